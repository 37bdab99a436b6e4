//! Ordered message channels between the main-thread bridge and the worker.
//!
//! Both directions are unbounded crossbeam channels, so messages from one
//! sender arrive in send order. The worker half runs either on its own
//! thread, inline inside [`WorkerLink::poll`], or nowhere at all (detached)
//! when a test wants to play the worker itself.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, trace};

use crate::config::WorldConfig;
use crate::error::{BridgeError, Result};
use crate::native::EngineLoader;
use crate::protocol::{FromWorker, ToWorker};
use crate::world::SimulationWorld;

/// Worker side of the channel pair.
pub struct WorkerEndpoint {
    inbound: Receiver<ToWorker>,
    outbound: Sender<FromWorker>,
}

impl WorkerEndpoint {
    /// Next message from the main thread, if one is queued.
    pub fn try_recv(&self) -> Option<ToWorker> {
        self.inbound.try_recv().ok()
    }

    /// Everything currently queued, in arrival order.
    pub fn drain(&self) -> Vec<ToWorker> {
        self.inbound.try_iter().collect()
    }

    pub fn post(&self, message: impl Into<FromWorker>) -> Result<()> {
        self.outbound
            .send(message.into())
            .map_err(|_| BridgeError::TransportClosed)
    }

    /// Feeds every queued message to `world` and posts its replies.
    ///
    /// Returns `false` once the main thread has hung up.
    pub fn pump(&self, world: &mut SimulationWorld) -> bool {
        for message in self.inbound.try_iter() {
            world.handle(message);
            if !self.flush(world) {
                return false;
            }
        }
        true
    }

    /// Blocking worker loop; returns when the main side drops its sender.
    pub fn run(self, mut world: SimulationWorld) {
        for message in self.inbound.iter() {
            world.handle(message);
            if !self.flush(&mut world) {
                break;
            }
        }
        debug!("worker loop finished");
    }

    fn flush(&self, world: &mut SimulationWorld) -> bool {
        for message in world.drain_outbox() {
            if self.outbound.send(message).is_err() {
                trace!("main thread gone, dropping worker output");
                return false;
            }
        }
        true
    }
}

enum Host {
    Thread(JoinHandle<()>),
    Inline {
        world: Box<SimulationWorld>,
        endpoint: WorkerEndpoint,
    },
    Detached,
}

/// Main-thread side of the channel pair, plus whatever hosts the worker.
pub struct WorkerLink {
    to_worker: Sender<ToWorker>,
    from_worker: Receiver<FromWorker>,
    host: Host,
    transferable: bool,
}

fn channel_pair() -> (Sender<ToWorker>, Receiver<FromWorker>, WorkerEndpoint) {
    let (to_worker, inbound) = unbounded();
    let (outbound, from_worker) = unbounded();
    (
        to_worker,
        from_worker,
        WorkerEndpoint { inbound, outbound },
    )
}

impl WorkerLink {
    /// Hosts the worker the way `config.no_worker` asks for.
    pub fn spawn<L>(loader: L, config: &WorldConfig) -> Result<Self>
    where
        L: EngineLoader + 'static,
    {
        let link = if config.no_worker {
            Self::inline(loader)
        } else {
            Self::threaded(loader)?
        };
        Ok(link.with_transferable(config.transferable))
    }

    /// Runs the worker on a dedicated background thread.
    pub fn threaded<L>(loader: L) -> Result<Self>
    where
        L: EngineLoader + 'static,
    {
        let (to_worker, from_worker, endpoint) = channel_pair();
        let world = SimulationWorld::new(loader);
        let handle = thread::Builder::new()
            .name("physics-worker".into())
            .spawn(move || endpoint.run(world))
            .map_err(|err| BridgeError::WorkerSpawn(err.to_string()))?;
        debug!("physics worker thread started");
        Ok(Self {
            to_worker,
            from_worker,
            host: Host::Thread(handle),
            transferable: true,
        })
    }

    /// Runs the worker on the calling thread, one pump per [`poll`](Self::poll).
    pub fn inline<L>(loader: L) -> Self
    where
        L: EngineLoader + 'static,
    {
        let (to_worker, from_worker, endpoint) = channel_pair();
        Self {
            to_worker,
            from_worker,
            host: Host::Inline {
                world: Box::new(SimulationWorld::new(loader)),
                endpoint,
            },
            transferable: true,
        }
    }

    /// A link with no worker behind it; the caller drives the returned endpoint.
    pub fn detached() -> (Self, WorkerEndpoint) {
        let (to_worker, from_worker, endpoint) = channel_pair();
        let link = Self {
            to_worker,
            from_worker,
            host: Host::Detached,
            transferable: true,
        };
        (link, endpoint)
    }

    pub fn with_transferable(mut self, transferable: bool) -> Self {
        self.transferable = transferable;
        self
    }

    /// Whether report buffers should be handed back to the worker after use.
    pub fn transferable(&self) -> bool {
        self.transferable
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.host, Host::Inline { .. })
    }

    pub fn send(&self, message: impl Into<ToWorker>) -> Result<()> {
        self.to_worker.send(message.into()).map_err(|_| {
            error!("worker channel closed, message dropped");
            BridgeError::TransportClosed
        })
    }

    /// Everything the worker has posted so far. An inline worker first
    /// processes its pending inbox.
    pub fn poll(&mut self) -> Vec<FromWorker> {
        if let Host::Inline { world, endpoint } = &mut self.host {
            endpoint.pump(world);
        }
        self.from_worker.try_iter().collect()
    }

    /// Blocks until the worker posts something or `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> Option<FromWorker> {
        if let Host::Inline { world, endpoint } = &mut self.host {
            endpoint.pump(world);
            return self.from_worker.try_recv().ok();
        }
        match self.from_worker.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                error!("worker hung up");
                None
            }
        }
    }

    /// The inline worker's world, for inspection.
    pub fn inline_world(&self) -> Option<&SimulationWorld> {
        match &self.host {
            Host::Inline { world, .. } => Some(&**world),
            _ => None,
        }
    }

    /// Closes the channel and waits for a threaded worker to exit.
    pub fn shutdown(self) {
        let WorkerLink { to_worker, host, .. } = self;
        drop(to_worker);
        if let Host::Thread(handle) = host {
            if handle.join().is_err() {
                error!("physics worker thread panicked");
            }
        }
    }
}
