//! Readiness gate: holds outgoing work until the worker reports the native
//! engine loaded.

use std::collections::VecDeque;

use log::debug;

use crate::protocol::WorkerCommand;
use crate::utils::allocator::NodeId;

/// Work queued behind the engine load.
#[derive(Debug, Clone, PartialEq)]
pub enum Deferred {
    /// Describe and add a scene node; the description is built at replay
    /// time so it sees the node's latest transform.
    AddNode(NodeId),
    Command(WorkerCommand),
}

#[derive(Debug, Default)]
pub struct LoaderGate {
    open: bool,
    queue: VecDeque<Deferred>,
}

impl LoaderGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns the work back when it may run now, otherwise queues it.
    pub fn defer(&mut self, work: Deferred) -> Option<Deferred> {
        if self.open {
            Some(work)
        } else {
            self.queue.push_back(work);
            None
        }
    }

    /// Opens the gate and hands over everything queued, oldest first.
    pub fn open(&mut self) -> Vec<Deferred> {
        self.open = true;
        if !self.queue.is_empty() {
            debug!("replaying {} deferred operation(s)", self.queue.len());
        }
        self.queue.drain(..).collect()
    }

    /// Drops queued node additions for `node`, e.g. when it is removed
    /// before the engine ever loaded.
    pub fn forget_node(&mut self, node: NodeId) -> bool {
        let before = self.queue.len();
        self.queue
            .retain(|work| !matches!(work, Deferred::AddNode(queued) if *queued == node));
        before != self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_until_opened() {
        let mut gate = LoaderGate::new();
        assert!(gate
            .defer(Deferred::Command(WorkerCommand::OnSimulationResume))
            .is_none());
        assert!(gate.defer(Deferred::AddNode(NodeId::new(0, 0))).is_none());
        assert_eq!(gate.pending(), 2);

        let replay = gate.open();
        assert_eq!(replay.len(), 2);
        assert_eq!(
            replay[0],
            Deferred::Command(WorkerCommand::OnSimulationResume)
        );
        assert!(gate.defer(Deferred::AddNode(NodeId::new(1, 0))).is_some());
        assert_eq!(gate.pending(), 0);
    }

    #[test]
    fn forgotten_nodes_are_not_replayed() {
        let mut gate = LoaderGate::new();
        gate.defer(Deferred::AddNode(NodeId::new(3, 0)));
        assert!(gate.forget_node(NodeId::new(3, 0)));
        assert!(gate.open().is_empty());
    }
}
