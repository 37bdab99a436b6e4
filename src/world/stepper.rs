//! Simulation stepper: advances the native world and emits the reports.

use log::trace;

use super::reports;
use super::session::Session;
use crate::protocol::FromWorker;
use crate::utils::logging::{warn_if_step_budget_exceeded, ScopedTimer};

/// Step length and substep cap actually handed to the engine.
///
/// Requests shorter than the fixed step are raised to it, and a missing or
/// zero substep cap becomes whatever keeps the world caught up.
pub fn step_parameters(
    time_step: Option<f32>,
    max_sub_steps: Option<u32>,
    fixed_time_step: f32,
) -> (f32, u32) {
    let time_step = time_step
        .filter(|step| step.is_finite() && *step > fixed_time_step)
        .unwrap_or(fixed_time_step);
    let max_sub_steps = max_sub_steps
        .filter(|steps| *steps > 0)
        .unwrap_or_else(|| (time_step / fixed_time_step).ceil() as u32);
    (time_step, max_sub_steps)
}

impl Session {
    /// Steps the world, then reports vehicles, collisions, constraints, rigid
    /// bodies and soft bodies, in that order.
    pub(crate) fn simulate(
        &mut self,
        time_step: Option<f32>,
        max_sub_steps: Option<u32>,
        outbox: &mut Vec<FromWorker>,
    ) {
        let fixed = self.config.effective_fixed_time_step();
        let (time_step, max_sub_steps) = step_parameters(time_step, max_sub_steps, fixed);

        let timer = ScopedTimer::new("simulate");
        let substeps = self
            .engine
            .step_simulation(time_step, max_sub_steps, fixed);
        warn_if_step_budget_exceeded("simulate", timer.elapsed(), time_step * 1000.0);
        trace!("stepped {time_step}s in {substeps} substep(s)");
        drop(timer);

        let engine = &*self.engine;
        let registry = &self.registry;
        let slots = &mut self.reports;
        if !registry.vehicles.is_empty() {
            outbox.push(reports::report_vehicles(engine, registry, slots).into());
        }
        outbox.push(reports::report_collisions(engine, registry, slots).into());
        if !registry.constraints.is_empty() {
            outbox.push(reports::report_constraints(engine, registry, slots).into());
        }
        outbox.push(reports::report_world(engine, registry, slots).into());
        if self.config.softbody {
            outbox.push(reports::report_soft_bodies(engine, registry, slots).into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED: f32 = 1.0 / 60.0;

    #[test]
    fn short_steps_are_raised_to_the_fixed_step() {
        assert_eq!(step_parameters(Some(0.001), None, FIXED), (FIXED, 1));
        assert_eq!(step_parameters(None, None, FIXED), (FIXED, 1));
    }

    #[test]
    fn substeps_default_to_catching_up() {
        let (step, substeps) = step_parameters(Some(0.04), None, FIXED);
        assert_eq!(step, 0.04);
        assert_eq!(substeps, 3);
        assert_eq!(step_parameters(Some(0.04), Some(0), FIXED).1, 3);
        assert_eq!(step_parameters(Some(0.04), Some(1), FIXED).1, 1);
    }
}
