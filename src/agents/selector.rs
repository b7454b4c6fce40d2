use super::{ActionValuePolicy, AxisAction, PerAxis, PolicyError};
use crate::envs::Screen;
use crate::schedules::{ExplorationMode, ExplorationUpdate, LinearSchedule};
use crate::Prng;

/// Chooses screen coordinates with one independent policy per axis.
///
/// Both policies share the exploration schedule and the global step counter
/// but own separate parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSelector<P> {
    policies: PerAxis<P>,
    exploration: LinearSchedule,
    mode: ExplorationMode,
}

impl<P> CoordinateSelector<P> {
    pub const fn new(policies: PerAxis<P>, exploration: LinearSchedule, mode: ExplorationMode) -> Self {
        Self {
            policies,
            exploration,
            mode,
        }
    }

    pub const fn policies(&self) -> &PerAxis<P> {
        &self.policies
    }

    pub fn policies_mut(&mut self) -> &mut PerAxis<P> {
        &mut self.policies
    }

    /// Scheduled exploration rate at a global step.
    pub fn exploration_rate(&self, step: u64) -> f64 {
        self.exploration.value(step)
    }

    /// Exploration parameters for a policy with `num_actions` coordinates.
    pub fn exploration_update(
        &self,
        step: u64,
        fresh_episode: bool,
        num_actions: usize,
    ) -> ExplorationUpdate {
        let eps = self.exploration.value(step);
        match self.mode {
            ExplorationMode::EpsilonGreedy => ExplorationUpdate::EpsilonGreedy { eps },
            ExplorationMode::ParameterNoise(threshold) => ExplorationUpdate::ParameterNoise {
                threshold: threshold.value(eps, num_actions),
                reset: fresh_episode,
                update_scale: true,
            },
        }
    }
}

impl<P: ActionValuePolicy> CoordinateSelector<P> {
    /// Select a coordinate on each axis for the given screen.
    ///
    /// `fresh_episode` marks the first selection of an episode.
    pub fn select(
        &mut self,
        state: &Screen,
        step: u64,
        fresh_episode: bool,
        rng: &mut Prng,
    ) -> Result<PerAxis<AxisAction>, PolicyError> {
        let updates = PerAxis::from_fn(|axis| {
            self.exploration_update(step, fresh_episode, self.policies[axis].num_actions())
        });
        let x = self.policies.x.act(state, &updates.x, rng)?;
        let y = self.policies.y.act(state, &updates.y, rng)?;
        Ok(PerAxis::new(x, y))
    }
}
