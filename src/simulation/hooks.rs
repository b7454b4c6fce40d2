//! Training hooks
use super::stats::EpisodeMeans;
use crate::agents::PerAxis;
use crate::logging::StatsLogger;

/// Training loop state visible to hooks at the end of an episode.
#[derive(Debug)]
pub struct EpisodeSnapshot<'a, P> {
    /// Global step counter at the step that ended the episode
    pub step: u64,
    /// Number of completed episodes, including this one
    pub num_episodes: u64,
    /// Rolling means over the completed episodes
    pub means: EpisodeMeans,
    /// Scheduled exploration rate at `step`
    pub exploration: f64,
    /// The per-axis policies
    pub policies: &'a PerAxis<P>,
}

/// Observer of the training loop.
pub trait TrainingHook<P> {
    /// Whether training should stop before running `step`.
    ///
    /// Checked once at the top of every step.
    fn should_stop(&mut self, _step: u64) -> bool {
        false
    }

    /// Called once for every completed episode.
    fn on_episode_end(&mut self, _snapshot: &EpisodeSnapshot<P>, _logger: &mut dyn StatsLogger) {}
}

impl<P> TrainingHook<P> for () {}

impl<P, H: TrainingHook<P> + ?Sized> TrainingHook<P> for &mut H {
    fn should_stop(&mut self, step: u64) -> bool {
        H::should_stop(self, step)
    }
    fn on_episode_end(&mut self, snapshot: &EpisodeSnapshot<P>, logger: &mut dyn StatsLogger) {
        H::on_episode_end(self, snapshot, logger)
    }
}

impl<P, H: TrainingHook<P> + ?Sized> TrainingHook<P> for Box<H> {
    fn should_stop(&mut self, step: u64) -> bool {
        H::should_stop(self, step)
    }
    fn on_episode_end(&mut self, snapshot: &EpisodeSnapshot<P>, logger: &mut dyn StatsLogger) {
        H::on_episode_end(self, snapshot, logger)
    }
}

/// An absent hook never stops training.
impl<P, H: TrainingHook<P>> TrainingHook<P> for Option<H> {
    fn should_stop(&mut self, step: u64) -> bool {
        self.as_mut().map_or(false, |hook| hook.should_stop(step))
    }
    fn on_episode_end(&mut self, snapshot: &EpisodeSnapshot<P>, logger: &mut dyn StatsLogger) {
        if let Some(hook) = self {
            hook.on_episode_end(snapshot, logger);
        }
    }
}

macro_rules! impl_hook_for_tuple {
    ($($name:ident),+) => {
        /// Calls every hook in order. Stops if any hook requests it.
        impl<P, $($name: TrainingHook<P>),+> TrainingHook<P> for ($($name,)+) {
            #[allow(non_snake_case)]
            fn should_stop(&mut self, step: u64) -> bool {
                let ($($name,)+) = self;
                let mut stop = false;
                $(stop |= $name.should_stop(step);)+
                stop
            }

            #[allow(non_snake_case)]
            fn on_episode_end(&mut self, snapshot: &EpisodeSnapshot<P>, logger: &mut dyn StatsLogger) {
                let ($($name,)+) = self;
                $($name.on_episode_end(snapshot, logger);)+
            }
        }
    };
}

impl_hook_for_tuple!(A);
impl_hook_for_tuple!(A, B);
impl_hook_for_tuple!(A, B, C);
impl_hook_for_tuple!(A, B, C, D);

/// Stop after a maximum number of steps.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StepLimit {
    pub max_steps: u64,
}

impl StepLimit {
    pub const fn new(max_steps: u64) -> Self {
        Self { max_steps }
    }
}

impl<P> TrainingHook<P> for StepLimit {
    fn should_stop(&mut self, step: u64) -> bool {
        step >= self.max_steps
    }
}

/// Stop after a maximum number of completed episodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EpisodeLimit {
    pub max_episodes: u64,
    completed: u64,
}

impl EpisodeLimit {
    pub const fn new(max_episodes: u64) -> Self {
        Self {
            max_episodes,
            completed: 0,
        }
    }
}

impl<P> TrainingHook<P> for EpisodeLimit {
    fn should_stop(&mut self, _: u64) -> bool {
        self.completed >= self.max_episodes
    }

    fn on_episode_end(&mut self, snapshot: &EpisodeSnapshot<P>, _: &mut dyn StatsLogger) {
        self.completed = snapshot.num_episodes;
    }
}

/// Records every snapshot it sees, for tests.
#[cfg(test)]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SnapshotRecorder {
    /// `(step, num_episodes, means)` of each snapshot
    pub snapshots: Vec<(u64, u64, EpisodeMeans)>,
}

#[cfg(test)]
impl<P> TrainingHook<P> for SnapshotRecorder {
    fn on_episode_end(&mut self, snapshot: &EpisodeSnapshot<P>, _: &mut dyn StatsLogger) {
        self.snapshots
            .push((snapshot.step, snapshot.num_episodes, snapshot.means));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(policies: &PerAxis<()>, num_episodes: u64) -> EpisodeSnapshot<'_, ()> {
        EpisodeSnapshot {
            step: 10,
            num_episodes,
            means: EpisodeMeans::default(),
            exploration: 0.5,
            policies,
        }
    }

    #[test]
    fn step_limit() {
        let mut hook = StepLimit::new(3);
        assert!(!TrainingHook::<()>::should_stop(&mut hook, 2));
        assert!(TrainingHook::<()>::should_stop(&mut hook, 3));
    }

    #[test]
    fn episode_limit_counts_episodes() {
        let policies = PerAxis::new((), ());
        let mut hook = EpisodeLimit::new(2);
        hook.on_episode_end(&snapshot(&policies, 1), &mut ());
        assert!(!TrainingHook::<()>::should_stop(&mut hook, 0));
        hook.on_episode_end(&snapshot(&policies, 2), &mut ());
        assert!(TrainingHook::<()>::should_stop(&mut hook, 0));
    }

    #[test]
    fn tuple_calls_all_hooks() {
        let policies = PerAxis::new((), ());
        let mut hooks = (SnapshotRecorder::default(), StepLimit::new(5), SnapshotRecorder::default());
        hooks.on_episode_end(&snapshot(&policies, 1), &mut ());
        assert_eq!(hooks.0.snapshots.len(), 1);
        assert_eq!(hooks.2.snapshots.len(), 1);
        assert!(!TrainingHook::<()>::should_stop(&mut hooks, 4));
        assert!(TrainingHook::<()>::should_stop(&mut hooks, 5));
    }

    #[test]
    fn optional_hook() {
        let policies = PerAxis::new((), ());
        let mut hook: Option<EpisodeLimit> = None;
        hook.on_episode_end(&snapshot(&policies, 5), &mut ());
        assert!(!TrainingHook::<()>::should_stop(&mut hook, 0));

        let mut hook = Some(EpisodeLimit::new(1));
        hook.on_episode_end(&snapshot(&policies, 1), &mut ());
        assert!(TrainingHook::<()>::should_stop(&mut hook, 0));
    }
}
