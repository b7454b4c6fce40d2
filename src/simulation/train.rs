//! Training loop
use super::checkpoint::{BestModelRecord, ModelSelection};
use super::hooks::{EpisodeSnapshot, TrainingHook};
use super::stats::{round1, EpisodeMeans, EpisodeStatistics};
use crate::agents::{
    ActionValuePolicy, Axis, CoordinateSelector, PerAxis, PersistPolicy, PolicyError,
};
use crate::buffers::{ExperienceStore, StoreConfig, StoreError, Transition};
use crate::envs::{
    target_mask, EnvError, FunctionCall, FunctionId, Point, Screen, ScreenEnvironment, TimeStep,
    UnitTracker,
};
use crate::logging::{Id, LogError, Loggable, StatsLogger};
use crate::Prng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Training loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Total number of environment steps
    pub max_timesteps: u64,
    /// Transitions per sampled batch
    pub batch_size: usize,
    /// Learn only on steps strictly after this one
    pub learning_starts: u64,
    /// Learn every this many steps
    pub train_freq: u64,
    /// Copy the online networks to the target networks every this many steps
    pub target_network_update_freq: u64,
    /// Environment rewards are multiplied by this factor
    pub reward_scale: f64,
    /// Consider checkpointing every this many steps. `None` disables checkpoints.
    pub checkpoint_freq: Option<u64>,
    /// Completed episodes required before checkpointing
    pub checkpoint_min_episodes: u64,
    /// Factor by which the mean reward must beat the checkpointed one
    pub checkpoint_margin: f64,
    /// Directory of the best checkpoint of this run. `None` skips writing it.
    pub checkpoint_dir: Option<PathBuf>,
    /// Experience store of each axis
    pub replay: StoreConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_timesteps: 2_000_000,
            batch_size: 32,
            learning_starts: 500,
            train_freq: 4,
            target_network_update_freq: 100,
            reward_scale: 100.0,
            checkpoint_freq: Some(10_000),
            checkpoint_min_episodes: 100,
            checkpoint_margin: 1.2,
            checkpoint_dir: None,
            replay: StoreConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Selection rule of the in-run best checkpoint, if enabled.
    pub fn checkpoint_selection(&self) -> Option<ModelSelection> {
        self.checkpoint_freq.map(|every| ModelSelection {
            after_step: self.learning_starts,
            min_episodes: self.checkpoint_min_episodes,
            margin: self.checkpoint_margin,
            every: Some(every),
        })
    }

    /// Build the experience store of each axis.
    pub fn build_stores(&self) -> Result<PerAxis<Box<dyn ExperienceStore>>, StoreError> {
        Ok(PerAxis::new(self.replay.build_store()?, self.replay.build_store()?))
    }

    fn is_learning_step(&self, step: u64) -> bool {
        step > self.learning_starts && is_multiple(step, self.train_freq)
    }

    fn is_target_update_step(&self, step: u64) -> bool {
        step > self.learning_starts && is_multiple(step, self.target_network_update_freq)
    }
}

const fn is_multiple(step: u64, interval: u64) -> bool {
    interval > 0 && step % interval == 0
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Outcome of a training run.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSummary {
    /// Number of environment steps taken
    pub steps: u64,
    /// Number of completed episodes
    pub episodes: u64,
    /// Rolling means at the end of training
    pub means: EpisodeMeans,
    /// Mean reward of the checkpoint restored into the policies, if any
    pub restored_mean_reward: Option<f64>,
    /// Whether a hook stopped training before `max_timesteps`
    pub stopped_early: bool,
}

const CHECKPOINT_FILES: PerAxis<&str> = PerAxis::new("x.cbor", "y.cbor");
const PARTIAL_CHECKPOINT_FILES: PerAxis<&str> = PerAxis::new("x.cbor.part", "y.cbor.part");

/// Best checkpoint of the current run.
struct RunCheckpoint<'a> {
    selection: ModelSelection,
    record: BestModelRecord,
    dir: Option<&'a Path>,
    /// Mean reward of the complete pair of files in `dir`, if any
    saved: Option<f64>,
}

impl<'a> RunCheckpoint<'a> {
    fn new(selection: ModelSelection, dir: Option<&'a Path>) -> Self {
        Self {
            selection,
            record: BestModelRecord::new(selection.margin),
            dir,
            saved: None,
        }
    }

    /// Save the policies if eligible and improved. Failures are logged, never returned.
    ///
    /// The record is updated whether or not the files are written.
    /// Both axes are written before either replaces the previous checkpoint.
    fn consider<P: PersistPolicy, L: StatsLogger>(
        &mut self,
        step: u64,
        num_episodes: u64,
        mean_reward: f64,
        policies: &PerAxis<P>,
        logger: &mut L,
    ) -> Result<(), LogError> {
        if !self.selection.is_eligible(step, num_episodes) {
            return Ok(());
        }
        let previous = self.record.best();
        let mean_reward = match self.record.offer(mean_reward) {
            Some(mean) => mean,
            None => return Ok(()),
        };
        logger.log_message(
            "checkpoint",
            format!(
                "saving model due to mean reward increase: {:?} -> {}",
                previous, mean_reward
            ),
        )?;
        let dir = match self.dir {
            Some(dir) => dir,
            None => return Ok(()),
        };
        if let Err(err) = fs::create_dir_all(dir) {
            return logger.log_message("checkpoint", format!("cannot create {}: {}", dir.display(), err));
        }
        for axis in Axis::ALL {
            let path = dir.join(PARTIAL_CHECKPOINT_FILES[axis]);
            if let Err(err) = policies[axis].save(&path) {
                return logger.log_message("checkpoint", format!("cannot save {}: {}", path.display(), err));
            }
        }
        for axis in Axis::ALL {
            let from = dir.join(PARTIAL_CHECKPOINT_FILES[axis]);
            let to = dir.join(CHECKPOINT_FILES[axis]);
            if let Err(err) = fs::rename(&from, &to) {
                // The pair on disk is now mixed
                self.saved = None;
                return logger.log_message("checkpoint", format!("cannot move {}: {}", from.display(), err));
            }
        }
        self.saved = Some(mean_reward);
        Ok(())
    }

    /// Load the saved checkpoint into the policies, returning its mean reward.
    fn restore<P: PersistPolicy>(&self, policies: &mut PerAxis<P>) -> Result<Option<f64>, PolicyError> {
        let (mean_reward, dir) = match (self.saved, self.dir) {
            (Some(mean_reward), Some(dir)) => (mean_reward, dir),
            _ => return Ok(None),
        };
        for (axis, policy) in policies.iter_mut() {
            policy.restore(&dir.join(CHECKPOINT_FILES[axis]))?;
        }
        Ok(Some(mean_reward))
    }
}

/// Environment state tracked by the loop between steps.
pub(super) struct EnvState {
    pub time_step: TimeStep,
    pub screen: Screen,
    pub unit: UnitTracker,
}

impl EnvState {
    pub fn reset<E: ScreenEnvironment + ?Sized>(env: &mut E) -> Result<Self, EnvError> {
        let time_step = env.reset()?;
        let screen = target_mask(time_step.observation.player_relative.view());
        let mut unit = UnitTracker::new();
        unit.reset(time_step.observation.player_relative.view());
        Ok(Self {
            time_step,
            screen,
            unit,
        })
    }

    /// The call to issue for the chosen coordinate.
    ///
    /// Selects the army instead whenever moving is not available.
    pub fn function_call(&self, target: Point) -> FunctionCall {
        if self.time_step.observation.is_available(FunctionId::MoveScreen) {
            FunctionCall::move_now(target)
        } else {
            FunctionCall::SELECT_ALL
        }
    }
}

/// Train the per-axis policies of `selector` on an environment.
///
/// Runs until `config.max_timesteps` steps have been taken or a hook requests a stop.
/// Each step issues one call to the environment and stores one transition per axis.
/// When a best checkpoint was saved during the run it is restored into the policies at the end.
///
/// # Args
/// * `env` - Environment, reset at the start of training and after every episode.
/// * `selector` - Coordinate selector holding the policies to train.
/// * `stores` - Experience store of each axis.
/// * `config` - Training loop configuration.
/// * `hooks` - Observers called at the end of every episode.
/// * `logger` - Statistics logger.
/// * `rng` - Source of exploration and sampling randomness.
pub fn train<E, P, S, H, L>(
    env: &mut E,
    selector: &mut CoordinateSelector<P>,
    stores: &mut PerAxis<S>,
    config: &TrainConfig,
    hooks: &mut H,
    logger: &mut L,
    rng: &mut Prng,
) -> Result<TrainSummary, TrainError>
where
    E: ScreenEnvironment + ?Sized,
    P: ActionValuePolicy + PersistPolicy,
    S: ExperienceStore,
    H: TrainingHook<P> + ?Sized,
    L: StatsLogger,
{
    let beta_schedule = config.replay.beta_schedule(config.max_timesteps);
    let priority_eps = config.replay.priority_eps();
    let mut checkpoint = config
        .checkpoint_selection()
        .map(|selection| RunCheckpoint::new(selection, config.checkpoint_dir.as_deref()));

    let mut state = EnvState::reset(env)?;
    let mut stats = EpisodeStatistics::new();
    let mut num_episodes = 0;
    let mut fresh_episode = true;
    let mut capture_start = 0;
    let mut stopped_early = false;
    let mut step = 0;

    while step < config.max_timesteps {
        if hooks.should_stop(step) {
            stopped_early = true;
            break;
        }

        let actions = selector.select(&state.screen, step, fresh_episode, rng)?;
        fresh_episode = false;
        let target = Point::new(actions.x.index, actions.y.index);
        let call = state.function_call(target);
        let origin = state.unit.position();

        let time_step = env.step(&call)?;
        let next_screen = target_mask(time_step.observation.player_relative.view());
        state.unit.update(time_step.observation.player_relative.view());

        let mut beacon_time = 0;
        if time_step.reward != 0.0 {
            beacon_time = step - capture_start;
            capture_start = step;
        }
        let reward = time_step.reward * config.reward_scale;
        let done = time_step.is_last();

        for (axis, store) in stores.iter_mut() {
            store.add(Transition {
                state: state.screen.clone(),
                action: actions[axis].index,
                reward,
                next_state: next_screen.clone(),
                done,
            });
        }
        stats.record_step(reward, time_step.reward, beacon_time as f64);

        logger.group_start();
        if let (FunctionCall::MoveScreen { .. }, Some(origin)) = (call, origin) {
            logger.group_log("move_distance".into(), Loggable::Scalar(origin.distance(&target)))?;
        }
        for axis in Axis::ALL {
            logger.group_log(
                Id::new().with(axis.name()).with("exploratory"),
                Loggable::Scalar(if actions[axis].exploratory { 1.0 } else { 0.0 }),
            )?;
        }
        logger.group_end();

        state.time_step = time_step;
        state.screen = next_screen;
        if done {
            state = EnvState::reset(env)?;
            stats.end_episode();
            num_episodes += 1;
            fresh_episode = true;
        }

        if config.is_learning_step(step) {
            let beta = beta_schedule.map(|schedule| schedule.value(step));
            for axis in Axis::ALL {
                let batch = stores[axis].sample(config.batch_size, beta, rng)?;
                let train_stats = selector.policies_mut()[axis].train(&batch)?;
                if let (Some(indices), Some(eps)) = (&batch.indices, priority_eps) {
                    let priorities: Vec<f64> = train_stats
                        .td_errors
                        .iter()
                        .map(|td| td.abs() + eps)
                        .collect();
                    stores[axis].update_priorities(indices, &priorities)?;
                }
                log_train_stats(logger, axis, train_stats.loss, &train_stats.td_errors)?;
            }
        }

        if config.is_target_update_step(step) {
            for (_, policy) in selector.policies_mut().iter_mut() {
                policy.update_target()?;
            }
        }

        let means = stats.means();
        if done {
            let exploration = selector.exploration_rate(step);
            log_episode(logger, step, &stats, means, exploration)?;
            hooks.on_episode_end(
                &EpisodeSnapshot {
                    step,
                    num_episodes,
                    means,
                    exploration,
                    policies: selector.policies(),
                },
                logger,
            );
        }

        if let Some(checkpoint) = &mut checkpoint {
            checkpoint.consider(step, num_episodes, means.reward, selector.policies(), logger)?;
        }

        step += 1;
    }

    let mut restored_mean_reward = None;
    if let Some(checkpoint) = &checkpoint {
        restored_mean_reward = checkpoint.restore(selector.policies_mut())?;
        if let Some(mean) = restored_mean_reward {
            logger.log_message(
                "checkpoint",
                format!("restored model with mean reward: {}", mean),
            )?;
        }
    }
    logger.flush();

    Ok(TrainSummary {
        steps: step,
        episodes: num_episodes,
        means: stats.means(),
        restored_mean_reward,
        stopped_early,
    })
}

fn log_train_stats<L: StatsLogger>(
    logger: &mut L,
    axis: Axis,
    loss: f64,
    td_errors: &[f64],
) -> Result<(), LogError> {
    logger.group_start();
    logger.group_log(Id::new().with(axis.name()).with("loss"), Loggable::Scalar(loss))?;
    if !td_errors.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let mean_abs = td_errors.iter().map(|td| td.abs()).sum::<f64>() / td_errors.len() as f64;
        logger.group_log(Id::new().with(axis.name()).with("td_error"), Loggable::Scalar(mean_abs))?;
    }
    logger.group_end();
    Ok(())
}

/// Log the per-episode record. The episode counter goes last so that it closes the chunk.
#[allow(clippy::cast_precision_loss)]
fn log_episode<L: StatsLogger>(
    logger: &mut L,
    step: u64,
    stats: &EpisodeStatistics,
    means: EpisodeMeans,
    exploration: f64,
) -> Result<(), LogError> {
    logger.group_start();
    logger.group_log("steps".into(), Loggable::Scalar(step as f64))?;
    if let Some(reward) = stats.rewards().last() {
        logger.group_log("episode_reward".into(), Loggable::Scalar(reward))?;
    }
    logger.group_log("mean_100ep_reward".into(), Loggable::Scalar(round1(means.reward)))?;
    logger.group_log("mean_100ep_beacon".into(), Loggable::Scalar(round1(means.beacons)))?;
    logger.group_log(
        "pct_time_exploring".into(),
        Loggable::Scalar((100.0 * exploration).trunc()),
    )?;
    if let Some(beacon_time) = means.beacon_time {
        logger.group_log("mean_beacon_time".into(), Loggable::Scalar(beacon_time))?;
    }
    logger.group_log("episodes".into(), Loggable::CounterIncrement(1))?;
    logger.group_end();
    Ok(())
}
