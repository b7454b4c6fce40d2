//! Greedy evaluation
use super::stats::{EpisodeMeans, EpisodeStatistics};
use super::train::{EnvState, TrainError};
use crate::agents::{ActionValuePolicy, PerAxis};
use crate::envs::{target_mask, Point, ScreenEnvironment};
use crate::schedules::ExplorationUpdate;
use crate::Prng;

/// Run `episodes` complete episodes with the greedy actions of the per-axis policies.
///
/// Rewards are scaled by `reward_scale` as in training. Nothing is stored or learned.
pub fn evaluate<E, P>(
    env: &mut E,
    policies: &mut PerAxis<P>,
    episodes: u64,
    reward_scale: f64,
    rng: &mut Prng,
) -> Result<EpisodeMeans, TrainError>
where
    E: ScreenEnvironment + ?Sized,
    P: ActionValuePolicy,
{
    let mut stats = EpisodeStatistics::new();
    let mut step = 0;
    let mut capture_start = 0;
    for _ in 0..episodes {
        let mut state = EnvState::reset(env)?;
        loop {
            let x = policies.x.act(&state.screen, &ExplorationUpdate::GREEDY, rng)?;
            let y = policies.y.act(&state.screen, &ExplorationUpdate::GREEDY, rng)?;
            let call = state.function_call(Point::new(x.index, y.index));
            let time_step = env.step(&call)?;

            let mut beacon_time = 0;
            if time_step.reward != 0.0 {
                beacon_time = step - capture_start;
                capture_start = step;
            }
            stats.record_step(
                time_step.reward * reward_scale,
                time_step.reward,
                beacon_time as f64,
            );
            step += 1;

            if time_step.is_last() {
                stats.end_episode();
                break;
            }
            state.screen = target_mask(time_step.observation.player_relative.view());
            state.time_step = time_step;
        }
    }
    Ok(stats.means())
}
