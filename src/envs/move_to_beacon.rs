//! Move-to-beacon screen environment
use super::{
    EnvError, FunctionCall, FunctionId, Observation, PlayerRelative, Point, ScreenEnvironment,
    StepType, TimeStep,
};
use crate::Prng;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Configuration of [`MoveToBeacon`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveToBeaconConfig {
    /// Side length of the square screen in cells.
    pub screen_size: usize,
    /// Number of agent steps in each episode.
    pub episode_steps: u64,
    /// Distance the unit travels per agent step, in cells.
    pub unit_speed: f64,
    /// Radius of the drawn unit, in cells.
    pub unit_radius: f64,
    /// The beacon is captured when the unit centre is within this radius of the beacon centre.
    pub beacon_radius: f64,
}

impl Default for MoveToBeaconConfig {
    fn default() -> Self {
        // 120 game seconds at 8 game loops per agent step.
        Self {
            screen_size: 16,
            episode_steps: 240,
            unit_speed: 1.5,
            unit_radius: 0.75,
            beacon_radius: 1.5,
        }
    }
}

/// Move-to-beacon environment
///
/// A single friendly unit and a neutral beacon on an empty square screen.
/// Reaching the beacon gives a reward of 1 and moves the beacon to a new random location.
/// The unit starts unselected; move commands are only available once the army is selected.
/// Move orders persist across steps until the unit reaches the ordered point.
#[derive(Debug, Clone)]
pub struct MoveToBeacon {
    config: MoveToBeaconConfig,
    rng: Prng,
    state: Option<BeaconState>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct BeaconState {
    unit: (f64, f64),
    beacon: (f64, f64),
    order: Option<(f64, f64)>,
    selected: bool,
    steps: u64,
}

impl MoveToBeacon {
    #[must_use]
    pub fn new(config: MoveToBeaconConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Prng::seed_from_u64(seed),
            state: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &MoveToBeaconConfig {
        &self.config
    }

    fn sample_location(&mut self, margin: f64) -> (f64, f64) {
        let size = self.config.screen_size as f64;
        let (low, high) = if 2.0 * margin < size {
            (margin, size - margin)
        } else {
            (0.0, size)
        };
        (self.rng.gen_range(low..high), self.rng.gen_range(low..high))
    }

    /// Sample a beacon location not already touching the unit.
    fn sample_beacon(&mut self, unit: (f64, f64)) -> (f64, f64) {
        let min_distance = self.config.beacon_radius + self.config.unit_radius;
        let mut beacon = self.sample_location(self.config.beacon_radius);
        // A bounded number of attempts; tiny screens may not have any valid location.
        for _ in 0..100 {
            if distance(beacon, unit) > min_distance {
                break;
            }
            beacon = self.sample_location(self.config.beacon_radius);
        }
        beacon
    }

    fn observe(&self, state: &BeaconState) -> Observation {
        let size = self.config.screen_size;
        let mut player_relative = Array2::zeros((size, size));
        paint(
            &mut player_relative,
            state.beacon,
            self.config.beacon_radius,
            PlayerRelative::Neutral,
        );
        // The unit is drawn on top of the beacon.
        paint(
            &mut player_relative,
            state.unit,
            self.config.unit_radius,
            PlayerRelative::SelfUnit,
        );

        let mut available_actions: BTreeSet<_> =
            [FunctionId::NoOp, FunctionId::SelectArmy].into_iter().collect();
        if state.selected {
            available_actions.insert(FunctionId::MoveScreen);
            available_actions.insert(FunctionId::AttackScreen);
        }
        Observation {
            player_relative,
            available_actions,
        }
    }

    fn check_target(&self, target: Point) -> Result<(f64, f64), EnvError> {
        let size = self.config.screen_size;
        if target.x >= size || target.y >= size {
            return Err(EnvError::OutOfBounds {
                point: target,
                size,
            });
        }
        Ok((target.x as f64 + 0.5, target.y as f64 + 0.5))
    }
}

impl Default for MoveToBeacon {
    fn default() -> Self {
        Self::new(MoveToBeaconConfig::default(), 0)
    }
}

impl ScreenEnvironment for MoveToBeacon {
    fn screen_size(&self) -> usize {
        self.config.screen_size
    }

    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        let unit = self.sample_location(self.config.unit_radius);
        let beacon = self.sample_beacon(unit);
        let state = BeaconState {
            unit,
            beacon,
            order: None,
            selected: false,
            steps: 0,
        };
        let observation = self.observe(&state);
        self.state = Some(state);
        Ok(TimeStep {
            step_type: StepType::First,
            reward: 0.0,
            observation,
        })
    }

    fn step(&mut self, action: &FunctionCall) -> Result<TimeStep, EnvError> {
        let mut state = self.state.ok_or(EnvError::NeedsReset)?;

        match *action {
            FunctionCall::NoOp => {}
            FunctionCall::SelectArmy { add: _ } => state.selected = true,
            FunctionCall::MoveScreen { queued, target }
            | FunctionCall::AttackScreen { queued, target } => {
                if !state.selected {
                    return Err(EnvError::UnavailableAction(action.id()));
                }
                let target = self.check_target(target)?;
                // There is a single order slot: a queued order only applies once the unit is idle.
                if !queued || state.order.is_none() {
                    state.order = Some(target);
                }
            }
        }

        if let Some(order) = state.order {
            let remaining = distance(state.unit, order);
            if remaining <= self.config.unit_speed {
                state.unit = order;
                state.order = None;
            } else {
                let scale = self.config.unit_speed / remaining;
                state.unit.0 += (order.0 - state.unit.0) * scale;
                state.unit.1 += (order.1 - state.unit.1) * scale;
            }
        }

        let mut reward = 0.0;
        if distance(state.unit, state.beacon) <= self.config.beacon_radius {
            reward = 1.0;
            state.beacon = self.sample_beacon(state.unit);
        }

        state.steps += 1;
        let step_type = if state.steps >= self.config.episode_steps {
            StepType::Last
        } else {
            StepType::Mid
        };

        let observation = self.observe(&state);
        self.state = if step_type == StepType::Last {
            None
        } else {
            Some(state)
        };
        Ok(TimeStep {
            step_type,
            reward,
            observation,
        })
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Label every cell whose centre lies within `radius` of `centre`, and always the centre cell.
fn paint(screen: &mut Array2<u8>, centre: (f64, f64), radius: f64, label: PlayerRelative) {
    let (rows, cols) = screen.dim();
    for ((y, x), cell) in screen.indexed_iter_mut() {
        if distance((x as f64 + 0.5, y as f64 + 0.5), centre) <= radius {
            *cell = label.label();
        }
    }
    // Cast is safe: centres are clamped into the screen
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (x, y) = (
        (centre.0.max(0.0) as usize).min(cols - 1),
        (centre.1.max(0.0) as usize).min(rows - 1),
    );
    screen[[y, x]] = label.label();
}

#[cfg(test)]
mod tests {
    use super::super::self_position;
    use super::*;

    fn small_env() -> MoveToBeacon {
        MoveToBeacon::new(
            MoveToBeaconConfig {
                episode_steps: 5,
                ..MoveToBeaconConfig::default()
            },
            1,
        )
    }

    #[test]
    fn reset_is_first_step_with_unit_and_beacon() {
        let mut env = small_env();
        let step = env.reset().unwrap();
        assert_eq!(step.step_type, StepType::First);
        assert_eq!(step.reward, 0.0);
        let screen = &step.observation.player_relative;
        assert_eq!(screen.dim(), (16, 16));
        assert!(self_position(screen.view()).is_some());
        assert!(screen.iter().any(|&c| c == PlayerRelative::Neutral.label()));
    }

    #[test]
    fn move_requires_selection() {
        let mut env = small_env();
        let step = env.reset().unwrap();
        assert!(!step.observation.is_available(FunctionId::MoveScreen));
        assert_eq!(
            env.step(&FunctionCall::move_now(Point::new(0, 0))),
            Err(EnvError::UnavailableAction(FunctionId::MoveScreen))
        );

        let step = env.step(&FunctionCall::SELECT_ALL).unwrap();
        assert!(step.observation.is_available(FunctionId::MoveScreen));
        assert!(env.step(&FunctionCall::move_now(Point::new(0, 0))).is_ok());
    }

    #[test]
    fn out_of_bounds_target() {
        let mut env = small_env();
        env.reset().unwrap();
        env.step(&FunctionCall::SELECT_ALL).unwrap();
        assert_eq!(
            env.step(&FunctionCall::move_now(Point::new(16, 0))),
            Err(EnvError::OutOfBounds {
                point: Point::new(16, 0),
                size: 16
            })
        );
    }

    #[test]
    fn episode_ends_after_configured_steps() {
        let mut env = small_env();
        env.reset().unwrap();
        for _ in 0..4 {
            assert_eq!(
                env.step(&FunctionCall::NoOp).unwrap().step_type,
                StepType::Mid
            );
        }
        assert!(env.step(&FunctionCall::NoOp).unwrap().is_last());
        assert_eq!(env.step(&FunctionCall::NoOp), Err(EnvError::NeedsReset));
        assert!(env.reset().is_ok());
    }

    #[test]
    fn stepping_before_reset_fails() {
        let mut env = MoveToBeacon::default();
        assert_eq!(env.step(&FunctionCall::NoOp), Err(EnvError::NeedsReset));
    }

    #[test]
    fn walking_to_beacon_captures_and_relocates_it() {
        let mut env = MoveToBeacon::new(
            MoveToBeaconConfig {
                episode_steps: 1000,
                ..MoveToBeaconConfig::default()
            },
            3,
        );
        env.reset().unwrap();
        env.step(&FunctionCall::SELECT_ALL).unwrap();

        let beacon = env.state.unwrap().beacon;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let target = Point::new(beacon.0 as usize, beacon.1 as usize);
        let mut step = env.step(&FunctionCall::move_now(target)).unwrap();
        let mut steps = 1;
        while step.reward == 0.0 {
            assert!(steps < 50, "unit never reached the beacon");
            step = env.step(&FunctionCall::NoOp).unwrap();
            steps += 1;
        }
        assert_eq!(step.reward, 1.0);
        assert_ne!(env.state.unwrap().beacon, beacon);
    }

    #[test]
    fn seeded_resets_are_reproducible() {
        let mut env1 = MoveToBeacon::new(MoveToBeaconConfig::default(), 7);
        let mut env2 = MoveToBeacon::new(MoveToBeaconConfig::default(), 7);
        assert_eq!(env1.reset().unwrap(), env2.reset().unwrap());
    }
}
