//! Environment testing utilities
use super::{
    EnvError, FunctionCall, FunctionId, Observation, PlayerRelative, Point, ScreenEnvironment,
    StepType, TimeStep,
};
use ndarray::Array2;
use std::collections::BTreeSet;

/// Screen side length of [`ScriptedEnv`].
pub const SCRIPTED_SCREEN_SIZE: usize = 4;

/// One scripted environment step.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    pub reward: f64,
    pub last: bool,
    /// Location of the friendly unit; `None` renders it hidden.
    pub unit: Option<Point>,
    /// Whether move-screen is available on the *next* step.
    pub move_available: bool,
}

impl Frame {
    /// A visible unit at the origin, move available.
    pub const fn reward(reward: f64) -> Self {
        Self {
            reward,
            last: false,
            unit: Some(Point::new(0, 0)),
            move_available: true,
        }
    }

    pub const fn last(mut self) -> Self {
        self.last = true;
        self
    }

    pub const fn at(mut self, unit: Option<Point>) -> Self {
        self.unit = unit;
        self
    }

    pub const fn unavailable(mut self) -> Self {
        self.move_available = false;
        self
    }
}

/// Environment replaying a fixed script of frames in every episode.
///
/// Every issued action is accepted and recorded.
/// Stepping past the end of the script, or past a last frame, needs a reset.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedEnv {
    pub initial: Frame,
    pub frames: Vec<Frame>,
    pub actions: Vec<FunctionCall>,
    pub resets: usize,
    index: Option<usize>,
}

impl ScriptedEnv {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            initial: Frame::reward(0.0),
            frames,
            actions: Vec::new(),
            resets: 0,
            index: None,
        }
    }

    /// Script in which each reward is one step and the final one ends the episode.
    pub fn from_rewards(rewards: &[f64]) -> Self {
        let mut frames: Vec<_> = rewards.iter().map(|&r| Frame::reward(r)).collect();
        if let Some(frame) = frames.last_mut() {
            frame.last = true;
        }
        Self::new(frames)
    }

    fn time_step(frame: &Frame, step_type: StepType) -> TimeStep {
        let mut player_relative = Array2::zeros((SCRIPTED_SCREEN_SIZE, SCRIPTED_SCREEN_SIZE));
        player_relative[[SCRIPTED_SCREEN_SIZE - 1, SCRIPTED_SCREEN_SIZE - 1]] =
            PlayerRelative::Neutral.label();
        if let Some(unit) = frame.unit {
            player_relative[[unit.y, unit.x]] = PlayerRelative::SelfUnit.label();
        }
        let mut available_actions: BTreeSet<_> =
            [FunctionId::NoOp, FunctionId::SelectArmy].into_iter().collect();
        if frame.move_available {
            available_actions.insert(FunctionId::MoveScreen);
        }
        TimeStep {
            step_type,
            reward: frame.reward,
            observation: Observation {
                player_relative,
                available_actions,
            },
        }
    }
}

impl ScreenEnvironment for ScriptedEnv {
    fn screen_size(&self) -> usize {
        SCRIPTED_SCREEN_SIZE
    }

    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        self.resets += 1;
        self.index = Some(0);
        Ok(Self::time_step(&self.initial, StepType::First))
    }

    fn step(&mut self, action: &FunctionCall) -> Result<TimeStep, EnvError> {
        let index = self.index.ok_or(EnvError::NeedsReset)?;
        let frame = *self.frames.get(index).ok_or(EnvError::NeedsReset)?;
        self.actions.push(*action);
        let step_type = if frame.last {
            self.index = None;
            StepType::Last
        } else {
            self.index = Some(index + 1);
            StepType::Mid
        };
        Ok(Self::time_step(&frame, step_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_each_episode() {
        let mut env = ScriptedEnv::from_rewards(&[0.0, 1.0]);
        for _ in 0..2 {
            assert_eq!(env.reset().unwrap().step_type, StepType::First);
            assert_eq!(env.step(&FunctionCall::NoOp).unwrap().reward, 0.0);
            let last = env.step(&FunctionCall::NoOp).unwrap();
            assert!(last.is_last());
            assert_eq!(last.reward, 1.0);
        }
        assert_eq!(env.resets, 2);
        assert_eq!(env.actions.len(), 4);
    }

    #[test]
    fn step_after_last_needs_reset() {
        let mut env = ScriptedEnv::from_rewards(&[0.0]);
        assert_eq!(env.step(&FunctionCall::NoOp), Err(EnvError::NeedsReset));
        env.reset().unwrap();
        env.step(&FunctionCall::NoOp).unwrap();
        assert_eq!(env.step(&FunctionCall::NoOp), Err(EnvError::NeedsReset));
    }
}
