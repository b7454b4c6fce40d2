//! Policy testing utilities
use super::{ActionValuePolicy, AxisAction, PersistPolicy, PolicyError, TrainStats};
use crate::buffers::SampledBatch;
use crate::envs::Screen;
use crate::schedules::ExplorationUpdate;
use crate::utils::save::SaveLoad;
use crate::Prng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Policy that always chooses the same coordinate and records how it is used.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedPolicy {
    pub num_actions: usize,
    pub action: usize,
    /// Absolute TD error reported for every trained transition.
    pub td_error: f64,
    pub updates: Vec<ExplorationUpdate>,
    /// Batches passed to `train`, in order.
    pub batches: Vec<SampledBatch>,
    pub target_updates: usize,
    pub restored_from: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedScript {
    num_actions: usize,
    action: usize,
}

impl ScriptedPolicy {
    pub const fn new(num_actions: usize, action: usize) -> Self {
        Self {
            num_actions,
            action,
            td_error: 0.5,
            updates: Vec::new(),
            batches: Vec::new(),
            target_updates: 0,
            restored_from: None,
        }
    }
}

impl ActionValuePolicy for ScriptedPolicy {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn act(
        &mut self,
        _state: &Screen,
        exploration: &ExplorationUpdate,
        _rng: &mut Prng,
    ) -> Result<AxisAction, PolicyError> {
        self.updates.push(*exploration);
        Ok(AxisAction {
            index: self.action,
            exploratory: false,
        })
    }

    fn train(&mut self, batch: &SampledBatch) -> Result<TrainStats, PolicyError> {
        if batch.is_empty() {
            return Err(PolicyError::EmptyBatch);
        }
        self.batches.push(batch.clone());
        Ok(TrainStats {
            loss: self.td_error,
            td_errors: vec![-self.td_error; batch.len()],
        })
    }

    fn update_target(&mut self) -> Result<(), PolicyError> {
        self.target_updates += 1;
        Ok(())
    }
}

impl PersistPolicy for ScriptedPolicy {
    fn save(&self, path: &Path) -> Result<(), PolicyError> {
        SavedScript {
            num_actions: self.num_actions,
            action: self.action,
        }
        .save(path)?;
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> Result<(), PolicyError> {
        let saved = SavedScript::load(path)?;
        if saved.num_actions != self.num_actions {
            return Err(PolicyError::Incompatible(format!(
                "{} actions saved, {} expected",
                saved.num_actions, self.num_actions
            )));
        }
        self.action = saved.action;
        self.restored_from = Some(path.to_owned());
        Ok(())
    }
}
