//! Optimizers
use serde::{Deserialize, Serialize};
use tch::nn::{self, OptimizerConfig, VarStore};
use tch::{TchError, Tensor};

/// Build an optimizer for the trainable variables of a variable store.
pub trait BuildOptimizer {
    fn build_optimizer(&self, vs: &VarStore) -> Result<nn::Optimizer, TchError>;
}

/// Configuration for the Adam optimizer.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Coefficient for the running average of the gradient
    pub beta1: f64,
    /// Coefficient for the running average of the square of the gradient
    pub beta2: f64,
    /// Weight decay (L2 penalty)
    pub weight_decay: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 5e-4,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 0.0,
        }
    }
}

impl BuildOptimizer for AdamConfig {
    fn build_optimizer(&self, vs: &VarStore) -> Result<nn::Optimizer, TchError> {
        nn::Adam {
            beta1: self.beta1,
            beta2: self.beta2,
            wd: self.weight_decay,
            ..nn::Adam::default()
        }
        .build(vs, self.learning_rate)
    }
}

/// Backpropagate `loss` and take one optimization step.
///
/// With `max_grad_norm`, gradients are rescaled so that their total norm is at most that value.
pub fn backward_step(optimizer: &mut nn::Optimizer, loss: &Tensor, max_grad_norm: Option<f64>) {
    optimizer.zero_grad();
    loss.backward();
    if let Some(max_norm) = max_grad_norm {
        optimizer.clip_grad_norm(max_norm);
    }
    optimizer.step();
}
