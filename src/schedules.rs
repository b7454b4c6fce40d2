//! Parameter schedules --- functions of the global step count during training.
use serde::{Deserialize, Serialize};

/// Linear interpolation from `initial_p` to `final_p` over `horizon` steps, then constant.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSchedule {
    /// Number of steps to reach `final_p`.
    pub horizon: u64,
    pub initial_p: f64,
    pub final_p: f64,
}

impl LinearSchedule {
    #[must_use]
    pub const fn new(horizon: u64, initial_p: f64, final_p: f64) -> Self {
        Self {
            horizon,
            initial_p,
            final_p,
        }
    }

    /// Schedule value at the given global step.
    #[must_use]
    pub fn value(&self, step: u64) -> f64 {
        // Exact at and beyond the horizon; also covers a zero horizon.
        if step >= self.horizon {
            return self.final_p;
        }
        let fraction = step as f64 / self.horizon as f64;
        fraction.mul_add(self.final_p - self.initial_p, self.initial_p)
    }
}

/// Default epsilon-greedy exploration: from 1 down to 0.01 over 100k steps.
impl Default for LinearSchedule {
    fn default() -> Self {
        Self::new(100_000, 1.0, 0.01)
    }
}

/// Parameter noise KL divergence threshold.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum NoiseThreshold {
    Fixed(f64),
    /// Match the divergence of epsilon-greedy exploration at the scheduled epsilon.
    Auto,
}

impl NoiseThreshold {
    #[must_use]
    pub fn value(&self, eps: f64, num_actions: usize) -> f64 {
        match self {
            Self::Fixed(threshold) => *threshold,
            Self::Auto => auto_noise_threshold(eps, num_actions),
        }
    }
}

/// Exploration strategy of the action selector.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExplorationMode {
    EpsilonGreedy,
    ParameterNoise(NoiseThreshold),
}

impl Default for ExplorationMode {
    fn default() -> Self {
        Self::EpsilonGreedy
    }
}

/// Exploration parameters handed to a policy for a single action.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExplorationUpdate {
    /// Act uniformly at random with probability `eps`.
    EpsilonGreedy { eps: f64 },
    /// Act greedily with respect to a perturbed network.
    ParameterNoise {
        /// KL divergence threshold for adapting the noise scale.
        threshold: f64,
        /// Re-sample the perturbation before acting.
        reset: bool,
        /// Adapt the perturbation scale before acting.
        update_scale: bool,
    },
}

impl ExplorationUpdate {
    /// No exploration.
    pub const GREEDY: Self = Self::EpsilonGreedy { eps: 0.0 };
}

/// KL threshold for which parameter noise explores about as much as epsilon-greedy.
///
/// See Appendix C.1 of "Parameter Space Noise for Exploration" (Plappert et al., 2017).
#[must_use]
pub fn auto_noise_threshold(eps: f64, num_actions: usize) -> f64 {
    -(1.0 - eps + eps / num_actions as f64).ln()
}
