//! Deep Q-network policy over one screen axis
use super::modules::{QNetConfig, QNetwork};
use super::optimizers::{backward_step, AdamConfig, BuildOptimizer};
use super::serialize::{DeviceDef, TensorData};
use crate::agents::{
    ActionValuePolicy, AxisAction, BuildAgentError, PersistPolicy, PolicyError, TrainStats,
};
use crate::buffers::SampledBatch;
use crate::envs::Screen;
use crate::schedules::ExplorationUpdate;
use crate::utils::save::SaveLoad;
use crate::Prng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tch::{nn, nn::Module, Device, Kind, Tensor};

/// Configuration of a [`DqnAxisPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqnConfig {
    pub q_network: QNetConfig,
    pub optimizer: AdamConfig,
    /// Discount factor
    pub gamma: f64,
    /// Clip the total gradient norm to this value.
    pub grad_norm_clipping: Option<f64>,
    /// Evaluate the target network at the online network's greedy action.
    pub double_q: bool,
    /// Initial standard deviation of the parameter noise.
    pub param_noise_scale: f64,
    pub device: DeviceDef,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            q_network: QNetConfig::default(),
            optimizer: AdamConfig::default(),
            gamma: 0.99,
            grad_norm_clipping: Some(10.0),
            double_q: true,
            param_noise_scale: 0.01,
            device: DeviceDef::default(),
        }
    }
}

impl DqnConfig {
    /// Build a policy choosing one of `num_actions` coordinates from `screen_size` screens.
    pub fn build_policy(
        &self,
        screen_size: usize,
        num_actions: usize,
    ) -> Result<DqnAxisPolicy, BuildAgentError> {
        DqnAxisPolicy::new(self, screen_size, num_actions)
    }
}

/// Network and variables of one parameter copy.
struct Network {
    vs: nn::VarStore,
    net: QNetwork,
}

impl Network {
    fn new(
        config: &QNetConfig,
        device: Device,
        screen_size: usize,
        num_actions: usize,
    ) -> Result<Self, BuildAgentError> {
        let vs = nn::VarStore::new(device);
        let net = config.build_network(&vs.root(), screen_size, num_actions)?;
        Ok(Self { vs, net })
    }

    /// Set the variables to those of `source` plus gaussian noise of standard deviation `scale`.
    fn perturb_from(&mut self, source: &nn::VarStore, scale: f64) -> Result<(), PolicyError> {
        let source_variables = source.variables();
        let _no_grad = tch::no_grad_guard();
        for (name, mut var) in self.vs.variables() {
            let original = source_variables.get(&name).ok_or_else(|| {
                PolicyError::Incompatible(format!("missing variable {}", name))
            })?;
            let noise = original.randn_like() * scale;
            var.f_copy_(&(original + noise))?;
        }
        Ok(())
    }
}

/// Deep Q-learning policy for the coordinate along one screen axis.
///
/// Based on "Human-level control through deep reinforcement learning" by Mnih et al. (2015)
/// with double Q-learning targets, a dueling architecture and importance-weighted Huber loss.
/// Parameter-space exploration follows
/// "Parameter Space Noise for Exploration" by Plappert et al. (2017).
pub struct DqnAxisPolicy {
    config: DqnConfig,
    screen_size: usize,
    num_actions: usize,
    device: Device,

    online: Network,
    target: Network,
    /// Noisy copy of `online` used to act in parameter noise mode.
    perturbed: Network,
    /// Noisy copy of `online` for measuring the divergence induced by the noise scale.
    adaptive: Network,
    optimizer: nn::Optimizer,
    noise_scale: f64,
}

impl fmt::Debug for DqnAxisPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DqnAxisPolicy")
            .field("config", &self.config)
            .field("screen_size", &self.screen_size)
            .field("num_actions", &self.num_actions)
            .field("device", &self.device)
            .field("noise_scale", &self.noise_scale)
            .finish()
    }
}

/// Serialized online parameters of a [`DqnAxisPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedQNetwork {
    pub q_network: QNetConfig,
    pub screen_size: usize,
    pub num_actions: usize,
    pub variables: BTreeMap<String, TensorData>,
}

impl DqnAxisPolicy {
    pub fn new(
        config: &DqnConfig,
        screen_size: usize,
        num_actions: usize,
    ) -> Result<Self, BuildAgentError> {
        let device = Device::from(config.device);
        let build = || Network::new(&config.q_network, device, screen_size, num_actions);
        let online = build()?;
        let mut target = build()?;
        target.vs.copy(&online.vs)?;
        let optimizer = config.optimizer.build_optimizer(&online.vs)?;
        Ok(Self {
            config: config.clone(),
            screen_size,
            num_actions,
            device,
            perturbed: build()?,
            adaptive: build()?,
            online,
            target,
            optimizer,
            noise_scale: config.param_noise_scale,
        })
    }

    /// Build a policy from a file written by [`PersistPolicy::save`].
    ///
    /// The network shape comes from the file; the remaining settings from `config`.
    pub fn load(path: &Path, config: &DqnConfig) -> Result<Self, PolicyError> {
        let saved = SavedQNetwork::load(path)?;
        let config = DqnConfig {
            q_network: saved.q_network.clone(),
            ..config.clone()
        };
        let mut policy = Self::new(&config, saved.screen_size, saved.num_actions)
            .map_err(|err| PolicyError::Incompatible(err.to_string()))?;
        policy.set_parameters(&saved)?;
        Ok(policy)
    }

    /// Current parameter noise standard deviation.
    #[must_use]
    pub const fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    /// Action values of the online network for each screen. Shape `[batch, num_actions]`.
    pub fn action_values(&self, screens: &[&Screen]) -> Result<Tensor, PolicyError> {
        let input = self.screens_tensor(screens)?;
        Ok(tch::no_grad(|| self.online.net.forward(&input)))
    }

    /// Stack screens into a float tensor of shape `[batch, 1, size, size]` on the policy device.
    fn screens_tensor(&self, screens: &[&Screen]) -> Result<Tensor, PolicyError> {
        let size = self.screen_size;
        let mut values = Vec::with_capacity(screens.len() * size * size);
        for screen in screens {
            if screen.dim() != (size, size) {
                return Err(PolicyError::StateShape {
                    shape: screen.dim(),
                    expected: size,
                });
            }
            values.extend(screen.iter().map(|&cell| f32::from(cell)));
        }
        #[allow(clippy::cast_possible_wrap)]
        let shape = [screens.len() as i64, 1, size as i64, size as i64];
        Ok(Tensor::of_slice(&values)
            .reshape(&shape)
            .to_device(self.device))
    }

    /// Adapt the noise scale so the perturbed policy diverges from the greedy one by `threshold`.
    fn adapt_noise_scale(&mut self, input: &Tensor, threshold: f64) -> Result<(), PolicyError> {
        self.adaptive
            .perturb_from(&self.online.vs, self.noise_scale)?;
        let kl_sum = tch::no_grad(|| {
            let log_p = self.online.net.forward(input).log_softmax(-1, Kind::Float);
            let log_q = self.adaptive.net.forward(input).log_softmax(-1, Kind::Float);
            (log_p.exp() * (&log_p - log_q)).sum(Kind::Float)
        });
        #[allow(clippy::cast_precision_loss)]
        let kl = f64::from(&kl_sum) / input.size()[0] as f64;
        if kl < threshold {
            self.noise_scale *= 1.01;
        } else {
            self.noise_scale /= 1.01;
        }
        Ok(())
    }

    fn set_parameters(&mut self, saved: &SavedQNetwork) -> Result<(), PolicyError> {
        if saved.q_network != self.config.q_network
            || saved.screen_size != self.screen_size
            || saved.num_actions != self.num_actions
        {
            return Err(PolicyError::Incompatible(format!(
                "saved {}x{} screens with {} actions, policy has {}x{} screens with {} actions",
                saved.screen_size,
                saved.screen_size,
                saved.num_actions,
                self.screen_size,
                self.screen_size,
                self.num_actions
            )));
        }
        {
            let _no_grad = tch::no_grad_guard();
            for (name, mut var) in self.online.vs.variables() {
                let data = saved.variables.get(&name).ok_or_else(|| {
                    PolicyError::Incompatible(format!("missing variable {}", name))
                })?;
                let value = data.to_tensor().ok_or_else(|| {
                    PolicyError::Incompatible(format!("variable {} has foreign byte order", name))
                })?;
                if value.size() != var.size() {
                    return Err(PolicyError::Incompatible(format!(
                        "variable {} has shape {:?}, expected {:?}",
                        name,
                        value.size(),
                        var.size()
                    )));
                }
                var.f_copy_(&value.to_device(self.device))?;
            }
        }
        self.update_target()
    }
}

fn argmax_index(action_values: &Tensor) -> usize {
    let index = i64::from(action_values.argmax(-1, false).get(0));
    usize::try_from(index).unwrap_or(0)
}

impl ActionValuePolicy for DqnAxisPolicy {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn act(
        &mut self,
        state: &Screen,
        exploration: &ExplorationUpdate,
        rng: &mut Prng,
    ) -> Result<AxisAction, PolicyError> {
        let input = self.screens_tensor(&[state])?;
        let greedy = argmax_index(&tch::no_grad(|| self.online.net.forward(&input)));
        let index = match *exploration {
            ExplorationUpdate::EpsilonGreedy { eps } => {
                if rng.gen_bool(eps.clamp(0.0, 1.0)) {
                    rng.gen_range(0..self.num_actions)
                } else {
                    greedy
                }
            }
            ExplorationUpdate::ParameterNoise {
                threshold,
                reset,
                update_scale,
            } => {
                if update_scale {
                    self.adapt_noise_scale(&input, threshold)?;
                }
                if reset {
                    self.perturbed
                        .perturb_from(&self.online.vs, self.noise_scale)?;
                }
                argmax_index(&tch::no_grad(|| self.perturbed.net.forward(&input)))
            }
        };
        Ok(AxisAction {
            index,
            exploratory: index != greedy,
        })
    }

    fn train(&mut self, batch: &SampledBatch) -> Result<TrainStats, PolicyError> {
        if batch.is_empty() {
            return Err(PolicyError::EmptyBatch);
        }
        let states: Vec<_> = batch.states.iter().collect();
        let next_states: Vec<_> = batch.next_states.iter().collect();
        let obs_t = self.screens_tensor(&states)?;
        let obs_tp1 = self.screens_tensor(&next_states)?;

        #[allow(clippy::cast_possible_wrap)]
        let actions: Vec<i64> = batch.actions.iter().map(|&a| a as i64).collect();
        #[allow(clippy::cast_possible_truncation)]
        let to_f32 = |values: &[f64]| -> Tensor {
            let values: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            Tensor::of_slice(&values).to_device(self.device)
        };
        let rewards = to_f32(&batch.rewards);
        let weights = to_f32(&batch.weights);
        let not_done: Vec<f64> = batch
            .dones
            .iter()
            .map(|&done| if done { 0.0 } else { 1.0 })
            .collect();
        let not_done = to_f32(&not_done);
        let actions = Tensor::of_slice(&actions).to_device(self.device);

        let targets = tch::no_grad(|| {
            let q_tp1 = self.target.net.forward(&obs_tp1);
            let q_tp1_best = if self.config.double_q {
                let best_actions = self.online.net.forward(&obs_tp1).argmax(-1, true);
                q_tp1.gather(-1, &best_actions, false).squeeze_dim(-1)
            } else {
                q_tp1.amax(&[-1], false)
            };
            &rewards + q_tp1_best * &not_done * self.config.gamma
        });

        let q_t_selected = self
            .online
            .net
            .forward(&obs_t)
            .gather(-1, &actions.unsqueeze(-1), false)
            .squeeze_dim(-1);
        let td_error = &q_t_selected - &targets;

        // Huber loss with delta = 1
        let abs_error = td_error.abs();
        let quadratic = abs_error.clamp_max(1.0);
        let linear = &abs_error - &quadratic;
        let errors = quadratic.square() * 0.5 + linear;
        let loss = (&weights * &errors).mean(Kind::Float);

        backward_step(&mut self.optimizer, &loss, self.config.grad_norm_clipping);

        let td_errors = Vec::<f32>::from(&td_error.detach().to_device(Device::Cpu))
            .into_iter()
            .map(f64::from)
            .collect();
        Ok(TrainStats {
            loss: f64::from(&loss),
            td_errors,
        })
    }

    fn update_target(&mut self) -> Result<(), PolicyError> {
        self.target.vs.copy(&self.online.vs)?;
        Ok(())
    }
}

impl PersistPolicy for DqnAxisPolicy {
    fn save(&self, path: &Path) -> Result<(), PolicyError> {
        let variables = self
            .online
            .vs
            .variables()
            .into_iter()
            .map(|(name, tensor)| (name, TensorData::from(&tensor)))
            .collect();
        SavedQNetwork {
            q_network: self.config.q_network.clone(),
            screen_size: self.screen_size,
            num_actions: self.num_actions,
            variables,
        }
        .save(path)?;
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> Result<(), PolicyError> {
        let saved = SavedQNetwork::load(path)?;
        self.set_parameters(&saved)
    }
}
