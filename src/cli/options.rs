//! Command-line options
use crate::buffers::StoreConfig;
use crate::envs::MoveToBeaconConfig;
use crate::schedules::{ExplorationMode, LinearSchedule, NoiseThreshold};
use crate::simulation::{EpisodeLimit, ModelSelection, TrainConfig};
use crate::torch::{AdamConfig, DqnConfig, QNetConfig};
use clap::{ArgAction, ArgEnum, Parser, Subcommand};
use rand::Rng;
use std::fmt;
use std::path::PathBuf;

/// Capacity of each axis replay buffer.
pub const BUFFER_CAPACITY: usize = 5000;

/// Final exploration rate of the epsilon-greedy schedule.
pub const EXPLORATION_FINAL_EPS: f64 = 0.01;

/// Learning rates sampled when `--lr 0` is given.
pub const LEARNING_RATE_RANGE: (f64, f64) = (1e-5, 1e-3);

#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(name = "beacon-dqn", author, version, about)]
pub struct Options {
    #[clap(subcommand)]
    pub command: Command,

    /// Name of the map, used in log and model paths
    #[clap(long, default_value = "MoveToBeacon")]
    pub map: String,

    /// Learning algorithm
    #[clap(long, arg_enum, default_value_t = Algorithm::Deepq)]
    pub algorithm: Algorithm,

    /// Logging backend
    #[clap(long, arg_enum, default_value_t = LogBackend::Tensorboard)]
    pub log: LogBackend,

    /// Print a summary every this many episodes
    #[clap(long, default_value_t = 1)]
    pub print_freq: u64,

    /// Number of environment steps to train for
    #[clap(long, default_value_t = 2_000_000)]
    pub timesteps: u64,

    /// Stop training after this many completed episodes
    #[clap(long)]
    pub max_episodes: Option<u64>,

    /// Fraction of training over which the exploration rate is annealed
    #[clap(long, default_value_t = 0.2)]
    pub exploration_fraction: f64,

    /// Use prioritized experience replay
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub prioritized: bool,

    /// Use dueling Q-networks
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub dueling: bool,

    /// Learning rate. 0 samples one uniformly from [1e-5, 1e-3].
    #[clap(long, default_value_t = 0.0005)]
    pub lr: f64,

    /// Name of the experiment, used in the log path
    #[clap(long, default_value = "SCREEN_DIM=16")]
    pub experiment: String,

    /// Random seed. Chosen at random if omitted.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Side length of the square screen
    #[clap(long, default_value_t = 16)]
    pub screen_size: usize,

    /// Explore with parameter noise instead of epsilon-greedy actions
    #[clap(long)]
    pub param_noise: bool,

    /// Parameter noise KL threshold. Negative derives it from the exploration rate.
    #[clap(long, default_value_t = 0.05, allow_hyphen_values = true)]
    pub param_noise_threshold: f64,

    /// Root directory of the models, logs and run configuration
    #[clap(long, default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Train a new pair of axis policies
    Train,
    /// Run greedy episodes with saved axis policies
    Evaluate {
        /// Saved x-axis policy
        x_policy: PathBuf,
        /// Saved y-axis policy
        y_policy: PathBuf,
        /// Number of episodes to run
        #[clap(long, default_value_t = 10)]
        episodes: u64,
    },
}

#[derive(ArgEnum, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Deepq,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Deepq => f.write_str("deepq"),
        }
    }
}

#[derive(ArgEnum, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LogBackend {
    /// Tabular summaries on standard output
    Stdout,
    /// Tabular summaries on standard output and a TensorBoard event file
    Tensorboard,
}

impl Options {
    /// Replace a zero learning rate by one sampled from [`LEARNING_RATE_RANGE`].
    pub fn resolve_learning_rate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        if self.lr == 0.0 {
            let (low, high) = LEARNING_RATE_RANGE;
            self.lr = rng.gen_range(low..high);
        }
        self.lr
    }

    /// TensorBoard log directory of a run started at `start`.
    ///
    /// `tensorboard/<map>/<algorithm>/<timesteps>_<expl>_prio<p>_duel<d>_lr<lr>/<start>-<experiment>`
    pub fn tensorboard_dir(&self, start: &str) -> PathBuf {
        let lr = (self.lr * 1e8).round() / 1e8;
        self.output_dir
            .join("tensorboard")
            .join(&self.map)
            .join(self.algorithm.to_string())
            .join(format!(
                "{}_{}_prio{}_duel{}_lr{}",
                self.timesteps, self.exploration_fraction, self.prioritized, self.dueling, lr
            ))
            .join(format!("{}-{}", start, self.experiment))
    }

    /// Hook stopping training after `--max-episodes` episodes, if given.
    pub fn episode_limit(&self) -> Option<EpisodeLimit> {
        self.max_episodes.map(EpisodeLimit::new)
    }

    /// Selection rule of the archived best models.
    ///
    /// Considered at the end of every eligible episode.
    pub fn model_selection(&self) -> ModelSelection {
        let train = TrainConfig::from(self);
        ModelSelection {
            every: None,
            ..train.checkpoint_selection().unwrap_or_default()
        }
    }
}

impl From<&Options> for MoveToBeaconConfig {
    fn from(opts: &Options) -> Self {
        Self {
            screen_size: opts.screen_size,
            ..Self::default()
        }
    }
}

impl From<&Options> for QNetConfig {
    fn from(opts: &Options) -> Self {
        Self {
            dueling: opts.dueling,
            ..Self::default()
        }
    }
}

impl From<&Options> for DqnConfig {
    fn from(opts: &Options) -> Self {
        Self {
            q_network: opts.into(),
            optimizer: AdamConfig {
                learning_rate: opts.lr,
                ..AdamConfig::default()
            },
            ..Self::default()
        }
    }
}

impl From<&Options> for TrainConfig {
    fn from(opts: &Options) -> Self {
        let replay = if opts.prioritized {
            StoreConfig::prioritized(BUFFER_CAPACITY)
        } else {
            StoreConfig::uniform(BUFFER_CAPACITY)
        };
        Self {
            max_timesteps: opts.timesteps,
            replay,
            ..Self::default()
        }
    }
}

impl From<&Options> for LinearSchedule {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn from(opts: &Options) -> Self {
        let horizon = (opts.exploration_fraction * opts.timesteps as f64) as u64;
        Self::new(horizon, 1.0, EXPLORATION_FINAL_EPS)
    }
}

impl From<&Options> for ExplorationMode {
    fn from(opts: &Options) -> Self {
        if !opts.param_noise {
            Self::EpsilonGreedy
        } else if opts.param_noise_threshold >= 0.0 {
            Self::ParameterNoise(NoiseThreshold::Fixed(opts.param_noise_threshold))
        } else {
            Self::ParameterNoise(NoiseThreshold::Auto)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Prng;
    use rand::SeedableRng;
    use std::path::Path;

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(std::iter::once("beacon-dqn").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let opts = parse(&["train"]);
        assert_eq!(opts.command, Command::Train);
        assert_eq!(opts.map, "MoveToBeacon");
        assert_eq!(opts.algorithm, Algorithm::Deepq);
        assert_eq!(opts.log, LogBackend::Tensorboard);
        assert_eq!(opts.timesteps, 2_000_000);
        assert!(opts.prioritized);
        assert!(opts.dueling);
        assert_eq!(opts.lr, 0.0005);
        assert_eq!(opts.episode_limit(), None);
        assert_eq!(ExplorationMode::from(&opts), ExplorationMode::EpsilonGreedy);
    }

    #[test]
    fn boolean_values() {
        let opts = parse(&["--prioritized", "false", "--dueling", "false", "train"]);
        assert_eq!(TrainConfig::from(&opts).replay, StoreConfig::uniform(BUFFER_CAPACITY));
        assert!(!QNetConfig::from(&opts).dueling);
    }

    #[test]
    fn max_episodes_limit() {
        let opts = parse(&["--max-episodes", "50", "train"]);
        assert_eq!(opts.episode_limit(), Some(EpisodeLimit::new(50)));
    }

    #[test]
    fn evaluate_command() {
        let opts = parse(&["evaluate", "x.cbor", "y.cbor", "--episodes", "3"]);
        assert_eq!(
            opts.command,
            Command::Evaluate {
                x_policy: "x.cbor".into(),
                y_policy: "y.cbor".into(),
                episodes: 3
            }
        );
    }

    #[test]
    fn zero_learning_rate_sampled() {
        let mut opts = parse(&["--lr", "0", "train"]);
        let lr = opts.resolve_learning_rate(&mut Prng::seed_from_u64(1));
        assert!((1e-5..1e-3).contains(&lr));
        assert_eq!(opts.lr, lr);
        assert_eq!(DqnConfig::from(&opts).optimizer.learning_rate, lr);
    }

    #[test]
    fn exploration_schedule() {
        let opts = parse(&["--timesteps", "1000", "--exploration-fraction", "0.1", "train"]);
        let schedule = LinearSchedule::from(&opts);
        assert_eq!(schedule, LinearSchedule::new(100, 1.0, 0.01));
    }

    #[test]
    fn param_noise_threshold() {
        let opts = parse(&["--param-noise", "train"]);
        assert_eq!(
            ExplorationMode::from(&opts),
            ExplorationMode::ParameterNoise(NoiseThreshold::Fixed(0.05))
        );
        let opts = parse(&["--param-noise", "--param-noise-threshold", "-1", "train"]);
        assert_eq!(
            ExplorationMode::from(&opts),
            ExplorationMode::ParameterNoise(NoiseThreshold::Auto)
        );
    }

    #[test]
    fn tensorboard_dir_layout() {
        let opts = parse(&["--output-dir", "/runs", "train"]);
        assert_eq!(
            opts.tensorboard_dir("11051230"),
            Path::new(
                "/runs/tensorboard/MoveToBeacon/deepq/2000000_0.2_priotrue_dueltrue_lr0.0005/11051230-SCREEN_DIM=16"
            )
        );
    }

    #[test]
    fn archived_model_selection() {
        let selection = parse(&["train"]).model_selection();
        assert_eq!(selection.every, None);
        assert_eq!(selection.min_episodes, 100);
        assert_eq!(selection.margin, 1.2);
    }
}
