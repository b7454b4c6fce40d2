use beacon_dqn::agents::{CoordinateSelector, PerAxis, PersistPolicy};
use beacon_dqn::cli::{Command, Options};
use beacon_dqn::envs::{MoveToBeacon, MoveToBeaconConfig};
use beacon_dqn::schedules::{ExplorationMode, LinearSchedule};
use beacon_dqn::simulation::{evaluate, train, BestModelSaver, TrainConfig};
use beacon_dqn::torch::{DqnAxisPolicy, DqnConfig};
use beacon_dqn::{Prng, RLError};
use clap::Parser;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::error::Error;
use std::fs::{self, File};
use std::path::Path;

/// Everything needed to reproduce a training run.
#[derive(Debug, Serialize)]
struct RunConfig<'a> {
    seed: u64,
    env: &'a MoveToBeaconConfig,
    agent: &'a DqnConfig,
    training: &'a TrainConfig,
    exploration: &'a LinearSchedule,
    exploration_mode: &'a ExplorationMode,
}

fn run_train(opts: &mut Options, seed: u64, rng: &mut Prng) -> Result<(), RLError> {
    let lr = opts.resolve_learning_rate(rng);
    println!("learning rate: {}", lr);
    let start = chrono::Local::now().format("%m%d%H%M").to_string();
    let opts = &*opts;

    let env_config = MoveToBeaconConfig::from(opts);
    let mut env = MoveToBeacon::new(env_config, rng.gen());
    let size = env_config.screen_size;

    let agent_config = DqnConfig::from(opts);
    let policies = PerAxis::new(
        agent_config.build_policy(size, size)?,
        agent_config.build_policy(size, size)?,
    );
    let exploration = LinearSchedule::from(opts);
    let exploration_mode = ExplorationMode::from(opts);
    let mut selector = CoordinateSelector::new(policies, exploration, exploration_mode);

    let run_dir = opts
        .output_dir
        .join("runs")
        .join(opts.algorithm.to_string())
        .join(format!("{}-{}", start, opts.experiment));
    fs::create_dir_all(&run_dir)?;
    let training_config = TrainConfig {
        checkpoint_dir: Some(run_dir.join("checkpoint")),
        ..TrainConfig::from(opts)
    };

    let run_config = RunConfig {
        seed,
        env: &env_config,
        agent: &agent_config,
        training: &training_config,
        exploration: &exploration,
        exploration_mode: &exploration_mode,
    };
    println!("{:#?}", run_config);
    let config_path = run_dir.join("config.json");
    println!("Saving run config to {:?}", config_path);
    serde_json::to_writer_pretty(File::create(&config_path)?, &run_config)?;

    let mut stores = training_config.build_stores()?;
    let mut hooks = (
        BestModelSaver::new(
            &opts.output_dir,
            &opts.algorithm.to_string(),
            opts.model_selection(),
        ),
        opts.episode_limit(),
    );
    let mut logger = opts.build_logger(&start);
    let summary = train(
        &mut env,
        &mut selector,
        &mut stores,
        &training_config,
        &mut hooks,
        &mut logger,
        rng,
    )?;
    drop(logger); // Flush output before the following prints
    println!("{:#?}", summary);

    for (axis, policy) in selector.policies().iter() {
        let path = run_dir.join(format!("{}.cbor", axis));
        println!("Saving {} policy to {:?}", axis, path);
        policy.save(&path)?;
    }
    println!(
        "To evaluate the policies run\n{} evaluate {:?} {:?}",
        env!("CARGO_PKG_NAME"),
        run_dir.join("x.cbor"),
        run_dir.join("y.cbor")
    );
    Ok(())
}

fn run_evaluate(
    opts: &Options,
    x_policy: &Path,
    y_policy: &Path,
    episodes: u64,
    rng: &mut Prng,
) -> Result<(), RLError> {
    let agent_config = DqnConfig::from(opts);
    let mut policies = PerAxis::new(
        DqnAxisPolicy::load(x_policy, &agent_config)?,
        DqnAxisPolicy::load(y_policy, &agent_config)?,
    );
    let mut env = MoveToBeacon::new(MoveToBeaconConfig::from(opts), rng.gen());
    let training_config = TrainConfig::from(opts);
    let means = evaluate(
        &mut env,
        &mut policies,
        episodes,
        training_config.reward_scale,
        rng,
    )?;
    println!("\nEvaluation over {} episodes\n{:#?}", episodes, means);
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut opts = Options::parse();
    let seed = opts.seed.unwrap_or_else(|| rand::thread_rng().gen());
    println!("seed: {}", seed);
    let mut rng = Prng::seed_from_u64(seed);
    tch::manual_seed(rng.gen());

    match opts.command.clone() {
        Command::Train => run_train(&mut opts, seed, &mut rng)?,
        Command::Evaluate {
            x_policy,
            y_policy,
            episodes,
        } => run_evaluate(&opts, &x_policy, &y_policy, episodes, &mut rng)?,
    }
    Ok(())
}
