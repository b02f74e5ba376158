//! Distributed SAC on Pendulum.
//!
//! Trains with four agent threads and one learner, saves the networks and
//! runs a deterministic evaluation of the saved actor.
//!
//! ```text
//! RUST_LOG=distributed_sac=debug cargo run --release --example pendulum
//! ```
//!
//! `SAC_AGENTS`, `SAC_MAX_STEPS` and `SAC_OUT` override the defaults.

use std::env;
use std::process::ExitCode;

use burn::backend::{Autodiff, NdArray};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use distributed_sac::checkpoint::Checkpointer;
use distributed_sac::{
    shared_logger, AgentConfig, CsvLogger, DistributedConfig, DistributedSac, LearnerConfig,
    MultiLogger, Pendulum, Result, SacConfig, StoreConfig, Tester, TesterConfig, TracingLogger,
};

type B = Autodiff<NdArray<f32>>;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("distributed_sac=info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("a global tracing subscriber is already set");
    }
}

fn train_and_evaluate() -> Result<()> {
    let n_agents: usize = env_or("SAC_AGENTS", 4);
    let max_steps: u64 = env_or("SAC_MAX_STEPS", 20_000);
    let out: String = env_or("SAC_OUT", "runs/pendulum".to_string());

    let learner = LearnerConfig::new(Pendulum::OBS_DIM, Pendulum::ACTION_DIM)
        .with_sac(SacConfig::new().with_batch_size(256))
        .with_steps(1_000, max_steps)
        .with_log_interval(500)
        .with_save_path(&out);
    let config = DistributedConfig::new(learner.clone())
        .with_agents(n_agents)
        .with_store(StoreConfig::new(100_000, 1_000))
        .with_agent(AgentConfig::new().with_update_interval(64));

    let logger = MultiLogger::new()
        .add(TracingLogger::new())
        .add(CsvLogger::new(&out)?);
    let runner = DistributedSac::new(config)?.with_logger(shared_logger(logger));

    let device = Default::default();
    let report = runner.run::<B, _, _>(|id| Ok(Pendulum::new(id as u64)), &device)?;
    tracing::info!(
        env_steps = report.env_steps,
        episodes = report.episodes,
        train_step = report.trained.train_step,
        "training done"
    );

    let actor_path = Checkpointer::new(&out)?.actor_path();
    let tester_config = TesterConfig::new(learner.actor)
        .with_max_steps(1_000)
        .with_model_path(actor_path);
    let stats = Tester::<NdArray<f32>, _>::new(tester_config, Pendulum::new(1_000), &device)?.run()?;
    tracing::info!(
        episodes = stats.episodes,
        mean_reward = stats.mean_reward(),
        "evaluation done"
    );
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    match train_and_evaluate() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "pendulum run failed");
            ExitCode::FAILURE
        }
    }
}
