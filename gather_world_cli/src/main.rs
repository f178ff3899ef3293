use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gather_world_core::{
    Color,
    agent::{Agent, AgentView, GatherPlanner, RandomWalker},
    config::{EpisodeConfig, ResetOptions},
    environment::GatherEnv,
    registry::{self, Registry},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyKind {
    /// Uniformly sampled actions
    Random,
    /// Shortest path to the nearest paying object
    Planner,
}

#[derive(Parser, Debug)]
#[command(version, about = "Run multi-agent color gathering episodes", long_about = None)]
struct Args {
    /// Registered environment identifier
    #[arg(short, long, default_value = registry::COLOR_GATHER_8X8)]
    env: String,

    /// JSON episode configuration, used instead of the registered preset
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Override the goal color
    #[arg(long)]
    goal_color: Option<Color>,

    /// Enable hazard strips
    #[arg(long)]
    hazard: bool,

    /// Number of episodes to run
    #[arg(short = 'n', long, default_value_t = 10)]
    episodes: usize,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    #[arg(short, long, value_enum, default_value_t = PolicyKind::Random)]
    policy: PolicyKind,

    /// List registered environments and exit
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let registry = Registry::with_builtin();

    if args.list {
        for id in registry.ids() {
            println!("{id}");
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => registry
            .config(&args.env)
            .with_context(|| format!("looking up environment '{}'", args.env))?,
    };
    let options = ResetOptions {
        goal_color: args.goal_color,
        hazard: args.hazard.then_some(true),
    };
    let mut env = GatherEnv::new(options.apply(&config), args.seed)
        .context("creating environment")?;

    info!(
        env = %run_source(&args.env, args.config.as_deref()),
        size = env.config().size,
        agents = env.n_agents(),
        goal = %env.config().goal_color,
        policy = ?args.policy,
        "starting run"
    );

    let mut agents = make_agents(args.policy, env.n_agents(), args.seed);
    for episode in 0..args.episodes {
        run_episode(&mut env, &mut agents, episode)?;
    }

    let metrics = env.metrics();
    info!(
        episodes = args.episodes,
        max_gathered = metrics.max_gathered,
        other_gathered = metrics.other_gathered,
        "run complete"
    );
    Ok(())
}

/// What the run's configuration came from: the config file when one was
/// given, otherwise the registered id.
fn run_source(env: &str, config: Option<&Path>) -> String {
    match config {
        Some(path) => format!("config file {}", path.display()),
        None => env.to_string(),
    }
}

fn load_config(path: &Path) -> Result<EpisodeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn make_agents(policy: PolicyKind, n_agents: usize, seed: u64) -> Vec<Box<dyn Agent>> {
    (0..n_agents)
        .map(|id| -> Box<dyn Agent> {
            match policy {
                PolicyKind::Random => Box::new(RandomWalker::new(id, seed.wrapping_add(id as u64))),
                PolicyKind::Planner => Box::new(GatherPlanner::new(id)),
            }
        })
        .collect()
}

/// Plays one episode to its step limit and logs a summary.
fn run_episode(env: &mut GatherEnv, agents: &mut [Box<dyn Agent>], episode: usize) -> Result<()> {
    env.reset().context("resetting environment")?;
    let mut total_reward = vec![0.0f32; agents.len()];

    loop {
        let actions: Vec<_> = agents
            .iter_mut()
            .map(|agent| {
                let targets = env.paying_colors(agent.id());
                let view = AgentView {
                    agent_state: &env.world().agents[agent.id()],
                    world: env.world(),
                    targets: &targets,
                };
                agent.get_action(&view)
            })
            .collect();

        let result = env.step(&actions).context("stepping environment")?;
        for (total, reward) in total_reward.iter_mut().zip(&result.rewards) {
            *total += reward;
        }

        if result.done {
            info!(
                episode,
                steps = result.info.step_count,
                rewards = ?total_reward,
                max_gathered = result.info.metrics.max_gathered,
                other_gathered = result.info.metrics.other_gathered,
                collected = ?result.info.collected_colors,
                "episode finished"
            );
            return Ok(());
        }
    }
}
