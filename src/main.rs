use std::fs::File;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridmdp::agents::{Agent, MonteCarloAgent, RandomAgent, Td0Agent};
use gridmdp::config::{AgentKind, GridConfig, MoveSet};
use gridmdp::environment::Environment;
use gridmdp::experiment::{write_results_csv, EpisodeSummary, Experiment};
use gridmdp::policy::{evaluate_policy, policy_iteration, Policy};
use gridmdp::{FourWayAction, GridAction, GridMdp, GridState, KingAction, Result};

/// Command line argument parser.
#[derive(Parser, Debug)]
#[command(about = "Solve and simulate grid-world Markov decision processes", long_about = None)]
pub struct Args {
    /// Path to the gridmdp configuration TOML file.
    config_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate the uniform random policy.
    Evaluate,
    /// Solve for the optimal policy with policy iteration.
    Iterate,
    /// Train the configured agent on the grid.
    Train {
        /// Write per-episode results to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    info!(path = %args.config_path.display(), "reading configuration");
    let config = GridConfig::from_path(&args.config_path)?;
    match config.grid.moves {
        MoveSet::FourWay => run_with::<FourWayAction>(&config, &args.command),
        MoveSet::King => run_with::<KingAction>(&config, &args.command),
    }
}

fn run_with<A: GridAction>(config: &GridConfig, command: &Commands) -> Result<()> {
    let mdp: GridMdp<A> = config.build_mdp()?;
    let solver = &config.solver;

    match command {
        Commands::Evaluate => {
            let mut policy = Policy::new(&mdp, solver.gamma)?;
            let sweeps = evaluate_policy(&mut policy, solver.theta, solver.max_sweeps)?;
            println!("Random policy values after {sweeps} sweeps:");
            println!("{:.2}", mdp.value_grid(&policy));
        }
        Commands::Iterate => {
            let mut policy = Policy::new(&mdp, solver.gamma)?;
            let report = policy_iteration(&mut policy, solver.theta, solver.max_sweeps)?;
            println!(
                "Converged after {} improvements ({} sweeps).",
                report.improvements, report.sweeps
            );
            println!("{:.2}", mdp.value_grid(&policy));
            print!("{}", mdp.render_policy(&policy));
        }
        Commands::Train { csv } => {
            let settings = &config.agent;
            let seed = config.experiment.seed;
            // Environment and agent draw from distinct streams of the same seed.
            let agent_seed = seed.map(|s| s.wrapping_add(1));
            match settings.kind {
                AgentKind::Random => {
                    let mut agent = RandomAgent::new(agent_seed);
                    train(config, &mdp, &mut agent, csv.as_ref())?;
                }
                AgentKind::MonteCarlo => {
                    let mut agent: MonteCarloAgent<GridState, A> =
                        MonteCarloAgent::new(settings.gamma, settings.epsilon, agent_seed)?;
                    train(config, &mdp, &mut agent, csv.as_ref())?;
                }
                AgentKind::Td0 => {
                    let mut agent: Td0Agent<GridState, A> = Td0Agent::new(
                        settings.alpha,
                        settings.gamma,
                        settings.epsilon,
                        agent_seed,
                    )?;
                    train(config, &mdp, &mut agent, csv.as_ref())?;
                }
            }
        }
    }
    Ok(())
}

fn train<A, G>(
    config: &GridConfig,
    mdp: &GridMdp<A>,
    agent: &mut G,
    csv: Option<&PathBuf>,
) -> Result<()>
where
    A: GridAction,
    G: Agent<GridState, A>,
{
    let mut env = Environment::new(mdp, config.experiment.seed);
    let experiment = Experiment::new(config.experiment.max_steps)?;
    let results = experiment.run(&mut env, agent, config.experiment.episodes)?;

    if let Some(summary) = EpisodeSummary::from_results(&results) {
        println!("{summary}");
    }
    if let Some(path) = csv {
        write_results_csv(File::create(path)?, &results)?;
        info!(path = %path.display(), "wrote episode results");
    }
    Ok(())
}
