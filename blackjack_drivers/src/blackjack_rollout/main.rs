use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use blackjack_rollout::simulation::{Simulator, PRIMARY_PLAYER};
use blackjack_rollout::strategy::ActionChart;
use blackjack_rollout::{Rule, SimulationError};
use blackjack_rollout_drivers::{
    parse_config_from_file, write_results_grid, Config, ConfigError, LoggingHandler,
};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info};
use rand::{rngs::StdRng, SeedableRng};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "~/.blackjack_rollout.yml";

#[derive(Debug, Parser)]
#[command(author, about, long_about = None)]
struct CommandLineArgs {
    /// Number of learning rounds. Overrides the config file.
    iterations: Option<u64>,

    /// The path of the config file
    #[arg(short, long, default_value_t = String::from(DEFAULT_CONFIG_PATH))]
    config: String,

    /// Shuffling seed. Overrides the config file.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Writes the learned action chart to this file
    #[arg(long)]
    chart: Option<String>,
}

#[derive(Debug, Error)]
enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid rule in config: {0}")]
    Rule(#[from] serde::de::value::Error),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("cannot write output: {0}")]
    Io(#[from] io::Error),
    #[error("cannot find home directory")]
    NoHome,
}

fn load_config(path: &str) -> Result<Config, DriverError> {
    if path != DEFAULT_CONFIG_PATH {
        return Ok(parse_config_from_file(path)?);
    }

    let home_dir = home::home_dir().ok_or(DriverError::NoHome)?;
    let config_file_path = home_dir.join(".blackjack_rollout.yml");
    if !config_file_path.is_file() {
        info!(
            "{} not found, using default settings",
            config_file_path.display()
        );
        return Ok(Config::default());
    }
    Ok(parse_config_from_file(&config_file_path.to_string_lossy())?)
}

fn seed_from_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

fn run(args: CommandLineArgs) -> Result<(), DriverError> {
    let config = load_config(&args.config)?;
    let rule: Rule = config.rule.try_into()?;
    let iterations = args.iterations.unwrap_or(config.simulator.iterations);
    let seed = args
        .seed
        .or(config.simulator.seed)
        .unwrap_or_else(seed_from_time);
    info!("{:?}, {} rounds, seed {}", rule, iterations, seed);

    let mut simulator = Simulator::new(&rule, seed)?;
    let mut handler = LoggingHandler::new(config.simulator.progress_interval, iterations);
    simulator.run(iterations, &mut handler)?;

    let player = simulator.player(PRIMARY_PLAYER);
    info!(
        "learning done: {} samples, {} reloads, {} naturals, expected value {:.4} per hand",
        simulator.results().total_samples(),
        handler.reloads(),
        handler.naturals(),
        player.expected_value().unwrap_or(0.0)
    );

    write_results_grid(simulator.results(), io::stdout().lock())?;

    let mut chart = ActionChart::from_results(simulator.results());

    let search = &config.simulator;
    if search.search_batches > 0 {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        let mut handler = LoggingHandler::new(search.progress_interval, search.search_rounds);
        let summary = simulator.improve_chart(
            chart,
            search.search_batches,
            search.search_rounds,
            search.search_adjust,
            &mut rng,
            &mut handler,
        )?;
        info!(
            "search done: {} improvements, best expected value {:.4} per hand",
            summary.improvements, summary.expected_value
        );
        chart = summary.chart;
    }

    if let Some(path) = &args.chart {
        fs::write(Path::new(path), format!("{}\n", chart))?;
        info!("action chart written to {}", path);
    }

    let rounds = config.simulator.evaluation_rounds;
    if rounds > 0 {
        let mut handler = LoggingHandler::new(config.simulator.progress_interval, rounds);
        let summary = simulator.evaluate(&mut chart, rounds, &mut handler)?;
        info!(
            "learned chart over {} rounds: money {:+}, expected value {:.4} per hand",
            summary.rounds, summary.money, summary.expected_value
        );
        debug!("chart usage:\n{}", chart.usage_table());
    }

    Ok(())
}

/// Parses the command line. Usage errors are logged instead of ending the
/// process with a failure code; help and version output are printed as usual.
fn parse_args<I, T>(args: I) -> Option<CommandLineArgs>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match CommandLineArgs::try_parse_from(args) {
        Ok(args) => Some(args),
        Err(err) => {
            if err.use_stderr() {
                error!("{}", err);
            } else {
                let _ = err.print();
            }
            None
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let Some(args) = parse_args(std::env::args_os()) else {
        return;
    };
    if let Err(err) = run(args) {
        error!("{}", err);
    }
}
