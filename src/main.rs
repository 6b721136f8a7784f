use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::path::{Path, PathBuf};
use traffic_payoff::convert::{convert_flat_log, convert_queue_log};
use traffic_payoff::{
    ControllerConfig, Driver, Error, ExitCode, Result, RunSummary, Simulation,
    SyntheticSimulation, TraciClient,
};

#[derive(Parser)]
#[command(name = "traffic-payoff")]
#[command(version, about = "Queue-pressure traffic signal control for SUMO", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "controller.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// SUMO installation directory (overrides config and SUMO_HOME)
    #[arg(long, global = true)]
    sumo_home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller until the simulation ends (default)
    Run(RunArgs),
    /// Convert a queue output log to CSV
    ConvertQueues {
        #[arg(default_value = "output_queues.xml")]
        xml: PathBuf,
        #[arg(default_value = "output_queues.csv")]
        csv: PathBuf,
    },
    /// Convert a flat XML log, such as trip info, to CSV
    ConvertFlat {
        #[arg(default_value = "tripinfo.xml")]
        xml: PathBuf,
        #[arg(default_value = "tripinfo.csv")]
        csv: PathBuf,
    },
    /// Write a config file with the default settings
    GenerateConfig {
        #[arg(short, long, default_value = "controller.toml")]
        output: PathBuf,
    },
    /// Validate the config without running
    ValidateConfig,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Simulation to control
    #[arg(long, value_enum, default_value_t = Backend::Sumo)]
    backend: Backend,

    /// Run `sumo` rather than `sumo-gui`
    #[arg(long)]
    nogui: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Override the synthetic backend's random seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Default)]
enum Backend {
    #[default]
    Sumo,
    Synthetic,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let code = match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::ConvertQueues { xml, csv }) => {
            report_conversion(convert_queue_log(&xml, &csv));
            Ok(())
        }
        Some(Commands::ConvertFlat { xml, csv }) => {
            report_conversion(convert_flat_log(&xml, &csv));
            Ok(())
        }
        Some(Commands::GenerateConfig { output }) => generate_config(&output),
        Some(Commands::ValidateConfig) => {
            let config = load_config(&cli.config, cli.sumo_home)?;
            config.validate()?;
            println!("Configuration is valid:\n{}", config.to_toml()?);
            Ok(())
        }
        Some(Commands::Run(args)) => run(load_config(&cli.config, cli.sumo_home)?, args),
        None => run(load_config(&cli.config, cli.sumo_home)?, RunArgs::default()),
    }
}

fn load_config(path: &Path, sumo_home: Option<PathBuf>) -> Result<ControllerConfig> {
    let mut config = ControllerConfig::load(path)?;
    if sumo_home.is_some() {
        config.sumo.home = sumo_home;
    }
    Ok(config)
}

fn run(mut config: ControllerConfig, args: RunArgs) -> Result<()> {
    if args.nogui {
        config.sumo.gui = false;
    }
    if let Some(seed) = args.seed {
        config.synthetic.seed = seed;
    }
    config.validate()?;

    let summary = match args.backend {
        Backend::Sumo => drive(TraciClient::launch(&config.sumo)?, &config)?,
        Backend::Synthetic => drive(SyntheticSimulation::from_config(&config)?, &config)?,
    };

    if let Some(path) = args.summary {
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, &summary)?;
        info!("Wrote run summary to {}", path.display());
    }
    Ok(())
}

fn drive<S: Simulation>(sim: S, config: &ControllerConfig) -> Result<RunSummary> {
    Driver::new(sim, config)?.run()
}

/// Conversion failures are logged and do not fail the command.
fn report_conversion(result: Result<usize>) {
    match result {
        Ok(_) => {}
        Err(err @ Error::InputNotFound(_)) => error!("Error: {}", err),
        Err(err) => error!("An error occurred: {}", err),
    }
}

fn generate_config(path: &Path) -> Result<()> {
    let content = format!(
        "# Traffic signal controller configuration\n\
         # See: traffic-payoff --help\n\
         # SUMO is located through `sumo.home` or the SUMO_HOME environment variable.\n\n{}",
        ControllerConfig::default().to_toml()?
    );
    std::fs::write(path, content)?;
    println!("Sample configuration written to {}", path.display());
    Ok(())
}
