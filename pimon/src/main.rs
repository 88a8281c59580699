use clap::{Arg, ArgAction, Command};
use pimon_core::{
    config::CliConfig, CollectionSupervisor, CommandExecutor, Config, ConnectionMode,
    LocalExecutor, Series, TimeSeriesStore,
};
use std::{path::PathBuf, process};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn cli() -> Command {
    Command::new("pimon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Collects Raspberry Pi health metrics into a per-target JSON time series")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to JSON configuration file")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("MS")
                .help("Collection interval in milliseconds")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("remote")
                .long("remote")
                .help("Collect from a remote host over ssh")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Remote host address")
                .global(true),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .value_name("NAME")
                .help("Remote login name")
                .global(true),
        )
        .arg(
            Arg::new("secret")
                .long("secret")
                .value_name("PASSWORD")
                .env("PIMON_SECRET")
                .hide_env_values(true)
                .help("Remote login password, key authentication is used when unset")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .help("Remote ssh port")
                .global(true)
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Upper bound for a single diagnostic command")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding the per-target JSON documents")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("interface")
                .long("interface")
                .value_name("IFACE")
                .help("Network interface watched by the network agents")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("run")
                .about("Start every agent and collect until the store fails (default)"),
        )
        .subcommand(Command::new("show").about("Print the latest sample of every series"))
        .subcommand(Command::new("path").about("Print the store document path for the target"))
}

fn run() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    // Globals given after the subcommand only land in its matches.
    let args = matches.subcommand().map_or(&matches, |(_, sub)| sub);
    init_tracing(args.get_flag("verbose"));

    let cli_config = CliConfig {
        interval_ms: args.get_one::<u64>("interval").copied(),
        remote: args.get_flag("remote"),
        host: args.get_one::<String>("host").cloned(),
        username: args.get_one::<String>("user").cloned(),
        secret: args.get_one::<String>("secret").cloned(),
        port: args.get_one::<u16>("port").copied(),
        command_timeout_ms: args.get_one::<u64>("timeout").copied(),
        data_dir: args.get_one::<PathBuf>("data-dir").cloned(),
        network_interface: args.get_one::<String>("interface").cloned(),
    };

    let json_config_path = args.get_one::<PathBuf>("config");
    let config = Config::load(Some(&cli_config), json_config_path)?;

    match matches.subcommand() {
        Some(("show", _)) => show(&config),
        Some(("path", _)) => {
            println!("{}", open_store(&config)?.path().display());
            Ok(())
        }
        _ => collect(config),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_thread_names(true)
        .init();
}

/// Run in the foreground until the store becomes unusable.
fn collect(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        mode = ?config.mode,
        interval_ms = config.interval_ms,
        data_dir = %config.data_dir.display(),
        "starting collection"
    );
    let running = CollectionSupervisor::new(config)?.start()?;
    running.wait()?;
    Ok(())
}

/// Open the store for the configured target without starting any agent.
fn open_store(config: &Config) -> anyhow::Result<TimeSeriesStore> {
    let target = match config.mode {
        ConnectionMode::Remote => config.target.host.clone(),
        ConnectionMode::Local => LocalExecutor::new(config.command_timeout()).target_name(),
    };
    Ok(TimeSeriesStore::open(&config.data_dir, &target, config.retry_policy())?)
}

fn show(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let snapshot = store.read_all()?;

    println!("{}", store.path().display());
    for series in Series::ALL {
        let count = snapshot.series(series).len();
        match snapshot.latest(series) {
            Some(sample) => println!(
                "{:<18} {:>14}  {}  ({} samples)",
                series.as_str(),
                sample.value,
                sample.time,
                count
            ),
            None => println!("{:<18} {:>14}", series.as_str(), "-"),
        }
    }
    Ok(())
}
