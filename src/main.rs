//! tictacplot - draw Tic-Tac-Toe moves on a GRBL pen plotter
//!
//! Runs one program (or one move) against the plotter and prints the
//! session report.

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info};

use tictacplot::error::{Error, ErrorKind, Result};
use tictacplot::link::{DeviceBehavior, LinkConnector, SerialConnector, SimulatorConnector};
use tictacplot::program::move_program_name;
use tictacplot::{load_config, Config, Session, Symbol};

/// What to draw
#[derive(Debug, Clone, PartialEq)]
enum Target {
    /// Program by name
    Program(String),
    /// Symbol in a board cell (1 to 9)
    Move(Symbol, usize),
    /// Only list the available programs
    List,
}

/// Application configuration
#[derive(Debug, Default)]
struct AppArgs {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Serial port override
    port: Option<String>,
    /// Program directory override
    directory: Option<PathBuf>,
    /// Enable debug mode
    debug: bool,
    /// Use the built-in simulated board instead of a serial port
    simulate: bool,
    /// Write the report as JSON instead of a summary
    json: bool,
    target: Option<Target>,
}

impl AppArgs {
    /// Parse command line arguments
    fn parse() -> Result<Self> {
        Self::parse_from(env::args().skip(1).collect())
    }

    fn parse_from(args: Vec<String>) -> Result<Self> {
        let mut app_args = AppArgs::default();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    app_args.config_path = Some(PathBuf::from(value(&args, i, "config file path")?));
                    i += 1;
                }
                "--port" | "-p" => {
                    app_args.port = Some(value(&args, i, "port name")?.to_string());
                    i += 1;
                }
                "--dir" => {
                    app_args.directory = Some(PathBuf::from(value(&args, i, "program directory")?));
                    i += 1;
                }
                "--move" | "-m" => {
                    let symbol: Symbol = value(&args, i, "symbol")?.parse().map_err(Error::Other)?;
                    let cell: usize = value(&args, i + 1, "cell")?
                        .parse()
                        .map_err(|_| Error::from("Cell must be a number from 1 to 9"))?;
                    if !(1..=9).contains(&cell) {
                        return Err("Cell must be a number from 1 to 9".into());
                    }
                    app_args.target = Some(Target::Move(symbol, cell));
                    i += 2;
                }
                "--list" | "-l" => {
                    app_args.target = Some(Target::List);
                }
                "--simulate" => {
                    app_args.simulate = true;
                }
                "--json" => {
                    app_args.json = true;
                }
                "--debug" | "-d" => {
                    app_args.debug = true;
                }
                "--help" | "-?" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("tictacplot v{}", env!("CARGO_PKG_VERSION"));
                    process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    return Err(format!("Unknown option: {}", arg).into());
                }
                name => {
                    if app_args.target.is_some() {
                        return Err(format!("Unexpected argument: {}", name).into());
                    }
                    app_args.target = Some(Target::Program(name.to_string()));
                }
            }
            i += 1;
        }

        Ok(app_args)
    }
}

/// Argument following the flag at `index`
fn value<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| Error::Other(format!("Missing {}", what)))
}

/// Print help information
fn print_help() {
    println!("tictacplot - draw Tic-Tac-Toe moves on a GRBL pen plotter");
    println!();
    println!("USAGE:");
    println!("    tictacplot [OPTIONS] <PROGRAM>");
    println!("    tictacplot [OPTIONS] --move <x|o> <CELL>");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>      Path to configuration file");
    println!("    -p, --port <PORT>        Serial port (overrides configuration)");
    println!("        --dir <PATH>         Program directory (overrides configuration)");
    println!("    -m, --move <x|o> <CELL>  Draw a symbol in cell 1-9, row by row");
    println!("    -l, --list               List available programs");
    println!("        --simulate           Use a simulated board instead of the serial port");
    println!("        --json               Print the session report as JSON");
    println!("    -d, --debug              Enable debug logging");
    println!("    -?, --help               Print this help message");
    println!("    -v, --version            Print version information");
    println!();
    println!("CONFIGURATION:");
    println!("    tictacplot looks for tictacplot.toml or tictacplot.json in:");
    println!("    1. Path specified with --config");
    println!("    2. The current directory");
    println!("    3. ~/.config/tictacplot/ (platform config directory)");
    println!("    4. $XDG_CONFIG_HOME/tictacplot/");
    println!("    5. ~/.tictacplot/");
    println!("    6. Built-in defaults");
    println!();
    println!("ENVIRONMENT:");
    println!("    TICTACPLOT_DEBUG       Enable debug mode (1 or true)");
    println!("    RUST_LOG               Set logging level (error, warn, info, debug, trace)");
}

fn init_logging(debug: bool) {
    let debug_env = env::var("TICTACPLOT_DEBUG").is_ok_and(|v| v == "1" || v.to_lowercase() == "true");
    let log_level = if debug || debug_env { "debug" } else { "info" };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn apply_overrides(config: &mut Config, args: &AppArgs) {
    if let Some(port) = &args.port {
        config.link.port = port.clone();
    }
    if let Some(directory) = &args.directory {
        config.program.directory = directory.clone();
    }
}

#[tokio::main]
async fn main() {
    let args = AppArgs::parse().unwrap_or_else(|e| {
        eprintln!("Failed to parse arguments: {}", e);
        print_help();
        process::exit(2);
    });

    init_logging(args.debug);
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            let kind = e.downcast_ref::<Error>().map_or(ErrorKind::Other, Error::kind);
            error!("[{}] {:#}", kind, e);
            process::exit(2);
        }
    }
}

/// Returns whether the drawing completed cleanly
async fn run(args: AppArgs) -> anyhow::Result<bool> {
    let mut config = load_config(args.config_path.as_deref()).context("loading configuration")?;
    apply_overrides(&mut config, &args);

    let connector: Arc<dyn LinkConnector> = if args.simulate {
        info!("Using simulated board on {}", config.link.port);
        Arc::new(SimulatorConnector::new(DeviceBehavior::responsive()))
    } else {
        Arc::new(SerialConnector)
    };
    let session = Session::with_connector(config, connector)?;

    let program = match args.target {
        Some(Target::List) => {
            let directory = session.loader().directory().display().to_string();
            for name in session.loader().list().context(directory)? {
                println!("{}", name);
            }
            return Ok(true);
        }
        Some(Target::Move(symbol, cell)) => move_program_name(symbol, (cell - 1) / 3, (cell - 1) % 3)?,
        Some(Target::Program(name)) => name,
        None => anyhow::bail!("No program given (see --help)"),
    };

    let report = session
        .run(&program)
        .await
        .with_context(|| format!("drawing '{}'", program))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }
    Ok(report.is_complete())
}
