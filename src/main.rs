//! mosaic - a sidebar terminal multiplexer for supervising processes
//!
//! Runs every `[[process]]` from the config file side by side: a sidebar
//! lists them, the selected one fills the rest of the screen.
//!
//! # Quick Start
//!
//! ```text
//! mosaic                       # processes from ~/.mosaic/config.toml, or $SHELL
//! mosaic -c dev.toml           # another config file
//! mosaic -- npm run dev        # one ad-hoc pane
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | j/k, Up/Down | Select pane |
//! | Enter | Start a stopped pane, focus a running one |
//! | x | Kill the selected pane |
//! | Ctrl+Z | Toggle between sidebar and pane |
//! | Ctrl+U/Ctrl+D | Scroll history |
//! | Ctrl+C | Quit (from the sidebar) |

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mosaic::{Config, CrosstermSurface, Multiplexer, ProcessSpec, PtySpawner};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line options
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    /// Trailing command after `--`
    command: Vec<String>,
}

#[derive(Debug, PartialEq)]
enum Command {
    Run(Args),
    Help,
    Version,
}

fn print_help() {
    eprintln!("mosaic {} - A sidebar terminal multiplexer", VERSION);
    eprintln!();
    eprintln!("Usage: mosaic [OPTIONS] [-- COMMAND ARGS...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>   Config file (default: ~/.mosaic/config.toml)");
    eprintln!("  -V, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MOSAIC_LOG            Log filter, e.g. debug or mosaic::core=trace");
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command, String> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => {
                let path = args.next().ok_or("Missing config path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--" => {
                parsed.command = args.collect();
                break;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
    }

    Ok(Command::Run(parsed))
}

/// Log to a file; the screen belongs to the UI.
fn init_logging(config: &Config) {
    let Some(log_path) = config.log_path() else {
        return;
    };
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    // Open log file (append mode)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("MOSAIC_LOG")
            .or_else(|_| EnvFilter::try_new(config.log_level.as_deref().unwrap_or("info")))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Everything to start with: configured processes, the ad-hoc command,
/// or a shell when there is nothing else.
fn initial_processes(config: &Config, command: Vec<String>) -> Vec<ProcessSpec> {
    let mut specs = config.specs();
    if !command.is_empty() {
        let title = command.join(" ");
        specs.push(ProcessSpec::new("cmd", command).title(title).icon(">"));
    }
    if specs.is_empty() {
        let shell = env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string());
        specs.push(ProcessSpec::new("shell", vec![shell]).icon(">"));
    }
    specs
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args(env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            eprintln!("mosaic {}", VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(2);
        }
    };

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    init_logging(&config);
    info!("mosaic {} starting...", VERSION);

    let specs = initial_processes(&config, args.command);

    let surface = CrosstermSurface::new().context("failed to initialize terminal")?;
    let spawner = PtySpawner::new(config.term.clone());
    let mut mux = Multiplexer::new(surface, Box::new(spawner), config.layout());

    for spec in specs {
        let key = spec.key.clone();
        if let Err(e) = mux.add_process(spec) {
            error!("could not start {}: {}", key, e);
        }
    }

    mux.run().context("multiplexer stopped")?;
    info!("mosaic exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Command, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_config_and_command() {
        assert_eq!(
            args(&["-c", "dev.toml", "--", "npm", "run", "dev"]),
            Ok(Command::Run(Args {
                config: Some(PathBuf::from("dev.toml")),
                command: vec!["npm".into(), "run".into(), "dev".into()],
            }))
        );
        assert_eq!(args(&[]), Ok(Command::Run(Args::default())));
    }

    #[test]
    fn test_parse_flags_and_errors() {
        assert_eq!(args(&["--help"]), Ok(Command::Help));
        assert_eq!(args(&["-V"]), Ok(Command::Version));
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--bogus"]).is_err());
    }

    #[test]
    fn test_ad_hoc_command_becomes_pane() {
        let specs = initial_processes(&Config::default(), vec!["make".into(), "watch".into()]);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].key, "cmd");
        assert_eq!(specs[0].title, "make watch");
    }

    #[test]
    fn test_shell_when_nothing_configured() {
        let specs = initial_processes(&Config::default(), Vec::new());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].key, "shell");
        assert_eq!(specs[0].args.len(), 1);
    }
}
