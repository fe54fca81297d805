//! Veil - simple X display locker
//!
//! Locks every screen of the current X display until the invoking user's
//! password is typed. Typing the `pw` sentinel first arms password entry.

use std::path::Path;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use veil_core::{DisplayError, Episode, LockConfig, SystemAccounts, DEFAULT_CONFIG_PATH, VERSION};
use veil_x11::X11Display;

const USAGE: &str = "usage: veil [-v]";

/// Veil - lock the X display until the password is entered
#[derive(Parser, Debug)]
#[command(name = "veil")]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Print version and credits, then exit
    #[arg(short = 'v')]
    version: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "veil=info,veil_core=info,veil_x11=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    if cli.version {
        eprintln!(
            "veil-{}, © 2006-2013 Anselm R Garbe, Diogo Sousa (orium), see LICENSE for details",
            VERSION
        );
        process::exit(1);
    }

    let code = match lock(Path::new(DEFAULT_CONFIG_PATH)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("veil: {:#}", e);
            1
        }
    };
    process::exit(code);
}

/// Run one lock episode and return the process exit status
fn lock(config_path: &Path) -> anyhow::Result<i32> {
    let config = LockConfig::load(config_path)
        .with_context(|| format!("cannot load {}", config_path.display()))?;
    info!(verifier = ?config.verifier, "locking display");

    let accounts = SystemAccounts::new(config.shadow_path.clone());
    let outcome = Episode::new(&config, &accounts)
        .run(|| X11Display::connect().map_err(DisplayError::from))?;

    info!(?outcome, "episode finished");
    Ok(outcome.exit_code())
}
