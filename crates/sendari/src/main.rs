// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sendari - a multi-tenant chat-session gateway.
//!
//! This is the binary entry point for the Sendari daemon.

use clap::{Parser, Subcommand};

mod notify;
mod serve;
mod shutdown;
mod transport;

/// Sendari - a multi-tenant chat-session gateway.
#[derive(Parser, Debug)]
#[command(name = "sendari", version, about, long_about = None)]
struct Cli {
    /// Path to an explicit config file (overrides the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway daemon (default).
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            for error in errors {
                eprintln!("sendari: config error: {error}");
            }
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) | None => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("sendari: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<sendari_config::SendariConfig, Vec<sendari_config::ConfigError>> {
    match path {
        Some(path) => {
            let config = sendari_config::load_config_from_path(path).map_err(|e| {
                vec![sendari_config::ConfigError::Parse {
                    message: e.to_string(),
                }]
            })?;
            sendari_config::validation::validate_config(&config)?;
            Ok(config)
        }
        None => sendari_config::load_and_validate(),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn binary_loads_config_defaults() {
        let config = super::load_config(None).expect("default config should be valid");
        assert_eq!(config.gateway.name, "sendari");
    }
}
