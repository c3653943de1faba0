//! Config validation CLI tool
//!
//! Validates a berthload configuration file and reports any errors.

use berthload_config::{ConfigError, CURRENT_CONFIG_VERSION};
use berthload_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a berthload configuration file.");
            eprintln!("Set BERTHLOAD_SIGNING_KEY to supply the key outside the file.");
            eprintln!();
            eprintln!("Default location: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match berthload_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Bind: {}", settings.server.bind);
            println!("  Data dir: {}", settings.server.data_dir.display());
            println!("  Session TTL: {}s", settings.auth.session_ttl.as_secs());
            println!("  Moderators: {}", settings.moderators.len());
            println!("  Seed ships: {}", settings.ships.len());

            if !settings.ships.is_empty() {
                println!();
                println!("Ships:");
                for ship in &settings.ships {
                    println!(
                        "  - {} (capacity {}, {} cranes)",
                        ship.name, ship.capacity, ship.cranes
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
