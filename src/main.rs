//! tensor-vault entry point.
//!
//! Bootstraps the serving backend with:
//! - Configuration loading from `TENSOR_VAULT_*` environment variables
//! - Logging initialization (JSON or pretty)
//! - TCP listener setup
//! - Signal handling for shutdown
//!
//! ## CLI Subcommands
//!
//! - `tensor-vault` or `tensor-vault serve` - Run the server (default)
//! - `tensor-vault config` - Print the effective configuration
//! - `tensor-vault version` - Print the version

use std::process::ExitCode;

use tensor_vault::config;
use tensor_vault::runtime::mock::MockRuntime;
use tensor_vault::telemetry::{init_logging, LogConfig, LogFormat};
use tensor_vault::Vault;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => {
            let config = config::load();

            let log_config = LogConfig {
                format: if config.log_json {
                    LogFormat::Json
                } else {
                    LogFormat::Pretty
                },
                level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                output_path: None,
            };
            if let Err(e) = init_logging(&log_config) {
                eprintln!("Logging init failed: {e}");
                return ExitCode::FAILURE;
            }

            let vault = Vault::new(config, Box::new(MockRuntime::new()));
            match vault.serve().await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Server error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        "config" => {
            let config = config::load();
            println!("listen      {}", config.listen_addr());
            println!("model_dir   {}", config.model_dir.display());
            println!("cache_mode  {:?}", config.cache_mode);
            println!("frame_limit {}", config.frame_limit);
            println!("log_format  {}", if config.log_json { "json" } else { "pretty" });
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("tensor-vault {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("tensor-vault - encrypted-at-rest model serving backend");
    println!();
    println!("USAGE:");
    println!("  tensor-vault [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("  serve      Run the TCP server (default)");
    println!("  config     Print the effective configuration");
    println!("  version    Print the version");
    println!("  help       Show this message");
    println!();
    println!("Configuration is read from TENSOR_VAULT_* environment variables;");
    println!("run 'tensor-vault config' to see the effective values.");
}
