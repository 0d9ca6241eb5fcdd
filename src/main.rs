//! shadowcode - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shadowcode::demo::{expected_value, run_demo};
use shadowcode::util::config::{load_config, save_config};
use shadowcode::util::logger;
use shadowcode::{NAME, VERSION};
use std::path::PathBuf;

/// Adaptive inline caching for a bytecode interpreter
#[derive(Parser, Debug)]
#[command(name = "shadowcode")]
#[command(author = "shadowcode developers")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the built-in workload and print cache statistics
    Demo {
        /// Number of calls
        #[arg(short = 'n', long, default_value_t = 100)]
        iterations: usize,

        /// Run with shadow bytecode disabled
        #[arg(long)]
        disable: bool,

        /// Print statistics only
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the configuration to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    logger::init_with_level(logger::level_from_env(logger::level_for(args.verbose)));
    if args.verbose {
        eprintln!("shadowcode version: {}", VERSION);
    }

    let mut config = load_config(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("Failed to load config: {}", path.display()),
        None => "Failed to load config".to_string(),
    })?;

    match args.command {
        Commands::Demo {
            iterations,
            disable,
            quiet,
        } => {
            if disable {
                config.enabled = false;
            }
            let report = run_demo(config, iterations).context("Demo run failed")?;
            for (i, value) in report.values.iter().enumerate() {
                let expected = expected_value(i, iterations);
                if *value != expected {
                    anyhow::bail!("call {} returned {}, expected {}", i, value, expected);
                }
                if !quiet {
                    println!("{:>6} {}", i, value);
                }
            }
            let json = serde_json::to_string_pretty(&report.stats).context("Failed to serialize statistics")?;
            println!("{}", json);
        }
        Commands::Config { output } => match output {
            Some(path) => {
                save_config(&config, &path).with_context(|| format!("Failed to write: {}", path.display()))?;
                eprintln!("Config written to {}", path.display());
            }
            None => {
                let text = config.to_toml_string().context("Failed to serialize config")?;
                print!("{}", text);
            }
        },
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
