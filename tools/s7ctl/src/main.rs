//! s7ctl - S7 address inspection and PLC exchange tool
//!
//! Parses S7 address notation and runs typed reads and writes through the
//! serialized client against a simulated PLC built from configuration.

mod config;
mod ops;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use s7_comlink::{status, AddressDescriptor, S7Client, SimulatedPlc, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::S7ctlConfig;
use crate::ops::{Operation, Outcome, ValueType};

#[derive(Parser)]
#[command(name = "s7ctl")]
#[command(about = "S7 address inspection and PLC exchange tool")]
#[command(long_about = "S7 address inspection and PLC exchange tool

Addresses:
  EB1000        input byte 1000
  AW4 / MD0     output word 4 / merker double word 0
  E5.5          input bit 5 of byte 5
  DB1.DBW4      data block 1, word at byte 4
  DB1.DBX5.1    data block 1, bit 1 of byte 5

Examples:
  s7ctl parse EB1000 DB1.DBX5.1 --json
  s7ctl exec write:DB1.DBW4=1234:u16 read:DB1.DBW4:u16
  s7ctl poll MD0 --type f32 --interval-ms 500 --count 10")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: config/s7ctl.* and S7CTL_* variables)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive, overrides the configuration
    #[arg(short = 'l', long = "log-level", global = true, env = "S7CTL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse address notation and print the resulting descriptors
    Parse {
        /// Addresses to parse
        #[arg(required = true)]
        addresses: Vec<String>,

        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute operations in order against the configured PLC
    #[command(about = "Execute read:<ADDR>:<TYPE> / write:<ADDR>=<VALUE>:<TYPE> operations")]
    Exec {
        /// Operations, executed in the order given
        #[arg(required = true)]
        operations: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read an address periodically
    Poll {
        /// Address to read
        address: String,

        /// Value type (bool, u8, i8, u16, i16, u32, i32, f32)
        #[arg(short = 't', long = "type")]
        ty: ValueType,

        /// Poll interval in milliseconds (default from configuration)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Number of reads, 0 polls until interrupted (default from configuration)
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },

    /// Write a configuration template
    InitConfig {
        /// Target file (.yaml, .toml or .json)
        #[arg(default_value = "config/s7ctl.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = S7ctlConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    if cli.no_color {
        config.log.ansi = false;
    }
    let _log_guard = s7_common::init_logging(&config.log).context("Failed to initialize logging")?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Parse { addresses, json } => parse_command(&addresses, json),
        Commands::Exec { operations, json } => exec_command(&config, &operations, json).await,
        Commands::Poll {
            address,
            ty,
            interval_ms,
            count,
        } => {
            let interval_ms = interval_ms.unwrap_or(config.poll.interval_ms);
            let count = count.unwrap_or(config.poll.count);
            poll_command(&config, &address, ty, interval_ms, count).await
        },
        Commands::InitConfig { path, force } => init_config_command(&path, force),
    }
}

// ============================================================================
// parse
// ============================================================================

fn parse_command(addresses: &[String], json: bool) -> Result<()> {
    let results: Vec<_> = addresses
        .iter()
        .map(|text| (text, s7_comlink::parse(text)))
        .collect();
    let rejected = results.iter().filter(|(_, r)| r.is_err()).count();

    if json {
        let entries: Vec<serde_json::Value> = results
            .iter()
            .map(|(text, result)| match result {
                Ok(descriptor) => serde_json::json!({
                    "input": text,
                    "canonical": descriptor.to_string(),
                    "descriptor": descriptor,
                    "start": descriptor.effective_offset(),
                    "amount": descriptor.amount(),
                }),
                Err(e) => serde_json::json!({ "input": text, "error": e.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (text, result) in &results {
            match result {
                Ok(descriptor) => print_descriptor(text, descriptor),
                Err(e) => println!("{} {:<14} {}", "✗".bright_red(), text, e.to_string().red()),
            }
        }
    }

    if rejected > 0 {
        bail!("{} of {} address(es) rejected", rejected, addresses.len());
    }
    Ok(())
}

fn print_descriptor(text: &str, descriptor: &AddressDescriptor) {
    let area = descriptor.area();
    let length = descriptor.length();
    println!(
        "{} {:<14} {}",
        "✓".bright_green(),
        text.bright_yellow(),
        descriptor.to_string().bright_cyan()
    );
    println!(
        "    area={} ({:#04x})  db={}  length={:?} ({:#04x})  size={}",
        area,
        area.code(),
        descriptor.db_number(),
        length,
        length.code(),
        descriptor.size()
    );
    println!(
        "    offset={}  bit={}  start={}  amount={}",
        descriptor.offset(),
        descriptor.bit_offset(),
        descriptor.effective_offset(),
        descriptor.amount()
    );
}

// ============================================================================
// exec / poll
// ============================================================================

/// Start a client on the simulated PLC and connect it
async fn connect(config: &S7ctlConfig) -> Result<S7Client> {
    let plc = SimulatedPlc::from_config(&config.simulator);
    let client = S7Client::with_options(plc, config.client.clone())?;

    let target = &config.plc;
    let code = client
        .connect_async(&target.address, target.rack, target.slot)
        .await?;
    if status::is_ok(code) {
        info!(
            "Connected to {} (rack {}, slot {})",
            target.address, target.rack, target.slot
        );
    } else {
        warn!("Connect to {} failed: {}", target.address, status::describe(code));
        println!(
            "{} connect {}: {}",
            "WARN".yellow(),
            target.address,
            describe(code)
        );
    }
    Ok(client)
}

async fn close(client: S7Client) -> Result<()> {
    client.disconnect_async().await?;
    tokio::task::spawn_blocking(move || client.shutdown())
        .await
        .context("Client shutdown task failed")??;
    Ok(())
}

fn describe(code: StatusCode) -> String {
    format!("{} ({:#x})", status::describe(code), code)
}

async fn exec_command(config: &S7ctlConfig, operations: &[String], json: bool) -> Result<()> {
    let operations = operations
        .iter()
        .map(|text| {
            text.parse::<Operation>()
                .map_err(|e| anyhow!("{}: {}", text, e))
        })
        .collect::<Result<Vec<_>>>()?;

    let client = connect(config).await?;
    let mut failed = 0usize;
    let mut entries = Vec::new();

    for op in &operations {
        let result = match ops::execute(&client, op).await {
            Err(e) if !e.is_rejection() => return Err(e.into()),
            result => result,
        };
        let ok = matches!(&result, Ok(outcome) if status::is_ok(outcome.code()));
        if !ok {
            failed += 1;
        }

        if json {
            entries.push(ops::outcome_json(op, &result));
            continue;
        }
        match result {
            Ok(Outcome::Read { value, .. }) if ok => println!(
                "{} {:<16} = {}",
                "READ ".bright_green(),
                op.address(),
                value.to_string().bright_white()
            ),
            Ok(Outcome::Written { .. }) if ok => {
                println!("{} {:<16} {}", "WRITE".bright_green(), op.address(), "ok".green())
            },
            Ok(outcome) => println!(
                "{} {:<16} {}",
                "FAIL ".bright_red(),
                op.address(),
                describe(outcome.code()).red()
            ),
            Err(e) => println!("{} {} - {}", "REJECT".bright_red(), op, e.to_string().red()),
        }
    }

    close(client).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    }
    if failed > 0 {
        bail!("{} of {} operation(s) failed", failed, operations.len());
    }
    Ok(())
}

async fn poll_command(
    config: &S7ctlConfig,
    address: &str,
    ty: ValueType,
    interval_ms: u64,
    count: u64,
) -> Result<()> {
    let client = connect(config).await?;
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut reads = 0u64;

    println!(
        "{} {} as {} every {} ms",
        "Polling".bright_cyan(),
        address.bright_yellow(),
        ty,
        interval_ms
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {},
            _ = tokio::signal::ctrl_c() => {
                info!("Polling interrupted");
                break;
            },
        }

        let (value, code) = ops::read_typed(&client, address, ty).await?;
        let now = chrono::Local::now().format("%H:%M:%S%.3f");
        if status::is_ok(code) {
            println!("[{}] {} = {}", now, address, value.to_string().bright_white());
        } else {
            println!("[{}] {} {}", now, address, describe(code).red());
        }

        reads += 1;
        if count > 0 && reads >= count {
            break;
        }
    }

    close(client).await
}

// ============================================================================
// init-config
// ============================================================================

fn init_config_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite", path.display());
    }
    s7_common::config::save_config_to_file(&S7ctlConfig::template(), path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", "Wrote".bright_green(), path.display());
    Ok(())
}
