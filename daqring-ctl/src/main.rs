//! daqring-ctl - create, inspect and recover shared-memory rings.
//!
//! Usage: daqring-ctl [-v] <command> ...
//! Logging follows RUST_LOG; each -v raises the default level.

use std::fs;

use anyhow::{ bail, Context, Result };
use clap::{ Parser, Subcommand };
use daqring::{ default_max_consumers, ClientMode, RingBuffer, RingConfig, RingRegion };
use tracing::{ debug, info };
use tracing_subscriber::EnvFilter;

/// Where Linux exposes POSIX shared memory objects
const SHM_DIR: &str = "/dev/shm";

#[derive(Parser)]
#[command(name = "daqring-ctl")]
#[command(about = "Manage daqring shared-memory ring buffers")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (repeat for more)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and format a new ring
    Create {
        name: String,
        /// Size of the data area in bytes (rounded up to whole pages)
        #[arg(short = 's', long = "size")]
        size: Option<usize>,
        /// Number of consumer slots
        #[arg(short = 'c', long = "max-consumers")]
        max_consumers: Option<usize>,
    },

    /// Reformat an existing ring, discarding data and slot ownership
    Format {
        name: String,
        #[arg(short = 'c', long = "max-consumers")]
        max_consumers: Option<usize>,
        /// Reformat even while producer or consumer slots are owned
        #[arg(long)]
        force: bool,
    },

    /// Remove a ring; processes that have it mapped keep their mapping
    Delete {
        name: String,
    },

    /// Show usage of a ring
    Status {
        name: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List rings in /dev/shm
    List,

    /// Mark the producer slot unowned
    ReleaseProducer {
        name: String,
    },

    /// Mark a consumer slot unowned
    ReleaseConsumer {
        name: String,
        slot: usize,
    },

    /// Release slots held by processes that no longer exist
    Reap {
        name: String,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Create { name, size, max_consumers } => create(&name, size, max_consumers),
        Command::Format { name, max_consumers, force } => {
            let max_consumers = max_consumers.unwrap_or_else(default_max_consumers);
            if !force {
                let usage = manage(&name)?.usage();
                if usage.producer.is_some() || !usage.consumers.is_empty() {
                    bail!(
                        "{} is in use (producer {:?}, {} consumers); close them first or pass --force",
                        name,
                        usage.producer,
                        usage.consumers.len()
                    );
                }
            }
            RingRegion::format(&name, max_consumers).with_context(||
                format!("formatting ring {}", name)
            )?;
            println!("formatted {} with {} consumer slots", name, max_consumers);
            Ok(())
        }
        Command::Delete { name } => {
            if !RingRegion::is_ring(&name) {
                bail!("{} is not a daqring ring", name);
            }
            RingRegion::remove(&name).with_context(|| format!("removing ring {}", name))?;
            println!("deleted {}", name);
            Ok(())
        }
        Command::Status { name, json } => status(&name, json),
        Command::List => list(),
        Command::ReleaseProducer { name } => {
            let manager = manage(&name)?;
            match manager.producer_pid() {
                Some(pid) => {
                    manager.force_producer_release()?;
                    println!("released producer (pid {})", pid);
                }
                None => println!("no producer attached"),
            }
            Ok(())
        }
        Command::ReleaseConsumer { name, slot } => {
            let manager = manage(&name)?;
            manager
                .force_consumer_release(slot)
                .with_context(|| format!("releasing consumer slot {} of {}", slot, name))?;
            println!("released consumer slot {}", slot);
            Ok(())
        }
        Command::Reap { name, json } => {
            let released = manage(&name)?.reap_stale()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&released)?);
            } else if released.is_empty() {
                println!("nothing to reap");
            } else {
                for slot in released {
                    println!("reaped {:?}", slot);
                }
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn manage(name: &str) -> Result<RingBuffer> {
    RingBuffer::open(name, ClientMode::Manager).with_context(|| format!("opening ring {}", name))
}

fn create(name: &str, size: Option<usize>, max_consumers: Option<usize>) -> Result<()> {
    let mut config = match size {
        Some(size) => RingConfig::new(size)?,
        None => RingConfig::default(),
    };
    if let Some(n) = max_consumers {
        config = config.with_consumers(n)?;
    }
    config.create(name).with_context(|| format!("creating ring {}", name))?;
    info!(ring = name, data_bytes = config.data_bytes, max_consumers = config.max_consumers, "created");

    let manager = manage(name)?;
    println!(
        "created {} ({} data bytes, {} consumer slots)",
        manager.name(),
        manager.data_bytes(),
        manager.max_consumers()
    );
    Ok(())
}

fn status(name: &str, json: bool) -> Result<()> {
    let manager = manage(name)?;
    let usage = manager.usage();
    if json {
        println!("{}", serde_json::to_string_pretty(&usage)?);
        return Ok(());
    }

    println!("ring:          {}", manager.name());
    println!("buffer space:  {}", usage.buffer_space);
    println!("put space:     {}", usage.put_space);
    match usage.producer {
        Some(pid) => println!("producer:      pid {}", pid),
        None => println!("producer:      none"),
    }
    println!("consumers:     {}/{}", usage.consumers.len(), usage.max_consumers);
    println!("get space:     min {} max {}", usage.min_get_space, usage.max_get_space);
    for consumer in &usage.consumers {
        println!("  slot {:>4}  pid {:>8}  {:>10} bytes behind", consumer.slot, consumer.pid, consumer.available);
    }
    Ok(())
}

fn list() -> Result<()> {
    let entries = fs::read_dir(SHM_DIR).with_context(|| format!("reading {}", SHM_DIR))?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| RingRegion::is_ring(name))
        .collect();
    names.sort();
    debug!(count = names.len(), "scanned {}", SHM_DIR);

    for name in names {
        match RingBuffer::open(&name, ClientMode::Manager) {
            Ok(manager) => {
                let usage = manager.usage();
                println!(
                    "/{:<32} {:>12} bytes  producer {:<5}  consumers {}/{}",
                    name,
                    usage.buffer_space,
                    if usage.producer.is_some() { "yes" } else { "no" },
                    usage.consumers.len(),
                    usage.max_consumers
                );
            }
            Err(err) => println!("/{:<32} unreadable: {}", name, err),
        }
    }
    Ok(())
}
