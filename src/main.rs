// meshdisc - service discovery for a private mesh network
// Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use meshdisc::config::{load_config, load_config_from, Config};
use meshdisc::registry::Registry;
use meshdisc::service::{parse_labels, Service};
use meshdisc::DiscoveryClient;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.meshdisc/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every service advertised on the network
    List,

    /// Print the address of a service
    Find {
        /// Service name
        name: String,

        /// Required labels, as key=value
        labels: Vec<String>,
    },

    /// Advertise services from a JSON file until interrupted
    Advertise {
        /// File with a JSON array of {name, labels, addrPort}, or - for stdin
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Commands::List => list(&config).await,
        Commands::Find { name, labels } => find(&config, &name, labels).await,
        Commands::Advertise { file } => advertise(&config, &file).await,
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn list(config: &Config) -> Result<()> {
    let client = DiscoveryClient::from_config(config)?;
    let services = client.list_services().await?;
    if services.is_empty() {
        eprintln!("No advertised services found");
        return Ok(());
    }

    let name_width = services.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for s in &services {
        println!(
            "* {:<name_width$}  {:<21}  {}",
            s.name,
            s.addr_port.to_string(),
            s.labels_display(),
        );
    }
    Ok(())
}

async fn find(config: &Config, name: &str, labels: Vec<String>) -> Result<()> {
    let labels = parse_labels(labels)?;
    let client = DiscoveryClient::from_config(config)?;
    let addr = client
        .find_service(name, &labels)
        .await
        .with_context(|| format!("cannot find service '{}'", name))?;
    println!("{}", addr);
    Ok(())
}

async fn advertise(config: &Config, file: &str) -> Result<()> {
    let services = read_services(file)?;
    let source = config.address_source();
    let registry = Registry::start(config, source.as_ref()).await?;

    for s in services {
        if *s.addr_port.ip() == registry.local_addr() {
            registry.advertise(s.addr_port.port(), &s.name, s.labels)?;
        } else {
            registry.advertise_remote(s.addr_port, &s.name, s.labels)?;
        }
    }
    eprintln!(
        "Advertising {} service(s) from {}. Press Ctrl-C to stop.",
        registry.services().len(),
        registry.local_addr()
    );

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;
    tracing::info!("Shutting down registry");
    registry.shutdown().await?;
    Ok(())
}

fn read_services(file: &str) -> Result<Vec<Service>> {
    let raw = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("cannot read services from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(file))
            .with_context(|| format!("cannot read services from {}", file))?
    };
    serde_json::from_str(&raw).with_context(|| format!("invalid services file {}", file))
}
