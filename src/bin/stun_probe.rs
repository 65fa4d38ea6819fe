use anyhow::{Context, Result};
use clap::Parser;
use sharp_stun::{init_logging, Client, ClientConfig, Protocol};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "SHARP STUN Binding probe", long_about = None)]
struct Args {
    /// STUN server (host:port); overrides the config file
    server: Option<String>,

    /// Transport (udp, udp4, udp6, tcp, tcp4, tcp6)
    #[arg(short, long)]
    protocol: Option<Protocol>,

    /// Deadline for dialing and for the request, in milliseconds
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Largest response accepted, in bytes
    #[arg(long)]
    max_message_size: Option<usize>,

    /// Reject responses with a foreign transaction ID
    #[arg(long)]
    strict: bool,

    /// JSON client configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => ClientConfig::default(),
        };

        if let Some(server) = &self.server {
            config = config.with_server(server.clone());
        }
        if let Some(protocol) = self.protocol {
            config = config.with_protocol(protocol);
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_deadline(Duration::from_millis(ms));
        }
        if let Some(size) = self.max_message_size {
            config = config.with_max_message_size(size);
        }
        if self.strict {
            config = config.with_transaction_verification(true);
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config = args.client_config()?;
    info!("Probing {} over {}", config.server, config.protocol);

    let mut client = Client::with_config(&config)
        .with_context(|| format!("Cannot reach {}", config.server))?;

    println!("Local address:  {}", client.local_addr()?);
    println!("Server address: {}", client.peer_addr()?);

    let response = client.request().context("Binding request failed")?;

    println!("Response:       {} {}", response.method(), response.class());
    println!("Transaction ID: {}", response.transaction_id());

    let mut decoded = 0;
    for attribute in response.attributes() {
        println!("  {}: {:?}", attribute.attr_type(), attribute);
        decoded += 1;
    }
    let skipped = response.raw_attributes().len().saturating_sub(decoded);
    if skipped > 0 {
        println!("  ({} attribute(s) not decoded)", skipped);
    }

    if let Some(addr) = response.xor_mapped_address() {
        println!();
        println!("Public address: {}", addr);
    }

    client.close()?;
    Ok(())
}
