use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use relay_common::constants::{DEFAULT_SERVER_PORT, REQUEST_TIMEOUT};

/// CLI arguments for the relay server
#[derive(Parser, Debug)]
#[command(name = "relayd")]
#[command(about = "Relay server exposing tunneled services under subdomains", long_about = None)]
#[command(version)]
pub struct Args {
    /// Public base hostname, e.g. tunnel.example.com
    #[arg(long, env = "HOSTNAME")]
    pub hostname: String,

    /// Shared authentication secrets, comma-separated
    #[arg(long, env = "SECRET", value_delimiter = ',')]
    pub secret: Vec<String>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_SERVER_PORT)]
    pub port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated server configuration
#[derive(Debug)]
pub struct ServerConfig {
    /// Base hostname; tunnel URLs are `https://<subdomain>.<hostname>`
    pub hostname: String,

    /// Allow-set of shared secrets
    pub secrets: HashSet<String>,

    /// Listen port
    pub port: u16,

    /// How long a forwarded request may wait for its response
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        if !args.hostname.contains('.') {
            bail!(
                "HOSTNAME must be a valid domain (e.g. tunnel.example.com), got '{}'",
                args.hostname
            );
        }

        let secrets: HashSet<String> = args
            .secret
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if secrets.is_empty() {
            bail!("SECRET must contain at least one non-empty secret");
        }

        Ok(Self {
            hostname: args.hostname,
            secrets,
            port: args.port,
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    /// Public URL handed to a client once its tunnel is live
    pub fn public_url(&self, subdomain: &str) -> String {
        format!("https://{}.{}", subdomain, self.hostname)
    }

    /// Leading label of the base hostname, reserved for the health probe
    pub fn hostname_label(&self) -> &str {
        self.hostname.split('.').next().unwrap_or(&self.hostname)
    }
}
