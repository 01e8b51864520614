//! Command-line flags and the validated configuration derived from them.

use crate::bitmap::{parse_port_list, Bitmap};
use crate::error::{SetupError, SetupResult};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pmtud", about = "Path MTU Discovery ICMP re-injection daemon")]
pub struct Cli {
    /// Interface to capture and re-inject on.
    #[arg(long, env = "PMTUD_IFACE")]
    pub iface: Option<String>,

    /// Per-source admit rate in packets/sec; burst = 1.9x this value.
    #[arg(long, env = "PMTUD_SRC_RATE", default_value_t = 1.0)]
    pub src_rate: f64,

    /// Global egress admit rate in packets/sec; burst = 1.9x this value.
    #[arg(long, env = "PMTUD_IFACE_RATE", default_value_t = 10.0)]
    pub iface_rate: f64,

    /// Comma-separated inner L4 source ports to whitelist, e.g. "80,443".
    #[arg(long, env = "PMTUD_PORTS")]
    pub ports: Option<String>,

    /// Increase verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, env = "PMTUD_VERBOSE")]
    pub verbose: u8,

    /// Classify and rate-limit, but do not transmit.
    #[arg(long, env = "PMTUD_DRY_RUN")]
    pub dry_run: bool,

    /// Pin the process to this CPU.
    #[arg(long, env = "PMTUD_CPU")]
    pub cpu: Option<usize>,
}

/// Configuration validated from [`Cli`], ready for the supervisor to consume.
pub struct Config {
    pub iface: String,
    pub src_rate: f64,
    pub iface_rate: f64,
    pub ports: Option<Bitmap>,
    pub verbose: u8,
    pub dry_run: bool,
    pub cpu: Option<usize>,
}

impl Config {
    pub fn from_cli(cli: Cli) -> SetupResult<Self> {
        let iface = cli.iface.ok_or(SetupError::MissingInterface)?;

        if !(cli.src_rate > 0.0) {
            return Err(SetupError::NonPositiveRate(cli.src_rate));
        }
        if !(cli.iface_rate > 0.0) {
            return Err(SetupError::NonPositiveRate(cli.iface_rate));
        }

        let ports = match cli.ports {
            Some(raw) => Some(parse_port_list(&raw).map_err(SetupError::MalformedPort)?),
            None => None,
        };

        Ok(Self {
            iface,
            src_rate: cli.src_rate,
            iface_rate: cli.iface_rate,
            ports,
            verbose: cli.verbose,
            dry_run: cli.dry_run,
            cpu: cli.cpu,
        })
    }
}
