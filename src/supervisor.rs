//! Composes the capture, classifier, rate limiter, and egress sink into a
//! single-threaded cooperative event loop (component F).

use crate::capture::Ingress;
use crate::cli::Config;
use crate::classifier::classify;
use crate::egress::Egress;
use crate::error::{RuntimeError, RuntimeResult, SetupResult};
use crate::ratelimit::{self, Table};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// The event loop has no periodic work; it only ever wakes on I/O, so the
/// select timeout exists just to give shutdown a bound in pathological cases.
const IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

struct CaptureFd(RawFd);

impl AsRawFd for CaptureFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Owns every long-lived resource and mutates them only from the packet path.
pub struct Supervisor {
    iface: String,
    src_rate: f64,
    iface_rate: f64,
    ingress: Ingress,
    egress: Egress,
    sources: Table,
    ifaces: Table,
    ports: Option<crate::bitmap::Bitmap>,
    verbose: u8,
    dry_run: bool,
}

impl Supervisor {
    /// Acquire the capture handle and raw socket and build both rate-limit
    /// tables. Nothing past this point allocates resources; [`run`] only
    /// consumes them.
    pub fn build(config: Config) -> SetupResult<Self> {
        let ingress = Ingress::open(&config.iface)?;
        let egress = Egress::open(&config.iface)?;
        let sources = Table::alloc(
            ratelimit::SOURCES_CAPACITY,
            config.src_rate,
            config.src_rate * ratelimit::BURST_MULTIPLIER,
        );
        let ifaces = Table::alloc(
            ratelimit::IFACES_CAPACITY,
            config.iface_rate,
            config.iface_rate * ratelimit::BURST_MULTIPLIER,
        );
        Ok(Self {
            iface: config.iface,
            src_rate: config.src_rate,
            iface_rate: config.iface_rate,
            ingress,
            egress,
            sources,
            ifaces,
            ports: config.ports,
            verbose: config.verbose,
            dry_run: config.dry_run,
        })
    }

    /// Run until SIGINT, SIGTERM, or a fatal runtime error.
    pub async fn run(mut self) -> RuntimeResult<()> {
        let mut sigint = signal(SignalKind::interrupt()).map_err(RuntimeError::Signal)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(RuntimeError::Signal)?;
        let capture_fd = AsyncFd::new(CaptureFd(self.ingress.as_raw_fd()))
            .map_err(RuntimeError::EventLoopInit)?;

        info!(
            iface = %self.iface,
            src_rate = self.src_rate,
            iface_rate = self.iface_rate,
            verbose = self.verbose,
            dry_run = self.dry_run,
            "starting"
        );

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("received SIGINT");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM");
                    break;
                }
                readiness = capture_fd.readable() => {
                    let mut guard = readiness.map_err(RuntimeError::EventLoopInit)?;
                    self.drain()?;
                    guard.clear_ready();
                }
                _ = tokio::time::sleep(IDLE_TIMEOUT) => {}
            }
        }

        self.shutdown()
    }

    /// Pull frames until the capture handle would block, classifying and
    /// rate-limiting each in turn.
    fn drain(&mut self) -> RuntimeResult<()> {
        loop {
            match self.ingress.try_next()? {
                Some(frame) => self.handle_frame(frame)?,
                None => return Ok(()),
            }
        }
    }

    fn handle_frame(&mut self, mut frame: Vec<u8>) -> RuntimeResult<()> {
        let source_key = match classify(&frame, self.ports.as_ref()) {
            Ok(classified) => classified.source_key.to_vec(),
            Err(reason) => {
                if self.verbose >= 2 {
                    println!("reject: {reason}");
                }
                return Ok(());
            }
        };

        if !self.sources.touch_hash(&source_key) {
            if self.verbose >= 2 {
                println!("{} reject: rate-limited (source)", format_key(&source_key));
            }
            return Ok(());
        }
        if !self.ifaces.touch_hash(ratelimit::IFACE_KEY) {
            if self.verbose >= 2 {
                println!("{} reject: rate-limited (iface)", format_key(&source_key));
            }
            return Ok(());
        }

        if self.verbose >= 1 {
            println!("{} admit", format_key(&source_key));
        }
        if self.verbose >= 3 {
            println!("{}", hex_dump(&frame));
        }

        // Mutation happens strictly after both admit checks, so a rejected
        // frame is never touched.
        self.egress.transmit(&mut frame, self.dry_run)?;
        Ok(())
    }

    fn shutdown(mut self) -> RuntimeResult<()> {
        let stats = self.ingress.stats()?;
        eprintln!(
            "recv={} drop={} ifdrop={}",
            stats.received, stats.dropped, stats.if_dropped
        );
        info!(
            recv = stats.received,
            drop = stats.dropped,
            ifdrop = stats.if_dropped,
            "shutdown"
        );
        Ok(())
    }
}

fn format_key(key: &[u8]) -> String {
    match key.len() {
        4 => Ipv4Addr::new(key[0], key[1], key[2], key[3]).to_string(),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(key);
            Ipv6Addr::from(octets).to_string()
        }
        _ => format!("{key:02x?}"),
    }
}

fn hex_dump(frame: &[u8]) -> String {
    frame
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
