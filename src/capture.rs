//! Ingress source: a BPF-filtered live capture handle (component D).

use crate::error::{SetupError, SetupResult};
use pcap::{Active, Capture, Device};

const SNAPLEN: i32 = 2048;
const READ_TIMEOUT_MS: i32 = 100;

/// The filter compiled onto the capture handle. Matches IPv4 Fragmentation
/// Needed, IPv6 Packet Too Big, and excludes frames already destined to the
/// broadcast address (our own re-injections).
pub const BPF_FILTER: &str = "((icmp and icmp[0] == 3 and icmp[1] == 4) or \
     (icmp6 and ip6[40+0] == 2 and ip6[40+1] == 0)) and \
     (ether dst not ff:ff:ff:ff:ff:ff)";

/// Capture statistics reported at shutdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub received: u32,
    pub dropped: u32,
    pub if_dropped: u32,
}

/// Owns the live capture handle and its compiled filter.
pub struct Ingress {
    capture: Capture<Active>,
}

impl Ingress {
    /// Open and configure a capture handle on `iface_name`: promiscuous,
    /// immediate-mode, Ethernet link type, with the PMTUD BPF filter compiled.
    pub fn open(iface_name: &str) -> SetupResult<Self> {
        let device = Device::list()
            .map_err(|source| SetupError::CaptureOpen { iface: iface_name.to_string(), source })?
            .into_iter()
            .find(|d| d.name == iface_name)
            .ok_or_else(|| SetupError::UnknownInterface(iface_name.to_string()))?;

        let mut capture = Capture::from_device(device)
            .map_err(|source| SetupError::CaptureOpen { iface: iface_name.to_string(), source })?
            .snaplen(SNAPLEN)
            .promisc(true)
            .immediate_mode(true)
            .timeout(READ_TIMEOUT_MS)
            .open()
            .map_err(|source| SetupError::CaptureOpen { iface: iface_name.to_string(), source })?;

        capture
            .filter(BPF_FILTER, true)
            .map_err(SetupError::FilterCompile)?;

        Ok(Self { capture })
    }

    /// The capture handle's selectable file descriptor, for integration with
    /// the event-loop multiplexer.
    pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.capture.as_raw_fd()
    }

    /// Pull the next frame, if one is immediately available.
    ///
    /// Returns `Ok(None)` on the underlying "would block" / "timeout out"
    /// conditions so callers can drain non-blockingly; any other capture
    /// error is fatal. Partial captures (`caplen < len`) are silently
    /// dropped by returning `Ok(None)`, per the truncated-capture policy.
    pub fn try_next(&mut self) -> crate::error::RuntimeResult<Option<Vec<u8>>> {
        match self.capture.next_packet() {
            Ok(packet) => {
                if (packet.header.caplen as u32) < packet.header.len {
                    return Ok(None);
                }
                Ok(Some(packet.data.to_vec()))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(source) => Err(crate::error::RuntimeError::Capture(source)),
        }
    }

    /// Capture statistics accumulated since the handle was opened.
    pub fn stats(&mut self) -> crate::error::RuntimeResult<Stats> {
        let raw = self
            .capture
            .stats()
            .map_err(crate::error::RuntimeError::Capture)?;
        Ok(Stats {
            received: raw.received,
            dropped: raw.dropped,
            if_dropped: raw.if_dropped,
        })
    }
}
