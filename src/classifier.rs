//! Ethernet/VLAN/IPv4/IPv6/ICMP framing validation and source-key extraction.
//!
//! Everything here is pure, allocation-free computation over a borrowed
//! frame: no I/O, no mutation. The frame is only ever touched (to rewrite
//! the Ethernet addresses) after it has cleared this stage *and* both
//! rate-limit checks — see the supervisor.

use crate::bitmap::Bitmap;
use std::fmt;

/// 14 (Ethernet) + 20 (IPv4) + 8 (ICMP) + 8 (quoted L4) — the smallest frame
/// that could possibly be a valid IPv4 PMTUD message.
pub const MIN_FRAME_LEN: usize = 14 + 20 + 8 + 8;

const BROADCAST: [u8; 6] = [0xff; 6];
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;

/// Why a frame was rejected. Every sub-check of the pipeline has its own
/// variant so verbose logging and tests can match on the precise cause
/// instead of a formatted string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Shorter than [`MIN_FRAME_LEN`], or shorter than BPF's own framing guarantees.
    TooShort,
    /// Destination MAC is `ff:ff:ff:ff:ff:ff` — almost certainly our own re-injection.
    BroadcastDestination,
    /// EtherType (after an optional VLAN tag) is neither IPv4 nor IPv6.
    UnsupportedEtherType,
    /// IPv4 IHL encodes a header shorter than 20 bytes.
    Ipv4HeaderTooShort,
    /// IPv4 protocol isn't ICMP, or the frame doesn't span header+ICMP+quoted IPv4+8.
    NotIcmpFragNeeded,
    /// IPv6 next-header isn't ICMPv6, or the frame doesn't span header+ICMPv6+32 quoted bytes.
    NotIcmpv6PacketTooBig,
    /// A port filter is configured but fewer than 9 bytes of ICMP payload are present.
    PayloadTooShortForPortCheck,
    /// The quoted inner datagram's IP version nibble is neither 4 nor 6.
    InvalidInnerIpVersion,
    /// Fewer than 2 bytes remain at the computed inner L4 offset.
    TooShortForL4Port,
    /// A port filter is configured and the inner L4 source port isn't in it.
    PortNotWhitelisted,
}

impl RejectReason {
    /// Short, stable, human-readable reason string used in verbose output.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooShort => "frame too short",
            RejectReason::BroadcastDestination => "destination is broadcast",
            RejectReason::UnsupportedEtherType => "unsupported ethertype",
            RejectReason::Ipv4HeaderTooShort => "IPv4 header invalid length",
            RejectReason::NotIcmpFragNeeded => "not ICMP fragmentation-needed or too short",
            RejectReason::NotIcmpv6PacketTooBig => "not ICMPv6 packet-too-big or too short",
            RejectReason::PayloadTooShortForPortCheck => "payload too short for port check",
            RejectReason::InvalidInnerIpVersion => "invalid inner IP version",
            RejectReason::TooShortForL4Port => "too short to read L4 source port",
            RejectReason::PortNotWhitelisted => "L4 source port not on whitelist",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame that has cleared classification, carrying the bytes to rate-limit
/// and forward plus the source-address key to rate-limit it by.
pub struct Classified<'a> {
    pub frame: &'a [u8],
    pub source_key: &'a [u8],
}

/// Run the full classification pipeline over one captured frame.
///
/// `ports`, if present, enforces the inner-payload L4 source-port whitelist.
pub fn classify<'a>(frame: &'a [u8], ports: Option<&Bitmap>) -> Result<Classified<'a>, RejectReason> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(RejectReason::TooShort);
    }
    if frame[0..6] == BROADCAST {
        return Err(RejectReason::BroadcastDestination);
    }

    let mut l3_offset = 14;
    let mut ether_type = u16::from_be_bytes([frame[12], frame[13]]);
    if ether_type == ETHERTYPE_VLAN {
        // Frame is at least MIN_FRAME_LEN (50) bytes, so offsets 16/17 are in bounds.
        ether_type = u16::from_be_bytes([frame[16], frame[17]]);
        l3_offset = 18;
    }

    let icmp_offset = match ether_type {
        ETHERTYPE_IPV4 if (frame[l3_offset] & 0xF0) == 0x40 => {
            let ihl = (frame[l3_offset] & 0x0F) as usize * 4;
            if ihl < 20 {
                return Err(RejectReason::Ipv4HeaderTooShort);
            }
            let icmp_offset = l3_offset + ihl;
            let protocol = frame[l3_offset + 9];
            let needed = l3_offset + 20 + 8 + 20 + 8;
            if protocol != 1 || frame.len() < needed {
                return Err(RejectReason::NotIcmpFragNeeded);
            }
            icmp_offset
        }
        ETHERTYPE_IPV6 if (frame[l3_offset] & 0xF0) == 0x60 => {
            let icmp_offset = l3_offset + 40;
            let next_header = frame[l3_offset + 6];
            let needed = l3_offset + 40 + 8 + 32;
            if next_header != 58 || frame.len() < needed {
                return Err(RejectReason::NotIcmpv6PacketTooBig);
            }
            icmp_offset
        }
        _ => return Err(RejectReason::UnsupportedEtherType),
    };

    let source_key: &'a [u8] = if ether_type == ETHERTYPE_IPV4 {
        &frame[l3_offset + 12..l3_offset + 16]
    } else {
        &frame[l3_offset + 8..l3_offset + 24]
    };

    if let Some(bitmap) = ports {
        check_port_whitelist(frame, icmp_offset, bitmap)?;
    }

    Ok(Classified { frame, source_key })
}

/// Optimistic parsing: the quoted datagram's first two L4 bytes are treated
/// as a source port regardless of what protocol the quoted IP header names.
/// Correct for TCP/UDP/SCTP/DCCP; silently wrong for exotic L4s (accepted).
fn check_port_whitelist(frame: &[u8], icmp_offset: usize, bitmap: &Bitmap) -> Result<(), RejectReason> {
    let payload_offset = icmp_offset + 8;
    if frame.len() < payload_offset + 9 {
        return Err(RejectReason::PayloadTooShortForPortCheck);
    }

    let inner_version = frame[payload_offset] & 0xF0;
    let l4_offset = match inner_version {
        0x40 => payload_offset + (frame[payload_offset] & 0x0F) as usize * 4,
        0x60 => payload_offset + 40,
        _ => return Err(RejectReason::InvalidInnerIpVersion),
    };

    if frame.len() < l4_offset + 2 {
        return Err(RejectReason::TooShortForL4Port);
    }

    let sport = u16::from_be_bytes([frame[l4_offset], frame[l4_offset + 1]]);
    if !bitmap.get(sport as usize) {
        return Err(RejectReason::PortNotWhitelisted);
    }
    Ok(())
}
