//! Path MTU Discovery assistance daemon.
//!
//! Captures ICMP "fragmentation needed" (IPv4) and "packet too big" (IPv6)
//! messages on an interface and re-broadcasts them at the link layer so
//! every backend on a load-balanced segment can update its path MTU cache,
//! not just the one that happened to receive the original ICMP.

pub mod bitmap;
pub mod capture;
pub mod classifier;
pub mod cli;
pub mod egress;
pub mod error;
pub mod process;
pub mod ratelimit;
pub mod supervisor;
