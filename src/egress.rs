//! Egress sink: raw link-layer broadcast re-injection (component E).

use crate::error::{RuntimeError, RuntimeResult, SetupError, SetupResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::ffi::CString;
use std::mem;

const BROADCAST: [u8; 6] = [0xff; 6];

/// `htons(ETH_P_ALL)`, the protocol value for a raw packet socket that sees
/// every ethertype flowing through the interface.
fn eth_p_all_network_order() -> u16 {
    (libc::ETH_P_ALL as u16).to_be()
}

/// A raw `AF_PACKET`/`SOCK_RAW` socket bound to a single interface.
pub struct Egress {
    socket: Socket,
}

impl Egress {
    /// Resolve `iface_name` to an interface index and bind a raw link-layer
    /// socket to it.
    pub fn open(iface_name: &str) -> SetupResult<Self> {
        let ifindex = interface_index(iface_name)?;

        let protocol = eth_p_all_network_order();
        let socket = Socket::new(
            Domain::from(libc::AF_PACKET),
            Type::RAW,
            Some(Protocol::from(protocol as i32)),
        )
        .map_err(SetupError::RawSocket)?;

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = ifindex;

        let rc = unsafe {
            libc::bind(
                std::os::unix::io::AsRawFd::as_raw_fd(&socket),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(SetupError::RawSocket(std::io::Error::last_os_error()));
        }

        Ok(Self { socket })
    }

    /// Rewrite the Ethernet addresses and send the frame as a broadcast.
    ///
    /// Destination becomes `ff:ff:ff:ff:ff:ff`; source becomes the frame's
    /// *original* destination address, so the re-injection is attributable
    /// to the node that forwarded it. Bytes from offset 12 on are untouched.
    /// Callers must only invoke this after every admit check has already
    /// passed: a rejected frame must never be mutated.
    pub fn transmit(&self, frame: &mut [u8], dry_run: bool) -> RuntimeResult<()> {
        debug_assert!(frame.len() >= 12, "frame too short to carry Ethernet addresses");
        let original_dst: [u8; 6] = frame[0..6].try_into().expect("checked length above");
        frame[0..6].copy_from_slice(&BROADCAST);
        frame[6..12].copy_from_slice(&original_dst);

        if dry_run {
            return Ok(());
        }

        match self.socket.send(frame) {
            Ok(_) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => Ok(()),
            Err(e) => Err(RuntimeError::Send(e)),
        }
    }
}

fn interface_index(iface_name: &str) -> SetupResult<libc::c_int> {
    let name =
        CString::new(iface_name).map_err(|_| SetupError::UnknownInterface(iface_name.to_string()))?;
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(SetupError::UnknownInterface(iface_name.to_string()));
    }
    Ok(index as libc::c_int)
}
