//! Boundary scenarios from the capture-classify pipeline, built from
//! hand-constructed Ethernet frames rather than a packet-capture fixture.

use pmtud::bitmap::Bitmap;
use pmtud::classifier::{classify, RejectReason};

/// Ethernet(14) + IPv4(20, IHL=5) + ICMP(8) + quoted IPv4(20, IHL=5) +
/// quoted L4(8) = 70: the actual minimum span `classify` requires for IPv4.
/// `MIN_FRAME_LEN` (50) is only the cheap length guard checked before the
/// EtherType is read.
const FULL_IPV4_FRAME_LEN: usize = 14 + 20 + 8 + 20 + 8;

fn ipv4_icmp_frag_needed(dst_mac: [u8; 6], src_ip: [u8; 4], inner_sport: u16) -> Vec<u8> {
    let mut f = vec![0u8; FULL_IPV4_FRAME_LEN];
    f[0..6].copy_from_slice(&dst_mac);
    f[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    f[12..14].copy_from_slice(&0x0800u16.to_be_bytes());

    let l3 = 14;
    f[l3] = 0x45;
    f[l3 + 9] = 1; // ICMP
    f[l3 + 12..l3 + 16].copy_from_slice(&src_ip);

    let icmp_offset = l3 + 20;
    f[icmp_offset] = 3;
    f[icmp_offset + 1] = 4;

    let payload_offset = icmp_offset + 8;
    f[payload_offset] = 0x45;
    let l4_offset = payload_offset + 20;
    f[l4_offset..l4_offset + 2].copy_from_slice(&inner_sport.to_be_bytes());
    f
}

fn with_vlan_tag(mut frame: Vec<u8>) -> Vec<u8> {
    let ether_type = frame[12..14].to_vec();
    frame.splice(12..12, [0x81, 0x00, 0x00, 0x01]);
    frame[16..18].copy_from_slice(&ether_type);
    frame
}

fn ipv6_icmpv6_packet_too_big(dst_mac: [u8; 6]) -> Vec<u8> {
    let mut f = vec![0u8; 14 + 40 + 8 + 32];
    f[0..6].copy_from_slice(&dst_mac);
    f[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    f[12..14].copy_from_slice(&0x86ddu16.to_be_bytes());
    let l3 = 14;
    f[l3] = 0x60;
    f[l3 + 6] = 58; // ICMPv6
    f[l3 + 8..l3 + 24].copy_from_slice(&[0xfe; 16]);
    let icmp_offset = l3 + 40;
    f[icmp_offset] = 2;
    f[icmp_offset + 1] = 0;
    f
}

#[test]
fn scenario_1_minimal_valid_ipv4_is_admitted() {
    let frame = ipv4_icmp_frag_needed([0x02, 0, 0, 0, 0, 0x02], [10, 0, 0, 1], 80);
    assert_eq!(frame.len(), FULL_IPV4_FRAME_LEN);
    let classified = classify(&frame, None).expect("minimal IPv4 frame should classify");
    assert_eq!(classified.source_key, &[10, 0, 0, 1]);
}

#[test]
fn scenario_2_vlan_tagged_ipv4_is_admitted() {
    let frame = with_vlan_tag(ipv4_icmp_frag_needed([0x02, 0, 0, 0, 0, 0x02], [10, 0, 0, 1], 80));
    assert_eq!(frame.len(), FULL_IPV4_FRAME_LEN + 4);
    assert!(classify(&frame, None).is_ok());
}

#[test]
fn scenario_3_ipv6_packet_too_big_is_admitted() {
    let frame = ipv6_icmpv6_packet_too_big([0x02, 0, 0, 0, 0, 0x02]);
    assert_eq!(frame.len(), 94);
    let classified = classify(&frame, None).expect("minimal IPv6 frame should classify");
    assert_eq!(classified.source_key, &[0xfe; 16]);
}

#[test]
fn scenario_4_port_whitelist_rejects_unlisted_inner_port() {
    let frame = ipv4_icmp_frag_needed([0x02, 0, 0, 0, 0, 0x02], [10, 0, 0, 1], 80);
    let mut whitelist = Bitmap::alloc(65536);
    whitelist.set(443);
    assert_eq!(
        classify(&frame, Some(&whitelist)),
        Err(RejectReason::PortNotWhitelisted)
    );
}

#[test]
fn scenario_5_port_whitelist_admits_listed_inner_port() {
    let frame = ipv4_icmp_frag_needed([0x02, 0, 0, 0, 0, 0x02], [10, 0, 0, 1], 8080);
    let mut whitelist = Bitmap::alloc(65536);
    whitelist.set(443);
    whitelist.set(8080);
    assert!(classify(&frame, Some(&whitelist)).is_ok());
}

#[test]
fn scenario_7_broadcast_ingress_is_rejected() {
    let frame = ipv4_icmp_frag_needed([0xff; 6], [10, 0, 0, 1], 80);
    assert_eq!(classify(&frame, None), Err(RejectReason::BroadcastDestination));
}

#[test]
fn scenario_8_truncated_capture_is_silently_dropped() {
    // caplen=40 < len=70: the ingress source itself discards this before the
    // classifier ever sees it (see Ingress::try_next), so here we only assert
    // that a frame this short cannot possibly classify as valid either way.
    let full = ipv4_icmp_frag_needed([0x02, 0, 0, 0, 0, 0x02], [10, 0, 0, 1], 80);
    let truncated = &full[..40];
    assert_eq!(classify(truncated, None), Err(RejectReason::TooShort));
}

#[test]
fn reject_never_touches_the_frame() {
    // classify borrows immutably; a caller holding a reject cannot have had
    // its bytes mutated by classification itself.
    let frame = ipv4_icmp_frag_needed([0xff; 6], [10, 0, 0, 1], 80);
    let before = frame.clone();
    let _ = classify(&frame, None);
    assert_eq!(frame, before);
}
