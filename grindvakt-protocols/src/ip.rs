//! ## grindvakt-protocols::ip
//! Fixed-offset IPv4/IPv6 header decoding.
//!
//! Only the source and destination addresses are extracted; nothing past
//! the network-layer header is looked at.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const SLL_HEADER_LEN: usize = 16;
const SLL2_HEADER_LEN: usize = 20;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;

/// Errors raised for frames that carry no usable IP header.
///
/// The capture loop treats all of these as "unresolved" and skips the frame.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Truncated {layer} header: need {needed} bytes, have {available}")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("Unsupported ethertype 0x{0:04x}")]
    UnsupportedEtherType(u16),
    #[error("Unsupported IP version {0}")]
    UnsupportedIpVersion(u8),
    #[error("Malformed IPv4 header length {0}")]
    BadIhl(u8),
}

/// Link-layer framing of captured data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Linux cooked capture v1 (`any` device).
    LinuxSll,
    /// Linux cooked capture v2.
    LinuxSll2,
    /// Bare IP packets with no link header.
    RawIp,
}

impl LinkType {
    /// Maps a pcap DLT/LINKTYPE value onto a supported framing.
    pub fn from_dlt(dlt: i32) -> Option<Self> {
        match dlt {
            1 => Some(LinkType::Ethernet),
            113 => Some(LinkType::LinuxSll),
            276 => Some(LinkType::LinuxSll2),
            // DLT_RAW has historically been 12 or 14 depending on platform.
            12 | 14 | 101 | 228 | 229 => Some(LinkType::RawIp),
            _ => None,
        }
    }
}

/// Addresses of one captured packet. Not retained past the matching decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketObservation {
    pub source: IpAddr,
    pub destination: IpAddr,
}

impl PacketObservation {
    pub fn new(source: impl Into<IpAddr>, destination: impl Into<IpAddr>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Decodes a captured frame down to its IP addresses.
pub fn observe(link: LinkType, frame: &[u8]) -> Result<PacketObservation, ParseError> {
    match link {
        LinkType::Ethernet => observe_ethernet(frame),
        LinkType::LinuxSll => {
            ensure(frame, SLL_HEADER_LEN, "SLL")?;
            let ethertype = be16(frame, 14);
            observe_ethertype(ethertype, &frame[SLL_HEADER_LEN..])
        }
        LinkType::LinuxSll2 => {
            ensure(frame, SLL2_HEADER_LEN, "SLL2")?;
            let ethertype = be16(frame, 0);
            observe_ethertype(ethertype, &frame[SLL2_HEADER_LEN..])
        }
        LinkType::RawIp => observe_ip(frame),
    }
}

/// Decodes a bare IP packet, dispatching on the version nibble.
pub fn observe_ip(packet: &[u8]) -> Result<PacketObservation, ParseError> {
    ensure(packet, 1, "IP")?;
    match packet[0] >> 4 {
        4 => parse_ipv4(packet),
        6 => parse_ipv6(packet),
        other => Err(ParseError::UnsupportedIpVersion(other)),
    }
}

fn observe_ethernet(frame: &[u8]) -> Result<PacketObservation, ParseError> {
    ensure(frame, ETHERNET_HEADER_LEN, "Ethernet")?;
    let mut offset = 12;
    let mut ethertype = be16(frame, offset);

    // Strip any number of 802.1Q / 802.1ad tags.
    while ethertype == ETHERTYPE_VLAN || ethertype == ETHERTYPE_QINQ {
        offset += VLAN_TAG_LEN;
        ensure(frame, offset + 2, "VLAN")?;
        ethertype = be16(frame, offset);
    }

    observe_ethertype(ethertype, &frame[offset + 2..])
}

fn observe_ethertype(ethertype: u16, payload: &[u8]) -> Result<PacketObservation, ParseError> {
    match ethertype {
        ETHERTYPE_IPV4 => parse_ipv4(payload),
        ETHERTYPE_IPV6 => parse_ipv6(payload),
        other => Err(ParseError::UnsupportedEtherType(other)),
    }
}

fn parse_ipv4(packet: &[u8]) -> Result<PacketObservation, ParseError> {
    ensure(packet, IPV4_MIN_HEADER_LEN, "IPv4")?;
    let version = packet[0] >> 4;
    if version != 4 {
        return Err(ParseError::UnsupportedIpVersion(version));
    }
    let ihl = packet[0] & 0x0F;
    if ihl < 5 {
        return Err(ParseError::BadIhl(ihl));
    }
    ensure(packet, usize::from(ihl) * 4, "IPv4")?;

    let source = Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]);
    let destination = Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]);
    Ok(PacketObservation::new(source, destination))
}

fn parse_ipv6(packet: &[u8]) -> Result<PacketObservation, ParseError> {
    ensure(packet, IPV6_HEADER_LEN, "IPv6")?;
    let version = packet[0] >> 4;
    if version != 6 {
        return Err(ParseError::UnsupportedIpVersion(version));
    }

    let mut source = [0u8; 16];
    let mut destination = [0u8; 16];
    source.copy_from_slice(&packet[8..24]);
    destination.copy_from_slice(&packet[24..40]);
    Ok(PacketObservation::new(
        Ipv6Addr::from(source),
        Ipv6Addr::from(destination),
    ))
}

#[inline]
fn ensure(data: &[u8], needed: usize, layer: &'static str) -> Result<(), ParseError> {
    if data.len() < needed {
        return Err(ParseError::Truncated {
            layer,
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

#[inline]
fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}
