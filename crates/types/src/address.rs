//! Peer network endpoints.
//!
//! A [`NetworkAddress`] is the reachable endpoint of a committee member. On the
//! wire it is always [`NetworkAddress::ENCODED_SIZE`] bytes: the IP as 16 bytes
//! (IPv4 written IPv4-mapped) followed by the port as a big-endian `u16`.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// A committee member's IP endpoint.
///
/// IPv4-mapped IPv6 addresses are normalized to IPv4 on construction so the
/// fixed-width encoding round-trips exactly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetworkAddress(SocketAddr);

impl NetworkAddress {
    /// Encoded width: 16 IP bytes plus 2 port bytes.
    pub const ENCODED_SIZE: usize = 18;

    /// The unspecified endpoint `0.0.0.0:0`.
    pub const UNSPECIFIED: Self = Self(SocketAddr::new(
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        0,
    ));

    /// Wrap a socket address.
    pub fn new(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        };
        Self(SocketAddr::new(ip, addr.port()))
    }

    /// Build from an IP and port.
    pub fn from_ip_port(ip: IpAddr, port: u16) -> Self {
        Self::new(SocketAddr::new(ip, port))
    }

    /// The wrapped socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Fixed-width big-endian encoding.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_SIZE] {
        let ip = match self.0.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        let mut out = [0u8; Self::ENCODED_SIZE];
        out[..16].copy_from_slice(&ip.octets());
        out[16..].copy_from_slice(&self.0.port().to_be_bytes());
        out
    }

    /// Decode the fixed-width encoding.
    pub fn from_bytes(bytes: &[u8; Self::ENCODED_SIZE]) -> Self {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&bytes[..16]);
        let port = u16::from_be_bytes([bytes[16], bytes[17]]);
        Self::from_ip_port(IpAddr::V6(Ipv6Addr::from(octets)), port)
    }
}

impl Default for NetworkAddress {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl From<SocketAddr> for NetworkAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Debug for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkAddress({})", self.0)
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NetworkAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<SocketAddr>()
            .map(Self::new)
            .map_err(|e| Error::InvalidAddress(format!("{s}: {e}")))
    }
}

impl Serialize for NetworkAddress {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for NetworkAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
