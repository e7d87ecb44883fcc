use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Result, UotError};

/// Longest hostname that fits the one-byte length field.
pub const MAX_HOSTNAME_LEN: usize = 255;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// Raw domain bytes. Peers are not required to send UTF-8.
    Hostname(Vec<u8>),
}

impl Address {
    pub fn from(s: &str) -> Result<Self> {
        let mut dots = 0;
        let mut possible_ipv4 = true;
        let mut possible_ipv6 = true;
        let mut possible_hostname = true;
        for b in s.as_bytes().iter() {
            let c = *b;
            if c == b':' {
                possible_ipv4 = false;
                possible_hostname = false;
                break;
            } else if c == b'.' {
                possible_ipv6 = false;
                dots += 1;
                if dots > 3 {
                    // can only be a hostname.
                    break;
                }
            } else if (b'A'..=b'F').contains(&c) || (b'a'..=b'f').contains(&c) {
                possible_ipv4 = false;
            } else if !c.is_ascii_digit() {
                possible_ipv4 = false;
                possible_ipv6 = false;
                break;
            }
        }

        if possible_ipv4
            && dots == 3
            && let Ok(addr) = s.parse::<Ipv4Addr>()
        {
            return Ok(Address::Ipv4(addr));
        }

        if possible_ipv6 && let Ok(addr) = s.parse::<Ipv6Addr>() {
            return Ok(Address::Ipv6(addr));
        }

        if possible_hostname {
            return Address::hostname(s);
        }

        Err(UotError::InvalidHostname(format!(
            "failed to parse address: {s}"
        )))
    }

    /// Builds a hostname address, checking that it fits the wire format.
    pub fn hostname(name: impl AsRef<[u8]>) -> Result<Self> {
        let name = name.as_ref();
        check_hostname(name)?;
        Ok(Address::Hostname(name.to_vec()))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, Address::Ipv6(_))
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(addr) => Address::Ipv4(addr),
            IpAddr::V6(addr) => Address::Ipv6(addr),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Address::Ipv4(i) => write!(f, "{i}"),
            Address::Ipv6(i) => write!(f, "{i}"),
            Address::Hostname(h) => write!(f, "{}", String::from_utf8_lossy(h)),
        }
    }
}

fn check_hostname(s: &[u8]) -> Result<()> {
    if s.is_empty() {
        return Err(UotError::InvalidHostname("empty hostname".to_string()));
    }
    if s.len() > MAX_HOSTNAME_LEN {
        return Err(UotError::InvalidHostname(format!(
            "hostname is {} bytes, max is {MAX_HOSTNAME_LEN}",
            s.len()
        )));
    }
    Ok(())
}

/// A host and port, as carried in front of every tunneled packet.
///
/// Instances are always encodable: hostnames are checked on construction.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct NetLocation {
    address: Address,
    port: u16,
}

impl NetLocation {
    pub fn new(address: Address, port: u16) -> Result<Self> {
        if let Address::Hostname(ref h) = address {
            check_hostname(h)?;
        }
        Ok(Self { address, port })
    }

    pub fn from_ip_addr(ip: IpAddr, port: u16) -> Self {
        Self {
            address: ip.into(),
            port,
        }
    }

    pub fn from_str(s: &str, default_port: Option<u16>) -> Result<Self> {
        let (address_str, port, expect_ipv6) = match s.strip_prefix('[') {
            Some(rest) => {
                let (host, tail) = rest
                    .split_once(']')
                    .ok_or_else(|| UotError::InvalidHostname(format!("unclosed bracket: {s}")))?;
                let port = match tail.strip_prefix(':') {
                    Some(p) => Some(parse_port(p)?),
                    None if tail.is_empty() => default_port,
                    None => {
                        return Err(UotError::InvalidHostname(format!(
                            "unexpected characters after bracket: {s}"
                        )));
                    }
                };
                (host, port, true)
            }
            None => match s.rfind(':') {
                Some(i) => {
                    // The ':' could be from an ipv6 address.
                    match s[i + 1..].parse::<u16>() {
                        Ok(port) => (&s[0..i], Some(port), false),
                        Err(_) => (s, default_port, true),
                    }
                }
                None => (s, default_port, false),
            },
        };

        let address = Address::from(address_str)?;
        if expect_ipv6 && !address.is_ipv6() {
            return Err(UotError::InvalidHostname(format!("invalid location: {s}")));
        }

        let port = port.ok_or_else(|| UotError::InvalidHostname(format!("no port: {s}")))?;

        Ok(Self { address, port })
    }

    pub fn components(&self) -> (&Address, u16) {
        (&self.address, self.port)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse::<u16>()
        .map_err(|e| UotError::InvalidHostname(format!("invalid port {s}: {e}")))
}

impl From<SocketAddr> for NetLocation {
    fn from(addr: SocketAddr) -> Self {
        Self::from_ip_addr(addr.ip(), addr.port())
    }
}

impl std::fmt::Display for NetLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.address {
            Address::Ipv6(ref addr) => write!(f, "[{addr}]:{}", self.port),
            ref address => write!(f, "{address}:{}", self.port),
        }
    }
}

impl Serialize for NetLocation {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetLocation {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NetLocation::from_str(&s, None).map_err(serde::de::Error::custom)
    }
}
