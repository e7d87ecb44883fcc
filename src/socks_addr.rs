//! SOCKS5 address encoding (RFC 1928, section 5).
//!
//! ```text
//! | ATYP | DST.ADDR                     | DST.PORT |
//! | u8   | 4 / 16 / (u8 len + len bytes) | u16be    |
//! ```

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::address::{Address, NetLocation};
use crate::error::{Result, UotError};

pub const ADDR_TYPE_IPV4: u8 = 0x01;
pub const ADDR_TYPE_DOMAIN_NAME: u8 = 0x03;
pub const ADDR_TYPE_IPV6: u8 = 0x04;

/// Number of bytes `location` occupies on the wire.
pub fn encoded_len(location: &NetLocation) -> usize {
    match location.address() {
        Address::Ipv4(_) => 1 + 4 + 2,
        Address::Ipv6(_) => 1 + 16 + 2,
        Address::Hostname(h) => 1 + 1 + h.len() + 2,
    }
}

pub fn write_location(location: &NetLocation, buf: &mut BytesMut) {
    buf.reserve(encoded_len(location));
    let (address, port) = location.components();
    match address {
        Address::Ipv4(ip) => {
            buf.put_u8(ADDR_TYPE_IPV4);
            buf.put_slice(&ip.octets());
        }
        Address::Ipv6(ip) => {
            buf.put_u8(ADDR_TYPE_IPV6);
            buf.put_slice(&ip.octets());
        }
        Address::Hostname(h) => {
            // NetLocation guarantees 1..=255 bytes.
            buf.put_u8(ADDR_TYPE_DOMAIN_NAME);
            buf.put_u8(h.len() as u8);
            buf.put_slice(h);
        }
    }
    buf.put_u16(port);
}

pub fn encode_location(location: &NetLocation) -> BytesMut {
    let mut buf = BytesMut::with_capacity(encoded_len(location));
    write_location(location, &mut buf);
    buf
}

/// Reads one address from `reader`, returning it along with the number of
/// bytes consumed. Only the bytes belonging to the address are read, and all
/// of them are read before the address is validated.
pub async fn read_location<R>(reader: &mut R) -> Result<(NetLocation, usize)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let addr_type = reader
        .read_u8()
        .await
        .map_err(UotError::TruncatedAddress)?;

    let address = match addr_type {
        ADDR_TYPE_IPV4 => {
            let mut octets = [0u8; 4];
            read_exact(reader, &mut octets).await?;
            Address::Ipv4(octets.into())
        }
        ADDR_TYPE_IPV6 => {
            let mut octets = [0u8; 16];
            read_exact(reader, &mut octets).await?;
            Address::Ipv6(octets.into())
        }
        ADDR_TYPE_DOMAIN_NAME => {
            let len = reader
                .read_u8()
                .await
                .map_err(UotError::TruncatedAddress)? as usize;
            let mut raw = vec![0u8; len];
            read_exact(reader, &mut raw).await?;
            // Kept as a hostname even if it looks like an IP literal.
            Address::Hostname(raw)
        }
        unknown => return Err(UotError::InvalidAddressType(unknown)),
    };

    let port = reader
        .read_u16()
        .await
        .map_err(UotError::TruncatedAddress)?;

    // Only a zero-length domain can fail here.
    let location = NetLocation::new(address, port)?;
    let consumed = encoded_len(&location);
    Ok((location, consumed))
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    reader
        .read_exact(buf)
        .await
        .map_err(UotError::TruncatedAddress)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn sample_locations() -> Vec<NetLocation> {
        vec![
            NetLocation::from_ip_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 53),
            NetLocation::from_ip_addr(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            NetLocation::from_ip_addr(IpAddr::V6(Ipv6Addr::LOCALHOST), 65535),
            NetLocation::from_ip_addr(
                IpAddr::V6("2001:db8::ff00:42:8329".parse().unwrap()),
                443,
            ),
            NetLocation::new(Address::hostname("a").unwrap(), 0).unwrap(),
            NetLocation::new(Address::hostname("example.com").unwrap(), 8080).unwrap(),
            NetLocation::new(Address::hostname(&"x".repeat(255)).unwrap(), 65535).unwrap(),
            NetLocation::new(Address::Hostname(b"127.0.0.1".to_vec()), 80).unwrap(),
            NetLocation::new(Address::hostname([0xc3u8, 0x28]).unwrap(), 80).unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_roundtrip() {
        for location in sample_locations() {
            let encoded = encode_location(&location);
            assert_eq!(encoded.len(), encoded_len(&location));

            let mut reader = &encoded[..];
            let (decoded, consumed) = read_location(&mut reader).await.unwrap();
            assert_eq!(decoded, location);
            assert_eq!(consumed, encoded.len());
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_encode_ipv4_bytes() {
        let location = NetLocation::from_ip_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 53);
        assert_eq!(
            &encode_location(&location)[..],
            &[0x01, 0x0a, 0x00, 0x00, 0x01, 0x00, 0x35]
        );
    }

    #[test]
    fn test_encode_domain_bytes() {
        let location = NetLocation::new(Address::hostname("foo").unwrap(), 80).unwrap();
        assert_eq!(
            &encode_location(&location)[..],
            &[0x03, 0x03, b'f', b'o', b'o', 0x00, 0x50]
        );
    }

    #[tokio::test]
    async fn test_invalid_type_consumes_one_byte() {
        for tag in 0..=255u8 {
            if matches!(tag, ADDR_TYPE_IPV4 | ADDR_TYPE_DOMAIN_NAME | ADDR_TYPE_IPV6) {
                continue;
            }
            let data = [tag, 1, 2, 3, 4, 5, 6];
            let mut reader = &data[..];
            match read_location(&mut reader).await {
                Err(UotError::InvalidAddressType(t)) => assert_eq!(t, tag),
                other => panic!("expected InvalidAddressType, got {other:?}"),
            }
            assert_eq!(reader.len(), data.len() - 1);
        }
    }

    #[tokio::test]
    async fn test_every_truncation_point() {
        for location in sample_locations() {
            let encoded = encode_location(&location);
            for cut in 0..encoded.len() {
                let mut reader = &encoded[..cut];
                match read_location(&mut reader).await {
                    Err(UotError::TruncatedAddress(e)) => {
                        assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
                    }
                    other => panic!("cut at {cut} of {location}: got {other:?}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_reads_only_the_address() {
        let data = [0x03, 0x03, b'f', b'o', b'o', 0x00, 0x50, b'h', b'i'];
        let mut reader = &data[..];
        let (location, consumed) = read_location(&mut reader).await.unwrap();
        assert_eq!(location.to_string(), "foo:80");
        assert_eq!(consumed, 7);
        assert_eq!(reader, b"hi");
    }

    #[tokio::test]
    async fn test_empty_hostname_consumes_whole_address() {
        let data = [0x03, 0x00, 0x00, 0x50, b'h', b'i'];
        let mut reader = &data[..];
        assert!(matches!(
            read_location(&mut reader).await,
            Err(UotError::InvalidHostname(_))
        ));
        assert_eq!(reader, b"hi");
    }

    #[tokio::test]
    async fn test_non_utf8_hostname_is_kept_verbatim() {
        let data = [0x03, 0x02, 0xc3, 0x28, 0x00, 0x50, b'h', b'i'];
        let mut reader = &data[..];
        let (location, consumed) = read_location(&mut reader).await.unwrap();
        assert_eq!(location.address(), &Address::Hostname(vec![0xc3, 0x28]));
        assert_eq!(location.port(), 80);
        assert_eq!(consumed, 6);
        assert_eq!(reader, b"hi");
        assert_eq!(&encode_location(&location)[..], &data[..6]);
    }
}
