//! Datagram socket wrapper where each datagram starts with its target address.

use std::future::poll_fn;
use std::net::SocketAddr;

use bytes::{BufMut, BytesMut};
use log::trace;
use tokio::io::ReadBuf;

use crate::address::NetLocation;
use crate::async_stream::AsyncDatagramSocket;
use crate::error::{Result, UotError};
use crate::socks_addr::{encoded_len, read_location, write_location};

/// Builds an outbound datagram: `target` followed by `payload`.
pub fn encode_datagram(target: &NetLocation, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(encoded_len(target) + payload.len());
    write_location(target, &mut buf);
    buf.put_slice(payload);
    buf
}

/// Holds no per-target state: every datagram names its own target.
pub struct UotPacketSocket<D> {
    socket: D,
}

impl<D: AsyncDatagramSocket> UotPacketSocket<D> {
    pub fn new(socket: D) -> Self {
        Self { socket }
    }

    pub fn get_ref(&self) -> &D {
        &self.socket
    }

    pub fn into_inner(self) -> D {
        self.socket
    }

    /// Receives one datagram into `buf` and strips its address prefix.
    ///
    /// Returns the payload length, the target named in the datagram, and the
    /// peer that sent it. The payload is moved to the start of `buf`.
    pub async fn read_packet(&self, buf: &mut [u8]) -> Result<(usize, NetLocation, SocketAddr)> {
        let (received, peer) = poll_fn(|cx| {
            let mut read_buf = ReadBuf::new(&mut *buf);
            self.socket
                .poll_recv_from(cx, &mut read_buf)
                .map_ok(|peer| (read_buf.filled().len(), peer))
        })
        .await
        .map_err(UotError::Io)?;

        let mut reader = &buf[..received];
        let (target, consumed) = read_location(&mut reader).await?;

        let payload_len = received - consumed;
        buf.copy_within(consumed..received, 0);
        trace!("Received {payload_len} byte datagram for {target} from {peer}");
        Ok((payload_len, target, peer))
    }

    /// Sends `payload` unchanged to `peer`. `target` is only used for logging;
    /// use [`send_to_target`](Self::send_to_target) to prepend an address.
    pub async fn write_packet(
        &self,
        payload: &[u8],
        target: &NetLocation,
        peer: SocketAddr,
    ) -> Result<usize> {
        let n = poll_fn(|cx| self.socket.poll_send_to(cx, payload, peer))
            .await
            .map_err(UotError::Io)?;
        trace!("Sent {n} byte datagram from {target} to {peer}");
        Ok(n)
    }

    /// Sends `payload` to `peer` with `target` encoded in front of it.
    pub async fn send_to_target(
        &self,
        payload: &[u8],
        target: &NetLocation,
        peer: SocketAddr,
    ) -> Result<usize> {
        let datagram = encode_datagram(target, payload);
        self.write_packet(&datagram, target, peer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv6Addr};
    use std::sync::Arc;
    use tokio::net::UdpSocket;

    use crate::address::Address;

    async fn bind_pair() -> (UdpSocket, UotPacketSocket<Arc<UdpSocket>>) {
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        (raw, UotPacketSocket::new(socket))
    }

    #[tokio::test]
    async fn test_read_strips_domain_prefix() {
        let (raw, socket) = bind_pair().await;
        let local = socket.get_ref().local_addr().unwrap();
        raw.send_to(b"\x03\x03foo\x00\x50hi", local).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, target, peer) = socket.read_packet(&mut buf).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..n], b"hi");
        assert_eq!(
            target,
            NetLocation::new(Address::hostname("foo").unwrap(), 80).unwrap()
        );
        assert_eq!(peer, raw.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_read_address_only_datagram() {
        let (raw, socket) = bind_pair().await;
        let local = socket.get_ref().local_addr().unwrap();
        let target = NetLocation::from_ip_addr(IpAddr::V6(Ipv6Addr::LOCALHOST), 53);
        raw.send_to(&encode_datagram(&target, b""), local)
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let (n, received_target, _) = socket.read_packet(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(received_target, target);
    }

    #[tokio::test]
    async fn test_read_rejects_malformed_prefix() {
        let (raw, socket) = bind_pair().await;
        let local = socket.get_ref().local_addr().unwrap();
        let mut buf = [0u8; 64];

        raw.send_to(b"\x07payload", local).await.unwrap();
        assert!(matches!(
            socket.read_packet(&mut buf).await,
            Err(UotError::InvalidAddressType(0x07))
        ));

        raw.send_to(b"\x01\x7f\x00", local).await.unwrap();
        assert!(matches!(
            socket.read_packet(&mut buf).await,
            Err(UotError::TruncatedAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_write_packet_sends_verbatim() {
        let (raw, socket) = bind_pair().await;
        let target = NetLocation::new(Address::hostname("example.com").unwrap(), 443).unwrap();

        let n = socket
            .write_packet(b"raw bytes", &target, raw.local_addr().unwrap())
            .await
            .unwrap();
        assert_eq!(n, 9);

        let mut buf = [0u8; 64];
        let (len, from) = raw.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"raw bytes");
        assert_eq!(from, socket.get_ref().local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_send_to_target_roundtrip() {
        let (_raw, sender) = bind_pair().await;
        let (_raw2, receiver) = bind_pair().await;
        let receiver_addr = receiver.get_ref().local_addr().unwrap();
        let target = NetLocation::new(Address::hostname("example.com").unwrap(), 443).unwrap();

        sender
            .send_to_target(b"payload", &target, receiver_addr)
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let (n, received_target, peer) = receiver.read_packet(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"payload");
        assert_eq!(received_target, target);
        assert_eq!(peer, sender.get_ref().local_addr().unwrap());
    }
}
