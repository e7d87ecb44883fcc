//! uot - UDP-over-TCP framing with per-packet SOCKS5 addressing.
//!
//! Tunnels datagrams through byte-stream transports while keeping the
//! original target address of each packet.
//!
//! # Components
//!
//! - **Address codec** ([`socks_addr`]): SOCKS5 (RFC 1928) address encoding for
//!   IPv4, IPv6 and domain name targets.
//! - **Stream framer** ([`UotInitiator`], [`UotResponder`], [`UotStream`]): a one-time
//!   address handshake followed by u16be length-prefixed packets.
//! - **Datagram adapter** ([`UotPacketSocket`]): each datagram carries its target
//!   address in front of the payload.
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> uot::Result<()> {
//! use uot::{NetLocation, UotInitiator};
//!
//! let tcp = tokio::net::TcpStream::connect("127.0.0.1:1080").await?;
//! let target = NetLocation::from_str("1.1.1.1:53", None)?;
//! let (mut stream, _) = UotInitiator::new(tcp).handshake(target).await?;
//!
//! stream.write_packet(b"query").await?;
//! let mut buf = [0u8; 65535];
//! if let Some(n) = stream.read_packet(&mut buf).await? {
//!     println!("got {n} bytes");
//! }
//! # Ok(())
//! # }
//! ```

mod address;
mod async_stream;
mod config;
mod error;
pub mod socks_addr;
mod uot;

pub use address::{Address, MAX_HOSTNAME_LEN, NetLocation};
pub use async_stream::{AsyncDatagramSocket, AsyncStream};
pub use config::{ShortBufferPolicy, UotConfig, load_config};
pub use error::{Result, UotError};
pub use uot::{
    MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, UotInitiator, UotPacketSocket, UotReadHalf, UotResponder,
    UotStream, UotWriteHalf, encode_datagram,
};
