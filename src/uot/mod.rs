//! UDP-over-TCP (UoT) framing.
//!
//! ## Stream Format
//! A SOCKS5 address is sent once by the initiator, followed by length-prefixed packets:
//! ```text
//! | ATYP | address  | port  | length | data     | length | data     | ...
//! | u8   | variable | u16be | u16be  | variable | u16be  | variable |
//! ```
//!
//! ## Datagram Format
//! Every datagram carries its own address, with no length field:
//! ```text
//! | ATYP | address  | port  | data     |
//! | u8   | variable | u16be | variable |
//! ```
//!
//! ATYP values follow SOCKS5: 0x01 IPv4, 0x03 domain name, 0x04 IPv6.

mod uot_handshake;
mod uot_packet_socket;
mod uot_stream;

pub use uot_handshake::{UotInitiator, UotResponder};
pub use uot_packet_socket::{UotPacketSocket, encode_datagram};
pub use uot_stream::{UotReadHalf, UotStream, UotWriteHalf};

/// Largest record (length prefix included) a UoT stream carries.
pub const MAX_PACKET_SIZE: usize = 65535;

/// Largest payload `write_packet` accepts.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - 2;
