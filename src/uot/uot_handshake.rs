//! The one-time UoT handshake that carries the target address.
//!
//! The initiator writes a SOCKS5 address; the responder reads it. Both sides
//! then exchange length-prefixed packets through a [`UotStream`].

use log::debug;
use tokio::io::AsyncWriteExt;

use crate::address::NetLocation;
use crate::async_stream::AsyncStream;
use crate::config::UotConfig;
use crate::error::{Result, UotError};
use crate::socks_addr::{encode_location, read_location};
use crate::uot::UotStream;

/// Client side of a UoT connection, which names the target.
pub struct UotInitiator<S> {
    stream: S,
    config: UotConfig,
}

impl<S: AsyncStream> UotInitiator<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            config: UotConfig::default(),
        }
    }

    /// Fails with [`UotError::Config`] if `config` does not validate.
    pub fn with_config(stream: S, config: UotConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { stream, config })
    }

    /// Sends `target` and returns the packet stream along with the target
    /// as confirmation.
    pub async fn handshake(mut self, target: NetLocation) -> Result<(UotStream<S>, NetLocation)> {
        let encoded = encode_location(&target);
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;
        debug!("UoT handshake sent target {target}");

        let stream = UotStream::new(self.stream, target.clone(), &self.config);
        Ok((stream, target))
    }

    /// Like [`handshake`](Self::handshake), with the target given as `host:port` text.
    pub async fn handshake_str(self, target: &str) -> Result<(UotStream<S>, NetLocation)> {
        let target = NetLocation::from_str(target, None)
            .map_err(|e| UotError::InvalidHandshakeInput(format!("{target}: {e}")))?;
        self.handshake(target).await
    }
}

/// Server side of a UoT connection, which learns the target from the peer.
pub struct UotResponder<S> {
    stream: S,
    config: UotConfig,
}

impl<S: AsyncStream> UotResponder<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            config: UotConfig::default(),
        }
    }

    /// Fails with [`UotError::Config`] if `config` does not validate.
    pub fn with_config(stream: S, config: UotConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { stream, config })
    }

    /// Reads the target address sent by the initiator.
    pub async fn handshake(mut self) -> Result<(UotStream<S>, NetLocation)> {
        let (target, _) = read_location(&mut self.stream).await?;
        debug!("UoT handshake received target {target}");

        let stream = UotStream::new(self.stream, target.clone(), &self.config);
        Ok((stream, target))
    }
}
