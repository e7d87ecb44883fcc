//! Length-prefixed packet stream, used after the UoT handshake.
//!
//! Packet format:
//! ```text
//! | length | data     |
//! | u16be  | variable |
//! ```

use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{BufMut, BytesMut};
use futures::ready;
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};

use crate::address::NetLocation;
use crate::async_stream::AsyncStream;
use crate::config::{ShortBufferPolicy, UotConfig};
use crate::error::{Result, UotError};
use crate::uot::MAX_PAYLOAD_SIZE;

const LENGTH_PREFIX_LEN: usize = 2;

/// Holds one complete record of the largest possible size.
const READ_BUFFER_SIZE: usize = LENGTH_PREFIX_LEN + u16::MAX as usize;

/// Read side framing state. Bytes are buffered internally, so dropping a
/// pending `read_packet` future never loses the position in the stream.
struct FrameReader {
    buf: Box<[u8]>,
    end: usize,
    short_buffer_policy: ShortBufferPolicy,
    is_eof: bool,
    is_broken: bool,
    is_closed: bool,
}

impl FrameReader {
    fn new(config: &UotConfig) -> Self {
        Self {
            buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            end: 0,
            short_buffer_policy: config.short_buffer_policy,
            is_eof: false,
            is_broken: false,
            is_closed: false,
        }
    }

    /// Length of the record at the front of the buffer, as far as it is known.
    fn expected_len(&self) -> usize {
        if self.end < LENGTH_PREFIX_LEN {
            LENGTH_PREFIX_LEN
        } else {
            LENGTH_PREFIX_LEN + u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize
        }
    }

    fn consume(&mut self, len: usize) {
        if self.end > len {
            self.buf.copy_within(len..self.end, 0);
            self.end -= len;
        } else {
            // self.end == len
            self.end = 0;
        }
    }

    fn poll_read_packet<R>(
        &mut self,
        stream: &mut R,
        cx: &mut Context<'_>,
        out: &mut [u8],
    ) -> Poll<Result<Option<usize>>>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if self.is_closed {
            return Poll::Ready(Err(UotError::Closed));
        }

        loop {
            if self.is_broken {
                return Poll::Ready(Err(UotError::ProtocolState(
                    "packet framing was lost by an earlier read failure",
                )));
            }

            let total_len = self.expected_len();
            if self.end >= total_len {
                let payload_len = total_len - LENGTH_PREFIX_LEN;
                if out.len() < payload_len {
                    if self.short_buffer_policy == ShortBufferPolicy::Discard {
                        debug!(
                            "Discarding {payload_len} byte packet, read buffer holds {}",
                            out.len()
                        );
                        self.consume(total_len);
                    }
                    return Poll::Ready(Err(UotError::ShortBuffer {
                        needed: payload_len,
                        available: out.len(),
                    }));
                }
                out[..payload_len].copy_from_slice(&self.buf[LENGTH_PREFIX_LEN..total_len]);
                self.consume(total_len);
                trace!("Read {payload_len} byte packet");
                return Poll::Ready(Ok(Some(payload_len)));
            }

            if self.is_eof {
                return Poll::Ready(Ok(None));
            }

            // There is always room: we only get here while the first record is incomplete.
            let mut read_buf = ReadBuf::new(&mut self.buf[self.end..]);
            let result = ready!(Pin::new(&mut *stream).poll_read(cx, &mut read_buf));
            let n = read_buf.filled().len();
            match result {
                Ok(()) if n == 0 => {
                    self.is_eof = true;
                    if self.end == 0 {
                        return Poll::Ready(Ok(None));
                    }
                    let source = std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "EOF reached in the middle of a packet",
                    );
                    return Poll::Ready(Err(self.fail(source)));
                }
                Ok(()) => {
                    self.end += n;
                }
                Err(e) => {
                    if self.end == 0 {
                        return Poll::Ready(Err(UotError::Io(e)));
                    }
                    return Poll::Ready(Err(self.fail(e)));
                }
            }
        }
    }

    fn fail(&mut self, source: std::io::Error) -> UotError {
        let expected = self.expected_len();
        warn!(
            "UoT stream failed after {} of {expected} packet bytes: {source}",
            self.end
        );
        self.is_broken = true;
        UotError::TruncatedPacket {
            expected,
            received: self.end,
            source,
        }
    }

    async fn read_packet<R>(&mut self, stream: &mut R, buf: &mut [u8]) -> Result<Option<usize>>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        poll_fn(|cx| self.poll_read_packet(&mut *stream, cx, &mut *buf)).await
    }
}

/// Write side framing state. A record is staged in `pending` and written out
/// in full before the next one is accepted.
struct FrameWriter {
    pending: BytesMut,
    write_offset: usize,
    max_payload_size: usize,
    is_broken: bool,
    is_closed: bool,
}

impl FrameWriter {
    fn new(config: &UotConfig) -> Self {
        // The length prefix is a u16, so no configuration can raise the limit.
        let max_payload_size = config.max_payload_size.min(MAX_PAYLOAD_SIZE);
        Self {
            pending: BytesMut::with_capacity(LENGTH_PREFIX_LEN + max_payload_size),
            write_offset: 0,
            max_payload_size,
            is_broken: false,
            is_closed: false,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_closed {
            return Err(UotError::Closed);
        }
        if self.is_broken {
            return Err(UotError::ProtocolState(
                "a partially written packet left the stream unusable",
            ));
        }
        Ok(())
    }

    fn poll_flush<W>(&mut self, stream: &mut W, cx: &mut Context<'_>) -> Poll<Result<()>>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        while self.write_offset < self.pending.len() {
            let chunk = &self.pending[self.write_offset..];
            match ready!(Pin::new(&mut *stream).poll_write(cx, chunk)) {
                Ok(0) => {
                    let e = std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "failed to write packet",
                    );
                    return Poll::Ready(Err(self.fail(e)));
                }
                Ok(n) => self.write_offset += n,
                Err(e) => return Poll::Ready(Err(self.fail(e))),
            }
        }
        self.pending.clear();
        self.write_offset = 0;

        // Once complete, flush the underlying stream.
        Poll::Ready(ready!(Pin::new(&mut *stream).poll_flush(cx)).map_err(UotError::Io))
    }

    fn fail(&mut self, e: std::io::Error) -> UotError {
        if self.write_offset > 0 {
            warn!(
                "UoT packet write failed after {} of {} bytes: {e}",
                self.write_offset,
                self.pending.len()
            );
            self.is_broken = true;
        }
        self.pending.clear();
        self.write_offset = 0;
        UotError::Io(e)
    }

    async fn write_packet<W>(&mut self, stream: &mut W, payload: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.check_writable()?;
        if payload.len() > self.max_payload_size {
            return Err(UotError::PacketTooLarge {
                size: payload.len(),
                limit: self.max_payload_size,
            });
        }

        // Finish a record left behind by a cancelled call first.
        if !self.pending.is_empty() {
            poll_fn(|cx| self.poll_flush(&mut *stream, cx)).await?;
        }

        self.pending.put_u16(payload.len() as u16);
        self.pending.put_slice(payload);
        self.write_offset = 0;
        poll_fn(|cx| self.poll_flush(&mut *stream, cx)).await?;
        trace!("Wrote {} byte packet", payload.len());
        Ok(())
    }

    async fn shutdown<W>(&mut self, stream: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.is_closed {
            return Ok(());
        }
        self.is_closed = true;
        let flushed = if !self.is_broken && !self.pending.is_empty() {
            poll_fn(|cx| self.poll_flush(&mut *stream, cx)).await
        } else {
            Ok(())
        };
        let shut_down = stream.shutdown().await.map_err(UotError::Io);
        flushed.and(shut_down)
    }
}

/// A handshaked UoT stream carrying packets for a single target.
///
/// Dropping the stream closes the underlying transport.
pub struct UotStream<S> {
    stream: S,
    target: NetLocation,
    reader: FrameReader,
    writer: FrameWriter,
}

impl<S: AsyncStream> UotStream<S> {
    pub(crate) fn new(stream: S, target: NetLocation, config: &UotConfig) -> Self {
        Self {
            stream,
            target,
            reader: FrameReader::new(config),
            writer: FrameWriter::new(config),
        }
    }

    /// The target address agreed on during the handshake.
    pub fn target(&self) -> &NetLocation {
        &self.target
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Reads one packet into `buf`, returning its length, or `None` once the
    /// peer has closed the stream on a packet boundary.
    pub async fn read_packet(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        self.reader.read_packet(&mut self.stream, buf).await
    }

    /// Writes `payload` as one packet and flushes it.
    pub async fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.write_packet(&mut self.stream, payload).await
    }

    /// Flushes and shuts down the transport. Later reads and writes fail
    /// with `UotError::Closed`.
    /// Both directions are closed even if the shutdown itself fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        debug!("Shutting down UoT stream for {}", self.target);
        let result = self.writer.shutdown(&mut self.stream).await;
        self.reader.is_closed = true;
        result
    }

    /// Splits the stream so that one task can read while another writes.
    pub fn into_split(self) -> (UotReadHalf<S>, UotWriteHalf<S>) {
        let (read_stream, write_stream) = tokio::io::split(self.stream);
        (
            UotReadHalf {
                stream: read_stream,
                target: self.target.clone(),
                reader: self.reader,
            },
            UotWriteHalf {
                stream: write_stream,
                target: self.target,
                writer: self.writer,
            },
        )
    }
}

pub struct UotReadHalf<S> {
    stream: ReadHalf<S>,
    target: NetLocation,
    reader: FrameReader,
}

impl<S: AsyncStream> UotReadHalf<S> {
    pub fn target(&self) -> &NetLocation {
        &self.target
    }

    pub async fn read_packet(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        self.reader.read_packet(&mut self.stream, buf).await
    }
}

pub struct UotWriteHalf<S> {
    stream: WriteHalf<S>,
    target: NetLocation,
    writer: FrameWriter,
}

impl<S: AsyncStream> UotWriteHalf<S> {
    pub fn target(&self) -> &NetLocation {
        &self.target
    }

    pub async fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.write_packet(&mut self.stream, payload).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        debug!("Shutting down UoT write half for {}", self.target);
        self.writer.shutdown(&mut self.stream).await
    }
}
