use bytes::BytesMut;
use futures::{Sink, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder};

use crate::packet::{self, Packet};

pub const MAX_PACKET_SIZE: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("MQTT protocol error {0}")]
    ProtocolError(packet::Error),
}

impl From<packet::Error> for CodecError {
    fn from(v: packet::Error) -> Self {
        Self::ProtocolError(v)
    }
}

pub struct Codec;

impl Decoder for Codec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A frame that checks out but fails to decode has already been
        // consumed, so it can be dropped without losing the framing. Errors
        // returned from here terminate the stream and are reserved for cases
        // where the framing itself is gone.
        loop {
            match packet::check(src.iter(), MAX_PACKET_SIZE) {
                Ok(header) => match packet::read(src, MAX_PACKET_SIZE) {
                    Ok(packet) => return Ok(Some(packet)),
                    Err(e) => {
                        log::warn!("Dropping malformed {} byte frame: {}", header.frame_length(), e);
                    }
                },
                Err(packet::Error::InsufficientBytes(x)) => {
                    if src.capacity() < x {
                        src.reserve(x - src.capacity());
                    }
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Encoder<&Packet> for Codec {
    type Error = CodecError;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write(dst)?;
        Ok(())
    }
}

use pin_project_lite::pin_project;

pin_project! {
pub struct Framed<T> {
    #[pin]
    inner: tokio_util::codec::Framed<T, Codec>
}
}

impl<T: Unpin + AsyncRead + AsyncWrite> Framed<T> {
    pub fn new(stream: T) -> Self {
        Self {
            inner: tokio_util::codec::Framed::new(stream, Codec),
        }
    }
}

impl<T> Framed<T> {
    /// Append a packet to the write buffer without flushing.
    ///
    /// This is what lets synchronous state machine code emit packets; the
    /// caller flushes the sink when it next has an await point.
    pub fn queue(&mut self, packet: &Packet) -> Result<(), CodecError> {
        Codec.encode(packet, self.inner.write_buffer_mut())
    }

    pub fn has_queued(&self) -> bool {
        !self.inner.write_buffer().is_empty()
    }
}

impl<T> Stream for Framed<T>
where
    tokio_util::codec::Framed<T, Codec>: Stream,
{
    type Item = <tokio_util::codec::Framed<T, Codec> as Stream>::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        this.inner.poll_next(cx)
    }
}

impl<T: AsyncWrite, I> Sink<I> for Framed<T>
where
    Codec: Encoder<I>,
    tokio_util::codec::Framed<T, Codec>: Sink<I>,
{
    type Error = <tokio_util::codec::Framed<T, Codec> as Sink<I>>::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: I) -> Result<(), Self::Error> {
        let this = self.project();
        this.inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.inner.poll_close(cx)
    }
}
