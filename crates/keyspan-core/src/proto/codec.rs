use crate::{Error, Frame, Result};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Default upper bound on a single frame body (64 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Length-prefixed [`Frame`] codec.
///
/// Decoding yields `Result<Frame>` items: a frame whose body fails to decode
/// is surfaced as `Some(Err(..))` so the caller can log and drop it while the
/// stream keeps going. Only transport-level failures (I/O, an oversized
/// length prefix) end the stream.
#[derive(Debug)]
pub struct MessageCodec {
    inner: LengthDelimitedCodec,
    max_frame_bytes: usize,
}

impl MessageCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_bytes)
                .new_codec(),
            max_frame_bytes,
        }
    }

    pub const fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Encodes `frame` and checks it against the frame limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if the encoded body exceeds
    /// `max_frame_bytes`.
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes> {
        encode_frame(frame, self.max_frame_bytes)
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

/// See [`MessageCodec::encode_frame`].
///
/// # Errors
///
/// Returns [`Error::FrameTooLarge`] if the encoded body exceeds
/// `max_frame_bytes`.
pub fn encode_frame(frame: &Frame, max_frame_bytes: usize) -> Result<Bytes> {
    let body = frame.encode();
    if body.len() > max_frame_bytes {
        return Err(Error::FrameTooLarge {
            max_frame_bytes,
            got_bytes: body.len(),
        });
    }
    Ok(body)
}

impl Decoder for MessageCodec {
    type Item = Result<Frame>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.inner.decode(src)? {
            Some(body) => Ok(Some(Frame::decode(&body))),
            None => Ok(None),
        }
    }
}

/// Writes a body produced by [`encode_frame`].
impl Encoder<Bytes> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<()> {
        if body.len() > self.max_frame_bytes {
            return Err(Error::FrameTooLarge {
                max_frame_bytes: self.max_frame_bytes,
                got_bytes: body.len(),
            });
        }
        self.inner.encode(body, dst)?;
        Ok(())
    }
}

impl Encoder<Frame> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let body = self.encode_frame(&frame)?;
        Encoder::<Bytes>::encode(self, body, dst)
    }
}
