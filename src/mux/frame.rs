//! Frame codec for the physical host/plugin link.
//!
//! Wire layout, inside a `u32` big-endian length prefix:
//!
//! ```text
//! [stream_id:u32_be][kind:u8][payload...]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Bytes preceding the payload inside a length-delimited frame.
pub const FRAME_HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Dialer opens a stream; payload is empty.
    Open = 1,
    Data = 2,
    /// Either side closes a stream; payload is empty.
    Close = 3,
}

impl FrameKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Open),
            2 => Some(Self::Data),
            3 => Some(Self::Close),
            _ => None,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Data => f.write_str("data"),
            Self::Close => f.write_str("close"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: u32,
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn open(stream_id: u32) -> Self {
        Self { stream_id, kind: FrameKind::Open, payload: Bytes::new() }
    }

    pub fn data(stream_id: u32, payload: Bytes) -> Self {
        Self { stream_id, kind: FrameKind::Data, payload }
    }

    pub fn close(stream_id: u32) -> Self {
        Self { stream_id, kind: FrameKind::Close, payload: Bytes::new() }
    }
}

/// [`Frame`] codec layered over [`LengthDelimitedCodec`].
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        let inner = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .max_frame_length(max_frame_bytes + FRAME_HEADER_LEN)
            .new_codec();
        Self { inner }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        let Some(mut buf) = self.inner.decode(src)? else {
            return Ok(None);
        };
        if buf.len() < FRAME_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes is shorter than its header", buf.len()),
            ));
        }
        let stream_id = buf.get_u32();
        let raw_kind = buf.get_u8();
        let kind = FrameKind::from_u8(raw_kind).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("unknown frame kind {}", raw_kind))
        })?;
        Ok(Some(Frame { stream_id, kind, payload: buf.freeze() }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), io::Error> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + frame.payload.len());
        buf.put_u32(frame.stream_id);
        buf.put_u8(frame.kind as u8);
        buf.extend_from_slice(&frame.payload);
        self.inner.encode(buf.freeze(), dst)
    }
}
