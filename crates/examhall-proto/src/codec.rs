//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian length followed by exactly that many bytes
//! of envelope JSON. The decoder works on a growing buffer and yields one
//! frame at a time, so callers can feed it whatever the socket returns.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Envelope, ProtocolError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest envelope accepted by default.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 65_535;

/// Frame encoder/decoder with a configurable size bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    /// Create a codec rejecting envelopes longer than `max_frame_size` bytes.
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Configured size bound.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Append one frame carrying `envelope` to `dst`.
    ///
    /// Nothing is written if the envelope exceeds the size bound.
    pub fn encode(&self, envelope: &Envelope, dst: &mut impl BufMut) -> Result<()> {
        let body = envelope.to_bytes()?;
        self.check_size(body.len())?;

        let len = u32::try_from(body.len())
            .map_err(|_| ProtocolError::FrameTooLarge { size: body.len(), max: self.max_frame_size })?;

        dst.put_u32(len);
        dst.put_slice(&body);
        Ok(())
    }

    /// Encode one frame into a fresh buffer.
    pub fn encode_to_vec(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(envelope, &mut buf)?;
        Ok(buf)
    }

    /// Split the next complete frame off the front of `src`.
    ///
    /// Returns `Ok(None)` until a whole frame is buffered. An oversized length
    /// prefix is reported as soon as it is seen, without waiting for the body;
    /// the stream cannot be resynchronized after that.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_be_bytes(prefix) as usize;
        self.check_size(len)?;

        if src.len() < LENGTH_PREFIX_SIZE + len {
            src.reserve(LENGTH_PREFIX_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge { size, max: self.max_frame_size });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::{LoginResponse, Payload};

    #[test]
    fn prefix_is_big_endian() {
        let codec = FrameCodec::default();
        let envelope = Envelope::new(Payload::ExamEnd, 0);
        let frame = codec.encode_to_vec(&envelope).unwrap();

        let body_len = frame.len() - LENGTH_PREFIX_SIZE;
        assert_eq!(&frame[..LENGTH_PREFIX_SIZE], &(body_len as u32).to_be_bytes());
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let codec = FrameCodec::default();
        let frame = codec.encode_to_vec(&Envelope::new(Payload::Heartbeat, 7)).unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame[..2]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&frame[2..frame.len() - 1]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&frame[frame.len() - 1..]);
        let body = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(Envelope::from_bytes(&body).unwrap().timestamp(), 7);
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_prefix_is_rejected_before_body_arrives() {
        let codec = FrameCodec::default();
        let mut buf = BytesMut::from(&hex!("00 01 00 00")[..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err, ProtocolError::FrameTooLarge { size: 65_536, max: 65_535 });
        assert!(err.is_fatal());
    }

    #[test]
    fn oversized_envelope_is_not_written() {
        let codec = FrameCodec::new(16);
        let envelope = Envelope::new(
            Payload::LoginResponse(LoginResponse::rejected("far too long for sixteen bytes")),
            0,
        );

        let mut buf = Vec::new();
        let err = codec.encode(&envelope, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { max: 16, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn malformed_frame_does_not_break_alignment() {
        let codec = FrameCodec::default();
        let mut buf = BytesMut::new();

        let garbage = b"{not json";
        buf.put_u32(garbage.len() as u32);
        buf.put_slice(garbage);
        codec.encode(&Envelope::new(Payload::Heartbeat, 42), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(Envelope::from_bytes(&first).is_err());

        let second = codec.decode(&mut buf).unwrap().unwrap();
        let envelope = Envelope::from_bytes(&second).unwrap();
        assert_eq!(envelope.payload(), &Payload::Heartbeat);
        assert_eq!(envelope.timestamp(), 42);
    }
}
