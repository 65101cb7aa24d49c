//! Length-prefixed CBOR frame streams.
//!
//! Each frame is written as a 4-byte big-endian length followed by that
//! many bytes of CBOR.

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Frame;
use std::io::{ErrorKind, Read, Write};

/// Maximum encoded size of a single frame (16 MiB).
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Writes frames to `writer`.
pub fn write_frames<W: Write>(writer: &mut W, frames: &[Frame]) -> ProtocolResult<()> {
    for frame in frames {
        let bytes = frame.encode_cbor()?;
        let length = u32::try_from(bytes.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or(ProtocolError::FrameTooLarge {
                length: bytes.len() as u64,
                limit: MAX_FRAME_LEN as u64,
            })?;
        writer.write_all(&length.to_be_bytes())?;
        writer.write_all(&bytes)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads frames from `reader` until end of input.
///
/// End of input is only accepted on a frame boundary.
pub fn read_frames<R: Read>(reader: &mut R) -> ProtocolResult<Vec<Frame>> {
    let mut frames = Vec::new();
    while let Some(bytes) = read_one(reader)? {
        frames.push(Frame::decode_cbor(&bytes)?);
    }
    Ok(frames)
}

fn read_one<R: Read>(reader: &mut R) -> ProtocolResult<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(ProtocolError::decoding_failed(
                    "stream ended inside a frame header",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let length = u32::from_be_bytes(header);
    if length > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            length: length as u64,
            limit: MAX_FRAME_LEN as u64,
        });
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            ProtocolError::decoding_failed("stream ended inside a frame body")
        } else {
            e.into()
        }
    })?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChangeMessage;
    use docsync_core::{Fields, Value};
    use std::io::Cursor;

    fn sample() -> Vec<Frame> {
        let mut fields = Fields::new();
        fields.insert("title".into(), Value::from("write docs"));
        Frame::batch(
            "tasks",
            false,
            vec![
                ChangeMessage::added("a", fields),
                ChangeMessage::removed("b"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn write_then_read() {
        let frames = sample();
        let mut buf = Vec::new();
        write_frames(&mut buf, &frames).unwrap();

        let decoded = read_frames(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn empty_stream() {
        let decoded = read_frames(&mut Cursor::new(Vec::new())).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let mut buf = Vec::new();
        write_frames(&mut buf, &sample()).unwrap();
        buf.truncate(buf.len() - 1);
        let err = read_frames(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ProtocolError::DecodingFailed { .. }));

        let err = read_frames(&mut Cursor::new(vec![0u8, 0])).unwrap_err();
        assert!(matches!(err, ProtocolError::DecodingFailed { .. }));
    }

    #[test]
    fn oversized_header_is_rejected() {
        let buf = (MAX_FRAME_LEN + 1).to_be_bytes().to_vec();
        let err = read_frames(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }
}
