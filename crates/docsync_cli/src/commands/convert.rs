//! Encode and decode command implementations.

use docsync_protocol::{read_frames, write_frames, Frame};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Reads frames from a JSON array or, for `.cbor` files, a CBOR stream.
pub fn load_frames(path: &Path) -> Result<Vec<Frame>, Box<dyn std::error::Error>> {
    if path.extension().is_some_and(|ext| ext == "cbor") {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(read_frames(&mut reader)?)
    } else {
        let json = std::fs::read_to_string(path)?;
        Ok(Frame::from_json_array(&json)?)
    }
}

/// Converts a JSON frame array into a CBOR stream. Returns the frame count.
pub fn encode(input: &Path, output: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(input)?;
    let frames = Frame::from_json_array(&json)?;
    let mut writer = BufWriter::new(File::create(output)?);
    write_frames(&mut writer, &frames)?;
    Ok(frames.len())
}

/// Converts a CBOR stream into a pretty-printed JSON frame array.
pub fn decode(input: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let mut reader = BufReader::new(File::open(input)?);
    let frames = read_frames(&mut reader)?;
    Ok(Frame::to_json_array(&frames)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FRAMES: &str = r#"[
        {"msg": "beginUpdate", "collection": "tasks", "batchSize": 1, "reset": false},
        {"msg": "changed", "collection": "tasks", "id": "1", "fields": {"a": 1}, "cleared": ["b"]},
        {"msg": "endUpdate", "collection": "tasks"}
    ]"#;

    #[test]
    fn encode_then_decode() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("frames.json");
        let cbor_path = dir.path().join("frames.cbor");
        std::fs::write(&json_path, FRAMES).unwrap();

        assert_eq!(encode(&json_path, &cbor_path).unwrap(), 3);

        let decoded = decode(&cbor_path).unwrap();
        assert_eq!(
            Frame::from_json_array(&decoded).unwrap(),
            Frame::from_json_array(FRAMES).unwrap()
        );
        assert_eq!(load_frames(&cbor_path).unwrap().len(), 3);
        assert_eq!(load_frames(&json_path).unwrap().len(), 3);
    }

    #[test]
    fn unknown_message_kind_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"msg": "moved", "collection": "c", "id": "1"}]"#).unwrap();
        let err = load_frames(&path).unwrap_err();
        assert!(err.to_string().contains("moved"));
    }
}
