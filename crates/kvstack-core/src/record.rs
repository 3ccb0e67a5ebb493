//! Record framing.
//!
//! A record is a `(key, value)` pair of non-empty text strings, serialized
//! as a self-describing frame:
//!
//! ```text
//! ┌────────────┬──────────┬──────────┬────────────┬───────────┐
//! │ Frame Size │ Key Size │ Key      │ Value Size │ Value     │
//! │ (4 bytes)  │(4 bytes) │ (N bytes)│ (4 bytes)  │ (M bytes) │
//! └────────────┴──────────┴──────────┴────────────┴───────────┘
//! ```
//!
//! All integers are little-endian u32. The frame size counts every field
//! including itself, so `frame_size = 12 + key_len + value_len`. A segment
//! file is nothing but a contiguous run of these frames; the frame size
//! field is what lets recovery walk the file record by record.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// Fixed framing cost per record: the three u32 length fields.
pub const FRAME_OVERHEAD: usize = 12;

/// A single key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Encoded length of a record without building the frame.
    pub fn encoded_len(key: &str, value: &str) -> usize {
        FRAME_OVERHEAD + key.len() + value.len()
    }

    /// Serialize into a wire frame.
    pub fn encode(&self) -> Bytes {
        let len = Self::encoded_len(&self.key, &self.value);
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u32_le(len as u32);
        buf.put_u32_le(self.key.len() as u32);
        buf.put_slice(self.key.as_bytes());
        buf.put_u32_le(self.value.len() as u32);
        buf.put_slice(self.value.as_bytes());
        buf.freeze()
    }

    /// Parse a full frame. `data` must be exactly one frame; any length
    /// inconsistency or non-UTF-8 text is a corruption error.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_OVERHEAD {
            return Err(Error::Corrupt(format!(
                "frame shorter than header: {} bytes",
                data.len()
            )));
        }

        let mut buf = data;
        let size = buf.get_u32_le() as usize;
        if size != data.len() {
            return Err(Error::Corrupt(format!(
                "frame size field {} does not match buffer length {}",
                size,
                data.len()
            )));
        }

        let key_len = buf.get_u32_le() as usize;
        if buf.remaining() < key_len + 4 {
            return Err(Error::Corrupt(format!("key length {key_len} overruns frame")));
        }
        let key = buf.copy_to_bytes(key_len);

        let value_len = buf.get_u32_le() as usize;
        if FRAME_OVERHEAD + key_len + value_len != size {
            return Err(Error::Corrupt(format!(
                "lengths {key_len}+{value_len} inconsistent with frame size {size}"
            )));
        }
        let value = buf.copy_to_bytes(value_len);

        let key = String::from_utf8(key.to_vec())
            .map_err(|_| Error::Corrupt("key is not valid UTF-8".into()))?;
        let value = String::from_utf8(value.to_vec())
            .map_err(|_| Error::Corrupt("value is not valid UTF-8".into()))?;

        Ok(Record { key, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Record::new("k1", "val").encode();
        // 12 + 2 + 3
        assert_eq!(frame.len(), 17);
        assert_eq!(&frame[0..4], &17u32.to_le_bytes());
        assert_eq!(&frame[4..8], &2u32.to_le_bytes());
        assert_eq!(&frame[8..10], b"k1");
        assert_eq!(&frame[10..14], &3u32.to_le_bytes());
        assert_eq!(&frame[14..17], b"val");
    }

    #[test]
    fn test_encoded_len_matches_frame() {
        for (k, v) in [("a", "b"), ("key1", "value1"), ("k", &"x".repeat(1000))] {
            let rec = Record::new(k, v.to_string());
            assert_eq!(rec.encode().len(), Record::encoded_len(k, v));
            assert_eq!(Record::encoded_len(k, v), 12 + k.len() + v.len());
        }
    }

    #[test]
    fn test_roundtrip() {
        let rec = Record::new("key1", "value1");
        let decoded = Record::decode(&rec.encode()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn test_roundtrip_unicode() {
        let rec = Record::new("clé", "très-long-été");
        let decoded = Record::decode(&rec.encode()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn test_decode_short_buffer() {
        assert!(Record::decode(&[0u8; 5]).is_err());
        assert!(Record::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_size_mismatch() {
        let mut frame = Record::new("k", "v").encode().to_vec();
        frame.push(0xFF);
        assert!(Record::decode(&frame).is_err());
    }

    #[test]
    fn test_decode_inconsistent_lengths() {
        let mut frame = Record::new("key", "value").encode().to_vec();
        // Inflate the key length so the section lengths no longer add up.
        frame[4..8].copy_from_slice(&100u32.to_le_bytes());
        assert!(Record::decode(&frame).is_err());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut frame = Record::new("key", "value").encode().to_vec();
        frame[8] = 0xFF;
        frame[9] = 0xFE;
        assert!(Record::decode(&frame).is_err());
    }
}
