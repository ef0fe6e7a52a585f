// batcher-core/src/dataset/framing.rs

//! Length-prefixed record framing.
//!
//! Every record file is a plain concatenation of frames:
//!
//! ```text
//! +----------------------+---------------------------+
//! | length (u64, LE, 8B) | payload (`length` bytes)  |
//! +----------------------+---------------------------+
//! ```

use std::io::{self, Read, Write};

use crate::error::{BatcherError, Result};

/// Describes how frames are laid out in a record file.
#[derive(Debug, Clone)]
pub struct LengthPrefixedFormat {
    /// Largest payload accepted before the frame is treated as corrupt.
    pub max_frame_len: u64,
}

impl LengthPrefixedFormat {
    /// Width of the length prefix in bytes.
    pub const PREFIX_LEN: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a length prefix.
    pub fn decode_len(&self, prefix: [u8; Self::PREFIX_LEN]) -> u64 {
        u64::from_le_bytes(prefix)
    }

    /// Writes `payload` as one frame.
    pub fn write_frame<W: Write>(&self, writer: &mut W, payload: &[u8]) -> io::Result<()> {
        writer.write_all(&(payload.len() as u64).to_le_bytes())?;
        writer.write_all(payload)
    }
}

impl Default for LengthPrefixedFormat {
    fn default() -> Self {
        Self {
            max_frame_len: 256 * 1024 * 1024, // 256 MB
        }
    }
}

/// Streams frames out of a reader one at a time.
pub struct FrameReader<R> {
    reader: R,
    format: LengthPrefixedFormat,
    frames_read: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, format: LengthPrefixedFormat) -> Self {
        Self {
            reader,
            format,
            frames_read: 0,
        }
    }

    /// Reads the next frame payload.
    ///
    /// Returns `Ok(None)` at a clean end of input. A prefix or payload cut
    /// short by end of input, or an oversized length, is a `Record` error;
    /// I/O failures are `Storage` errors.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prefix = [0u8; LengthPrefixedFormat::PREFIX_LEN];
        let got = read_fully(&mut self.reader, &mut prefix)?;
        if got == 0 {
            return Ok(None);
        }
        if got < prefix.len() {
            return Err(BatcherError::record(format!(
                "truncated length prefix after frame {} ({got} of {} bytes)",
                self.frames_read,
                prefix.len()
            )));
        }

        let len = self.format.decode_len(prefix);
        if len > self.format.max_frame_len {
            return Err(BatcherError::record(format!(
                "frame {} declares {len} bytes, above the {} byte limit",
                self.frames_read, self.format.max_frame_len
            )));
        }

        // grows with the bytes actually present, not the declared length
        let mut payload = Vec::new();
        (&mut self.reader)
            .take(len)
            .read_to_end(&mut payload)
            .map_err(|e| {
                BatcherError::storage_with_source("<record file>", "failed to read frame", e)
            })?;
        if (payload.len() as u64) < len {
            return Err(BatcherError::record(format!(
                "truncated payload in frame {} ({} of {len} bytes)",
                self.frames_read,
                payload.len()
            )));
        }

        self.frames_read += 1;
        Ok(Some(payload))
    }

    /// Number of complete frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

/// Fills `buf` as far as the reader allows; returns how many bytes were read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(BatcherError::storage_with_source(
                    "<record file>",
                    "failed to read frame",
                    e,
                ))
            }
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(payloads: &[&[u8]]) -> Vec<u8> {
        let format = LengthPrefixedFormat::new();
        let mut out = Vec::new();
        for p in payloads {
            format.write_frame(&mut out, p).unwrap();
        }
        out
    }

    #[test]
    fn test_reads_frames_in_order() {
        let data = framed(&[b"hello", b"", b"bye"]);
        let mut reader = FrameReader::new(Cursor::new(data), LengthPrefixedFormat::new());

        assert_eq!(reader.next_frame().unwrap(), Some(b"hello".to_vec()));
        assert_eq!(reader.next_frame().unwrap(), Some(Vec::new()));
        assert_eq!(reader.next_frame().unwrap(), Some(b"bye".to_vec()));
        assert_eq!(reader.next_frame().unwrap(), None);
        assert_eq!(reader.frames_read(), 3);
    }

    #[test]
    fn test_prefix_is_little_endian() {
        let data = framed(&[b"abc"]);
        assert_eq!(&data[..8], &[3, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_truncated_prefix() {
        let mut data = framed(&[b"ok"]);
        data.extend_from_slice(&[1, 0, 0]);
        let mut reader = FrameReader::new(Cursor::new(data), LengthPrefixedFormat::new());

        assert!(reader.next_frame().unwrap().is_some());
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(err, BatcherError::Record { .. }));
        assert!(err.to_string().contains("truncated length prefix"));
    }

    #[test]
    fn test_truncated_payload() {
        let mut data = Vec::new();
        data.extend_from_slice(&100u64.to_le_bytes());
        data.extend_from_slice(b"short");
        let mut reader = FrameReader::new(Cursor::new(data), LengthPrefixedFormat::new());

        let err = reader.next_frame().unwrap_err();
        assert!(err.to_string().contains("truncated payload"));
    }

    #[test]
    fn test_huge_declared_length_with_short_payload() {
        let mut data = framed(&[b"first"]);
        data.extend_from_slice(&(200u64 * 1024 * 1024).to_le_bytes());
        data.extend_from_slice(b"tail");
        let mut reader = FrameReader::new(Cursor::new(data), LengthPrefixedFormat::new());

        assert_eq!(reader.next_frame().unwrap(), Some(b"first".to_vec()));
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(err, BatcherError::Record { .. }));
        assert!(err.to_string().contains("frame 1 (4 of 209715200 bytes)"));
        assert_eq!(reader.frames_read(), 1);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        let format = LengthPrefixedFormat { max_frame_len: 1024 };
        let mut reader = FrameReader::new(Cursor::new(data), format);

        assert!(reader.next_frame().is_err());
    }
}
