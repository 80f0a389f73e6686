//! Length-prefixed framing shared by server mode and the isolated worker.
//!
//! ```text
//! Status:Ok
//! Length:1234
//!
//! <body bytes>
//! ```

use anyhow::{anyhow, Result};
use std::io::{BufRead, Read, Write};

/// Upper bound on a single frame body
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Read one frame. Returns `Ok(None)` on a clean EOF before any header.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Option<Frame>> {
    let mut headers = Vec::new();
    let mut length = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            if headers.is_empty() {
                return Ok(None);
            }
            return Err(anyhow!("Unexpected end of input inside frame headers"));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if headers.is_empty() {
                // Tolerate stray blank lines between frames
                continue;
            }
            break;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| anyhow!("Malformed header line: {:?}", line))?;
        let (key, value) = (key.trim().to_string(), value.trim().to_string());
        if key.eq_ignore_ascii_case("Length") {
            let n: usize = value
                .parse()
                .map_err(|_| anyhow!("Invalid Length header: {:?}", value))?;
            if n > MAX_FRAME_BYTES {
                return Err(anyhow!("Frame of {} bytes exceeds the {} byte limit", n, MAX_FRAME_BYTES));
            }
            length = Some(n);
        }
        headers.push((key, value));
    }

    let length = length.ok_or_else(|| anyhow!("Frame is missing the Length header"))?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    let body = String::from_utf8(body).map_err(|e| anyhow!("Frame body is not UTF-8: {}", e))?;

    Ok(Some(Frame { headers, body }))
}

/// Write one frame. `Length` is always computed from the body.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    for (key, value) in &frame.headers {
        if key.eq_ignore_ascii_case("Length") {
            continue;
        }
        writeln!(writer, "{}:{}", key, value)?;
    }
    writeln!(writer, "Length:{}", frame.body.len())?;
    writeln!(writer)?; // Empty line separator
    write!(writer, "{}", frame.body)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_consecutive_frames() {
        let input = "Length:5\n\nhelloStatus:Ok\nLength:3\n\nabc";
        let mut reader = Cursor::new(input.as_bytes());

        let first = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(first.body, "hello");

        let second = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(second.header("status"), Some("Ok"));
        assert_eq!(second.body, "abc");

        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_length_counts_utf8_bytes() {
        let frame = Frame::new("héllo\n<b>").with_header("Status", "Ok");
        let mut out = Vec::new();
        write_frame(&mut out, &frame).unwrap();
        assert!(String::from_utf8_lossy(&out).starts_with("Status:Ok\nLength:10\n\n"));

        let parsed = read_frame(&mut Cursor::new(out)).unwrap().unwrap();
        assert_eq!(parsed.body, "héllo\n<b>");
    }

    #[test]
    fn test_missing_length() {
        let mut reader = Cursor::new("Status:Ok\n\nbody".as_bytes());
        let err = read_frame(&mut reader).unwrap_err();
        assert!(err.to_string().contains("Length"));
    }

    #[test]
    fn test_truncated_body() {
        let mut reader = Cursor::new("Length:10\n\nshort".as_bytes());
        assert!(read_frame(&mut reader).is_err());
    }
}
