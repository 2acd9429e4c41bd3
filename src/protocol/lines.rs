// src/protocol/lines.rs

//! Line splitting over the merged worker output stream.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Reads a worker's output one line at a time.
///
/// Unlike `tokio::io::Lines`, invalid UTF-8 never produces an error: bytes
/// are decoded lossily so that a single garbled line cannot take the whole
/// session down. A trailing `\r` is stripped.
pub struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::with_capacity(256),
        }
    }

    /// Next line, or `None` once the stream is closed.
    ///
    /// Cancel safe: bytes read before a cancellation stay in the internal
    /// buffer and are returned by the next call.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let mut end = self.buf.len();
        if end > 0 && self.buf[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && self.buf[end - 1] == b'\r' {
            end -= 1;
        }

        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &'static [u8]) -> Vec<String> {
        let mut lines = OutputLines::new(input);
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await.expect("in-memory read") {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn splits_on_newlines_and_strips_carriage_returns() {
        let lines = collect(b"PROGRESS:10\r\nhello\n\nlast").await;
        assert_eq!(lines, vec!["PROGRESS:10", "hello", "", "last"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_rejected() {
        let lines = collect(b"ok\n\xff\xfebad\nafter\n").await;
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("bad"));
        assert_eq!(lines[2], "after");
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        assert!(collect(b"").await.is_empty());
    }
}
