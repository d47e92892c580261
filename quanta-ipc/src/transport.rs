//! Newline-delimited JSON framing
//!
//! Each frame is one compact JSON document followed by `\n`. `serde_json`
//! escapes control characters inside strings, so a serialized payload can never
//! contain the raw delimiter regardless of what it carries.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{ChildStdin, ChildStdout};

use crate::error::IpcError;

const DELIMITER: u8 = b'\n';

/// Reads complete frames from a byte stream
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_frame_bytes: Option<usize>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with no frame size limit
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            max_frame_bytes: None,
        }
    }

    /// Reject frames larger than `limit` bytes
    pub fn with_max_frame_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// Read the next non-empty frame without its delimiter.
    ///
    /// Returns `Ok(None)` on a clean end of stream. Bytes left over without a
    /// trailing delimiter when the stream ends are reported as
    /// [`IpcError::TruncatedFrame`] rather than handed out as a partial frame.
    pub async fn read_frame(&mut self) -> Result<Option<&[u8]>, IpcError> {
        loop {
            self.buf.clear();

            let read = match self.max_frame_bytes {
                Some(limit) => {
                    let mut limited = (&mut self.inner).take(limit as u64 + 1);
                    let read = limited.read_until(DELIMITER, &mut self.buf).await?;
                    let body = read.saturating_sub(usize::from(self.buf.last() == Some(&DELIMITER)));
                    if body > limit {
                        return Err(IpcError::FrameTooLarge { size: body, limit });
                    }
                    read
                }
                None => self.inner.read_until(DELIMITER, &mut self.buf).await?,
            };

            if read == 0 {
                return Ok(None);
            }
            if self.buf.last() != Some(&DELIMITER) {
                return Err(IpcError::TruncatedFrame { bytes: read });
            }

            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(&self.buf));
        }
    }

    /// Read and decode the next frame.
    ///
    /// A frame that is not valid JSON for `T` yields
    /// [`IpcError::DeserializationError`]; the stream stays usable and the
    /// caller may keep reading.
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, IpcError> {
        match self.read_frame().await? {
            Some(frame) => serde_json::from_slice(frame)
                .map(Some)
                .map_err(|e| IpcError::DeserializationError(e.to_string())),
            None => Ok(None),
        }
    }
}

/// Writes complete frames to a byte stream
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Serialize `message` and write it as exactly one frame
    pub async fn write_message<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<(), IpcError> {
        let mut bytes = serde_json::to_vec(message)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;
        bytes.push(DELIMITER);

        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write half, signalling end of input to the peer
    pub async fn shutdown(&mut self) -> Result<(), IpcError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Child process transport for parent-child communication
pub struct ChildProcessTransport {
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl ChildProcessTransport {
    /// Create a new child process transport
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self { stdin, stdout }
    }

    /// Split into independently owned framed halves
    pub fn into_parts(
        self,
        max_frame_bytes: Option<usize>,
    ) -> (FrameReader<ChildStdout>, FrameWriter<ChildStdin>) {
        (
            FrameReader::new(self.stdout).with_max_frame_bytes(max_frame_bytes),
            FrameWriter::new(self.stdin),
        )
    }
}

impl std::fmt::Debug for ChildProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcessTransport").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{WorkerRequest, WorkerResponse};
    use serde_json::json;

    #[tokio::test]
    async fn test_frames_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        let request = WorkerRequest::new(1, "cas_evaluate", json!({"expr": "line1\nline2"}));
        writer.write_message(&request).await.unwrap();
        writer.shutdown().await.unwrap();

        let received: WorkerRequest = reader.read_message().await.unwrap().unwrap();
        assert_eq!(received, request);
        assert!(reader.read_message::<WorkerRequest>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_large_frame_survives_small_buffer() {
        let (client, server) = tokio::io::duplex(1024);
        let payload = "A".repeat(3 * 1024 * 1024);
        let expected = payload.clone();

        tokio::spawn(async move {
            let mut writer = FrameWriter::new(client);
            writer
                .write_message(&WorkerResponse::success(9, json!({ "png_b64": payload })))
                .await
                .unwrap();
        });

        let mut reader = FrameReader::new(server);
        let response: WorkerResponse = reader.read_message().await.unwrap().unwrap();
        assert_eq!(response.request_id(), Some(9));
        assert_eq!(response.result.unwrap()["png_b64"], json!(expected));
    }

    #[tokio::test]
    async fn test_blank_lines_and_crlf_are_tolerated() {
        let input: &[u8] = b"\n   \r\n{\"id\":2,\"result\":true}\r\n";
        let mut reader = FrameReader::new(input);
        let response: WorkerResponse = reader.read_message().await.unwrap().unwrap();
        assert_eq!(response.request_id(), Some(2));
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_frame_at_eof() {
        let input: &[u8] = b"{\"id\":1,\"result\":1}\n{\"id\":2,\"res";
        let mut reader = FrameReader::new(input);
        assert!(reader.read_frame().await.unwrap().is_some());

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, IpcError::TruncatedFrame { bytes: 12 }));
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_poison_stream() {
        let input: &[u8] = b"not json\n{\"id\":4,\"result\":null}\n";
        let mut reader = FrameReader::new(input);

        let err = reader.read_message::<WorkerResponse>().await.unwrap_err();
        assert!(matches!(err, IpcError::DeserializationError(_)));

        let response: WorkerResponse = reader.read_message().await.unwrap().unwrap();
        assert_eq!(response.request_id(), Some(4));
    }

    #[tokio::test]
    async fn test_frame_size_limit() {
        let input: &[u8] = b"0123456789\n";
        let mut reader = FrameReader::new(input).with_max_frame_bytes(Some(4));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, IpcError::FrameTooLarge { limit: 4, .. }));

        let input: &[u8] = b"0123\n";
        let mut reader = FrameReader::new(input).with_max_frame_bytes(Some(4));
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"0123");
    }
}
