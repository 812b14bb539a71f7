//! Line framing for `text/event-stream` response bodies.
//!
//! Network reads can end anywhere, including inside a multi-byte UTF-8
//! character, so bytes are buffered raw and only complete lines are decoded.

use tracing::trace;

#[derive(Debug, Default)]
pub(crate) struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// The payload of the next complete `data:` line, if one is buffered.
    ///
    /// Other SSE fields (`event:`, comments, blank separators) are skipped.
    pub(crate) fn next_data(&mut self) -> Option<String> {
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = match std::str::from_utf8(&line) {
                Ok(line) => line,
                Err(e) => {
                    trace!(error = %e, "Skipping SSE line that is not valid UTF-8");
                    continue;
                }
            };
            if let Some(data) = line.trim_end().strip_prefix("data:") {
                return Some(data.trim().to_string());
            }
        }
        None
    }
}

/// A one-shot HTTP server that sends an SSE body as separate chunked writes.
#[cfg(test)]
pub(crate) async fn serve_chunked(parts: Vec<Vec<u8>>) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 64 * 1024];
        let _ = socket.read(&mut request).await.unwrap();

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                  transfer-encoding: chunked\r\nconnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        for part in parts {
            socket.write_all(format!("{:x}\r\n", part.len()).as_bytes()).await.unwrap();
            socket.write_all(&part).await.unwrap();
            socket.write_all(b"\r\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
    });
    format!("http://{addr}")
}

/// Split `body` right after the first byte of its first multi-byte character.
#[cfg(test)]
pub(crate) fn split_inside_char(body: &str) -> Vec<Vec<u8>> {
    let bytes = body.as_bytes();
    let split = bytes.iter().position(|&b| b >= 0xC0).unwrap() + 1;
    vec![bytes[..split].to_vec(), bytes[split..].to_vec()]
}
