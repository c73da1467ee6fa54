//! Server-sent events plumbing shared by the HTTP clients.
//!
//! Both wire formats deliver `data: {...}` lines; each client supplies a
//! parser that turns one payload into text, end-of-stream, or nothing.

use futures::StreamExt;
use kestrel_core::error::ModelError;
use kestrel_core::model::TextStream;
use tokio::sync::mpsc;
use tracing::warn;

/// What one `data:` payload means.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Text(String),
    Done,
}

/// Splits a byte stream into lines, carrying partial lines across chunks.
/// Bytes are decoded only once a whole line has arrived, so a multibyte
/// character split between chunks survives.
#[derive(Default)]
pub(crate) struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete line, without the trailing `\r\n`.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(decode(&line[..end]))
    }

    /// Whatever is left once the stream has ended without a final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode(&rest))
    }
}

fn decode(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end_matches('\r').to_string()
}

/// Map non-success statuses to a [`ModelError`].
pub(crate) async fn error_for_status(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, ModelError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        429 => Err(ModelError::RateLimited {
            retry_after_secs: response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }),
        401 | 403 => Err(ModelError::AuthenticationFailed(format!(
            "{provider}: invalid API key or insufficient permissions"
        ))),
        404 => Err(ModelError::ModelNotFound(
            response.text().await.unwrap_or_default(),
        )),
        _ => {
            let body = response.text().await.unwrap_or_default();
            warn!(provider, status, body = %body, "Provider returned error");
            Err(ModelError::ApiError {
                status_code: status,
                message: body,
            })
        }
    }
}

/// Pump an SSE response into a [`TextStream`] on a background task.
pub(crate) fn spawn_text_stream<F>(response: reqwest::Response, mut parse: F) -> TextStream
where
    F: FnMut(&str) -> Option<SseEvent> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut bytes = response.bytes_stream();
        let mut lines = LineBuffer::default();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(b) => b,
                Err(e) => {
                    let _ = tx.send(Err(ModelError::StreamInterrupted(e.to_string()))).await;
                    return;
                }
            };
            lines.push(&chunk);

            while let Some(line) = lines.next_line() {
                if !forward(&line, &mut parse, &tx).await {
                    return;
                }
            }
        }

        if let Some(line) = lines.finish() {
            forward(&line, &mut parse, &tx).await;
        }
    });

    rx
}

/// Parse one line and send any text on. Returns false once the stream
/// is over or the receiver is gone.
async fn forward<F>(
    line: &str,
    parse: &mut F,
    tx: &mpsc::Sender<Result<String, ModelError>>,
) -> bool
where
    F: FnMut(&str) -> Option<SseEvent>,
{
    let Some(data) = line.strip_prefix("data:") else {
        return true;
    };
    match parse(data.trim()) {
        Some(SseEvent::Text(text)) => tx.send(Ok(text)).await.is_ok(),
        Some(SseEvent::Done) => false,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_handles_split_lines() {
        let mut buf = LineBuffer::default();
        buf.push(b"data: {\"a\"");
        assert_eq!(buf.next_line(), None);
        buf.push(b":1}\r\n\ndata: [DONE]\n");
        assert_eq!(buf.next_line().as_deref(), Some("data: {\"a\":1}"));
        assert_eq!(buf.next_line().as_deref(), Some(""));
        assert_eq!(buf.next_line().as_deref(), Some("data: [DONE]"));
        assert_eq!(buf.next_line(), None);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let raw = "data: {\"text\":\"héllo\"}\n".as_bytes();
        let split = raw.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buf = LineBuffer::default();
        buf.push(&raw[..split]);
        assert_eq!(buf.next_line(), None);
        buf.push(&raw[split..]);
        assert_eq!(buf.next_line().as_deref(), Some("data: {\"text\":\"héllo\"}"));
    }

    #[test]
    fn unterminated_last_line_is_flushed() {
        let mut buf = LineBuffer::default();
        buf.push(b"data: one\ndata: [DONE]\r");
        assert_eq!(buf.next_line().as_deref(), Some("data: one"));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.finish().as_deref(), Some("data: [DONE]"));
        assert_eq!(buf.finish(), None);
    }

    #[tokio::test]
    async fn forward_sends_text_and_stops_on_done() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut parse = |data: &str| match data {
            "[DONE]" => Some(SseEvent::Done),
            "" => None,
            other => Some(SseEvent::Text(other.to_string())),
        };

        assert!(forward("event: ping", &mut parse, &tx).await);
        assert!(forward("data: hi", &mut parse, &tx).await);
        assert!(!forward("data: [DONE]", &mut parse, &tx).await);
        assert_eq!(rx.recv().await.unwrap().unwrap(), "hi");
    }
}
