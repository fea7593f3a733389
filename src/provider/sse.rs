use super::{ChatChunk, ChunkStream};
use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Data(String),
    Other,
}

/// Line-oriented SSE parser.
///
/// Emits a `Data` event when a blank line closes an event with data fields.
pub struct SseParser {
    buf: Vec<u8>,
    cur_data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            cur_data: String::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<anyhow::Result<SseEvent>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line = self.buf.drain(..=pos).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }

            if line.is_empty() {
                if !self.cur_data.is_empty() {
                    if self.cur_data.ends_with('\n') {
                        self.cur_data.pop();
                    }
                    out.push(Ok(SseEvent::Data(std::mem::take(&mut self.cur_data))));
                }
                continue;
            }

            let s = match std::str::from_utf8(&line) {
                Ok(s) => s,
                Err(e) => {
                    out.push(Err(anyhow!(e).context("SSE line is not valid UTF-8")));
                    continue;
                }
            };

            if let Some(rest) = s.strip_prefix("data:") {
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                self.cur_data.push_str(rest);
                self.cur_data.push('\n');
            } else {
                // event:, id:, retry:, comments
                out.push(Ok(SseEvent::Other));
            }
        }

        out
    }
}

/// What a provider makes of one SSE data payload.
#[derive(Debug)]
pub enum Decoded {
    Text(String),
    Skip,
    Done,
}

/// Pump an SSE response body into a chunk stream on a background task.
///
/// `decode` turns each data payload into text; returning an error ends the
/// stream with that error.
pub fn spawn_chunk_stream<F>(resp: reqwest::Response, decode: F) -> ChunkStream
where
    F: Fn(&str) -> anyhow::Result<Decoded> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(64);

    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        let mut parser = SseParser::new();

        while let Some(item) = stream.next().await {
            let bytes = match item {
                Ok(b) => b,
                Err(e) => {
                    let _ = tx.send(Err(anyhow!(e).context("network stream error"))).await;
                    return;
                }
            };

            for ev in parser.push(&bytes) {
                let data = match ev {
                    Ok(SseEvent::Data(data)) => data,
                    Ok(SseEvent::Other) => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                if data.trim().is_empty() {
                    continue;
                }

                match decode(&data) {
                    Ok(Decoded::Text(text)) => {
                        if tx.send(Ok(ChatChunk { text })).await.is_err() {
                            return;
                        }
                    }
                    Ok(Decoded::Skip) => {}
                    Ok(Decoded::Done) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
