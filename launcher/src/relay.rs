/// Forwards a child's output stream into the shared [`LogSink`].
///
/// One relay task runs per piped stream. It reads whatever bytes are available,
/// decodes them as UTF-8 and appends the text in a single call, so ordering
/// within a stream is the order of arrival.
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::sink::{LogSink, StreamKind};

const READ_CHUNK: usize = 4096;

/// Incremental UTF-8 decoder that carries an incomplete trailing sequence over
/// to the next chunk instead of mangling it.
#[derive(Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes `bytes` (prefixed by any carried-over bytes). Invalid sequences
    /// become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut input = self.pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = input.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &after[len..];
                        }
                        // Incomplete sequence at the end: keep for next time.
                        None => {
                            input = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = input.to_vec();
        out
    }

    /// Flushes carried-over bytes at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Reads `reader` to EOF, appending each decoded chunk to `sink` as `kind`.
pub async fn run<R>(mut reader: R, kind: StreamKind, sink: Arc<dyn LogSink>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = Utf8Decoder::default();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() {
                    sink.append(&text, kind);
                }
            }
            Err(e) => {
                log::debug!("[relay] {kind:?} read failed: {e}");
                break;
            }
        }
    }
    let tail = decoder.finish();
    if !tail.is_empty() {
        sink.append(&tail, kind);
    }
}
