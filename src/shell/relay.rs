// Full-duplex relay between a WebSocket and a remote shell's standard streams

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::CHUNK_SIZE;

/// Frames waiting for the single WebSocket writer.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Why a relay stopped. The first side to finish decides.
#[derive(Debug)]
pub enum RelayEnd {
    RemoteEof { stream: &'static str },
    RemoteReadFailed { stream: &'static str, error: io::Error },
    StdinWriteFailed(io::Error),
    ClientClosed,
    ClientReadFailed(String),
    /// The WebSocket writer stopped accepting frames.
    ClientGone,
}

/// Incremental UTF-8 decoder that holds back a sequence split across reads.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decodes as much as possible. Invalid bytes become U+FFFD; an incomplete
    /// trailing sequence waits for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid_up_to);
                            return text;
                        }
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }
    }

    /// Flushes whatever is left, lossily.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Runs until one of stdout, stderr or the client input ends, then drains
/// queued output and hands the sink back for closing.
///
/// Output from stdout and stderr is forwarded as text frames in the order reads
/// complete. Client text and binary frames go to stdin verbatim.
pub async fn relay<Si, St, E, O1, O2, I>(
    sink: Si,
    stream: St,
    stdout: O1,
    stderr: O2,
    stdin: I,
) -> (RelayEnd, Si)
where
    Si: Sink<Message> + Unpin,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    O1: AsyncRead + Unpin,
    O2: AsyncRead + Unpin,
    I: AsyncWrite + Unpin,
{
    let (queue_tx, queue_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);

    let pumps = async move {
        let stdout_pump = pump_output(stdout, queue_tx.clone(), "stdout");
        let stderr_pump = pump_output(stderr, queue_tx, "stderr");
        let stdin_pump = pump_input(stream, stdin);
        tokio::pin!(stdout_pump, stderr_pump, stdin_pump);

        // Returning drops every pump and with them the queue senders.
        tokio::select! {
            end = &mut stdout_pump => end,
            end = &mut stderr_pump => end,
            end = &mut stdin_pump => end,
        }
    };

    let writer = write_frames(sink, queue_rx);

    tokio::join!(pumps, writer)
}

async fn pump_output<R>(mut reader: R, queue: mpsc::Sender<String>, stream: &'static str) -> RelayEnd
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut carry = Utf8Carry::default();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                let rest = carry.finish();
                if !rest.is_empty() {
                    let _ = queue.send(rest).await;
                }
                return RelayEnd::RemoteEof { stream };
            }
            Ok(n) => {
                let text = carry.push(&buf[..n]);
                if text.is_empty() {
                    continue;
                }
                if queue.send(text).await.is_err() {
                    return RelayEnd::ClientGone;
                }
            }
            Err(error) => return RelayEnd::RemoteReadFailed { stream, error },
        }
    }
}

async fn pump_input<St, E, W>(mut stream: St, mut stdin: W) -> RelayEnd
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = stream.next().await {
        let bytes = match frame {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) => return RelayEnd::ClientClosed,
            // Ping and pong are answered by the WebSocket layer.
            Ok(_) => continue,
            Err(e) => return RelayEnd::ClientReadFailed(e.to_string()),
        };

        if let Err(e) = stdin.write_all(&bytes).await {
            return RelayEnd::StdinWriteFailed(e);
        }
        if let Err(e) = stdin.flush().await {
            return RelayEnd::StdinWriteFailed(e);
        }
    }

    RelayEnd::ClientClosed
}

// The only task that writes to the WebSocket.
async fn write_frames<Si>(mut sink: Si, mut queue: mpsc::Receiver<String>) -> Si
where
    Si: Sink<Message> + Unpin,
{
    while let Some(text) = queue.recv().await {
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    sink
}
