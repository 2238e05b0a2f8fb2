use crate::channel::{Channel, SLOT_CAPACITY};
use crate::config::IngestConfig;
use crate::{BridgeError, Result};
use crossbeam_channel::{Receiver, Sender};
use serde::de::IgnoredAny;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(20);
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Progress reported by the ingest thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    Listening(SocketAddr),
    Connected(SocketAddr),
    /// A document of `bytes` length was written to the channel.
    Forwarded { bytes: usize },
    /// A document was dropped because it does not fit a channel slot.
    Rejected { bytes: usize },
    Disconnected(SocketAddr),
}

/// Handle to the network-facing receive loop.
///
/// A background thread accepts one phone client at a time and copies every
/// received document into the channel. Socket errors end the session, never
/// the thread.
pub struct IngestServer {
    events: Receiver<IngestEvent>,
    local_addr: SocketAddr,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl IngestServer {
    /// Bind the listener and start the receive thread.
    pub fn start(config: &IngestConfig, channel: Channel) -> Result<IngestServer> {
        let listener = TcpListener::bind(&config.bind)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (sender, events) = crossbeam_channel::bounded(256);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let buffer_len = config.recv_buffer;

        let _ = sender.try_send(IngestEvent::Listening(local_addr));
        log::info!("Ingest listening on {}", local_addr);

        let thread = std::thread::Builder::new()
            .name("posebridge-ingest".into())
            .spawn(move || {
                ingest_loop(listener, channel, sender, stop_clone, buffer_len);
            })?;

        Ok(IngestServer {
            events,
            local_addr,
            stop_flag,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive the next event (blocks until available).
    pub fn recv_event(&self) -> Result<IngestEvent> {
        self.events.recv().map_err(|_| BridgeError::IngestStopped)
    }

    pub fn try_recv_event(&self) -> Option<IngestEvent> {
        self.events.try_recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<IngestEvent> {
        self.events.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => BridgeError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => BridgeError::IngestStopped,
        })
    }

    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the server and wait for the receive thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for IngestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Splits a client's byte stream into pose documents.
///
/// Documents end at NUL or newline. Bytes after the last separator are kept
/// and joined onto the next read; a trailing piece is only taken early when it
/// already parses as JSON on its own (senders that never frame). A pending
/// piece that outgrows a channel slot is dropped up to its separator.
#[derive(Debug, Default)]
pub struct DocumentFramer {
    pending: Vec<u8>,
    discarding: bool,
}

/// Result of feeding one received chunk to a [`DocumentFramer`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Framed {
    /// Newest complete document in the chunk; older ones are superseded.
    pub latest: Option<String>,
    /// Bytes of an unterminated document dropped for exceeding a slot.
    pub discarded: usize,
}

impl DocumentFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Framed {
        let mut framed = Framed::default();
        let mut pieces = chunk.split(|&b| b == 0 || b == b'\n');
        let tail = pieces.next_back().unwrap_or(&[]);

        for piece in pieces {
            if self.discarding {
                self.discarding = false;
                continue;
            }
            self.pending.extend_from_slice(piece);
            let doc = std::mem::take(&mut self.pending);
            if let Some(text) = document_text(&doc) {
                framed.latest = Some(text);
            }
        }

        if self.discarding {
            return framed;
        }
        self.pending.extend_from_slice(tail);
        let standalone = document_text(&self.pending)
            .filter(|text| serde_json::from_str::<IgnoredAny>(text).is_ok());
        if let Some(text) = standalone {
            self.pending.clear();
            framed.latest = Some(text);
        } else if self.pending.len() > SLOT_CAPACITY {
            framed.discarded = self.pending.len();
            self.pending.clear();
            self.discarding = true;
        }
        framed
    }

    /// Bytes held back waiting for a separator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn document_text(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Write one document into the channel, reporting the outcome as an event.
fn forward(channel: &Channel, doc: &str, peer: SocketAddr) -> IngestEvent {
    if !channel.is_free() {
        log::trace!("Replacing a message the frame loop has not read yet");
    }
    match channel.write(doc) {
        Ok(_) => IngestEvent::Forwarded { bytes: doc.len() },
        Err(e) => {
            log::warn!("Dropping message from {}: {}", peer, e);
            IngestEvent::Rejected { bytes: doc.len() }
        }
    }
}

fn ingest_loop(
    listener: TcpListener,
    channel: Channel,
    sender: Sender<IngestEvent>,
    stop_flag: Arc<AtomicBool>,
    buffer_len: usize,
) {
    let mut buf = vec![0u8; buffer_len.max(1)];

    log::info!("Ingest thread started");

    while !stop_flag.load(Ordering::Relaxed) {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(e) => {
                log::warn!("Accept failed: {}", e);
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
        };

        log::info!("Client connected: {}", peer);
        emit(&sender, IngestEvent::Connected(peer));
        serve_client(stream, peer, &channel, &sender, &stop_flag, &mut buf);
        log::info!("Client disconnected: {}", peer);
        emit(&sender, IngestEvent::Disconnected(peer));
    }

    log::info!("Ingest thread stopping (stop flag set)");
}

fn serve_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    channel: &Channel,
    sender: &Sender<IngestEvent>,
    stop_flag: &AtomicBool,
    buf: &mut [u8],
) {
    // Accepted sockets may inherit non-blocking mode from the listener.
    if let Err(e) = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(Some(READ_TIMEOUT)))
    {
        log::warn!("Failed to configure socket for {}: {}", peer, e);
        return;
    }
    stream.set_nodelay(true).ok();

    let mut framer = DocumentFramer::new();
    while !stop_flag.load(Ordering::Relaxed) {
        let len = match stream.read(buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Receive from {} failed: {}", peer, e);
                return;
            }
        };
        log::debug!("Received {} bytes from {}", len, peer);

        let framed = framer.push(&buf[..len]);
        if framed.discarded > 0 {
            log::warn!(
                "Dropping unterminated message from {} ({} bytes)",
                peer,
                framed.discarded
            );
            emit(sender, IngestEvent::Rejected { bytes: framed.discarded });
        }
        if let Some(doc) = framed.latest {
            emit(sender, forward(channel, &doc, peer));
        }
    }
}

fn emit(sender: &Sender<IngestEvent>, event: IngestEvent) {
    if let Err(crossbeam_channel::TrySendError::Full(_)) = sender.try_send(event) {
        log::trace!("Ingest event queue full, dropping event");
    }
}
