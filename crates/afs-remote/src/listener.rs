//! Background thread feeding server events into the local events bus.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use afs_protocol::{endpoints, StorageCodec};
use afs_storage::{InMemoryEventsBus, StorageError, StorageResult};
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// How long a blocking read waits before checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct EventListener {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventListener {
    /// Connect to `url` and wait until the server confirms the subscription.
    pub fn spawn(url: &str, bus: Arc<InMemoryEventsBus>) -> StorageResult<Self> {
        let (mut socket, _) =
            tungstenite::connect(url).map_err(|e| StorageError::Backend(format!("{url}: {e}")))?;
        if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
            stream.set_read_timeout(Some(POLL_INTERVAL))?;
        }
        wait_ready(&mut socket, url)?;
        info!(%url, "subscribed to remote events");

        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("afs-remote-events".into())
            .spawn(move || run(socket, bus, flag))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the thread to stop and wait for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("event listener thread panicked");
            }
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_timeout(e: &tungstenite::Error) -> bool {
    let tungstenite::Error::Io(io) = e else {
        return false;
    };
    matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn wait_ready(socket: &mut Socket, url: &str) -> StorageResult<()> {
    let deadline = Instant::now() + READY_TIMEOUT;
    while Instant::now() < deadline {
        match socket.read() {
            Ok(Message::Text(text)) if text == endpoints::EVENTS_READY => return Ok(()),
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {}
            Err(e) => return Err(StorageError::Backend(format!("{url}: {e}"))),
        }
    }
    Err(StorageError::Backend(format!("{url}: no subscription confirmation")))
}

fn run(mut socket: Socket, bus: Arc<InMemoryEventsBus>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) {
        match socket.read() {
            Ok(Message::Binary(payload)) => match StorageCodec::decode_events(&payload) {
                Ok(list) => bus.publish(list),
                Err(e) => warn!(error = %e, "dropping undecodable event list"),
            },
            Ok(Message::Close(_)) => {
                info!("server closed the event stream");
                return;
            }
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {}
            Err(e) => {
                warn!(error = %e, "event stream failed");
                return;
            }
        }
    }
    // Best effort: the server also drops the subscription when the socket goes away.
    if let Err(e) = socket.close(None).and_then(|_| socket.flush()) {
        debug!(error = %e, "closing event stream");
    }
}
