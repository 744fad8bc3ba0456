//! Browser debugging session adapter.
//!
//! A [`CdpSession`] is a live channel to one browser page: network protocol
//! events observed on the page are fanned out to every registered listener.
//! The [`NetworkEventSource`] trait is the seam consumed by
//! [`crate::NetworkManager`], so tests can drive a detached session without
//! a browser. With the `browser` feature, a session can be attached to a
//! real chromiumoxide page and fed by background forwarding tasks.

use crate::event::{Headers, NetworkEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// Source of network events a capture can subscribe to.
///
/// Implemented by [`CdpSession`]; the trait exists so the capture layer can
/// be driven by any event source in tests.
pub trait NetworkEventSource {
    /// Register a listener for all network event kinds.
    ///
    /// Registration is synchronous; event delivery is asynchronous through
    /// the returned subscription's queue.
    fn subscribe(&self) -> Subscription;
}

struct Listener {
    id: u64,
    sender: Sender<NetworkEvent>,
}

type ListenerRegistry = Arc<Mutex<Vec<Listener>>>;

/// A registered listener's end of the event queue.
///
/// Events emitted on the session while the subscription is live are queued
/// here. Cancelling deregisters the listener; events already queued remain
/// readable, events emitted afterwards are not delivered.
pub struct Subscription {
    id: u64,
    receiver: Receiver<NetworkEvent>,
    registry: ListenerRegistry,
}

impl Subscription {
    /// Pop the next queued event, if any.
    pub(crate) fn try_next(&self) -> Option<NetworkEvent> {
        self.receiver.try_recv().ok()
    }

    /// Deregister this listener from the session.
    pub(crate) fn cancel(&self) {
        if let Ok(mut listeners) = self.registry.lock() {
            listeners.retain(|l| l.id != self.id);
        }
        debug!(listener_id = self.id, "network listener deregistered");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// A live channel to a running browser page.
///
/// Clones are handles to the same session: listeners registered through any
/// handle see events emitted through any other. Timestamps on emitted
/// events are milliseconds since the session was created.
#[derive(Clone)]
pub struct CdpSession {
    listeners: ListenerRegistry,
    next_listener_id: Arc<AtomicU64>,
    start_time: Instant,
}

impl CdpSession {
    /// Create a new, detached session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the session was created.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver an event to every registered listener.
    ///
    /// Listeners whose queue has been dropped are pruned.
    pub fn emit(&self, event: NetworkEvent) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|l| l.sender.send(event.clone()).is_ok());
        }
    }

    /// Emit a request-sent event stamped with the session clock.
    pub fn emit_request_sent(&self, request_id: &str, url: &str, method: &str, headers: Headers) {
        self.emit(NetworkEvent::request_sent(
            request_id,
            self.elapsed_ms(),
            url,
            method,
            headers,
        ));
    }

    /// Emit a response-received event stamped with the session clock.
    pub fn emit_response_received(&self, request_id: &str, status: u16, headers: Headers) {
        self.emit(NetworkEvent::response_received(
            request_id,
            self.elapsed_ms(),
            status,
            headers,
        ));
    }

    /// Emit a request-failed event stamped with the session clock.
    pub fn emit_request_failed(&self, request_id: &str, reason: &str) {
        self.emit(NetworkEvent::request_failed(
            request_id,
            self.elapsed_ms(),
            reason,
        ));
    }

    /// Emit a loading-finished event stamped with the session clock.
    pub fn emit_loading_finished(&self, request_id: &str, bytes: u64) {
        self.emit(NetworkEvent::loading_finished(
            request_id,
            self.elapsed_ms(),
            bytes,
        ));
    }
}

impl NetworkEventSource for CdpSession {
    fn subscribe(&self) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Listener { id, sender });
        }
        debug!(listener_id = id, "network listener registered");
        Subscription {
            id,
            receiver,
            registry: Arc::clone(&self.listeners),
        }
    }
}

impl Default for CdpSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSession")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Real CDP bridge (when `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
mod cdp {
    use super::CdpSession;
    use crate::event::Headers;
    use crate::result::{JornadaError, JornadaResult};
    use chromiumoxide::cdp::browser_protocol::network::{
        EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
        EventResponseReceived,
    };
    use futures::StreamExt;

    /// Handles for the forwarding tasks attached to one page.
    ///
    /// Dropping the bridge leaves the tasks running until the page closes;
    /// call [`SessionBridge::detach`] to stop forwarding eagerly.
    #[derive(Debug)]
    pub struct SessionBridge {
        handles: Vec<tokio::task::JoinHandle<()>>,
    }

    impl SessionBridge {
        /// Stop forwarding events into the session.
        pub fn detach(self) {
            for handle in self.handles {
                handle.abort();
            }
        }
    }

    fn headers_from_cdp(value: &serde_json::Value) -> Headers {
        value
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let v = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                        (k.clone(), v)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    impl CdpSession {
        /// Attach this session to a page.
        ///
        /// Enables the Network domain and spawns one forwarding task per
        /// event kind; each forwards the protocol event into the session
        /// stamped with the session clock.
        pub async fn attach_page(&self, page: &chromiumoxide::Page) -> JornadaResult<SessionBridge> {
            page.execute(EnableParams::default())
                .await
                .map_err(|e| JornadaError::PageError {
                    message: e.to_string(),
                })?;

            let mut handles = Vec::with_capacity(4);

            let mut stream = page
                .event_listener::<EventRequestWillBeSent>()
                .await
                .map_err(|e| JornadaError::PageError {
                    message: e.to_string(),
                })?;
            let session = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(ev) = stream.next().await {
                    session.emit_request_sent(
                        ev.request_id.inner(),
                        &ev.request.url,
                        &ev.request.method,
                        headers_from_cdp(ev.request.headers.inner()),
                    );
                }
            }));

            let mut stream = page
                .event_listener::<EventResponseReceived>()
                .await
                .map_err(|e| JornadaError::PageError {
                    message: e.to_string(),
                })?;
            let session = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(ev) = stream.next().await {
                    session.emit_response_received(
                        ev.request_id.inner(),
                        u16::try_from(ev.response.status).unwrap_or(0),
                        headers_from_cdp(ev.response.headers.inner()),
                    );
                }
            }));

            let mut stream = page
                .event_listener::<EventLoadingFailed>()
                .await
                .map_err(|e| JornadaError::PageError {
                    message: e.to_string(),
                })?;
            let session = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(ev) = stream.next().await {
                    session.emit_request_failed(ev.request_id.inner(), &ev.error_text);
                }
            }));

            let mut stream = page
                .event_listener::<EventLoadingFinished>()
                .await
                .map_err(|e| JornadaError::PageError {
                    message: e.to_string(),
                })?;
            let session = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(ev) = stream.next().await {
                    let bytes = if ev.encoded_data_length.is_sign_negative() {
                        0
                    } else {
                        ev.encoded_data_length as u64
                    };
                    session.emit_loading_finished(ev.request_id.inner(), bytes);
                }
            }));

            Ok(SessionBridge { handles })
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::SessionBridge;
