//! Network protocol event types.
//!
//! One `NetworkEvent` is emitted by the session adapter for each
//! observable step in a request's lifetime. Events are immutable once
//! emitted; correlation into per-request records happens downstream in
//! [`crate::NetworkManager`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP headers map type
pub type Headers = HashMap<String, String>;

/// A network event observed through the browser debugging session.
///
/// Every variant carries the request identifier (opaque, unique within one
/// session lifetime) and a timestamp in milliseconds since session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkEvent {
    /// The browser sent a request
    RequestSent {
        /// Request identifier
        request_id: String,
        /// Milliseconds since session start
        timestamp_ms: u64,
        /// Request URL
        url: String,
        /// HTTP method
        method: String,
        /// Request headers
        headers: Headers,
    },
    /// Response headers arrived for a request
    ResponseReceived {
        /// Request identifier
        request_id: String,
        /// Milliseconds since session start
        timestamp_ms: u64,
        /// HTTP status code
        status: u16,
        /// Response headers
        headers: Headers,
    },
    /// The request failed before completing
    RequestFailed {
        /// Request identifier
        request_id: String,
        /// Milliseconds since session start
        timestamp_ms: u64,
        /// Failure reason (e.g. `net::ERR_ABORTED`)
        reason: String,
    },
    /// The response body finished loading
    LoadingFinished {
        /// Request identifier
        request_id: String,
        /// Milliseconds since session start
        timestamp_ms: u64,
        /// Encoded body size in bytes
        bytes: u64,
    },
}

impl NetworkEvent {
    /// Create a request-sent event
    #[must_use]
    pub fn request_sent(
        request_id: impl Into<String>,
        timestamp_ms: u64,
        url: impl Into<String>,
        method: impl Into<String>,
        headers: Headers,
    ) -> Self {
        Self::RequestSent {
            request_id: request_id.into(),
            timestamp_ms,
            url: url.into(),
            method: method.into(),
            headers,
        }
    }

    /// Create a response-received event
    #[must_use]
    pub fn response_received(
        request_id: impl Into<String>,
        timestamp_ms: u64,
        status: u16,
        headers: Headers,
    ) -> Self {
        Self::ResponseReceived {
            request_id: request_id.into(),
            timestamp_ms,
            status,
            headers,
        }
    }

    /// Create a request-failed event
    #[must_use]
    pub fn request_failed(
        request_id: impl Into<String>,
        timestamp_ms: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self::RequestFailed {
            request_id: request_id.into(),
            timestamp_ms,
            reason: reason.into(),
        }
    }

    /// Create a loading-finished event
    #[must_use]
    pub fn loading_finished(request_id: impl Into<String>, timestamp_ms: u64, bytes: u64) -> Self {
        Self::LoadingFinished {
            request_id: request_id.into(),
            timestamp_ms,
            bytes,
        }
    }

    /// The request identifier this event belongs to
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::RequestSent { request_id, .. }
            | Self::ResponseReceived { request_id, .. }
            | Self::RequestFailed { request_id, .. }
            | Self::LoadingFinished { request_id, .. } => request_id,
        }
    }

    /// The event timestamp in milliseconds since session start
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::RequestSent { timestamp_ms, .. }
            | Self::ResponseReceived { timestamp_ms, .. }
            | Self::RequestFailed { timestamp_ms, .. }
            | Self::LoadingFinished { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// Whether this event terminates a request's lifetime
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::LoadingFinished { .. }
        )
    }
}
