//! Per-test network capture.
//!
//! A [`NetworkManager`] observes one browser debugging session for the
//! duration of a test and produces a structurally complete, time-ordered
//! account of every HTTP-level network operation the page performed.
//!
//! Correlation tolerates protocol misbehavior: duplicate identifiers and
//! events for unknown or already-finalized requests are absorbed and
//! logged, never surfaced as failures. A flaky instrumentation layer must
//! not fail the test itself; only `start`/`stop` lifecycle misuse is fatal.

use crate::event::{Headers, NetworkEvent};
use crate::result::{JornadaError, JornadaResult};
use crate::session::{NetworkEventSource, Subscription};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Final outcome of one network request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOutcome {
    /// The response body finished loading
    Completed,
    /// The request failed before completing
    Failed,
    /// No terminal event arrived before capture stopped
    Aborted,
}

/// Correlated state for one network request across its lifetime.
///
/// Created when the first event for an identifier arrives, mutated in
/// place as correlated events follow, immutable once the outcome is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Request identifier, unique within one report
    pub request_id: String,
    /// Request URL (empty on synthesized records until a `RequestSent` merges in)
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Request headers
    pub request_headers: Headers,
    /// Response status code, absent if the request failed before a response
    pub status: Option<u16>,
    /// Response headers, absent until a response arrives
    pub response_headers: Option<Headers>,
    /// Final outcome, `None` while the request is in flight
    pub outcome: Option<RequestOutcome>,
    /// Failure reason (e.g. `net::ERR_ABORTED`)
    pub failure_reason: Option<String>,
    /// Milliseconds since session start when the request was first seen
    pub started_ms: u64,
    /// Milliseconds since session start when a terminal event arrived
    pub finished_ms: Option<u64>,
    /// Encoded response size in bytes
    pub bytes: Option<u64>,
    /// Record was created from an out-of-order non-`RequestSent` event
    pub synthesized: bool,
}

impl RequestRecord {
    fn new(
        request_id: String,
        url: String,
        method: String,
        request_headers: Headers,
        started_ms: u64,
    ) -> Self {
        Self {
            request_id,
            url,
            method,
            request_headers,
            status: None,
            response_headers: None,
            outcome: None,
            failure_reason: None,
            started_ms,
            finished_ms: None,
            bytes: None,
            synthesized: false,
        }
    }

    fn synthesized(request_id: String, started_ms: u64) -> Self {
        let mut record = Self::new(request_id, String::new(), String::new(), Headers::new(), started_ms);
        record.synthesized = true;
        record
    }

    /// Whether a terminal outcome has been recorded
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.outcome.is_some()
    }

    /// Whether the request completed normally
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == Some(RequestOutcome::Completed)
    }

    /// Whether the request failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.outcome == Some(RequestOutcome::Failed)
    }

    /// Whether capture stopped before the request finished
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.outcome == Some(RequestOutcome::Aborted)
    }

    fn finalize(&mut self, outcome: RequestOutcome, timestamp_ms: u64) {
        self.outcome = Some(outcome);
        // Clamp so Completed/Failed records keep end >= start even when
        // event timestamps arrive skewed.
        self.finished_ms = Some(timestamp_ms.max(self.started_ms));
    }
}

/// The finalized, ordered account of one capture.
///
/// Record order is first-seen order of each request identifier. The report
/// is a snapshot: constructed once at stop time, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    records: Vec<RequestRecord>,
}

impl NetworkReport {
    fn new(records: Vec<RequestRecord>) -> Self {
        Self { records }
    }

    /// Number of records in the report
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the report contains no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, in first-seen order
    #[must_use]
    pub fn records(&self) -> &[RequestRecord] {
        &self.records
    }

    /// Look up a record by request identifier
    #[must_use]
    pub fn get(&self, request_id: &str) -> Option<&RequestRecord> {
        self.records.iter().find(|r| r.request_id == request_id)
    }

    /// Find the first record matching a URL
    #[must_use]
    pub fn find_by_url(&self, url: &str) -> Option<&RequestRecord> {
        self.records.iter().find(|r| r.url == url)
    }

    /// Records that completed normally
    #[must_use]
    pub fn completed(&self) -> Vec<&RequestRecord> {
        self.records.iter().filter(|r| r.is_completed()).collect()
    }

    /// Records that failed
    #[must_use]
    pub fn failed(&self) -> Vec<&RequestRecord> {
        self.records.iter().filter(|r| r.is_failed()).collect()
    }

    /// Records still in flight when capture stopped
    #[must_use]
    pub fn aborted(&self) -> Vec<&RequestRecord> {
        self.records.iter().filter(|r| r.is_aborted()).collect()
    }

    /// Serialize the report to pretty JSON
    pub fn to_json(&self) -> JornadaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// In-progress capture state: the subscription plus the identifier map.
struct Capture {
    subscription: Subscription,
    records: Vec<RequestRecord>,
    index: HashMap<String, usize>,
}

impl Capture {
    fn insert(&mut self, record: RequestRecord) {
        self.index
            .insert(record.request_id.clone(), self.records.len());
        self.records.push(record);
    }

    /// Record for `request_id`, synthesizing one if the identifier is
    /// unknown. Browser debugging protocols can deliver response events
    /// out of order around redirects; the harness must not crash on them.
    fn entry(&mut self, request_id: &str, timestamp_ms: u64, anomalies: &mut u64) -> &mut RequestRecord {
        if !self.index.contains_key(request_id) {
            *anomalies += 1;
            warn!(request_id, "event for unknown request id, synthesizing record");
            self.insert(RequestRecord::synthesized(
                request_id.to_string(),
                timestamp_ms,
            ));
        }
        let i = self.index[request_id];
        &mut self.records[i]
    }

    fn absorb(&mut self, event: NetworkEvent, anomalies: &mut u64) {
        match event {
            NetworkEvent::RequestSent {
                request_id,
                timestamp_ms,
                url,
                method,
                headers,
            } => {
                if let Some(&i) = self.index.get(&request_id) {
                    *anomalies += 1;
                    let record = &mut self.records[i];
                    if record.is_finalized() {
                        // Re-keying a finalized id would break report
                        // uniqueness; drop the event instead.
                        warn!(request_id = %request_id, "request id reused after finalization, dropping event");
                    } else {
                        warn!(request_id = %request_id, "duplicate request id, merging");
                        if record.synthesized {
                            record.url = url;
                            record.method = method;
                            record.request_headers = headers;
                            record.synthesized = false;
                        }
                    }
                } else {
                    self.insert(RequestRecord::new(
                        request_id,
                        url,
                        method,
                        headers,
                        timestamp_ms,
                    ));
                }
            }
            NetworkEvent::ResponseReceived {
                request_id,
                timestamp_ms,
                status,
                headers,
            } => {
                let record = self.entry(&request_id, timestamp_ms, anomalies);
                if record.is_finalized() {
                    *anomalies += 1;
                    warn!(request_id = %request_id, "response for finalized request, dropping event");
                    return;
                }
                record.status = Some(status);
                record.response_headers = Some(headers);
            }
            NetworkEvent::LoadingFinished {
                request_id,
                timestamp_ms,
                bytes,
            } => {
                let record = self.entry(&request_id, timestamp_ms, anomalies);
                if record.is_finalized() {
                    *anomalies += 1;
                    warn!(request_id = %request_id, "terminal event for finalized request, dropping event");
                    return;
                }
                record.bytes = Some(bytes);
                record.finalize(RequestOutcome::Completed, timestamp_ms);
            }
            NetworkEvent::RequestFailed {
                request_id,
                timestamp_ms,
                reason,
            } => {
                let record = self.entry(&request_id, timestamp_ms, anomalies);
                if record.is_finalized() {
                    *anomalies += 1;
                    warn!(request_id = %request_id, "terminal event for finalized request, dropping event");
                    return;
                }
                record.failure_reason = Some(reason);
                record.finalize(RequestOutcome::Failed, timestamp_ms);
            }
        }
    }
}

enum CaptureState {
    Idle,
    Capturing(Capture),
    Finished,
}

impl CaptureState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing(_) => "capturing",
            Self::Finished => "finished",
        }
    }
}

/// Observes one debugging session per test and reports its network activity.
///
/// One instance per test execution; one report per lifecycle. `start`
/// before the test body runs, `stop` after it completes, never interleaved.
///
/// # Example
///
/// ```
/// use jornada::{CdpSession, Headers, NetworkManager};
///
/// let session = CdpSession::new();
/// let mut manager = NetworkManager::new();
/// manager.start(&session)?;
///
/// session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
/// session.emit_response_received("1", 200, Headers::new());
/// session.emit_loading_finished("1", 512);
///
/// let report = manager.stop()?;
/// assert_eq!(report.len(), 1);
/// # Ok::<(), jornada::JornadaError>(())
/// ```
pub struct NetworkManager {
    state: CaptureState,
    anomalies: u64,
}

impl NetworkManager {
    /// Create a new, idle manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            anomalies: 0,
        }
    }

    /// Whether a capture is currently running.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing(_))
    }

    /// Protocol anomalies absorbed so far (duplicate identifiers, events
    /// for unknown or finalized requests). Informational only.
    #[must_use]
    pub fn anomaly_count(&self) -> u64 {
        self.anomalies
    }

    /// Begin observing a session.
    ///
    /// Registers one listener covering all four network event kinds and
    /// returns immediately; delivery is asynchronous.
    ///
    /// # Errors
    ///
    /// [`JornadaError::AlreadyStarted`] if this instance was started
    /// before. An instance produces one report per lifecycle; use a fresh
    /// manager for a fresh capture.
    pub fn start(&mut self, session: &impl NetworkEventSource) -> JornadaResult<()> {
        if !matches!(self.state, CaptureState::Idle) {
            return Err(JornadaError::AlreadyStarted);
        }
        let subscription = session.subscribe();
        debug!("network capture started");
        self.state = CaptureState::Capturing(Capture {
            subscription,
            records: Vec::new(),
            index: HashMap::new(),
        });
        Ok(())
    }

    /// Stop observing and return the report.
    ///
    /// The listener is deregistered first, so events emitted after this
    /// call begins are dropped; events queued before it are incorporated
    /// (last-write-before-snapshot). Records with no terminal event are
    /// finalized as [`RequestOutcome::Aborted`].
    ///
    /// # Errors
    ///
    /// [`JornadaError::NotStarted`] if no capture is running: `start` was
    /// never called, or the one report was already produced.
    pub fn stop(&mut self) -> JornadaResult<NetworkReport> {
        match std::mem::replace(&mut self.state, CaptureState::Finished) {
            CaptureState::Capturing(mut capture) => {
                capture.subscription.cancel();
                while let Some(event) = capture.subscription.try_next() {
                    capture.absorb(event, &mut self.anomalies);
                }

                let mut records = capture.records;
                for record in &mut records {
                    if record.outcome.is_none() {
                        record.outcome = Some(RequestOutcome::Aborted);
                    }
                }
                debug!(
                    requests = records.len(),
                    anomalies = self.anomalies,
                    "network capture stopped"
                );
                Ok(NetworkReport::new(records))
            }
            other => {
                self.state = other;
                Err(JornadaError::NotStarted)
            }
        }
    }
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("state", &self.state.name())
            .field("anomalies", &self.anomalies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CdpSession;
    use proptest::prelude::*;

    fn started() -> (CdpSession, NetworkManager) {
        let session = CdpSession::new();
        let mut manager = NetworkManager::new();
        manager.start(&session).unwrap();
        (session, manager)
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_stop_before_start_fails() {
            let mut manager = NetworkManager::new();
            assert!(matches!(manager.stop(), Err(JornadaError::NotStarted)));
        }

        #[test]
        fn test_start_twice_fails() {
            let (session, mut manager) = started();
            assert!(matches!(
                manager.start(&session),
                Err(JornadaError::AlreadyStarted)
            ));
        }

        #[test]
        fn test_second_stop_fails() {
            let (_session, mut manager) = started();
            manager.stop().unwrap();
            assert!(matches!(manager.stop(), Err(JornadaError::NotStarted)));
        }

        #[test]
        fn test_start_after_stop_fails() {
            let (session, mut manager) = started();
            manager.stop().unwrap();
            assert!(matches!(
                manager.start(&session),
                Err(JornadaError::AlreadyStarted)
            ));
        }

        #[test]
        fn test_failed_stop_leaves_idle_manager_startable() {
            let session = CdpSession::new();
            let mut manager = NetworkManager::new();
            assert!(manager.stop().is_err());
            assert!(manager.start(&session).is_ok());
        }

        #[test]
        fn test_is_capturing_transitions() {
            let session = CdpSession::new();
            let mut manager = NetworkManager::new();
            assert!(!manager.is_capturing());
            manager.start(&session).unwrap();
            assert!(manager.is_capturing());
            manager.stop().unwrap();
            assert!(!manager.is_capturing());
        }

        #[test]
        fn test_stop_deregisters_listener() {
            let (session, mut manager) = started();
            assert_eq!(session.listener_count(), 1);
            manager.stop().unwrap();
            assert_eq!(session.listener_count(), 0);
        }
    }

    mod correlation_tests {
        use super::*;

        #[test]
        fn test_completed_request() {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
            session.emit_response_received("1", 200, Headers::new());
            session.emit_loading_finished("1", 512);

            let report = manager.stop().unwrap();
            assert_eq!(report.len(), 1);
            let record = report.get("1").unwrap();
            assert_eq!(record.url, "https://x/a");
            assert_eq!(record.method, "GET");
            assert_eq!(record.status, Some(200));
            assert_eq!(record.bytes, Some(512));
            assert!(record.is_completed());
            assert!(record.finished_ms.unwrap() >= record.started_ms);
        }

        #[test]
        fn test_failed_request() {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
            session.emit_request_failed("1", "net::ERR_ABORTED");

            let report = manager.stop().unwrap();
            let record = report.get("1").unwrap();
            assert!(record.is_failed());
            assert_eq!(record.failure_reason.as_deref(), Some("net::ERR_ABORTED"));
            assert!(record.status.is_none());
            assert!(record.finished_ms.is_some());
        }

        #[test]
        fn test_in_flight_request_is_aborted_at_stop() {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());

            let report = manager.stop().unwrap();
            let record = report.get("1").unwrap();
            assert!(record.is_aborted());
            assert!(record.finished_ms.is_none());
        }

        #[test]
        fn test_orphan_response_synthesizes_record() {
            let (session, mut manager) = started();
            session.emit_response_received("9", 304, Headers::new());

            let report = manager.stop().unwrap();
            assert_eq!(report.len(), 1);
            let record = report.get("9").unwrap();
            assert_eq!(record.status, Some(304));
            assert!(record.synthesized);
            assert_eq!(manager.anomaly_count(), 1);
        }

        #[test]
        fn test_late_request_sent_merges_into_synthesized_record() {
            let (session, mut manager) = started();
            session.emit_response_received("7", 200, Headers::new());
            session.emit_request_sent("7", "https://x/late", "POST", Headers::new());

            let report = manager.stop().unwrap();
            assert_eq!(report.len(), 1);
            let record = report.get("7").unwrap();
            assert_eq!(record.url, "https://x/late");
            assert_eq!(record.method, "POST");
            assert_eq!(record.status, Some(200));
            assert!(!record.synthesized);
        }

        #[test]
        fn test_duplicate_request_sent_keeps_first_record() {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
            session.emit_request_sent("1", "https://x/other", "POST", Headers::new());

            let report = manager.stop().unwrap();
            assert_eq!(report.len(), 1);
            let record = report.get("1").unwrap();
            assert_eq!(record.url, "https://x/a");
            assert_eq!(record.method, "GET");
            assert_eq!(manager.anomaly_count(), 1);
        }

        #[test]
        fn test_request_sent_after_finalization_is_dropped() {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
            session.emit_loading_finished("1", 100);
            session.emit_request_sent("1", "https://x/reused", "GET", Headers::new());

            let report = manager.stop().unwrap();
            assert_eq!(report.len(), 1);
            let record = report.get("1").unwrap();
            assert_eq!(record.url, "https://x/a");
            assert!(record.is_completed());
            assert_eq!(manager.anomaly_count(), 1);
        }

        #[test]
        fn test_terminal_event_after_finalization_is_dropped() {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
            session.emit_request_failed("1", "net::ERR_FAILED");
            session.emit_loading_finished("1", 64);

            let report = manager.stop().unwrap();
            let record = report.get("1").unwrap();
            assert!(record.is_failed());
            assert!(record.bytes.is_none());
            assert_eq!(manager.anomaly_count(), 1);
        }

        #[test]
        fn test_skewed_terminal_timestamp_is_clamped() {
            let session = CdpSession::new();
            let mut manager = NetworkManager::new();
            manager.start(&session).unwrap();

            session.emit(NetworkEvent::request_sent(
                "1",
                100,
                "https://x/a",
                "GET",
                Headers::new(),
            ));
            session.emit(NetworkEvent::loading_finished("1", 40, 8));

            let report = manager.stop().unwrap();
            let record = report.get("1").unwrap();
            assert_eq!(record.started_ms, 100);
            assert_eq!(record.finished_ms, Some(100));
        }

        #[test]
        fn test_records_keep_first_seen_order() {
            let (session, mut manager) = started();
            session.emit_request_sent("b", "https://x/b", "GET", Headers::new());
            session.emit_request_sent("a", "https://x/a", "GET", Headers::new());
            session.emit_request_sent("c", "https://x/c", "GET", Headers::new());

            let report = manager.stop().unwrap();
            let ids: Vec<&str> = report
                .records()
                .iter()
                .map(|r| r.request_id.as_str())
                .collect();
            assert_eq!(ids, vec!["b", "a", "c"]);
        }

        #[test]
        fn test_events_queued_before_stop_are_incorporated() {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
            session.emit_loading_finished("1", 32);

            // Nothing has been drained yet; stop picks the queue up whole.
            let report = manager.stop().unwrap();
            assert!(report.get("1").unwrap().is_completed());
        }

        #[test]
        fn test_events_emitted_after_stop_are_dropped() {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
            let report = manager.stop().unwrap();

            session.emit_request_sent("2", "https://x/b", "GET", Headers::new());
            assert_eq!(report.len(), 1);
            assert!(report.get("2").is_none());
        }
    }

    mod report_tests {
        use super::*;

        fn sample_report() -> NetworkReport {
            let (session, mut manager) = started();
            session.emit_request_sent("1", "https://x/a", "GET", Headers::new());
            session.emit_response_received("1", 200, Headers::new());
            session.emit_loading_finished("1", 512);
            session.emit_request_sent("2", "https://x/b", "GET", Headers::new());
            session.emit_request_failed("2", "net::ERR_ABORTED");
            session.emit_request_sent("3", "https://x/c", "GET", Headers::new());
            manager.stop().unwrap()
        }

        #[test]
        fn test_outcome_partitions() {
            let report = sample_report();
            assert_eq!(report.len(), 3);
            assert!(!report.is_empty());
            assert_eq!(report.completed().len(), 1);
            assert_eq!(report.failed().len(), 1);
            assert_eq!(report.aborted().len(), 1);
        }

        #[test]
        fn test_find_by_url() {
            let report = sample_report();
            let record = report.find_by_url("https://x/b").unwrap();
            assert_eq!(record.request_id, "2");
            assert!(report.find_by_url("https://x/missing").is_none());
        }

        #[test]
        fn test_to_json_round_trip() {
            let report = sample_report();
            let json = report.to_json().unwrap();
            let back: NetworkReport = serde_json::from_str(&json).unwrap();
            assert_eq!(back, report);
        }

        #[test]
        fn test_empty_capture_yields_empty_report() {
            let (_session, mut manager) = started();
            let report = manager.stop().unwrap();
            assert!(report.is_empty());
        }
    }

    mod property_tests {
        use super::*;
        use std::collections::HashSet;

        proptest! {
            #[test]
            fn report_has_exactly_one_record_per_identifier(
                events in proptest::collection::vec((0u8..4, 0u8..8), 0..64)
            ) {
                let session = CdpSession::new();
                let mut manager = NetworkManager::new();
                manager.start(&session).unwrap();

                let mut seen = HashSet::new();
                for (kind, id) in events {
                    let id = format!("req-{id}");
                    seen.insert(id.clone());
                    match kind {
                        0 => session.emit_request_sent(&id, "https://example.com/", "GET", Headers::new()),
                        1 => session.emit_response_received(&id, 200, Headers::new()),
                        2 => session.emit_loading_finished(&id, 128),
                        _ => session.emit_request_failed(&id, "net::ERR_FAILED"),
                    }
                }

                let report = manager.stop().unwrap();
                prop_assert_eq!(report.len(), seen.len());

                let mut ids = HashSet::new();
                for record in report.records() {
                    prop_assert!(ids.insert(record.request_id.clone()));
                    prop_assert!(record.outcome.is_some());
                    if record.is_completed() {
                        prop_assert!(record.finished_ms.unwrap() >= record.started_ms);
                    }
                }
            }
        }
    }
}
