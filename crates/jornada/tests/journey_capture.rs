//! End-to-end journey tests for the capture harness.
//!
//! These drive the public surface the way a test author would: begin a
//! journey, let the page produce traffic, finish, and assert against the
//! report.

use jornada::{Headers, Journey, JourneyConfig, RequestOutcome};

// ============================================================================
// Journey Lifecycle
// ============================================================================

#[test]
fn test_journey_captures_page_traffic() {
    jornada::init_test_tracing();

    let journey = Journey::begin(JourneyConfig::default()).unwrap();
    let session = journey.session();

    // Traffic a page load would produce: document, stylesheet, one failure.
    session.emit_request_sent("doc-1", "https://playwright.dev/", "GET", Headers::new());
    session.emit_response_received("doc-1", 200, Headers::new());
    session.emit_loading_finished("doc-1", 48_211);
    session.emit_request_sent("css-2", "https://playwright.dev/site.css", "GET", Headers::new());
    session.emit_response_received("css-2", 200, Headers::new());
    session.emit_loading_finished("css-2", 9_004);
    session.emit_request_sent("img-3", "https://playwright.dev/logo.png", "GET", Headers::new());
    session.emit_request_failed("img-3", "net::ERR_ABORTED");

    let report = journey.finish().unwrap().expect("capture enabled");

    assert_eq!(report.len(), 3);
    assert_eq!(report.completed().len(), 2);
    assert_eq!(report.failed().len(), 1);

    let doc = report.find_by_url("https://playwright.dev/").unwrap();
    assert_eq!(doc.status, Some(200));
    assert_eq!(doc.outcome, Some(RequestOutcome::Completed));

    let img = report.get("img-3").unwrap();
    assert_eq!(img.failure_reason.as_deref(), Some("net::ERR_ABORTED"));
}

#[test]
fn test_journey_with_capture_disabled_yields_no_report() {
    let journey = Journey::begin(JourneyConfig::new().with_network(false)).unwrap();

    journey
        .session()
        .emit_request_sent("1", "https://x/a", "GET", Headers::new());

    assert!(journey.finish().unwrap().is_none());
}

#[test]
fn test_request_still_in_flight_at_finish_is_aborted() {
    let journey = Journey::begin(JourneyConfig::default()).unwrap();

    journey
        .session()
        .emit_request_sent("slow-1", "https://x/slow", "GET", Headers::new());

    let report = journey.finish().unwrap().unwrap();
    assert_eq!(
        report.get("slow-1").unwrap().outcome,
        Some(RequestOutcome::Aborted)
    );
}

#[test]
fn test_out_of_order_response_does_not_fail_the_journey() {
    let journey = Journey::begin(JourneyConfig::default()).unwrap();

    // Redirect-style delivery: response observed with no prior request.
    journey
        .session()
        .emit_response_received("9", 304, Headers::new());

    let report = journey.finish().unwrap().unwrap();
    let record = report.get("9").unwrap();
    assert_eq!(record.status, Some(304));
    assert!(record.synthesized);
}

// ============================================================================
// Report Output
// ============================================================================

#[test]
fn test_report_serializes_for_attachment() {
    let journey = Journey::begin(JourneyConfig::default()).unwrap();
    journey
        .session()
        .emit_request_sent("1", "https://x/a", "GET", Headers::new());
    journey.session().emit_loading_finished("1", 512);

    let report = journey.finish().unwrap().unwrap();
    let json = report.to_json().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["records"][0]["request_id"], "1");
    assert_eq!(value["records"][0]["outcome"], "Completed");
}

// ============================================================================
// Page Journey (mock browser)
// ============================================================================

#[cfg(not(feature = "browser"))]
mod page_journeys {
    use super::*;
    use jornada::{Browser, BrowserConfig};

    #[test]
    fn test_page_journey_with_capture() {
        let browser = Browser::launch(BrowserConfig::default()).unwrap();
        let mut page = browser.new_page().unwrap();
        let journey = Journey::begin(JourneyConfig::default()).unwrap();

        page.goto("https://playwright.dev/").unwrap();
        assert_eq!(page.current_url(), "https://playwright.dev/");

        // The mock page produces no real traffic; the session observes what
        // the navigation would have emitted.
        journey.session().emit_request_sent(
            "doc-1",
            "https://playwright.dev/",
            "GET",
            Headers::new(),
        );
        journey
            .session()
            .emit_response_received("doc-1", 200, Headers::new());
        journey.session().emit_loading_finished("doc-1", 1_024);

        let report = journey.finish().unwrap().unwrap();
        browser.close().unwrap();

        assert_eq!(report.len(), 1);
        assert!(report.find_by_url("https://playwright.dev/").is_some());
    }

    #[test]
    fn test_headful_config_reaches_the_browser() {
        let config = BrowserConfig::default().with_headless(false);
        let browser = Browser::launch(config).unwrap();
        assert!(!browser.config().headless);
        browser.close().unwrap();
    }
}
