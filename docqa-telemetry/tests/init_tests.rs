use docqa_telemetry::{TelemetryError, init_json_telemetry, init_telemetry};

// Runs in its own process, so the global subscriber starts out unset.
#[tokio::test]
async fn second_initialisation_is_an_error() {
    init_telemetry("docqa-test").unwrap();
    tracing::info!(passage_count = 3, "after init");

    let again = init_telemetry("docqa-test");
    assert!(matches!(again, Err(TelemetryError::AlreadyInitialized(_))));

    let json = init_json_telemetry("docqa-test");
    assert!(matches!(json, Err(TelemetryError::AlreadyInitialized(_))));
}
