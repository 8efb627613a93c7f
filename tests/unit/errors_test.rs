use scriptbridge::types::errors::*;

// === ParseError Tests ===

#[test]
fn parse_error_display_variants() {
    assert_eq!(ParseError::MissingStartMarker.to_string(), "Metadata start marker not found");
    assert_eq!(ParseError::MissingEndMarker.to_string(), "Metadata end marker not found");
    assert_eq!(
        ParseError::MarkersOutOfOrder.to_string(),
        "Metadata end marker precedes start marker"
    );
    assert_eq!(
        ParseError::InvalidJson("expected value".to_string()).to_string(),
        "Invalid metadata JSON: expected value"
    );
    assert_eq!(
        ParseError::InvalidDirective("@".to_string()).to_string(),
        "Invalid metadata directive: @"
    );
}

#[test]
fn parse_error_implements_error_trait() {
    let err: Box<dyn std::error::Error> = Box::new(ParseError::MissingStartMarker);
    assert!(err.source().is_none());
}

// === MatchError Tests ===

#[test]
fn match_error_names_pattern_and_reason() {
    let err = MatchError::InvalidPattern {
        pattern: "/(/".to_string(),
        reason: "unclosed group".to_string(),
    };
    assert_eq!(err.to_string(), "Invalid URL pattern '/(/': unclosed group");
}

// === InjectionError Tests ===

#[test]
fn injection_error_display_variants() {
    assert_eq!(
        InjectionError::StrategyFailed {
            strategy: "blob_url".to_string(),
            reason: "blocked".to_string()
        }
        .to_string(),
        "Strategy blob_url failed: blocked"
    );
    assert_eq!(
        InjectionError::Timeout {
            strategy: "event_timed".to_string(),
            timeout_ms: 5000
        }
        .to_string(),
        "Strategy event_timed timed out after 5000ms"
    );
    assert_eq!(InjectionError::NonceUnavailable.to_string(), "No CSP nonce available on page");
    assert_eq!(
        InjectionError::Host("tab closed".to_string()).to_string(),
        "Host injection error: tab closed"
    );
    assert_eq!(
        InjectionError::UnsupportedFrame("about:blank".to_string()).to_string(),
        "Unsupported frame: about:blank"
    );
}

// === DetectionError Tests ===

#[test]
fn detection_error_display_variants() {
    assert_eq!(
        DetectionError::ProbeFailed {
            probe: "csp".to_string(),
            reason: "no document".to_string()
        }
        .to_string(),
        "Security probe csp failed: no document"
    );
    assert_eq!(
        DetectionError::Timeout(3000).to_string(),
        "Security analysis timed out after 3000ms"
    );
    assert_eq!(
        DetectionError::InvalidResponse("null".to_string()).to_string(),
        "Invalid security probe response: null"
    );
}

// === StoreError Tests ===

#[test]
fn store_error_display_variants() {
    assert_eq!(StoreError::NotFound("abc".to_string()).to_string(), "Script not found: abc");
    assert_eq!(
        StoreError::DatabaseError("locked".to_string()).to_string(),
        "Script database error: locked"
    );
    assert_eq!(
        StoreError::SerializationError("eof".to_string()).to_string(),
        "Script serialization error: eof"
    );
}

#[test]
fn store_error_implements_error_trait() {
    let err: Box<dyn std::error::Error> = Box::new(StoreError::NotFound("id".to_string()));
    assert!(err.source().is_none());
}

// === HostError Tests ===

#[test]
fn host_error_display_variants() {
    assert_eq!(
        HostError::Unavailable("detached".to_string()).to_string(),
        "Host unavailable: detached"
    );
    assert_eq!(
        HostError::ExecutionFailed("syntax".to_string()).to_string(),
        "Host execution failed: syntax"
    );
    assert_eq!(
        HostError::FrameGone { tab_id: 4, frame_id: 2 }.to_string(),
        "Frame 2 of tab 4 is gone"
    );
}

// === BridgeError Tests ===

#[test]
fn bridge_error_display_variants() {
    assert_eq!(
        BridgeError::Timeout("command 1".to_string()).to_string(),
        "Bridge request timed out: command 1"
    );
    assert_eq!(BridgeError::Closed.to_string(), "Bridge closed");
    assert_eq!(
        BridgeError::InvalidMessage("bad".to_string()).to_string(),
        "Invalid bridge message: bad"
    );
    assert_eq!(BridgeError::Host("gone".to_string()).to_string(), "Bridge host error: gone");
    assert_eq!(
        BridgeError::Handler("denied".to_string()).to_string(),
        "Bridge handler error: denied"
    );
}

// === DependencyError Tests ===

#[test]
fn dependency_error_display_variants() {
    assert_eq!(
        DependencyError::Network("refused".to_string()).to_string(),
        "Dependency network error: refused"
    );
    assert_eq!(
        DependencyError::IntegrityMismatch { url: "https://x/a.js".to_string() }.to_string(),
        "Dependency integrity mismatch: https://x/a.js"
    );
    assert_eq!(
        DependencyError::TooLarge { url: "https://x/a.js".to_string(), bytes: 10 }.to_string(),
        "Dependency too large (10 bytes): https://x/a.js"
    );
    assert_eq!(
        DependencyError::Cache("busy".to_string()).to_string(),
        "Dependency cache error: busy"
    );
}

// === SettingsError Tests ===

#[test]
fn settings_error_display_variants() {
    assert_eq!(
        SettingsError::IoError("denied".to_string()).to_string(),
        "Settings I/O error: denied"
    );
    assert_eq!(
        SettingsError::SerializationError("eof".to_string()).to_string(),
        "Settings serialization error: eof"
    );
    assert_eq!(
        SettingsError::InvalidKey("a.b".to_string()).to_string(),
        "Invalid settings key: a.b"
    );
    assert_eq!(
        SettingsError::InvalidValue("not a number".to_string()).to_string(),
        "Invalid settings value: not a number"
    );
}
