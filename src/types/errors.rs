use std::fmt;

// === ParseError ===

/// Errors raised while reading a script's metadata header.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// No start marker line was found.
    MissingStartMarker,
    /// A start marker was found but no end marker follows it.
    MissingEndMarker,
    /// The end marker appears before or on the start marker line.
    MarkersOutOfOrder,
    /// The compact block does not contain a valid JSON object.
    InvalidJson(String),
    /// A directive value has the wrong shape.
    InvalidDirective(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingStartMarker => write!(f, "Metadata start marker not found"),
            ParseError::MissingEndMarker => write!(f, "Metadata end marker not found"),
            ParseError::MarkersOutOfOrder => {
                write!(f, "Metadata end marker precedes start marker")
            }
            ParseError::InvalidJson(msg) => write!(f, "Invalid metadata JSON: {}", msg),
            ParseError::InvalidDirective(msg) => write!(f, "Invalid metadata directive: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

// === MatchError ===

/// Errors related to URL pattern compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    /// The pattern could not be turned into a matcher.
    InvalidPattern { pattern: String, reason: String },
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid URL pattern '{}': {}", pattern, reason)
            }
        }
    }
}

impl std::error::Error for MatchError {}

// === InjectionError ===

/// Errors produced by a single injection strategy attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectionError {
    /// The strategy ran but reported failure.
    StrategyFailed { strategy: String, reason: String },
    /// The strategy did not finish within its deadline.
    Timeout { strategy: String, timeout_ms: u64 },
    /// Nonce injection found no nonce on the page.
    NonceUnavailable,
    /// The host refused or failed to evaluate code.
    Host(String),
    /// The target frame cannot receive scripts.
    UnsupportedFrame(String),
}

impl fmt::Display for InjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionError::StrategyFailed { strategy, reason } => {
                write!(f, "Strategy {} failed: {}", strategy, reason)
            }
            InjectionError::Timeout { strategy, timeout_ms } => {
                write!(f, "Strategy {} timed out after {}ms", strategy, timeout_ms)
            }
            InjectionError::NonceUnavailable => write!(f, "No CSP nonce available on page"),
            InjectionError::Host(msg) => write!(f, "Host injection error: {}", msg),
            InjectionError::UnsupportedFrame(msg) => write!(f, "Unsupported frame: {}", msg),
        }
    }
}

impl std::error::Error for InjectionError {}

// === DetectionError ===

/// Errors related to security probing of a page.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// An individual probe failed.
    ProbeFailed { probe: String, reason: String },
    /// Analysis exceeded its deadline.
    Timeout(u64),
    /// A probe returned data of an unexpected shape.
    InvalidResponse(String),
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionError::ProbeFailed { probe, reason } => {
                write!(f, "Security probe {} failed: {}", probe, reason)
            }
            DetectionError::Timeout(ms) => write!(f, "Security analysis timed out after {}ms", ms),
            DetectionError::InvalidResponse(msg) => {
                write!(f, "Invalid security probe response: {}", msg)
            }
        }
    }
}

impl std::error::Error for DetectionError {}

// === StoreError ===

/// Errors related to script persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Script with the given ID was not found.
    NotFound(String),
    /// Database operation failed.
    DatabaseError(String),
    /// Failed to serialize or deserialize stored data.
    SerializationError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Script not found: {}", id),
            StoreError::DatabaseError(msg) => write!(f, "Script database error: {}", msg),
            StoreError::SerializationError(msg) => {
                write!(f, "Script serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for StoreError {}

// === HostError ===

/// Errors reported by the host platform.
#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    /// No host is attached or the capability is missing.
    Unavailable(String),
    /// Code evaluation failed inside the target context.
    ExecutionFailed(String),
    /// The frame no longer exists.
    FrameGone { tab_id: i64, frame_id: i64 },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Unavailable(msg) => write!(f, "Host unavailable: {}", msg),
            HostError::ExecutionFailed(msg) => write!(f, "Host execution failed: {}", msg),
            HostError::FrameGone { tab_id, frame_id } => {
                write!(f, "Frame {} of tab {} is gone", frame_id, tab_id)
            }
        }
    }
}

impl std::error::Error for HostError {}

// === BridgeError ===

/// Errors related to the page/manager message channel.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// No response arrived before the deadline.
    Timeout(String),
    /// The bridge was shut down while the request was pending.
    Closed,
    /// The message could not be decoded.
    InvalidMessage(String),
    /// Delivering the message through the host failed.
    Host(String),
    /// The handler rejected the request.
    Handler(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Timeout(what) => write!(f, "Bridge request timed out: {}", what),
            BridgeError::Closed => write!(f, "Bridge closed"),
            BridgeError::InvalidMessage(msg) => write!(f, "Invalid bridge message: {}", msg),
            BridgeError::Host(msg) => write!(f, "Bridge host error: {}", msg),
            BridgeError::Handler(msg) => write!(f, "Bridge handler error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

// === DependencyError ===

/// Errors related to fetching `@require` and `@resource` dependencies.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyError {
    /// A network error occurred during the fetch.
    Network(String),
    /// The body does not match the integrity hash in the URL fragment.
    IntegrityMismatch { url: String },
    /// The body exceeds the configured size limit.
    TooLarge { url: String, bytes: u64 },
    /// Reading or writing the dependency cache failed.
    Cache(String),
}

impl fmt::Display for DependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyError::Network(msg) => write!(f, "Dependency network error: {}", msg),
            DependencyError::IntegrityMismatch { url } => {
                write!(f, "Dependency integrity mismatch: {}", url)
            }
            DependencyError::TooLarge { url, bytes } => {
                write!(f, "Dependency too large ({} bytes): {}", bytes, url)
            }
            DependencyError::Cache(msg) => write!(f, "Dependency cache error: {}", msg),
        }
    }
}

impl std::error::Error for DependencyError {}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}
