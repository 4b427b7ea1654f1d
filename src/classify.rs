//! Error classification
//!
//! This module turns opaque failures into [`ClassifiedError`] records that the
//! recovery strategies dispatch on. Classification is the only place where
//! error messages are inspected: the message is sniffed once into a coarse
//! [`ErrorCategory`] and a structured [`FaultCode`], and strategies match on
//! those instead of on strings.
//!
//! # Examples
//!
//! ```
//! use recourse::{ErrorCategory, ErrorClassifier, FaultCode, HeuristicClassifier, Severity};
//!
//! let classified = HeuristicClassifier.classify(&"database connection refused");
//!
//! assert_eq!(classified.category(), ErrorCategory::Database);
//! assert_eq!(classified.fault(), FaultCode::ConnectionRefused);
//! assert_eq!(classified.severity(), Severity::High);
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Coarse kind of failure, used to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transport-level failure: unreachable host, timeout, dropped connection.
    Network,
    /// Failure reported by or while talking to the database.
    Database,
    /// Missing, expired or insufficient credentials.
    Auth,
    /// Input rejected by validation.
    Validation,
    /// Nothing more specific could be determined.
    Unknown,
}

impl ErrorCategory {
    /// The default severity for errors of this category.
    pub fn default_severity(self) -> Severity {
        match self {
            Self::Auth | Self::Database => Severity::High,
            Self::Network | Self::Unknown => Severity::Medium,
            Self::Validation => Severity::Low,
        }
    }

    /// Lowercase name, as used in logs and config.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Database => "database",
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failure is. Advisory only; no built-in strategy reads it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic or expected.
    Low,
    /// Degrades a feature.
    Medium,
    /// Breaks a feature.
    High,
    /// Breaks the application.
    Critical,
}

/// Structured description of what went wrong, attached at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCode {
    /// The operation took too long.
    Timeout,
    /// The peer refused or could not accept the connection.
    ConnectionRefused,
    /// An established connection was dropped.
    ConnectionReset,
    /// The peer reported a temporary failure (e.g. DNS `EAI_AGAIN`).
    TemporaryFailure,
    /// The peer is up but refusing work (HTTP 503 and friends).
    ServiceUnavailable,
    /// Generic network failure with no finer detail.
    NetworkUnreachable,
    /// A fetch-style request failed before a response arrived.
    FetchFailed,
    /// The session or token has expired.
    SessionExpired,
    /// The caller lacks permission.
    PermissionDenied,
    /// No recognizable fault.
    Unspecified,
}

impl FaultCode {
    /// Sniff a fault code out of a free-form error message.
    ///
    /// More specific patterns win over generic ones, so
    /// `"connection reset"` is a reset and not a refusal.
    ///
    /// ```
    /// use recourse::FaultCode;
    ///
    /// assert_eq!(FaultCode::sniff("Request TIMEOUT"), FaultCode::Timeout);
    /// assert_eq!(FaultCode::sniff("ECONNRESET"), FaultCode::ConnectionReset);
    /// assert_eq!(FaultCode::sniff("jwt expired"), FaultCode::SessionExpired);
    /// assert_eq!(FaultCode::sniff("bad input"), FaultCode::Unspecified);
    /// ```
    pub fn sniff(message: &str) -> Self {
        let message = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if has(&["connection reset", "econnreset"]) {
            Self::ConnectionReset
        } else if has(&["temporary failure", "eai_again"]) {
            Self::TemporaryFailure
        } else if has(&["service unavailable", "503"]) {
            Self::ServiceUnavailable
        } else if has(&["timeout", "timed out", "etimedout"]) {
            Self::Timeout
        } else if has(&["econnrefused", "connection", "connect"]) {
            Self::ConnectionRefused
        } else if has(&["failed to fetch", "fetch"]) {
            Self::FetchFailed
        } else if has(&["network"]) {
            Self::NetworkUnreachable
        } else if has(&["expired", "session", "token"]) {
            Self::SessionExpired
        } else if has(&["permission", "forbidden", "access denied", "not allowed"]) {
            Self::PermissionDenied
        } else {
            Self::Unspecified
        }
    }

    /// Whether this fault is a transport-level failure.
    pub fn is_network(self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ConnectionRefused
                | Self::ConnectionReset
                | Self::TemporaryFailure
                | Self::ServiceUnavailable
                | Self::NetworkUnreachable
                | Self::FetchFailed
        )
    }

    /// Whether this fault usually clears up on its own.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ConnectionReset
                | Self::TemporaryFailure
                | Self::ServiceUnavailable
        )
    }

    /// Whether this fault is about the connection itself rather than a request.
    pub fn is_connection(self) -> bool {
        matches!(self, Self::ConnectionRefused | Self::ConnectionReset)
    }

    /// Whether `message` mentions establishing or holding a connection,
    /// whatever its primary fault.
    ///
    /// `sniff` keeps one code per message and ranks timeouts above
    /// connection problems, so "connection timed out" is a [`Timeout`]. This
    /// check keeps the connection signal for strategies that rank it first.
    ///
    /// ```
    /// use recourse::FaultCode;
    ///
    /// assert!(FaultCode::mentions_connection("connection timed out"));
    /// assert!(FaultCode::mentions_connection("ECONNREFUSED"));
    /// assert!(!FaultCode::mentions_connection("query timed out"));
    /// ```
    ///
    /// [`Timeout`]: FaultCode::Timeout
    pub fn mentions_connection(message: &str) -> bool {
        let message = message.to_lowercase();
        ["econnrefused", "connection", "connect"]
            .iter()
            .any(|n| message.contains(n))
    }
}

/// A normalized failure record.
///
/// Created once per failure at the point where a raw error is caught, never
/// mutated afterwards.
///
/// # Examples
///
/// ```
/// use recourse::{ClassifiedError, ErrorCategory, FaultCode, Severity};
///
/// let err = ClassifiedError::new(ErrorCategory::Auth, "token expired")
///     .with_fault(FaultCode::SessionExpired)
///     .with_severity(Severity::Critical);
///
/// assert_eq!(err.category(), ErrorCategory::Auth);
/// assert_eq!(err.message(), "token expired");
/// assert!(err.cause().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    category: ErrorCategory,
    fault: FaultCode,
    message: String,
    connection: bool,
    cause: Option<Arc<dyn StdError + Send + Sync>>,
    timestamp: SystemTime,
    severity: Severity,
}

impl ClassifiedError {
    /// Create a classified error with the category's default severity and no
    /// fault code.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        ClassifiedError {
            category,
            fault: FaultCode::Unspecified,
            message: message.into(),
            connection: false,
            cause: None,
            timestamp: SystemTime::now(),
            severity: category.default_severity(),
        }
    }

    /// Attach a fault code.
    pub fn with_fault(mut self, fault: FaultCode) -> Self {
        self.fault = fault;
        self
    }

    /// Mark the failure as connection-related independently of its fault code.
    pub fn with_connection(mut self, connection: bool) -> Self {
        self.connection = connection;
        self
    }

    /// Override the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach the underlying error.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Coarse kind, used for strategy dispatch.
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Structured fault, if one was recognized.
    pub fn fault(&self) -> FaultCode {
        self.fault
    }

    /// Whether the failure involves the connection: either the fault code is
    /// a connection fault or the classifier saw a connection problem.
    pub fn involves_connection(&self) -> bool {
        self.connection || self.fault.is_connection()
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The original failure, when the classifier owned it.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// When the failure was classified.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Advisory severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.category, self.message)
    }
}

impl StdError for ClassifiedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Turns an opaque operation error into a [`ClassifiedError`].
pub trait ErrorClassifier: Send + Sync {
    /// Classify `error`.
    fn classify(&self, error: &dyn fmt::Display) -> ClassifiedError;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&dyn fmt::Display) -> ClassifiedError + Send + Sync,
{
    fn classify(&self, error: &dyn fmt::Display) -> ClassifiedError {
        self(error)
    }
}

/// Guesses category and fault from the error message.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    fn category_of(message: &str) -> ErrorCategory {
        let message = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if has(&[
            "unauthorized",
            "unauthenticated",
            "forbidden",
            "permission",
            "token",
            "session",
            "401",
            "403",
        ]) {
            ErrorCategory::Auth
        } else if has(&["database", "sql", "query", "econnrefused", "deadlock"]) {
            ErrorCategory::Database
        } else if has(&["validation", "invalid", "required field"]) {
            ErrorCategory::Validation
        } else if has(&[
            "network",
            "fetch",
            "timeout",
            "timed out",
            "connection",
            "econnreset",
        ]) {
            ErrorCategory::Network
        } else {
            ErrorCategory::Unknown
        }
    }
}

impl ErrorClassifier for HeuristicClassifier {
    fn classify(&self, error: &dyn fmt::Display) -> ClassifiedError {
        let message = error.to_string();
        let category = Self::category_of(&message);
        let fault = FaultCode::sniff(&message);
        let connection = FaultCode::mentions_connection(&message);
        ClassifiedError::new(category, message)
            .with_fault(fault)
            .with_connection(connection)
    }
}

/// Wraps every error as category `unknown`, severity `medium`.
///
/// The fault code is still sniffed, so strategies that look at transport
/// faults (the network strategy) keep working on unclassified errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownCategoryClassifier;

impl ErrorClassifier for UnknownCategoryClassifier {
    fn classify(&self, error: &dyn fmt::Display) -> ClassifiedError {
        let message = error.to_string();
        let fault = FaultCode::sniff(&message);
        let connection = FaultCode::mentions_connection(&message);
        ClassifiedError::new(ErrorCategory::Unknown, message)
            .with_fault(fault)
            .with_connection(connection)
            .with_severity(Severity::Medium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_prefers_specific_patterns() {
        let cases = [
            ("connection reset by peer", FaultCode::ConnectionReset),
            ("connection refused", FaultCode::ConnectionRefused),
            ("connect ECONNREFUSED 127.0.0.1", FaultCode::ConnectionRefused),
            ("temporary failure in name resolution", FaultCode::TemporaryFailure),
            ("503 Service Unavailable", FaultCode::ServiceUnavailable),
            ("TypeError: Failed to fetch", FaultCode::FetchFailed),
            ("NetworkError", FaultCode::NetworkUnreachable),
            ("permission denied", FaultCode::PermissionDenied),
        ];

        for (message, expected) in cases {
            assert_eq!(FaultCode::sniff(message), expected, "{}", message);
        }
    }

    #[test]
    fn test_fault_groups() {
        assert!(FaultCode::Timeout.is_network());
        assert!(FaultCode::Timeout.is_transient());
        assert!(!FaultCode::ConnectionRefused.is_transient());
        assert!(FaultCode::ConnectionRefused.is_connection());
        assert!(!FaultCode::SessionExpired.is_network());
        assert!(!FaultCode::Unspecified.is_network());
    }

    #[test]
    fn test_heuristic_categories() {
        let classify = |msg: &str| HeuristicClassifier.classify(&msg).category();

        assert_eq!(classify("token expired"), ErrorCategory::Auth);
        assert_eq!(classify("403 Forbidden"), ErrorCategory::Auth);
        assert_eq!(classify("database connection refused"), ErrorCategory::Database);
        assert_eq!(classify("SQL syntax error"), ErrorCategory::Database);
        assert_eq!(classify("validation failed: email"), ErrorCategory::Validation);
        assert_eq!(classify("network request timeout"), ErrorCategory::Network);
        assert_eq!(classify("Failed to fetch"), ErrorCategory::Network);
        assert_eq!(classify("something odd happened"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_connection_signal_survives_a_stronger_fault() {
        let err = HeuristicClassifier.classify(&"database connection timed out");
        assert_eq!(err.category(), ErrorCategory::Database);
        assert_eq!(err.fault(), FaultCode::Timeout);
        assert!(err.involves_connection());

        let err = HeuristicClassifier.classify(&"temporary failure connecting to database");
        assert_eq!(err.fault(), FaultCode::TemporaryFailure);
        assert!(err.involves_connection());

        let err = HeuristicClassifier.classify(&"database query timed out");
        assert!(!err.involves_connection());

        let err = ClassifiedError::new(ErrorCategory::Database, "x")
            .with_fault(FaultCode::ConnectionReset);
        assert!(err.involves_connection());
    }

    #[test]
    fn test_heuristic_severity_follows_category() {
        let err = HeuristicClassifier.classify(&"invalid email");
        assert_eq!(err.severity(), Severity::Low);

        let err = HeuristicClassifier.classify(&"session expired");
        assert_eq!(err.severity(), Severity::High);
    }

    #[test]
    fn test_unknown_classifier_keeps_fault() {
        let err = UnknownCategoryClassifier.classify(&"connection reset");
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert_eq!(err.severity(), Severity::Medium);
        assert_eq!(err.fault(), FaultCode::ConnectionReset);
        assert_eq!(err.message(), "connection reset");
    }

    #[test]
    fn test_closure_classifier() {
        let classifier = |e: &dyn fmt::Display| {
            ClassifiedError::new(ErrorCategory::Validation, e.to_string())
        };
        let err = classifier.classify(&"anything");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_cause_is_error_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out");
        let err =
            ClassifiedError::new(ErrorCategory::Network, "request failed").with_cause(io);

        assert_eq!(err.cause().unwrap().to_string(), "socket timed out");
        assert_eq!(
            StdError::source(&err).map(|e| e.to_string()),
            Some("socket timed out".to_string())
        );
        assert_eq!(err.to_string(), "network error: request failed");
    }
}
