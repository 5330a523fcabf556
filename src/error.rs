use std::fmt::{Display, Formatter};
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorCategory {
    Connection,
    Authentication,
    Permission,
    NotFound,
    Configuration,
    Network,
    General,
}

impl ErrorCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Authentication => "authentication",
            Self::Permission => "permission",
            Self::NotFound => "not found",
            Self::Configuration => "configuration",
            Self::Network => "network",
            Self::General => "general",
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            Self::Connection
            | Self::Network
            | Self::Authentication
            | Self::Permission
            | Self::Configuration => Severity::Error,
            Self::NotFound | Self::General => Severity::Warning,
        }
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Error and above interrupt the user with a modal.
    pub fn needs_modal(self) -> bool {
        self >= Self::Error
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecoveryAction {
    RetryConnection,
    Reauthenticate,
    RefreshListing,
}

impl RecoveryAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::RetryConnection => "retry connection",
            Self::Reauthenticate => "reload credentials",
            Self::RefreshListing => "refresh listing",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{category} error: {message}")]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            severity: category.default_severity(),
            message: message.into(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Connection, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Configuration, message)
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::General, message)
    }

    pub fn critical(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::new(category, message).with_severity(Severity::Critical)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCategory::General, "operation cancelled").with_severity(Severity::Info)
    }

    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::new(
            ErrorCategory::Network,
            format!("{operation} timed out after {}ms", after.as_millis()),
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category,
            ErrorCategory::Connection | ErrorCategory::Network | ErrorCategory::NotFound
        )
    }

    pub fn recovery_action(&self) -> Option<RecoveryAction> {
        match self.category {
            ErrorCategory::Connection | ErrorCategory::Network => {
                Some(RecoveryAction::RetryConnection)
            }
            ErrorCategory::Authentication => Some(RecoveryAction::Reauthenticate),
            ErrorCategory::NotFound | ErrorCategory::Permission => {
                Some(RecoveryAction::RefreshListing)
            }
            ErrorCategory::Configuration | ErrorCategory::General => None,
        }
    }
}

impl From<kube::Error> for AppError {
    fn from(error: kube::Error) -> Self {
        match &error {
            kube::Error::Api(response) => {
                let message = response.message.clone();
                match response.code {
                    401 => Self::new(ErrorCategory::Authentication, message),
                    403 => Self::new(ErrorCategory::Permission, message),
                    404 => Self::new(ErrorCategory::NotFound, message),
                    code if code >= 500 => Self::new(
                        ErrorCategory::Connection,
                        format!("server error {code}: {message}"),
                    ),
                    _ => Self::general(message),
                }
            }
            kube::Error::HyperError(_) | kube::Error::Service(_) => {
                classify_transport(error.to_string(), ErrorCategory::Connection)
            }
            kube::Error::InferConfig(_) => Self::configuration(error.to_string()),
            kube::Error::Auth(_) => Self::new(ErrorCategory::Authentication, error.to_string()),
            _ => classify_transport(error.to_string(), ErrorCategory::General),
        }
    }
}

impl From<kube::config::KubeconfigError> for AppError {
    fn from(error: kube::config::KubeconfigError) -> Self {
        Self::configuration(error.to_string())
    }
}

fn classify_transport(message: String, fallback: ErrorCategory) -> AppError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("tls") || lower.contains("certificate") || lower.contains("handshake") {
        AppError::new(ErrorCategory::Network, message)
    } else if lower.contains("connect")
        || lower.contains("refused")
        || lower.contains("dns")
        || lower.contains("timed out")
    {
        AppError::connection(message)
    } else {
        AppError::new(fallback, message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(63) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, exhausts
/// `policy.max_attempts`, or `token` is cancelled.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return Err(AppError::cancelled());
        }

        let error = tokio::select! {
            _ = token.cancelled() => return Err(AppError::cancelled()),
            result = op(attempt) => match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            },
        };

        attempt += 1;
        if !error.is_retryable() || attempt >= policy.max_attempts.max(1) {
            debug!(attempt, error = %error, "giving up");
            return Err(error);
        }

        let delay = policy.delay_for(attempt - 1);
        warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying");
        tokio::select! {
            _ = token.cancelled() => return Err(AppError::cancelled()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, ErrorCategory, RecoveryAction, RetryPolicy, Severity, retry_with_backoff};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
            max_attempts: 4,
        }
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = fast_policy();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(AppError::connection("refused").is_retryable());
        assert!(AppError::new(ErrorCategory::Network, "tls").is_retryable());
        assert!(AppError::not_found("gone").is_retryable());
        assert!(!AppError::new(ErrorCategory::Permission, "403").is_retryable());
        assert!(!AppError::new(ErrorCategory::Authentication, "401").is_retryable());
    }

    #[test]
    fn recovery_actions_follow_category() {
        assert_eq!(
            AppError::connection("x").recovery_action(),
            Some(RecoveryAction::RetryConnection)
        );
        assert_eq!(
            AppError::new(ErrorCategory::Authentication, "x").recovery_action(),
            Some(RecoveryAction::Reauthenticate)
        );
        assert_eq!(
            AppError::new(ErrorCategory::Permission, "x").recovery_action(),
            Some(RecoveryAction::RefreshListing)
        );
        assert_eq!(AppError::general("x").recovery_action(), None);
    }

    #[test]
    fn severity_ordering_drives_modal() {
        assert!(!Severity::Warning.needs_modal());
        assert!(Severity::Error.needs_modal());
        assert!(Severity::Critical > Severity::Error);
        assert_eq!(AppError::configuration("bad").severity, Severity::Error);
        assert_eq!(AppError::not_found("gone").severity, Severity::Warning);
        assert_eq!(
            AppError::critical(ErrorCategory::Connection, "down").severity,
            Severity::Critical
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_with_backoff_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();
        let started = Instant::now();

        let counter = Arc::clone(&calls);
        let result = retry_with_backoff(&fast_policy(), &token, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                if call < 2 {
                    Err(AppError::connection("refused"))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_on_non_retryable_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(&fast_policy(), &token, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::new(ErrorCategory::Authentication, "token expired"))
            }
        })
        .await;

        assert_eq!(
            result.map_err(|error| error.category),
            Err(ErrorCategory::Authentication)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(&fast_policy(), &token, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::connection("refused"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result: Result<(), _> = retry_with_backoff(&fast_policy(), &token, |_| async {
            Err(AppError::connection("refused"))
        })
        .await;

        assert_eq!(result, Err(AppError::cancelled()));
    }
}
