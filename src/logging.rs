use std::io;
/// Structured logging for virtual users and the load test runner
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize structured logging with optional JSON output
pub fn init_logging(json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("authload=info"));

    let registry = Registry::default().with(env_filter);

    if json_output {
        // JSON output for log aggregation
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::NONE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::NONE),
            )
            .try_init()?;
    }

    Ok(())
}

/// One finished action of one virtual user
#[macro_export]
macro_rules! log_action {
    ($user:expr, $request:expr, $outcome:expr, $duration_ms:expr) => {
        tracing::debug!(
            user = $user,
            request = $request,
            outcome = %$outcome,
            duration_ms = $duration_ms,
            "Action completed"
        );
    };
}

/// An authorization probe that was answered with data it should not see
#[macro_export]
macro_rules! log_bypass {
    ($user:expr, $request:expr, $path:expr) => {
        tracing::error!(
            user = $user,
            request = $request,
            path = %$path,
            "Authorization bypass detected"
        );
    };
}

#[macro_export]
macro_rules! log_transport_error {
    ($user:expr, $request:expr, $err:expr) => {
        tracing::warn!(
            user = $user,
            request = $request,
            kind = $err.kind(),
            error = %$err,
            "Transport error absorbed"
        );
    };
}

/// Lifecycle events of a virtual user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Started { user: usize, email: String },
    Registered { user: usize, email: String },
    LoggedIn { user: usize, email: String },
    EmailRegenerated { user: usize, email: String },
    Stopped { user: usize, authenticated: bool },
}

impl std::fmt::Display for UserEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started { user, email } => write!(f, "User {} started as {}", user, email),
            Self::Registered { user, email } => {
                write!(f, "User {} registered {}", user, email)
            }
            Self::LoggedIn { user, email } => write!(f, "User {} logged in as {}", user, email),
            Self::EmailRegenerated { user, email } => {
                write!(f, "User {} switched to new email {}", user, email)
            }
            Self::Stopped {
                user,
                authenticated,
            } => {
                if *authenticated {
                    write!(f, "User {} ended authenticated session", user)
                } else {
                    write!(f, "User {} stopped", user)
                }
            }
        }
    }
}
