//! Error types for the two management channels and the stop attempt

/// Error from a call on either management channel.
///
/// The coordinator decides retry-vs-fallback from its run state, not from
/// the variant; the variant only tells the operator what went wrong.
#[derive(Debug)]
pub enum ManagementError {
    /// Endpoint could not be reached or the session could not be opened
    Connect(String),
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Peer answered with something we could not interpret
    Protocol(String),
    /// Peer understood the request and refused it
    Rejected(String),
    /// I/O error on a raw channel
    Io(std::io::Error),
}

impl std::fmt::Display for ManagementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "connect failed: {msg}"),
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for ManagementError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ManagementError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl ManagementError {
    /// Transport-level failure that may clear on its own (unreachable
    /// endpoint, 5xx, bean not yet migrated).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Io(_) => true,
            // 404 = bean moved to another member mid-rebalance
            Self::Http { status, .. } => !matches!(status, Some(400 | 401 | 403)),
            Self::Protocol(_) | Self::Rejected(_) => false,
        }
    }
}

/// The run was cancelled by an internal shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("cancelled by shutdown request")
    }
}

impl std::error::Error for Cancelled {}

/// Phase of a stop attempt in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    GracefulStop,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::GracefulStop => "graceful-stop",
        })
    }
}

/// Why one connect → await-safety → stop attempt did not finish.
///
/// The safety wait absorbs its own query failures, so it only ever ends
/// an attempt by cancellation.
#[derive(Debug)]
pub enum AttemptError {
    Failed {
        step: Step,
        source: ManagementError,
    },
    Cancelled,
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { step, source } => write!(f, "{step}: {source}"),
            Self::Cancelled => write!(f, "{Cancelled}"),
        }
    }
}

impl std::error::Error for AttemptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed { source, .. } => Some(source),
            Self::Cancelled => None,
        }
    }
}

impl From<Cancelled> for AttemptError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl AttemptError {
    pub(crate) fn at(step: Step) -> impl FnOnce(ManagementError) -> Self {
        move |source| Self::Failed { step, source }
    }
}
