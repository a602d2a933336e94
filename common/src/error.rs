use strum::Display;

/// Failure kinds reported by every capability operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    NotFound,
    InvalidId,
    Unsupported,
    Transport,
    Provider,
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// Lookup or matching found nothing.
    NotFound(String),
    /// A composite identifier could not be decoded.
    InvalidId(String),
    /// The adapter deliberately does not implement the operation.
    Unsupported(String),
    /// The request never produced a usable response.
    Transport(String),
    /// The remote API answered with an application-level failure.
    Provider {
        code: Option<String>,
        message: String,
    },
    /// A caller-supplied precondition was violated.
    Validation(String),
}

pub type Result<T, E = ComputeError> = std::result::Result<T, E>;

impl ComputeError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ComputeError::NotFound(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        ComputeError::InvalidId(msg.into())
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        ComputeError::Unsupported(operation.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ComputeError::Transport(msg.into())
    }

    pub fn provider(code: Option<String>, message: impl Into<String>) -> Self {
        ComputeError::Provider {
            code,
            message: message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ComputeError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ComputeError::NotFound(_) => ErrorKind::NotFound,
            ComputeError::InvalidId(_) => ErrorKind::InvalidId,
            ComputeError::Unsupported(_) => ErrorKind::Unsupported,
            ComputeError::Transport(_) => ErrorKind::Transport,
            ComputeError::Provider { .. } => ErrorKind::Provider,
            ComputeError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Prefixes the message with `ctx`, keeping the kind.
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            ComputeError::NotFound(msg) => ComputeError::NotFound(format!("{}: {}", ctx, msg)),
            ComputeError::InvalidId(msg) => ComputeError::InvalidId(format!("{}: {}", ctx, msg)),
            ComputeError::Unsupported(msg) => {
                ComputeError::Unsupported(format!("{}: {}", ctx, msg))
            }
            ComputeError::Transport(msg) => ComputeError::Transport(format!("{}: {}", ctx, msg)),
            ComputeError::Provider { code, message } => ComputeError::Provider {
                code,
                message: format!("{}: {}", ctx, message),
            },
            ComputeError::Validation(msg) => {
                ComputeError::Validation(format!("{}: {}", ctx, msg))
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl std::fmt::Display for ComputeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ComputeError::InvalidId(msg) => write!(f, "Invalid ID: {}", msg),
            ComputeError::Unsupported(op) => write!(f, "Operation not supported: {}", op),
            ComputeError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ComputeError::Provider {
                code: Some(code),
                message,
            } => write!(f, "Provider error ({}): {}", code, message),
            ComputeError::Provider { code: None, message } => {
                write!(f, "Provider error: {}", message)
            }
            ComputeError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ComputeError {}

/// Extension mirroring `anyhow::Context` for `Result<T, ComputeError>`.
pub trait ResultExt<T> {
    fn context<C: std::fmt::Display>(self, ctx: C) -> Result<T>;

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<C: std::fmt::Display>(self, ctx: C) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
