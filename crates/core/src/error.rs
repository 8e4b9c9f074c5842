use thiserror::Error;

/// Failure reported by a remote backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never produced a usable response: network failure, or a
    /// non-2xx status whose body carried no readable message.
    #[error("{message}")]
    Transport { message: String },
    /// The backend answered with a structured error body.
    #[error("{message}")]
    Server { status: u16, message: String },
}

impl BackendError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message } | Self::Server { message, .. } => message,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { .. } => None,
            Self::Server { status, .. } => Some(*status),
        }
    }
}

/// Input rejected locally, before anything is sent over the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("localhost connections are not supported by the remote backend (host `{host}`); use a reachable database host")]
    LoopbackHost { host: String },
    #[error("no active database connection")]
    NotConnected,
    #[error("`{keyword}` statements require admin privileges")]
    PrivilegeRequired { keyword: String },
    #[error("invalid database name `{name}`: use letters, digits and underscores")]
    InvalidDatabaseName { name: String },
    #[error("creating databases is not supported for {kind}")]
    UnsupportedForKind { kind: &'static str },
}
