use thiserror::Error;

/// Failures crossing the boundary between a surface and the session authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("a focus session is already active ({active_session_id})")]
    Conflict { active_session_id: String },

    #[error("no active focus session")]
    NotFound,

    #[error("session authority unreachable: {0}")]
    Transport(String),

    #[error("notification permission denied")]
    PermissionDenied,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session authority failure: {0}")]
    Internal(String),
}

/// How a failure is shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Next to the control that triggered it.
    Inline,
    /// Across the top of the surface until dismissed or resolved.
    Banner,
}

impl AuthorityError {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport(detail.into())
    }

    /// Flattens an internal `anyhow` chain into a single message.
    pub fn internal(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }

    pub fn presentation(&self) -> Presentation {
        match self {
            Self::Conflict { .. } | Self::NotFound | Self::InvalidRequest(_) => {
                Presentation::Inline
            }
            Self::Transport(_) | Self::PermissionDenied | Self::Internal(_) => {
                Presentation::Banner
            }
        }
    }
}
