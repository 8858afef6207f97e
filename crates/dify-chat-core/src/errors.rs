/// Errors from local persistence and account handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error for key {key}: {message}")]
    Serialization { key: String, message: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("no administrator account has been set up")]
    NotInitialized,
    #[error("administrator account already exists")]
    AlreadyInitialized,
    #[error("invalid username or password")]
    InvalidCredentials,
}

impl CoreError {
    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
