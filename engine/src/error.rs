use uuid::Uuid;

use metacoach_core::signals::SignalValidationError;

/// Engine faults a caller can actually see. Availability faults (SVM
/// unreachable) and data-sparsity faults are recovered inside the turn via
/// fallback paths and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or out-of-range signal vector; the turn is rejected
    /// before any session state is touched.
    #[error(transparent)]
    InvalidSignals(#[from] SignalValidationError),

    #[error("session '{session_id}' not found")]
    SessionNotFound { session_id: Uuid },

    #[error("unknown intervention tool '{tool_id}'")]
    UnknownTool { tool_id: String },

    /// An override event arrived without the signature that makes it an
    /// override.
    #[error("signed override requires a signature")]
    MissingSignature,
}
