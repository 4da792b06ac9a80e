//! Encode/decode error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding an object graph.
///
/// Values dropped by the exclusion policy and nodes tagged with an
/// unregistered type are not errors; they surface as `null` and as untyped
/// records respectively.
#[derive(Debug, Error)]
pub enum SerdeError {
    /// A reference node names an id the root side table does not contain.
    #[error("unresolved reference: _mapId {id} has no entry in the side table")]
    UnresolvedReference { id: u32 },

    /// A reference node was found but the root carries no side table.
    #[error("missing side table: reference to _mapId {id} but the root has no _map")]
    MissingSideTable { id: u32 },

    /// The side table lists the same id twice.
    #[error("duplicate side table entry for _mapId {id}")]
    DuplicateSideTableEntry { id: u32 },

    /// The wire value is structurally invalid.
    #[error("malformed node: {0}")]
    MalformedNode(String),

    /// NaN and infinities have no JSON representation.
    #[error("non-finite number cannot be encoded: {0}")]
    NonFiniteNumber(f64),

    /// Traversal went deeper than the configured limit.
    #[error("depth limit exceeded (max: {max})")]
    DepthLimitExceeded { max: usize },

    /// A recorded parent slot no longer resolves while finalizing the root.
    #[error("dangling parent slot for _mapId {id}")]
    DanglingSlot { id: u32 },

    /// JSON text could not be produced or parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerdeError {
    /// Get a stable error code for this error type.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnresolvedReference { .. } => "UNRESOLVED_REFERENCE",
            Self::MissingSideTable { .. } => "MISSING_SIDE_TABLE",
            Self::DuplicateSideTableEntry { .. } => "DUPLICATE_SIDE_TABLE_ENTRY",
            Self::MalformedNode(_) => "MALFORMED_NODE",
            Self::NonFiniteNumber(_) => "NON_FINITE_NUMBER",
            Self::DepthLimitExceeded { .. } => "DEPTH_LIMIT_EXCEEDED",
            Self::DanglingSlot { .. } => "DANGLING_SLOT",
            Self::Json(_) => "JSON",
        }
    }

    /// Check if this error was caused by the wire input rather than the
    /// graph being encoded.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedReference { .. }
                | Self::MissingSideTable { .. }
                | Self::DuplicateSideTableEntry { .. }
                | Self::MalformedNode(_)
                | Self::Json(_)
        )
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedNode(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = SerdeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SerdeError::UnresolvedReference { id: 42 };
        assert!(err.to_string().contains("42"));

        let err = SerdeError::DepthLimitExceeded { max: 128 };
        assert!(err.to_string().contains("128"));
    }

    #[test]
    fn error_codes() {
        assert_eq!(
            SerdeError::MissingSideTable { id: 0 }.code(),
            "MISSING_SIDE_TABLE"
        );
        assert_eq!(SerdeError::malformed("x").code(), "MALFORMED_NODE");
    }

    #[test]
    fn error_malformed_input() {
        assert!(SerdeError::UnresolvedReference { id: 1 }.is_malformed_input());
        assert!(SerdeError::malformed("bare array").is_malformed_input());
        assert!(!SerdeError::NonFiniteNumber(f64::NAN).is_malformed_input());
        assert!(!SerdeError::DepthLimitExceeded { max: 1 }.is_malformed_input());
    }
}
