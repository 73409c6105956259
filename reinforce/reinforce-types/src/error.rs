//! Error types for reinforcement operations.

use thiserror::Error;

use crate::{BodyId, JointId, TreeId};

/// Errors that can occur while reinforcing an assembly.
///
/// None of these ever reach a user: the reinforcement pass logs them and
/// skips the affected body, pair, or bridge.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReinforceError {
    /// Invalid body ID referenced.
    #[error("unknown body: {0}")]
    UnknownBody(BodyId),

    /// Invalid joint ID referenced.
    #[error("unknown joint: {0}")]
    UnknownJoint(JointId),

    /// Invalid tree ID referenced.
    #[error("unknown tree: {0}")]
    UnknownTree(TreeId),

    /// Neither body carries an attach node pointing at the other.
    #[error("no attach node between {body} and {connected}")]
    MissingAttachNode {
        /// The body whose primary joint was being reinforced.
        body: BodyId,
        /// The body on the other side of that joint.
        connected: BodyId,
    },

    /// Walking primary joints from a body towards an ancestor ran out of chain.
    #[error("primary joint chain from {body} to {ancestor} is broken at {at}")]
    BrokenJointChain {
        /// Where the walk started.
        body: BodyId,
        /// The ancestor the walk was heading for.
        ancestor: BodyId,
        /// The body without a usable primary joint.
        at: BodyId,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Persisted settings could not be read or written.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ReinforceError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::Serialization(_))
    }

    /// Check if this error only means "skip this body or pair".
    #[must_use]
    pub fn is_precondition_skip(&self) -> bool {
        matches!(
            self,
            Self::MissingAttachNode { .. } | Self::UnknownBody(_) | Self::UnknownJoint(_)
        )
    }
}

impl From<serde_json::Error> for ReinforceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReinforceError::UnknownBody(BodyId::new(42));
        assert!(err.to_string().contains("42"));

        let err = ReinforceError::BrokenJointChain {
            body: BodyId::new(3),
            ancestor: BodyId::new(1),
            at: BodyId::new(2),
        };
        let text = err.to_string();
        assert!(text.contains("Body(3)"));
        assert!(text.contains("Body(2)"));

        let err = ReinforceError::serialization("expected value at line 7");
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn test_error_predicates() {
        let err = ReinforceError::invalid_config("bad value");
        assert!(err.is_config_error());
        assert!(!err.is_precondition_skip());

        let err = ReinforceError::MissingAttachNode {
            body: BodyId::new(1),
            connected: BodyId::new(2),
        };
        assert!(err.is_precondition_skip());
        assert!(!err.is_config_error());

        let err = ReinforceError::UnknownJoint(JointId::new(4));
        assert!(err.is_precondition_skip());
    }

    #[test]
    fn test_error_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: ReinforceError = json_err.into();
        assert!(matches!(err, ReinforceError::Serialization(_)));
        assert!(err.is_config_error());
    }
}
