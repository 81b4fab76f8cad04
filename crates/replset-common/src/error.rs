use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplSetError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No primary found for replica set '{set}'")]
    NoPrimary { set: String },

    #[error("No known members for replica set '{set}'")]
    NoMembers { set: String },

    #[error("Authentication failed for user '{user}' on '{db}': {message}")]
    Auth {
        db: String,
        user: String,
        message: String,
    },

    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl ReplSetError {
    /// Whether this error came from the transport layer (connect refused,
    /// read error, timeout). Transport errors mark a node unhealthy and the
    /// routing layer may move on to another member; anything else
    /// propagates to the caller unchanged.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ReplSetError::Connection(_) | ReplSetError::Timeout(_) | ReplSetError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReplSetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(ReplSetError::Connection("refused".to_string()).is_transport());
        assert!(ReplSetError::Timeout(5000).is_transport());
        assert!(ReplSetError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset"
        ))
        .is_transport());

        assert!(!ReplSetError::NoPrimary {
            set: "rs0".to_string()
        }
        .is_transport());
        assert!(!ReplSetError::Auth {
            db: "admin".to_string(),
            user: "alice".to_string(),
            message: "bad password".to_string(),
        }
        .is_transport());
        assert!(!ReplSetError::Operation("duplicate key".to_string()).is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = ReplSetError::NoPrimary {
            set: "rs0".to_string(),
        };
        assert_eq!(err.to_string(), "No primary found for replica set 'rs0'");

        let err = ReplSetError::Timeout(5000);
        assert_eq!(err.to_string(), "Operation timed out after 5000ms");
    }
}
