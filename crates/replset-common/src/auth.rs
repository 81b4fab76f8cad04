//! Cached credentials.
//!
//! The routing client does not implement an authentication protocol; it only
//! remembers credentials the caller has successfully used and replays them
//! against every fresh connection it opens after a failover.

/// One set of credentials for one database.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// Database the credentials authenticate against.
    pub db: String,
    pub user: String,
    pub password: String,
    /// Whether the password should be digested before being sent.
    pub digest_password: bool,
}

impl AuthInfo {
    pub fn new(
        db: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        digest_password: bool,
    ) -> Self {
        Self {
            db: db.into(),
            user: user.into(),
            password: password.into(),
            digest_password,
        }
    }
}
