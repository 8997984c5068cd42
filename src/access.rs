//! Access gate for starting an audit.
//!
//! This is a coarse gate with a single static shared secret. It is NOT an
//! authentication or authorization system and must not be relied on as a
//! security boundary.

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    shared_secret: Option<String>,
}

impl AccessGate {
    pub fn new(shared_secret: Option<String>) -> Self {
        Self {
            shared_secret: shared_secret.filter(|s| !s.is_empty()),
        }
    }

    /// Compare `provided` with the configured secret. With no secret
    /// configured every credential is rejected.
    pub fn check(&self, provided: &str) -> bool {
        match &self.shared_secret {
            Some(secret) => secret == provided,
            None => {
                warn!("No access key configured; rejecting audit start");
                false
            }
        }
    }
}
