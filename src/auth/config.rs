use std::time::Duration;

use super::password::DEFAULT_COST;

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;
pub const DEFAULT_SESSION_SWEEP_SECONDS: u64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    session_cookie_secure: bool,
    session_sweep_seconds: u64,
    bcrypt_cost: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_cookie_secure: false,
            session_sweep_seconds: DEFAULT_SESSION_SWEEP_SECONDS,
            bcrypt_cost: DEFAULT_COST,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    /// Zero disables the background sweeper.
    #[must_use]
    pub fn with_session_sweep_seconds(mut self, seconds: u64) -> Self {
        self.session_sweep_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }

    #[must_use]
    pub fn session_sweep_interval(&self) -> Option<Duration> {
        (self.session_sweep_seconds > 0).then(|| Duration::from_secs(self.session_sweep_seconds))
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tutorial_settings() {
        let config = AuthConfig::new();
        assert_eq!(config.session_ttl_seconds(), 3600);
        assert_eq!(config.bcrypt_cost(), 10);
        assert!(!config.session_cookie_secure());
        assert_eq!(config.session_sweep_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn builders_override_defaults() {
        let config = AuthConfig::new()
            .with_session_ttl_seconds(60)
            .with_session_cookie_secure(true)
            .with_session_sweep_seconds(0)
            .with_bcrypt_cost(4);
        assert_eq!(config.session_ttl_seconds(), 60);
        assert!(config.session_cookie_secure());
        assert_eq!(config.session_sweep_interval(), None);
        assert_eq!(config.bcrypt_cost(), 4);
    }
}
