//! bcrypt password hashing.
//!
//! Hashes embed their random salt and cost, so `verify` needs nothing but the
//! stored string. Both operations are CPU-bound; the async wrappers move them
//! to Tokio's blocking pool so concurrent logins hash in parallel.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_COST: u32 = 10;
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;
/// bcrypt ignores everything past this many bytes of input.
pub const MAX_PASSWORD_BYTES: usize = 72;

// Verified against when the account does not exist, so unknown emails take
// as long to reject as wrong passwords.
const DUMMY_PASSWORD: &str = "memberauth-timing-equalizer";

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    /// # Errors
    /// Returns an error if `cost` is outside bcrypt's supported range.
    pub fn new(cost: u32) -> Result<Self> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(anyhow!(
                "bcrypt cost must be between {MIN_COST} and {MAX_COST}, got {cost}"
            ));
        }
        let dummy_hash = bcrypt::hash(DUMMY_PASSWORD, cost).context("failed to build dummy hash")?;
        Ok(Self {
            cost,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash `plaintext` with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if `plaintext` exceeds [`MAX_PASSWORD_BYTES`] or the
    /// underlying bcrypt call fails.
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(anyhow!(
                "password is {} bytes, bcrypt accepts at most {MAX_PASSWORD_BYTES}",
                plaintext.len()
            ));
        }
        bcrypt::hash(plaintext, self.cost).context("failed to hash password")
    }

    /// Check `plaintext` against a stored hash. Malformed hashes and
    /// passwords longer than [`MAX_PASSWORD_BYTES`] never match.
    #[must_use]
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        match bcrypt::verify(plaintext, hash) {
            Ok(matched) => matched,
            Err(err) => {
                warn!("Rejecting malformed password hash: {err}");
                false
            }
        }
    }

    /// Burn the same work as a real verification and report no match.
    #[must_use]
    pub fn verify_dummy(&self, plaintext: &str) -> bool {
        let _ = bcrypt::verify(plaintext, &self.dummy_hash);
        false
    }

    /// [`Self::hash`] on the blocking pool.
    ///
    /// # Errors
    /// Returns an error if hashing fails or the blocking task panics.
    pub async fn hash_blocking(&self, plaintext: String) -> Result<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .context("password hashing task failed")?
    }

    /// [`Self::verify`] on the blocking pool; `None` hash runs the dummy check.
    ///
    /// # Errors
    /// Returns an error only if the blocking task panics.
    pub async fn verify_blocking(&self, plaintext: String, hash: Option<String>) -> Result<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => hasher.verify(&plaintext, &hash),
            None => hasher.verify_dummy(&plaintext),
        })
        .await
        .context("password verification task failed")
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Result<PasswordHasher> {
        PasswordHasher::new(MIN_COST)
    }

    #[test]
    fn hash_then_verify_matches() -> Result<()> {
        let hasher = hasher()?;
        let hash = hasher.hash("Secret123")?;
        assert!(hasher.verify("Secret123", &hash));
        assert!(!hasher.verify("Secret124", &hash));
        Ok(())
    }

    #[test]
    fn hash_never_contains_plaintext() -> Result<()> {
        let hash = hasher()?.hash("Secret123")?;
        assert!(!hash.contains("Secret123"));
        assert!(hash.starts_with("$2"));
        Ok(())
    }

    #[test]
    fn salts_differ_between_calls() -> Result<()> {
        let hasher = hasher()?;
        let first = hasher.hash("same")?;
        let second = hasher.hash("same")?;
        assert_ne!(first, second);
        assert!(hasher.verify("same", &first));
        assert!(hasher.verify("same", &second));
        Ok(())
    }

    #[test]
    fn distinct_plaintexts_do_not_cross_verify() -> Result<()> {
        let hasher = hasher()?;
        for (left, right) in [("a", "b"), ("password", "Password"), ("", " ")] {
            let hash = hasher.hash(right)?;
            assert!(!hasher.verify(left, &hash), "{left:?} verified against {right:?}");
        }
        Ok(())
    }

    #[test]
    fn passwords_sharing_a_long_prefix_stay_distinct() -> Result<()> {
        let hasher = hasher()?;
        let prefix = "\u{1F600}".repeat(18);
        let (left, right) = (prefix.clone() + "ab", prefix.clone() + "cd");
        assert_eq!(right.len(), 74);
        assert!(hasher.hash(&right).is_err());

        // A stored hash of the 72-byte prefix must not accept longer inputs.
        let hash = hasher.hash(&prefix)?;
        assert!(hasher.verify(&prefix, &hash));
        assert!(!hasher.verify(&left, &hash));
        assert!(!hasher.verify(&right, &hash));
        Ok(())
    }

    #[test]
    fn malformed_hash_is_false() -> Result<()> {
        let hasher = hasher()?;
        assert!(!hasher.verify("Secret123", ""));
        assert!(!hasher.verify("Secret123", "not-a-hash"));
        assert!(!hasher.verify("Secret123", "$2b$04$tooshort"));
        Ok(())
    }

    #[test]
    fn cost_is_embedded_in_hash() -> Result<()> {
        let hasher = PasswordHasher::new(5)?;
        assert_eq!(hasher.cost(), 5);
        let hash = hasher.hash("x")?;
        assert!(hash.contains("$05$"));
        Ok(())
    }

    #[test]
    fn cost_out_of_range_is_rejected() {
        assert!(PasswordHasher::new(3).is_err());
        assert!(PasswordHasher::new(32).is_err());
    }

    #[test]
    fn debug_hides_dummy_hash() -> Result<()> {
        let hasher = hasher()?;
        let debug = format!("{hasher:?}");
        assert!(debug.contains("cost"));
        assert!(!debug.contains("$2"));
        Ok(())
    }

    #[tokio::test]
    async fn blocking_wrappers_agree_with_sync_calls() -> Result<()> {
        let hasher = hasher()?;
        let hash = hasher.hash_blocking("Secret123".to_string()).await?;
        assert!(
            hasher
                .verify_blocking("Secret123".to_string(), Some(hash.clone()))
                .await?
        );
        assert!(!hasher.verify_blocking("wrong".to_string(), Some(hash)).await?);
        assert!(!hasher.verify_blocking("Secret123".to_string(), None).await?);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_hashes_complete() -> Result<()> {
        let hasher = hasher()?;
        let tasks: Vec<_> = (0..4)
            .map(|index| {
                let hasher = hasher.clone();
                tokio::spawn(async move { hasher.hash_blocking(format!("pw{index}")).await })
            })
            .collect();
        for task in tasks {
            let hash = task.await??;
            assert!(hash.starts_with("$2"));
        }
        Ok(())
    }
}
