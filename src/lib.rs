//! # memberauth
//!
//! A small members service: people sign up with a username, email and
//! password, log in, and get a server-side session that lasts one hour.
//!
//! ## Sessions
//!
//! The browser only ever holds an opaque random token in the
//! `memberauth_session` cookie. The store keeps a salted SHA-256 digest of
//! that token next to a snapshot of the identity (username, email, role) and
//! an absolute expiry. Presenting an expired token removes the record and the
//! request is treated as anonymous.
//!
//! ## Input validation
//!
//! Every field coming from a form, a JSON body or a query string is checked
//! against a fixed schema before it reaches a store. Structured values
//! (objects and arrays, including `field[$ne]=` style query keys) are reported
//! as injection attempts.
//!
//! ## Storage
//!
//! Users and sessions live in `PostgreSQL` (see `sql/schema.sql`), or in
//! process memory when started with `--memory-store`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{ensure, Context, Result};
    use std::{fs, path::PathBuf};

    // Compare SQL without caring about layout.
    fn canonical_sql(sql: &str) -> String {
        sql.chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_lowercase())
            .collect()
    }

    #[test]
    fn git_commit_hash_is_set() {
        assert!(!GIT_COMMIT_HASH.is_empty());
    }

    #[test]
    fn schema_sql_integrity() -> Result<()> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("sql/schema.sql");
        let sql = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SQL file at {}", path.display()))?;
        let canonical = canonical_sql(&sql);

        ensure!(
            canonical.contains("createtableifnotexistsusers"),
            "users table is missing"
        );
        ensure!(
            canonical.contains("createtableifnotexistsuser_sessions"),
            "user_sessions table is missing"
        );
        ensure!(
            canonical.contains("emailtextnotnullunique"),
            "email must be unique"
        );
        ensure!(
            canonical.contains("check(rolein('user','admin'))"),
            "role constraint is missing"
        );
        Ok(())
    }
}
