//! PostgreSQL adapters (schema in `sql/schema.sql`).

use anyhow::{anyhow, Context, Result};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{warn, Instrument};

use super::{
    CredentialStore, InsertOutcome, NewUser, SessionRecord, SessionStore, StoreFuture, User,
};
use crate::auth::identity::{Email, Role, Username};

const USER_COLUMNS: &str = "id, username, email, password_hash, role";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role").context("missing role column")?;
    Ok(User {
        id: row.try_get("id").context("missing id column")?,
        username: row.try_get("username").context("missing username column")?,
        email: row.try_get("email").context("missing email column")?,
        password_hash: row
            .try_get("password_hash")
            .context("missing password_hash column")?,
        role: role
            .parse()
            .map_err(|err| anyhow!("invalid stored role: {err}"))?,
    })
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for PgCredentialStore {
    fn find_by_email<'a>(&'a self, email: &'a Email) -> StoreFuture<'a, Option<User>> {
        Box::pin(async move {
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            let row = sqlx::query(&query)
                .bind(email.as_str())
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup user by email")?;

            row.as_ref().map(user_from_row).transpose()
        })
    }

    fn find_by_username<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, Vec<User>> {
        Box::pin(async move {
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            let rows = sqlx::query(&query)
                .bind(username.as_str())
                .fetch_all(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup users by username")?;

            rows.iter().map(user_from_row).collect()
        })
    }

    fn insert(&self, user: NewUser) -> StoreFuture<'_, InsertOutcome> {
        Box::pin(async move {
            let query = r"
                INSERT INTO users
                    (username, email, password_hash, role)
                VALUES ($1, $2, $3, $4)
                RETURNING id
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let result = sqlx::query(query)
                .bind(user.username.as_str())
                .bind(user.email.as_str())
                .bind(&user.password_hash)
                .bind(user.role.as_str())
                .fetch_one(&self.pool)
                .instrument(span)
                .await;

            let row = match result {
                Ok(row) => row,
                Err(err) if is_unique_violation(&err) => return Ok(InsertOutcome::Conflict),
                Err(err) => return Err(err).context("failed to insert user"),
            };

            Ok(InsertOutcome::Created(User {
                id: row.try_get("id").context("missing id column")?,
                username: user.username.as_str().to_string(),
                email: user.email.as_str().to_string(),
                password_hash: user.password_hash,
                role: user.role,
            }))
        })
    }

    fn update_role<'a>(&'a self, username: &'a Username, role: Role) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            // Usernames repeat; touch a single row like a single-document update.
            let query = r"
                UPDATE users SET role = $2
                WHERE id = (SELECT id FROM users WHERE username = $1 ORDER BY created_at LIMIT 1)
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            let result = sqlx::query(query)
                .bind(username.as_str())
                .bind(role.as_str())
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to update user role")?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn list_all(&self) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at");
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            let rows = sqlx::query(&query)
                .fetch_all(&self.pool)
                .instrument(span)
                .await
                .context("failed to list users")?;

            rows.iter().map(user_from_row).collect()
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let query = "SELECT 1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            sqlx::query(query)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("database ping failed")?;
            Ok(())
        })
    }
}

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SessionStore for PgSessionStore {
    fn get<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<SessionRecord>> {
        Box::pin(async move {
            let query = r"
                SELECT authenticated, username, email, role, created_at, expires_at
                FROM user_sessions
                WHERE session_hash = $1
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let Some(row) = sqlx::query(query)
                .bind(key)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup session")?
            else {
                return Ok(None);
            };

            let role: String = row.try_get("role").context("missing role column")?;
            let Ok(role) = role.parse::<Role>() else {
                warn!("Ignoring session with unknown role");
                return Ok(None);
            };
            Ok(Some(SessionRecord {
                authenticated: row
                    .try_get("authenticated")
                    .context("missing authenticated column")?,
                username: row.try_get("username").context("missing username column")?,
                email: row.try_get("email").context("missing email column")?,
                role,
                created_at: row.try_get("created_at").context("missing created_at column")?,
                expires_at: row.try_get("expires_at").context("missing expires_at column")?,
            }))
        })
    }

    fn set<'a>(&'a self, key: &'a [u8], record: SessionRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = r"
                INSERT INTO user_sessions
                    (session_hash, authenticated, username, email, role, created_at, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (session_hash) DO UPDATE SET
                    authenticated = EXCLUDED.authenticated,
                    username = EXCLUDED.username,
                    email = EXCLUDED.email,
                    role = EXCLUDED.role,
                    created_at = EXCLUDED.created_at,
                    expires_at = EXCLUDED.expires_at
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(key)
                .bind(record.authenticated)
                .bind(&record.username)
                .bind(&record.email)
                .bind(record.role.as_str())
                .bind(record.created_at)
                .bind(record.expires_at)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to store session")?;
            Ok(())
        })
    }

    fn destroy<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = "DELETE FROM user_sessions WHERE session_hash = $1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(key)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to delete session")?;
            Ok(())
        })
    }

    fn purge_expired(&self, now: i64) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let query = "DELETE FROM user_sessions WHERE expires_at <= $1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            let result = sqlx::query(query)
                .bind(now)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to purge expired sessions")?;
            Ok(result.rows_affected())
        })
    }
}
