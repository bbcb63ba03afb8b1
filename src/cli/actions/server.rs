use crate::{
    api::{self, StoreBackend},
    auth::AuthConfig,
    cli::globals::GlobalArgs,
};
use anyhow::{anyhow, Context, Result};
use secrecy::ExposeSecret;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    /// `None` runs on the in-memory stores.
    pub dsn: Option<String>,
    pub db_max_connections: u32,
    pub globals: GlobalArgs,
    pub session_ttl_seconds: i64,
    pub session_cookie_secure: bool,
    pub session_sweep_seconds: u64,
    pub bcrypt_cost: u32,
}

/// Inject the configured password into `dsn`, if any.
///
/// # Errors
/// Returns an error if the DSN is not a valid URL or cannot carry a password.
pub fn database_url(dsn: &str, globals: &GlobalArgs) -> Result<String> {
    let mut url = Url::parse(dsn).context("Invalid database DSN")?;

    if let Some(password) = &globals.db_password {
        url.set_password(Some(password.expose_secret()))
            .map_err(|()| anyhow!("Error setting password"))?;
    }

    Ok(url.to_string())
}

/// Execute the server action.
/// # Errors
/// Returns an error if the stores cannot be reached or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let backend = match &args.dsn {
        Some(dsn) => StoreBackend::Postgres {
            dsn: database_url(dsn, &args.globals)?,
            max_connections: args.db_max_connections,
        },
        None => StoreBackend::Memory,
    };

    let auth_config = AuthConfig::new()
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_session_cookie_secure(args.session_cookie_secure)
        .with_session_sweep_seconds(args.session_sweep_seconds)
        .with_bcrypt_cost(args.bcrypt_cost);

    api::new(args.port, backend, auth_config, args.globals.session_secret).await
}
