//! Map parsed command-line arguments onto an [`Action`].

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, database, ARG_PORT};
use crate::cli::globals::GlobalArgs;
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let database_opts = database::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;

    let globals =
        GlobalArgs::new(auth_opts.session_secret).with_db_password(database_opts.password);

    Ok(Action::Server(Args {
        port,
        dsn: database_opts.dsn,
        db_max_connections: database_opts.max_connections,
        globals,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        session_cookie_secure: auth_opts.session_cookie_secure,
        session_sweep_seconds: auth_opts.session_sweep_seconds,
        bcrypt_cost: auth_opts.bcrypt_cost,
    }))
}
