use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_PASSWORD: &str = "db-password";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";
pub const ARG_MEMORY_STORE: &str = "memory-store";

#[derive(Debug)]
pub struct Options {
    /// `None` when running on the in-memory stores.
    pub dsn: Option<String>,
    pub password: Option<SecretString>,
    pub max_connections: u32,
}

impl Options {
    /// # Errors
    /// Returns an error when neither a DSN nor `--memory-store` is given.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let memory_store = matches.get_flag(ARG_MEMORY_STORE);
        let dsn = matches
            .get_one::<String>(ARG_DSN)
            .cloned()
            .filter(|v| !v.trim().is_empty());

        let dsn = match (memory_store, dsn) {
            (true, _) => None,
            (false, Some(dsn)) => Some(dsn),
            (false, None) => anyhow::bail!("missing required argument: --{ARG_DSN}"),
        };

        let password = matches
            .get_one::<String>(ARG_DB_PASSWORD)
            .filter(|v| !v.is_empty())
            .map(|v| SecretString::from(v.clone()));

        Ok(Self {
            dsn,
            password,
            max_connections: matches
                .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
                .copied()
                .unwrap_or(5),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "PostgreSQL connection string. The password may be left out and supplied with --db-password.",
                )
                .env("MEMBERAUTH_DSN")
                .required_unless_present(ARG_MEMORY_STORE),
        )
        .arg(
            Arg::new(ARG_DB_PASSWORD)
                .long(ARG_DB_PASSWORD)
                .help("Database password, injected into the DSN")
                .env("MEMBERAUTH_DB_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum database pool size")
                .env("MEMBERAUTH_DB_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_MEMORY_STORE)
                .long(ARG_MEMORY_STORE)
                .help("Keep users and sessions in memory (development only)")
                .env("MEMBERAUTH_MEMORY_STORE")
                .action(ArgAction::SetTrue),
        )
}
