//! Startup helpers for the talk room server.
//!
//! Reads `TALK_ROOM_DB`, `TALK_ROOM_PORT` and `TALK_ROOM_PAGE_SIZE` from the
//! environment; everything else uses the defaults of [`TalkConfig`].

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use crate::messaging::core::config::TalkConfig;
use crate::messaging::core::errors::{TalkError, TalkResult};
use crate::server::{self, AppState};

/// Database path variable.
pub const DB_ENV: &str = "TALK_ROOM_DB";
/// Listening port variable.
pub const PORT_ENV: &str = "TALK_ROOM_PORT";
/// Friends page size variable.
pub const PAGE_SIZE_ENV: &str = "TALK_ROOM_PAGE_SIZE";

/// Everything the binary needs before it can serve.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Service configuration.
    pub config: TalkConfig,
    /// HTTP listening port.
    pub port: u16,
}

/// Run the server (used by the `talk-room-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting talk room v{}", env!("CARGO_PKG_VERSION"));

    let settings = match settings_from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };
    tracing::info!(
        "Database: {}, friends page size: {}",
        settings.config.storage.sqlite_path.display(),
        settings.config.friends.page_size
    );

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let state = match rt.block_on(AppState::new(settings.config)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let served = rt.block_on(async move {
        let listener = server::bind(settings.port).await?;
        server::serve(listener, state, server::shutdown_signal()).await
    });
    if let Err(e) = served {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build the settings from process environment variables.
///
/// # Errors
/// Returns `InvalidConfig` if a variable is present but malformed.
pub fn settings_from_env() -> TalkResult<Settings> {
    settings_from_lookup(|key| std::env::var(key).ok())
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> TalkResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| TalkError::InvalidConfig(format!("{name}={raw}")))
}

fn settings_from_lookup<F>(lookup: F) -> TalkResult<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = TalkConfig::default();

    if let Some(path) = lookup(DB_ENV).filter(|p| !p.trim().is_empty()) {
        config.storage.sqlite_path = PathBuf::from(path);
    }
    if let Some(raw) = lookup(PAGE_SIZE_ENV) {
        config.friends.page_size = parse_var(PAGE_SIZE_ENV, &raw)?;
    }
    let port = match lookup(PORT_ENV) {
        Some(raw) => parse_var(PORT_ENV, &raw)?,
        None => server::DEFAULT_PORT,
    };

    config.validate()?;
    Ok(Settings { config, port })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let settings = settings_from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.port, server::DEFAULT_PORT);
        assert_eq!(settings.config.friends.page_size, 7);
        assert_eq!(
            settings.config.storage.sqlite_path,
            PathBuf::from("talk_room.sqlite")
        );
    }

    #[test]
    fn test_env_overrides() {
        let settings = settings_from_lookup(lookup(&[
            (DB_ENV, ":memory:"),
            (PAGE_SIZE_ENV, " 12 "),
            (PORT_ENV, "8081"),
        ]))
        .unwrap();
        assert!(settings.config.storage.is_in_memory());
        assert_eq!(settings.config.friends.page_size, 12);
        assert_eq!(settings.port, 8081);
    }

    #[test]
    fn test_rejects_bad_page_size() {
        assert!(matches!(
            settings_from_lookup(lookup(&[(PAGE_SIZE_ENV, "many")])),
            Err(TalkError::InvalidConfig(_))
        ));
        assert!(matches!(
            settings_from_lookup(lookup(&[(PAGE_SIZE_ENV, "0")])),
            Err(TalkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_port() {
        for raw in ["http", "70000", "-1", ""] {
            assert!(matches!(
                settings_from_lookup(lookup(&[(PORT_ENV, raw)])),
                Err(TalkError::InvalidConfig(msg)) if msg.starts_with(PORT_ENV)
            ));
        }
    }
}
