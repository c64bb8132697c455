use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// The default request body limit (1 GiB), large enough for a full video upload.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024 * 1024;
/// How often expired sessions are reclaimed by default.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The PostgreSQL host.
    pub db_host: String,
    /// The PostgreSQL port.
    pub db_port: u16,
    /// The PostgreSQL user.
    pub db_user: String,
    /// The PostgreSQL password, if any.
    pub db_password: Option<Zeroizing<String>>,
    /// The PostgreSQL database name.
    pub db_name: String,
    /// Root directory holding one sub-directory per video asset.
    pub data_dir: PathBuf,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Reject plaintext requests with 426 when set.
    pub require_tls: bool,
    /// The maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Interval of the expired-session sweep, `None` disables it.
    pub session_sweep_interval_secs: Option<u64>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let db_host = env::var("VISTA_DB_HOST").unwrap_or_else(|_| {
            tracing::info!("VISTA_DB_HOST not set, using 'localhost'");
            "localhost".to_string()
        });

        let db_user = env::var("VISTA_DB_USER").unwrap_or_else(|_| {
            tracing::info!("VISTA_DB_USER not set, using 'postgres'");
            "postgres".to_string()
        });

        let db_password = match env::var("VISTA_DB_PASSWORD") {
            Ok(password) if !password.is_empty() => Some(Zeroizing::new(password)),
            _ => {
                tracing::warn!("VISTA_DB_PASSWORD not set");
                None
            }
        };

        let db_name = env::var("VISTA_DB_DATABASE").unwrap_or_else(|_| {
            tracing::info!("VISTA_DB_DATABASE not set, using 'postgres'");
            "postgres".to_string()
        });

        let sweep_secs: u64 = env::var("SESSION_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_SWEEP_INTERVAL_SECS.to_string())
            .parse()
            .context("Invalid SESSION_SWEEP_INTERVAL_SECS")?;

        Ok(Self {
            db_host,
            db_port: env::var("VISTA_DB_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()
                .context("Invalid VISTA_DB_PORT")?,
            db_user,
            db_password,
            db_name,
            data_dir: env::var("VISTA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            bind_addr: env::var("VISTA_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
                .parse()
                .context("Invalid VISTA_BIND_ADDR")?,
            require_tls: env::var("VISTA_REQUIRE_TLS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            max_body_bytes: env::var("VISTA_MAX_BODY_BYTES")
                .unwrap_or_else(|_| DEFAULT_MAX_BODY_BYTES.to_string())
                .parse()
                .context("Invalid VISTA_MAX_BODY_BYTES")?,
            session_sweep_interval_secs: (sweep_secs > 0).then_some(sweep_secs),
        })
    }

    /// A configuration for local development and tests, pointing at `data_dir`.
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_user: "postgres".to_string(),
            db_password: None,
            db_name: "postgres".to_string(),
            data_dir: data_dir.into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            require_tls: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            session_sweep_interval_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config() {
        let config = Config::local("/tmp/vista");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/vista"));
        assert_eq!(config.db_port, 5432);
        assert!(!config.require_tls);
        assert!(config.session_sweep_interval_secs.is_none());
        assert_eq!(config.max_body_bytes, 1024 * 1024 * 1024);
    }
}
