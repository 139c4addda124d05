use std::path::PathBuf;

/// Server settings, read from `ROOMBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: lookup("ROOMBOOK_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5433),
            bind: lookup("ROOMBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: lookup("ROOMBOOK_DATA_DIR")
                .unwrap_or_else(|| "./data".into())
                .into(),
            max_connections: lookup("ROOMBOOK_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(256),
            metrics_port: lookup("ROOMBOOK_METRICS_PORT").and_then(|s| s.parse().ok()),
            tls_cert: lookup("ROOMBOOK_TLS_CERT").map(PathBuf::from),
            tls_key: lookup("ROOMBOOK_TLS_KEY").map(PathBuf::from),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roombook.wal")
    }
}
