//! Daemon configuration

use std::env;

use camino::Utf8PathBuf;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Configuration of the wharfd daemon.
///
/// Values come from defaults, then optional `config/default` and
/// `config/<RUN_MODE>` files, then `WHARF_`-prefixed environment
/// variables (`WHARF_HOST`, `WHARF_PORT`, `WHARF_DATA_DIR`,
/// `WHARF_CERT_FILE`, `WHARF_KEY_FILE`, `WHARF_DB_PATH`).
#[derive(Debug, Clone, Deserialize)]
pub struct WharfConfig {
    /// Address the control-plane listener binds to.
    pub host: String,
    /// Control-plane port; 0 picks a free port.
    pub port: u16,
    /// Root of the artifact tree (`<data_dir>/artifacts`).
    pub data_dir: Utf8PathBuf,
    /// Certificate for the deployment's TLS termination.
    pub cert_file: Utf8PathBuf,
    /// Private key for the deployment's TLS termination.
    pub key_file: Utf8PathBuf,
    /// Location of the repository descriptor bucket.
    pub db_path: Utf8PathBuf,
}

impl WharfConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "dev".into());

        Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8443)?
            .set_default("data_dir", "./data")?
            .set_default("cert_file", "./certs/server.crt")?
            .set_default("key_file", "./certs/server.key")?
            .set_default("db_path", "./data/wharf-db")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("WHARF"))
            .build()?
            .try_deserialize()
    }
}
