use crate::error::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Prefix of the environment variables read by [`ConnectionConfig::load`].
pub const ENV_PREFIX: &str = "DB";

/// Never read; `DB_NAME` is the canonical database variable.
pub const IGNORED_DATABASE_VAR: &str = "DB_DATABASE";

/// Connection settings for a data source.
///
/// Environment keys map onto fields as `DB_HOST`, `DB_PORT`, `DB_USER`,
/// `DB_PASSWORD` and `DB_NAME`; config files use the same keys without the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(rename = "name")]
    pub database: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "ALX_prodev".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Layers defaults, an optional config file, then `DB_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::build(path, None)
    }

    /// Like [`ConnectionConfig::load`], but reads variables from `vars` instead of the process.
    pub fn load_with_vars(path: Option<&Path>, vars: config::Map<String, String>) -> Result<Self> {
        Self::build(path, Some(vars))
    }

    fn build(path: Option<&Path>, vars: Option<config::Map<String, String>>) -> Result<Self> {
        let database_var_set = match &vars {
            Some(vars) => vars.contains_key(IGNORED_DATABASE_VAR),
            None => std::env::var_os(IGNORED_DATABASE_VAR).is_some(),
        };
        if database_var_set {
            warn!("{} is ignored; set DB_NAME to choose the database", IGNORED_DATABASE_VAR);
        }

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        let settings =
            builder.add_source(config::Environment::with_prefix(ENV_PREFIX).source(vars)).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// `host:port/database`, for logs. Never includes credentials.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}
