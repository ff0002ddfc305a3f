use std::env;

use anyhow::Context;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::auth::ItemWritePolicy;
use crate::identity::SeedAccount;

const DEFAULT_CONFIG_FILE: &str = "bookstore";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Prefix of every route, `/api` by default
    pub base_path: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreSettings {
    Sqlite {
        path: String,
    },
    InMemory,
    Postgres {
        hostname: String,
        username: String,
        password: String,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthSettings {
    pub item_writes: ItemWritePolicy,
    pub identity: IdentitySettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum IdentitySettings {
    InMemory {
        #[serde(default)]
        seed_admin: Option<SeedAccount>,
    },
    Remote {
        url: String,
    },
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("server.base_path", "/api")?
        .set_default("store.backend", "sqlite")?
        .set_default("store.path", "bookstore.db")?
        .set_default("store.hostname", "127.0.0.1")?
        .set_default("store.username", "postgres")?
        .set_default("store.password", "postgres")?
        .set_default("auth.item_writes", "open")?
        .set_default("auth.identity.provider", "in_memory")
}

/// `PORT` and `USE_IN_MEMORY_DB` win over every other source
fn with_overrides(
    builder: ConfigBuilder<DefaultState>,
    port: Option<String>,
    use_in_memory_db: Option<String>,
) -> anyhow::Result<ConfigBuilder<DefaultState>> {
    let port = port
        .map(|port| port.trim().parse::<u16>())
        .transpose()
        .context("PORT must be a valid port number")?;
    let in_memory = use_in_memory_db
        .map(|value| value.to_lowercase() == "true")
        .unwrap_or_default();

    Ok(builder
        .set_override_option("server.port", port.map(i64::from))?
        .set_override_option("store.backend", in_memory.then_some("in_memory"))?)
}

impl Settings {
    /// Reads defaults, then `bookstore.toml` (or the file named by `BOOKSTORE_CONFIG`),
    /// then `BOOKSTORE__*` variables, then `PORT` and `USE_IN_MEMORY_DB`
    pub fn load() -> anyhow::Result<Self> {
        let config_file =
            env::var("BOOKSTORE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let builder = with_defaults()?
            .add_source(File::with_name(&config_file).required(false))
            .add_source(
                Environment::with_prefix("BOOKSTORE")
                    .separator("__")
                    .try_parsing(true),
            );
        let builder = with_overrides(
            builder,
            env::var("PORT").ok(),
            env::var("USE_IN_MEMORY_DB").ok(),
        )?;
        Self::from_config(builder.build().context("Failed to read configuration")?)
    }

    fn from_config(config: Config) -> anyhow::Result<Self> {
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
