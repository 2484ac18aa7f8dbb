use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "outreach.toml";
const ENV_PREFIX: &str = "OUTREACH";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub seed: SeedSettings,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> ServerSettings {
        ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Mongodb,
    Memory,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    pub uri: String,
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> DatabaseSettings {
        DatabaseSettings {
            backend: DatabaseBackend::Mongodb,
            uri: "mongodb://localhost:27017".to_string(),
            name: "outreach".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_minutes: i64,
}

impl Default for AuthSettings {
    fn default() -> AuthSettings {
        AuthSettings {
            jwt_secret: String::new(),
            token_minutes: 60 * 24,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> LoggingSettings {
        LoggingSettings {
            level: "info,outreach=debug".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SeedSettings {
    pub enabled: bool,
}

impl Settings {
    /// Loads `.env`, then `outreach.toml` if present, then `OUTREACH__*`
    /// environment variables (e.g. `OUTREACH__SERVER__PORT=9000`).
    pub fn load() -> Result<Settings, ConfigError> {
        let _ = dotenvy::dotenv();

        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_local_mongodb() {
        let settings = Settings::default();

        assert_eq!(settings.database.backend, DatabaseBackend::Mongodb);
        assert_eq!(settings.database.uri, "mongodb://localhost:27017");
        assert_eq!(settings.bind_address(), ("127.0.0.1".to_string(), 8080));
    }

    #[test]
    fn partial_sources_keep_defaults() {
        let settings: Settings = Config::builder()
            .set_override("database.backend", "memory")
            .unwrap()
            .set_override("database.uri", "")
            .unwrap()
            .set_override("database.name", "test")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.database.backend, DatabaseBackend::Memory);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }
}
