use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 3000;

/// Connection settings for the document container. All of them come from the
/// environment; none have defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSettings {
    pub endpoint: Option<String>,
    pub key: Option<String>,
    pub database: Option<String>,
    pub container: Option<String>,
}

impl StoreSettings {
    pub fn from_env() -> Self {
        Self {
            endpoint: var("STORE_ENDPOINT"),
            key: var("STORE_KEY"),
            database: var("STORE_DATABASE"),
            container: var("STORE_CONTAINER"),
        }
    }

    /// Database file the container lives in, if the settings name one.
    pub fn database_path(&self) -> Option<PathBuf> {
        let endpoint = self.endpoint.as_deref()?;
        let database = self.database.as_deref()?;
        Some(PathBuf::from(endpoint).join(format!("{database}.db")))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub static_dir: PathBuf,
    pub store: StoreSettings,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            port: try_load("PORT", DEFAULT_PORT)?,
            static_dir: PathBuf::from(var_or("STATIC_DIR", "public")),
            store: StoreSettings::from_env(),
        })
    }
}

fn var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!("Environment variable {key} not set");
            None
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => {
            info!("{key} not set, using default: {default}");
            default.to_string()
        }
    }
}

fn try_load<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}")),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_joins_endpoint_and_database() {
        let settings = StoreSettings {
            endpoint: Some("/var/lib/canal".into()),
            key: None,
            database: Some("RideauCanalDB".into()),
            container: Some("SensorAggregations".into()),
        };
        assert_eq!(
            settings.database_path(),
            Some(PathBuf::from("/var/lib/canal/RideauCanalDB.db"))
        );
    }

    #[test]
    fn database_path_needs_endpoint_and_database() {
        let settings = StoreSettings {
            endpoint: None,
            database: Some("RideauCanalDB".into()),
            ..Default::default()
        };
        assert_eq!(settings.database_path(), None);
    }

    #[test]
    fn static_dir_falls_back_to_default() {
        // Only this test touches STATIC_DIR.
        env::remove_var("STATIC_DIR");
        assert_eq!(var_or("STATIC_DIR", "public"), "public");
        env::set_var("STATIC_DIR", "/srv/canal");
        assert_eq!(var_or("STATIC_DIR", "public"), "/srv/canal");
        env::remove_var("STATIC_DIR");
    }

    #[test]
    fn load_reads_port_from_env() {
        // Only this test touches PORT.
        env::set_var("PORT", "4100");
        let config = Config::load().unwrap();
        env::remove_var("PORT");
        assert_eq!(config.port, 4100);
    }
}
