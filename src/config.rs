use anyhow::Context;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub log_level: String,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        check_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .context("DATABASE_URL must be set to a Postgres instance")?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| {
                    format!("DATABASE_MAX_CONNECTIONS must be a positive integer, got '{value}'")
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let log_level = lookup("LOG_LEVEL")
            .map(|level| level.to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        Ok(Config {
            database_url,
            max_connections,
            log_level,
        })
    }
}

/// A missing `.env` is fine; one that exists but cannot be read or parsed is not.
fn check_dotenv<T>(loaded: Result<T, dotenvy::Error>) -> anyhow::Result<()> {
    match loaded {
        Ok(_) => Ok(()),
        Err(error) if error.not_found() => Ok(()),
        Err(error) => Err(error).context("failed to load .env"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn requires_database_url() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", " ")])).is_err());
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/uni")])).unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/uni"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn rejects_bad_pool_size() {
        for value in ["0", "-3", "many"] {
            let result = Config::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://localhost/uni"),
                ("DATABASE_MAX_CONNECTIONS", value),
            ]));
            assert!(result.is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn missing_env_file_is_ignored() {
        let path = std::env::temp_dir().join(format!("registrar-{}.env", uuid::Uuid::new_v4()));
        assert!(check_dotenv(dotenvy::from_path(&path)).is_ok());
    }

    #[test]
    fn malformed_env_file_is_reported() {
        let path = std::env::temp_dir().join(format!("registrar-{}.env", uuid::Uuid::new_v4()));
        std::fs::write(&path, "BROKEN='unterminated\n").unwrap();
        let result = check_dotenv(dotenvy::from_path(&path));
        std::fs::remove_file(&path).unwrap();

        let error = result.unwrap_err();
        assert!(error.to_string().contains(".env"));
    }
}
