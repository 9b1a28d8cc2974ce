//! Environment-driven configuration.

use thiserror::Error;

use stocktrace_ledger::DEFAULT_SCAN_PREFIX;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Postgres connection settings; present only when persistence is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    pub database: Option<DatabaseConfig>,
    pub scan_token_prefix: String,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            database: None,
            scan_token_prefix: DEFAULT_SCAN_PREFIX.to_string(),
        }
    }
}

impl InfraConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let persistent = match lookup("USE_PERSISTENT_STORES") {
            Some(raw) => parse_bool("USE_PERSISTENT_STORES", &raw)?,
            None => false,
        };

        let database = if persistent {
            let url = lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::Invalid {
                        var: "DATABASE_MAX_CONNECTIONS",
                        value: raw,
                    })?,
                None => DEFAULT_MAX_CONNECTIONS,
            };
            Some(DatabaseConfig {
                url,
                max_connections,
            })
        } else {
            None
        };

        let scan_token_prefix = match lookup("SCAN_TOKEN_PREFIX") {
            Some(raw) if is_valid_prefix(&raw) => raw,
            Some(raw) => {
                return Err(ConfigError::Invalid {
                    var: "SCAN_TOKEN_PREFIX",
                    value: raw,
                });
            }
            None => DEFAULT_SCAN_PREFIX.to_string(),
        };

        Ok(Self {
            database,
            scan_token_prefix,
        })
    }

    pub fn persistent(&self) -> bool {
        self.database.is_some()
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
        }),
    }
}

/// Non-empty, alphanumeric; the dash is the token's segment separator.
fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<InfraConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        InfraConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_to_in_memory_with_qr_prefix() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config, InfraConfig::default());
        assert!(!config.persistent());
        assert_eq!(config.scan_token_prefix, "QR");
    }

    #[test]
    fn persistent_requires_database_url() {
        let err = from_vars(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn persistent_reads_pool_size() {
        let config = from_vars(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/stocktrace"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        let db = config.database.unwrap();
        assert_eq!(db.max_connections, 12);
        assert_eq!(db.url, "postgres://localhost/stocktrace");
    }

    #[test]
    fn garbage_values_are_rejected() {
        assert!(matches!(
            from_vars(&[("USE_PERSISTENT_STORES", "maybe")]),
            Err(ConfigError::Invalid { var: "USE_PERSISTENT_STORES", .. })
        ));
        assert!(matches!(
            from_vars(&[
                ("USE_PERSISTENT_STORES", "1"),
                ("DATABASE_URL", "postgres://x"),
                ("DATABASE_MAX_CONNECTIONS", "0"),
            ]),
            Err(ConfigError::Invalid { var: "DATABASE_MAX_CONNECTIONS", .. })
        ));
        assert!(matches!(
            from_vars(&[("SCAN_TOKEN_PREFIX", "QR-X")]),
            Err(ConfigError::Invalid { var: "SCAN_TOKEN_PREFIX", .. })
        ));
    }

    #[test]
    fn database_settings_are_ignored_when_not_persistent() {
        let config = from_vars(&[
            ("DATABASE_URL", "postgres://x"),
            ("SCAN_TOKEN_PREFIX", "LOT"),
        ])
        .unwrap();
        assert!(config.database.is_none());
        assert_eq!(config.scan_token_prefix, "LOT");
    }
}
