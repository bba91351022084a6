use anyhow::{Context, Result};
use chrono::Duration;
use std::env;
use std::path::PathBuf;

use proofdesk_core::openai::DEFAULT_BASE_URL;
use proofdesk_core::{
    IngestOptions, LockPolicy, OpenAIConfig, DEFAULT_LOCK_TTL_MINUTES, DEFAULT_MODEL,
};

/// Request body limit for document uploads, 20 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// File name of the SQLite database inside `state_dir`.
pub const DATABASE_FILE: &str = "proofdesk.db";

#[derive(Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub lock_ttl: Duration,
    /// Let save/generate/approve/reject ignore expired locks held by others.
    pub lock_guard_checks_expiry: bool,
    /// Clear lock fields when a record is re-ingested.
    pub ingest_clears_locks: bool,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|s| !s.trim().is_empty())
            .context("OPENAI_API_KEY environment variable is required")?;

        let openai_model = non_empty_or(lookup("OPENAI_MODEL"), DEFAULT_MODEL);
        let openai_base_url = non_empty_or(lookup("OPENAI_BASE_URL"), DEFAULT_BASE_URL);

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = lookup("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let lock_ttl_minutes = lookup("LOCK_TTL_MINUTES")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("LOCK_TTL_MINUTES must be a whole number of minutes")?
            .unwrap_or(DEFAULT_LOCK_TTL_MINUTES);
        if lock_ttl_minutes <= 0 {
            anyhow::bail!("LOCK_TTL_MINUTES must be positive, got {}", lock_ttl_minutes);
        }
        let lock_ttl = Duration::try_minutes(lock_ttl_minutes)
            .with_context(|| format!("LOCK_TTL_MINUTES {} is out of range", lock_ttl_minutes))?;

        let lock_guard_checks_expiry = parse_flag(lookup("LOCK_GUARD_CHECKS_EXPIRY"))
            .context("LOCK_GUARD_CHECKS_EXPIRY must be true or false")?;

        let ingest_clears_locks = parse_flag(lookup("INGEST_CLEARS_LOCKS"))
            .context("INGEST_CLEARS_LOCKS must be true or false")?;

        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("MAX_UPLOAD_BYTES must be a valid number")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Ok(Config {
            openai_api_key,
            openai_model,
            openai_base_url,
            port,
            state_dir,
            lock_ttl,
            lock_guard_checks_expiry,
            ingest_clears_locks,
            max_upload_bytes,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }

    pub fn openai(&self) -> OpenAIConfig {
        OpenAIConfig {
            api_key: self.openai_api_key.clone(),
            model: self.openai_model.clone(),
            base_url: self.openai_base_url.clone(),
        }
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            guard_checks_expiry: self.lock_guard_checks_expiry,
            ..LockPolicy::with_ttl(self.lock_ttl)
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            clear_locks: self.ingest_clears_locks,
        }
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parse a boolean switch. Unset or empty means false.
pub fn parse_flag(value: Option<String>) -> Result<bool> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => anyhow::bail!("unrecognised boolean '{}'", v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.openai_base_url, "https://api.openai.com/v1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_path(), PathBuf::from("./proofdesk.db"));
        assert_eq!(config.max_upload_bytes, 20_971_520);
        assert_eq!(config.lock_policy(), LockPolicy::default());
        assert_eq!(config.ingest_options(), IngestOptions::default());
    }

    #[test]
    fn test_api_key_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("OPENAI_API_KEY", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4.1"),
            ("PORT", "8080"),
            ("STATE_DIR", "/var/lib/proofdesk"),
            ("LOCK_TTL_MINUTES", "5"),
            ("LOCK_GUARD_CHECKS_EXPIRY", "true"),
            ("INGEST_CLEARS_LOCKS", "1"),
        ])
        .unwrap();

        assert_eq!(config.openai().model, "gpt-4.1");
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/proofdesk/proofdesk.db")
        );
        let policy = config.lock_policy();
        assert_eq!(policy.ttl, Duration::minutes(5));
        assert!(policy.guard_checks_expiry);
        assert!(config.ingest_options().clear_locks);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(load(&[("OPENAI_API_KEY", "k"), ("PORT", "http")]).is_err());
        assert!(load(&[("OPENAI_API_KEY", "k"), ("LOCK_TTL_MINUTES", "0")]).is_err());
        assert!(load(&[("OPENAI_API_KEY", "k"), ("INGEST_CLEARS_LOCKS", "maybe")]).is_err());
    }

    #[test]
    fn test_lock_ttl_beyond_duration_range_is_rejected() {
        let huge = i64::MAX.to_string();
        let err = load(&[("OPENAI_API_KEY", "k"), ("LOCK_TTL_MINUTES", huge.as_str())])
            .err()
            .unwrap();
        assert!(err.to_string().contains("out of range"));

        let config = load(&[("OPENAI_API_KEY", "k"), ("LOCK_TTL_MINUTES", "1440")]).unwrap();
        assert_eq!(config.lock_policy().ttl, Duration::days(1));
    }

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag(None).unwrap());
        assert!(!parse_flag(Some(String::new())).unwrap());
        assert!(parse_flag(Some("TRUE".to_string())).unwrap());
        assert!(!parse_flag(Some(" false ".to_string())).unwrap());
        assert!(parse_flag(Some("yes".to_string())).is_err());
    }
}
