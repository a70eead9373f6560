use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::llm_client::Provider;

/// Connection settings for one chat-completion provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub port: u16,
    pub rust_log: String,

    pub llm_provider: Provider,
    /// Every known provider, in fallback priority order.
    pub providers: Vec<ProviderSettings>,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,

    pub embedding_api_key: Option<String>,
    pub embedding_api_base: String,
    pub embedding_model: String,
    pub vector_dimension: usize,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub cache_expire_minutes: u64,
    pub max_document_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let providers = Provider::ALL
            .iter()
            .map(|&provider| ProviderSettings {
                provider,
                api_key: optional_env(&format!("{}_API_KEY", provider.env_prefix())),
                api_base: std::env::var(format!("{}_API_BASE", provider.env_prefix()))
                    .unwrap_or_else(|_| provider.default_api_base().to_string()),
                model: std::env::var(format!("{}_MODEL", provider.env_prefix()))
                    .unwrap_or_else(|_| provider.default_model().to_string()),
            })
            .collect();

        let config = Config {
            database_url: require_env("DATABASE_URL")?,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 10)?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),

            llm_provider: parse_env("LLM_PROVIDER", Provider::Qwen)?,
            providers,
            llm_temperature: parse_env("LLM_TEMPERATURE", 0.7)?,
            llm_max_tokens: parse_env("LLM_MAX_TOKENS", 2000)?,

            embedding_api_key: optional_env("EMBEDDING_API_KEY"),
            embedding_api_base: std::env::var("EMBEDDING_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            vector_dimension: parse_env("VECTOR_DIMENSION", 384)?,

            chunk_size: parse_env("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_env("CHUNK_OVERLAP", 100)?,
            cache_expire_minutes: parse_env("CACHE_EXPIRE_MINUTES", 30)?,
            max_document_bytes: parse_env("MAX_DOCUMENT_BYTES", 100 * 1024 * 1024)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than zero");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.db_max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be greater than zero");
        }
        if self.vector_dimension == 0 {
            bail!("VECTOR_DIMENSION must be greater than zero");
        }
        Ok(())
    }

    /// Search-result cache lifetime in seconds.
    pub fn cache_ttl_secs(&self) -> u64 {
        self.cache_expire_minutes * 60
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank values are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            database_url: "postgres://localhost/mentor".into(),
            db_max_connections: 10,
            redis_url: "redis://localhost".into(),
            s3_bucket: "reports".into(),
            s3_endpoint: "http://localhost:9000".into(),
            aws_access_key_id: "minio".into(),
            aws_secret_access_key: "minio123".into(),
            port: 8080,
            rust_log: "info".into(),
            llm_provider: Provider::Qwen,
            providers: vec![],
            llm_temperature: 0.7,
            llm_max_tokens: 2000,
            embedding_api_key: None,
            embedding_api_base: "https://api.openai.com/v1".into(),
            embedding_model: "text-embedding-3-small".into(),
            vector_dimension: 384,
            chunk_size: 1000,
            chunk_overlap: 100,
            cache_expire_minutes: 30,
            max_document_bytes: 1024,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let mut config = sample();
        config.chunk_overlap = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_ttl_in_seconds() {
        assert_eq!(sample().cache_ttl_secs(), 1800);
    }

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        let value: u16 = parse_env("MENTOR_TEST_SURELY_UNSET_PORT", 4242).unwrap();
        assert_eq!(value, 4242);
    }
}
