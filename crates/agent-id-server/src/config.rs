use agent_id_policy::RiskLevel;
use agent_id_registry::RegistryConfig;
use agent_id_tokens::{
    TokenConfig, DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_REFRESH_TOKEN_TTL, DEFAULT_SDK_REFRESH_TOKEN_TTL,
};
use agent_id_verification::{FailModes, VerificationConfig};
use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Server configuration
#[derive(Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Path to RocksDB database
    pub database_path: PathBuf,

    /// Vault master key (hex-encoded 32 bytes)
    pub vault_master_key: Zeroizing<[u8; 32]>,

    /// HS256 signing secret for all token classes
    pub jwt_secret: Zeroizing<Vec<u8>>,

    pub jwt_issuer: String,
    pub jwt_sdk_issuer: String,

    pub access_token_ttl: u64,
    pub refresh_token_ttl: u64,
    pub sdk_refresh_token_ttl: u64,

    /// Accepted clock difference on signed action requests
    pub freshness_window_seconds: u64,

    /// Bound on policy lookups during verification
    pub remote_check_timeout: Duration,

    /// Risk tiers that proceed when policies are unavailable
    pub fail_open_risk_levels: Vec<RiskLevel>,

    pub key_validity_days: u64,
    pub key_grace_period_hours: u64,

    /// URL written into credential bundles
    pub public_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_path", &self.database_path)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_sdk_issuer", &self.jwt_sdk_issuer)
            .field("freshness_window_seconds", &self.freshness_window_seconds)
            .field("remote_check_timeout", &self.remote_check_timeout)
            .field("fail_open_risk_levels", &self.fail_open_risk_levels)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} is not valid", name)),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any name → value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_address = parse_or(
            &lookup,
            "BIND_ADDRESS",
            SocketAddr::from(([127, 0, 0, 1], 8080)),
        )?;

        let database_path = lookup("DATABASE_PATH")
            .unwrap_or_else(|| "./data/agent-id.db".to_string())
            .into();

        let vault_master_key = {
            let hex_key = lookup("VAULT_MASTER_KEY")
                .context("VAULT_MASTER_KEY environment variable required")?;
            let bytes = Zeroizing::new(hex::decode(hex_key.trim())?);
            if bytes.len() != 32 {
                bail!("VAULT_MASTER_KEY must be 32 bytes (64 hex chars)");
            }
            let mut key = Zeroizing::new([0u8; 32]);
            key.copy_from_slice(&bytes);
            key
        };

        let jwt_secret = Zeroizing::new(
            lookup("JWT_SECRET")
                .context("JWT_SECRET environment variable required")?
                .into_bytes(),
        );

        let jwt_issuer = lookup("JWT_ISSUER").unwrap_or_else(|| "agent-id".to_string());
        let jwt_sdk_issuer = lookup("JWT_SDK_ISSUER").unwrap_or_else(|| "agent-id-sdk".to_string());

        let access_token_ttl =
            parse_or(&lookup, "ACCESS_TOKEN_TTL_SECONDS", DEFAULT_ACCESS_TOKEN_TTL)?;
        let refresh_token_ttl =
            parse_or(&lookup, "REFRESH_TOKEN_TTL_SECONDS", DEFAULT_REFRESH_TOKEN_TTL)?;
        let sdk_refresh_token_ttl = parse_or(
            &lookup,
            "SDK_REFRESH_TOKEN_TTL_SECONDS",
            DEFAULT_SDK_REFRESH_TOKEN_TTL,
        )?;

        let freshness_window_seconds = parse_or(&lookup, "FRESHNESS_WINDOW_SECONDS", 300)?;
        let remote_check_timeout =
            Duration::from_millis(parse_or(&lookup, "REMOTE_CHECK_TIMEOUT_MS", 3000)?);

        let fail_open_risk_levels = match lookup("FAIL_OPEN_RISK_LEVELS") {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|level| !level.is_empty())
                .map(|level| {
                    RiskLevel::parse(level).with_context(|| {
                        format!("FAIL_OPEN_RISK_LEVELS: unknown level '{}'", level)
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let key_validity_days = parse_or(&lookup, "KEY_VALIDITY_DAYS", 90)?;
        let key_grace_period_hours = parse_or(&lookup, "KEY_GRACE_PERIOD_HOURS", 24)?;
        if key_validity_days == 0 {
            bail!("KEY_VALIDITY_DAYS must be positive");
        }

        let public_url = lookup("PUBLIC_URL").unwrap_or_else(|| format!("http://{}", bind_address));

        Ok(Config {
            bind_address,
            database_path,
            vault_master_key,
            jwt_secret,
            jwt_issuer,
            jwt_sdk_issuer,
            access_token_ttl,
            refresh_token_ttl,
            sdk_refresh_token_ttl,
            freshness_window_seconds,
            remote_check_timeout,
            fail_open_risk_levels,
            key_validity_days,
            key_grace_period_hours,
            public_url,
        })
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            issuer: self.jwt_issuer.clone(),
            sdk_issuer: self.jwt_sdk_issuer.clone(),
            access_token_ttl: self.access_token_ttl,
            refresh_token_ttl: self.refresh_token_ttl,
            sdk_refresh_token_ttl: self.sdk_refresh_token_ttl,
            ..TokenConfig::new(self.jwt_secret.to_vec())
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            key_validity_seconds: self.key_validity_days * 24 * 3600,
            grace_period_seconds: self.key_grace_period_hours * 3600,
            ..RegistryConfig::default()
        }
    }

    pub fn verification_config(&self) -> VerificationConfig {
        VerificationConfig {
            freshness_window_seconds: self.freshness_window_seconds,
            remote_check_timeout: self.remote_check_timeout,
            fail_modes: FailModes::open_for(&self.fail_open_risk_levels),
            ..VerificationConfig::default()
        }
    }
}
