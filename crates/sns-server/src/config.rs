use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl_hours: i64,
    pub public_reads: bool,
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("SNS_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SNS_JWT_SECRET is unset or still a placeholder");
        }

        let db_path: PathBuf = lookup("SNS_DB_PATH").unwrap_or_else(|| "sns.db".into()).into();
        let host = lookup("SNS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("SNS_PORT")
            .unwrap_or_else(|| "50051".into())
            .parse()
            .context("SNS_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let token_ttl_hours: i64 = match lookup("SNS_TOKEN_TTL_HOURS") {
            Some(v) => v.parse().context("SNS_TOKEN_TTL_HOURS must be a number of hours")?,
            None => sns_api::token::TokenService::DEFAULT_TTL_HOURS,
        };
        if token_ttl_hours <= 0 {
            bail!("SNS_TOKEN_TTL_HOURS must be positive");
        }

        let public_reads = match lookup("SNS_PUBLIC_READS").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => bail!("SNS_PUBLIC_READS must be true or false, got '{}'", other),
        };

        let request_timeout = lookup("SNS_REQUEST_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>().context("SNS_REQUEST_TIMEOUT_SECS must be a number of seconds"))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl_hours,
            public_reads,
            request_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let cfg = config(&[("SNS_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("sns.db"));
        assert_eq!(cfg.addr.port(), 50051);
        assert_eq!(cfg.token_ttl_hours, 24);
        assert!(!cfg.public_reads);
        assert!(cfg.request_timeout.is_none());
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert!(config(&[]).is_err());
        assert!(config(&[("SNS_JWT_SECRET", "")]).is_err());
        assert!(config(&[("SNS_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("SNS_JWT_SECRET", "s3cr3t"),
            ("SNS_HOST", "127.0.0.1"),
            ("SNS_PORT", "8080"),
            ("SNS_TOKEN_TTL_HOURS", "2"),
            ("SNS_PUBLIC_READS", "true"),
            ("SNS_REQUEST_TIMEOUT_SECS", "15"),
        ])
        .unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.token_ttl_hours, 2);
        assert!(cfg.public_reads);
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (key, value) in [
            ("SNS_PORT", "http"),
            ("SNS_TOKEN_TTL_HOURS", "0"),
            ("SNS_PUBLIC_READS", "maybe"),
            ("SNS_REQUEST_TIMEOUT_SECS", "-1"),
        ] {
            assert!(config(&[("SNS_JWT_SECRET", "s3cr3t"), (key, value)]).is_err(), "{key}={value}");
        }
    }
}
