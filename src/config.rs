use anyhow::{anyhow, Context, Result};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub cache: CacheConfig,
    pub weather_api: WeatherApiConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Redis `host:port`. Without it the cache lives in process memory.
    pub address: Option<String>,
    pub password: Option<String>,
    pub db: u32,
    pub ttl: Duration,
    pub max_entries: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherApiConfig {
    pub url: String,
    pub key: String,
    pub timeout: Duration,
}

const DEFAULT_REDIS_PORT: u16 = 6379;

impl CacheConfig {
    /// Connection settings for the redis store, or `None` when no address is
    /// configured. The password is passed as-is, never through a URL.
    pub fn redis_connection_info(&self) -> Result<Option<ConnectionInfo>> {
        let Some(address) = self.address.as_deref() else {
            return Ok(None);
        };
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) if !host.ends_with(':') => {
                let port = port
                    .parse()
                    .with_context(|| format!("invalid port in APP_CACHE_ADDRESS: {:?}", address))?;
                (host, port)
            }
            _ => (address, DEFAULT_REDIS_PORT),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(Some(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: RedisConnectionInfo {
                db: i64::from(self.db),
                password: self.password.clone(),
                ..Default::default()
            },
        }))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let port = parse_or(&var, "APP_PORT", 8080)?;

        let cache = CacheConfig {
            address: var("APP_CACHE_ADDRESS"),
            password: var("APP_CACHE_PASSWORD"),
            db: parse_or(&var, "APP_CACHE_DB", 0)?,
            ttl: Duration::from_secs(parse_or(&var, "APP_CACHE_TTL_SECS", 300)?),
            max_entries: parse_or(&var, "APP_CACHE_MAX_ENTRIES", 10_000)?,
        };

        let weather_api = WeatherApiConfig {
            url: var("APP_WEATHER_API_URL")
                .unwrap_or_else(|| "https://api.openweathermap.org".to_string()),
            key: var("APP_WEATHER_API_KEY")
                .ok_or_else(|| anyhow!("APP_WEATHER_API_KEY not set"))?,
            timeout: Duration::from_millis(parse_or(&var, "APP_WEATHER_API_TIMEOUT_MS", 1000)?),
        };

        Ok(Self {
            port,
            cache,
            weather_api,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        None => Ok(default),
    }
}
