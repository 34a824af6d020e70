use std::env;
use std::str::FromStr;
use tracing::warn;

/// Where visits and availability windows are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Supabase,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            "supabase" => Ok(StoreBackend::Supabase),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub schedule_store: StoreBackend,
    pub redis_url: Option<String>,
    pub lock_timeout_ms: u64,
    pub lock_ttl_seconds: u64,
    pub flat_visit_minutes: u32,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            schedule_store: StoreBackend::Memory,
            redis_url: None,
            lock_timeout_ms: 5_000,
            lock_ttl_seconds: 30,
            flat_visit_minutes: 25,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            schedule_store: parse_var("SCHEDULE_STORE", defaults.schedule_store),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            lock_timeout_ms: parse_var("SCHEDULE_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
            lock_ttl_seconds: parse_var("SCHEDULE_LOCK_TTL_SECONDS", defaults.lock_ttl_seconds),
            flat_visit_minutes: parse_var("FLAT_VISIT_MINUTES", defaults.flat_visit_minutes),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
        };

        if config.schedule_store == StoreBackend::Supabase && !config.is_supabase_configured() {
            warn!("SCHEDULE_STORE=supabase but Supabase is not configured - missing environment variables");
        }

        config
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_redis_configured(&self) -> bool {
        self.redis_url.is_some()
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {:?}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
