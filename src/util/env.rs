//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    init_env();
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Resolved path of the pricing database file.
///
/// `PRICING_DB_DIR` and `PRICING_DB_FILE` override the location; the
/// defaults put `Pricing.db` in the working directory.
pub fn db_path() -> PathBuf {
    let dir = env_opt("PRICING_DB_DIR").unwrap_or_else(|| ".".into());
    let file = env_opt("PRICING_DB_FILE").unwrap_or_else(|| "Pricing.db".into());
    PathBuf::from(dir).join(file)
}

/// Market codes the pipelines quote against, comma/space separated via
/// `HRG_MARKETS`.
pub fn markets() -> Vec<String> {
    let raw = env_opt("HRG_MARKETS").unwrap_or_else(|| "NO FR DE UK US".into());
    raw.split(|c: char| c == ',' || c == ' ')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_uppercase())
        .collect()
}

/// Per-request timeout applied to every vendor call. The vendor endpoints
/// enforce nothing themselves; without this a hang stalls the whole run.
pub fn http_timeout_secs() -> u64 {
    env_parse("HTTP_TIMEOUT_SECS", 30u64)
}
