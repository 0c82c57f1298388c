use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::analysis::problems::{DEFAULT_MIN_DENOMINATOR, DEFAULT_THRESHOLD_PCT};

pub const DEFAULT_REFLECTION_HISTORY_LIMIT: usize = 5;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent → in-memory stores, nothing survives a restart.
    pub database_url: Option<String>,
    /// Absent → recommendations fall back to the rendered prompt.
    pub anthropic_api_key: Option<String>,
    pub hypotheses_path: Option<PathBuf>,
    pub problem_threshold_pct: u32,
    pub problem_min_denominator: u32,
    pub reflection_history_limit: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            anthropic_api_key: None,
            hypotheses_path: None,
            problem_threshold_pct: DEFAULT_THRESHOLD_PCT,
            problem_min_denominator: DEFAULT_MIN_DENOMINATOR,
            reflection_history_limit: DEFAULT_REFLECTION_HISTORY_LIMIT,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            hypotheses_path: optional_env("HYPOTHESES_PATH").map(PathBuf::from),
            problem_threshold_pct: parse_env("PROBLEM_THRESHOLD_PCT", defaults.problem_threshold_pct)?,
            problem_min_denominator: parse_env(
                "PROBLEM_MIN_DENOMINATOR",
                defaults.problem_min_denominator,
            )?,
            reflection_history_limit: parse_env(
                "REFLECTION_HISTORY_LIMIT",
                defaults.reflection_history_limit,
            )?,
            port: parse_env("PORT", defaults.port)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }
}

/// Unset and blank are the same thing.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
