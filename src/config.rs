use std::time::Duration;

pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEOCODER_BASE: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_APP_URL: &str = "https://aistudio.google.com/";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` is allowed here; synthesis reports it when a call is made.
    pub api_key: Option<String>,
    pub gemini_base: String,
    pub geocoder_base: String,
    pub app_url: String,
    pub port: u16,
    /// Sessions untouched for this long are dropped by the sweeper.
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            gemini_base: DEFAULT_GEMINI_BASE.to_string(),
            geocoder_base: DEFAULT_GEOCODER_BASE.to_string(),
            app_url: DEFAULT_APP_URL.to_string(),
            port: DEFAULT_PORT,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            api_key: non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")),
            gemini_base: non_empty("GEMINI_API_BASE").unwrap_or(defaults.gemini_base),
            geocoder_base: non_empty("GEOCODER_BASE").unwrap_or(defaults.geocoder_base),
            app_url: non_empty("APP_URL").unwrap_or(defaults.app_url),
            port: non_empty("PORT").and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
            session_ttl: non_empty("SESSION_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
        }
    }

    /// Key prefix for startup logging.
    pub fn redacted_key(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}...", key.chars().take(6).collect::<String>()),
            None => "<missing>".to_string(),
        }
    }
}
