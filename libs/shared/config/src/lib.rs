use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: Option<String>,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub extractor_timeout_ms: u64,
    pub extractor_failure_threshold: u64,
    pub extractor_recovery_secs: u64,
    pub clinic_name: String,
    pub clinic_phone: String,
    pub clinic_utc_offset_minutes: i32,
    pub api_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: None,
            gemini_api_key: String::new(),
            gemini_model: "gemini-1.5-flash".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            extractor_timeout_ms: 4000,
            extractor_failure_threshold: 3,
            extractor_recovery_secs: 60,
            clinic_name: "Clínica João Layon".to_string(),
            clinic_phone: "(31) 3333-4444".to_string(),
            clinic_utc_offset_minutes: -180,
            api_port: 3000,
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
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            gemini_api_key: env::var("GEMINI_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("GEMINI_API_KEY not set, only the keyword extractor will be used");
                    String::new()
                }),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: env::var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            extractor_timeout_ms: parse_or("EXTRACTOR_TIMEOUT_MS", defaults.extractor_timeout_ms),
            extractor_failure_threshold: parse_or(
                "EXTRACTOR_FAILURE_THRESHOLD",
                defaults.extractor_failure_threshold,
            ),
            extractor_recovery_secs: parse_or("EXTRACTOR_RECOVERY_SECS", defaults.extractor_recovery_secs),
            clinic_name: env::var("CLINIC_NAME").unwrap_or(defaults.clinic_name),
            clinic_phone: env::var("CLINIC_PHONE").unwrap_or(defaults.clinic_phone),
            clinic_utc_offset_minutes: parse_or(
                "CLINIC_UTC_OFFSET_MINUTES",
                defaults.clinic_utc_offset_minutes,
            ),
            api_port: parse_or("API_PORT", defaults.api_port),
        };

        if !config.is_configured() {
            warn!("Supabase not configured - conversations and bookings will be kept in memory");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_language_model_configured(&self) -> bool {
        !self.gemini_api_key.is_empty() && !self.gemini_base_url.is_empty()
    }

    /// Key sent on server-side writes; the service role key bypasses row level security.
    pub fn supabase_write_key(&self) -> &str {
        self.supabase_service_role_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .unwrap_or(&self.supabase_anon_key)
    }
}

fn parse_or<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_key_prefers_service_role() {
        let mut config = AppConfig {
            supabase_anon_key: "anon".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.supabase_write_key(), "anon");

        config.supabase_service_role_key = Some("service".to_string());
        assert_eq!(config.supabase_write_key(), "service");

        config.supabase_service_role_key = Some(String::new());
        assert_eq!(config.supabase_write_key(), "anon");
    }

    #[test]
    fn defaults_are_not_configured() {
        let config = AppConfig::default();
        assert!(!config.is_configured());
        assert!(!config.is_language_model_configured());
        assert_eq!(config.extractor_timeout_ms, 4000);
    }
}
