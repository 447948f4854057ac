use std::time::Duration;

use anyhow::Context;

const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub page_size: u32,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("PREDICTIONS_API_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let page_size = match lookup("PREDICTIONS_PAGE_SIZE") {
            Some(raw) => raw.trim().parse::<u32>().with_context(|| {
                format!("PREDICTIONS_PAGE_SIZE must be a positive integer, got `{raw}`")
            })?,
            None => DEFAULT_PAGE_SIZE,
        };
        anyhow::ensure!(page_size > 0, "PREDICTIONS_PAGE_SIZE must be greater than zero");

        let timeout_secs = match lookup("PREDICTIONS_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().with_context(|| {
                format!("PREDICTIONS_TIMEOUT_SECS must be a whole number of seconds, got `{raw}`")
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            page_size,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.api_url, "http://localhost:8000/api");
        assert_eq!(settings.page_size, 100);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("PREDICTIONS_API_URL", "https://dash.example.org/api/"),
            ("PREDICTIONS_PAGE_SIZE", "250"),
            ("PREDICTIONS_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(settings.api_url, "https://dash.example.org/api");
        assert_eq!(settings.page_size, 250);
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_page_size_is_rejected() {
        assert!(Settings::from_lookup(lookup_from(&[("PREDICTIONS_PAGE_SIZE", "lots")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("PREDICTIONS_PAGE_SIZE", "0")])).is_err());
    }
}
