//! Client configuration shared by every domain client.

use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_BASE_DOMAIN: &str = "wowsql.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_PROJECT_URL: &str = "WOWSQL_PROJECT_URL";
pub const ENV_API_KEY: &str = "WOWSQL_API_KEY";
pub const ENV_TIMEOUT_SECS: &str = "WOWSQL_TIMEOUT_SECS";

/// Where and how to reach a project.
///
/// `project_url` may be a full URL (`https://acme.wowsql.com`), a host
/// (`acme.wowsql.com`) or a bare project slug (`acme`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub project_url: String,
    pub api_key: String,
    pub base_domain: String,
    pub secure: bool,
    /// `None` uses the per-client default.
    pub timeout: Option<Duration>,
    pub auto_check_quota: bool,
}

impl ClientConfig {
    pub fn new(project_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_url: project_url.into(),
            api_key: api_key.into(),
            base_domain: DEFAULT_BASE_DOMAIN.to_string(),
            secure: true,
            timeout: None,
            auto_check_quota: true,
        }
    }

    /// Read `WOWSQL_PROJECT_URL`, `WOWSQL_API_KEY` and the optional
    /// `WOWSQL_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ApiError> {
        let project_url = required_env(ENV_PROJECT_URL)?;
        let api_key = required_env(ENV_API_KEY)?;
        let mut config = Self::new(project_url, api_key);
        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ApiError::Config(format!("{ENV_TIMEOUT_SECS} must be an integer, got {raw:?}")))?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_domain(mut self, base_domain: impl Into<String>) -> Self {
        self.base_domain = base_domain.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_auto_check_quota(mut self, enabled: bool) -> Self {
        self.auto_check_quota = enabled;
        self
    }

    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }

    /// Absolute base URL of the project, without a trailing `/` or `/api`.
    pub fn base_url(&self) -> String {
        resolve_project_url(&self.project_url, &self.base_domain, self.secure)
    }

    /// First label of the project host, used by the S3 management endpoints.
    pub fn project_slug(&self) -> String {
        project_slug(&self.project_url)
    }
}

fn required_env(name: &str) -> Result<String, ApiError> {
    std::env::var(name).map_err(|_| ApiError::Config(format!("{name} is not set")))
}

pub fn resolve_project_url(project_url: &str, base_domain: &str, secure: bool) -> String {
    let normalized = project_url.trim();
    let base_domain = if base_domain.is_empty() {
        DEFAULT_BASE_DOMAIN
    } else {
        base_domain
    };

    let absolute = if normalized.starts_with("http://") || normalized.starts_with("https://") {
        normalized.to_string()
    } else {
        let scheme = if secure { "https" } else { "http" };
        let host = normalized.trim_end_matches('/');
        if host.contains(&format!(".{base_domain}")) || host.ends_with(base_domain) {
            format!("{scheme}://{host}")
        } else {
            format!("{scheme}://{host}.{base_domain}")
        }
    };

    let trimmed = absolute.trim_end_matches('/');
    trimmed.strip_suffix("/api").unwrap_or(trimmed).to_string()
}

pub fn project_slug(project_url: &str) -> String {
    let trimmed = project_url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme.split('/').next().unwrap_or(without_scheme);
    let host = host.split(':').next().unwrap_or(host);
    host.split('.').next().unwrap_or(host).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_slug_gets_domain_and_scheme() {
        assert_eq!(
            resolve_project_url("acme", DEFAULT_BASE_DOMAIN, true),
            "https://acme.wowsql.com"
        );
        assert_eq!(
            resolve_project_url("acme", "example.test", false),
            "http://acme.example.test"
        );
    }

    #[test]
    fn host_with_domain_is_not_duplicated() {
        assert_eq!(
            resolve_project_url("acme.wowsql.com/", DEFAULT_BASE_DOMAIN, true),
            "https://acme.wowsql.com"
        );
    }

    #[test]
    fn full_url_is_kept_and_api_suffix_stripped() {
        assert_eq!(
            resolve_project_url("http://127.0.0.1:8080/api/", DEFAULT_BASE_DOMAIN, true),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn slug_extraction() {
        assert_eq!(project_slug("https://acme.wowsql.com"), "acme");
        assert_eq!(project_slug("acme.wowsql.com"), "acme");
        assert_eq!(project_slug("acme"), "acme");
        assert_eq!(project_slug("http://localhost:3000/api"), "localhost");
    }

    #[test]
    fn builder_setters() {
        let config = ClientConfig::new("acme", "key")
            .with_timeout(Duration::from_secs(5))
            .with_auto_check_quota(false)
            .with_secure(false);
        assert_eq!(config.timeout_or(DEFAULT_TIMEOUT), Duration::from_secs(5));
        assert!(!config.auto_check_quota);
        assert_eq!(config.base_url(), "http://acme.wowsql.com");
        assert_eq!(
            ClientConfig::new("acme", "key").timeout_or(DEFAULT_STORAGE_TIMEOUT),
            DEFAULT_STORAGE_TIMEOUT
        );
    }
}
