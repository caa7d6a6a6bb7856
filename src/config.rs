//! Carrier settings.
//!
//! Every settings struct has sensible defaults, chained `with_*`
//! overrides, and a `from_env()` constructor for convention-based setup.
//! Key material is never part of settings; it goes to the signer, crypter
//! and JWT codec constructors.

use axum::http::HeaderName;
use axum_extra::extract::cookie::SameSite;
use time::Duration;

use crate::cookies::{self, CookieSpec};
use crate::error::ConfigError;
use crate::http::RequestPart;

const DEFAULT_EXPIRY: Duration = Duration::hours(12);
const DEFAULT_HEADER_NAME: &str = "x-auth-token";

/// Settings for the cookie carrier.
#[derive(Debug, Clone)]
pub struct CookieAuthenticatorSettings {
    pub(crate) cookie_name: String,
    pub(crate) cookie_path: String,
    pub(crate) cookie_domain: Option<String>,
    pub(crate) secure_cookie: bool,
    pub(crate) http_only_cookie: bool,
    pub(crate) same_site: Option<SameSite>,
    pub(crate) use_fingerprinting: bool,
    pub(crate) cookie_max_age: Option<Duration>,
    pub(crate) authenticator_idle_timeout: Option<Duration>,
    pub(crate) authenticator_expiry: Duration,
}

impl Default for CookieAuthenticatorSettings {
    fn default() -> Self {
        Self {
            cookie_name: "authenticator".into(),
            cookie_path: "/".into(),
            cookie_domain: None,
            secure_cookie: true,
            http_only_cookie: true,
            same_site: Some(SameSite::Lax),
            use_fingerprinting: true,
            cookie_max_age: None,
            authenticator_idle_timeout: None,
            authenticator_expiry: DEFAULT_EXPIRY,
        }
    }
}

impl CookieAuthenticatorSettings {
    /// Create settings from environment variables.
    ///
    /// # Optional env vars
    /// - `AUTH_COOKIE_NAME`, `AUTH_COOKIE_PATH`, `AUTH_COOKIE_DOMAIN`
    /// - `AUTH_COOKIE_SECURE`, `AUTH_COOKIE_HTTP_ONLY`: `true`/`false`/`1`/`0`
    /// - `AUTH_COOKIE_SAME_SITE`: `lax`, `strict` or `none`
    /// - `AUTH_COOKIE_FINGERPRINTING`: `true`/`false`
    /// - `AUTH_COOKIE_MAX_AGE_SECS`, `AUTH_COOKIE_IDLE_TIMEOUT_SECS`,
    ///   `AUTH_COOKIE_EXPIRY_SECS`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(name) = env_string("AUTH_COOKIE_NAME") {
            settings.cookie_name = name;
        }
        if let Some(path) = env_string("AUTH_COOKIE_PATH") {
            settings.cookie_path = path;
        }
        if let Some(domain) = env_string("AUTH_COOKIE_DOMAIN") {
            settings.cookie_domain = Some(domain);
        }
        if let Some(secure) = env_bool("AUTH_COOKIE_SECURE")? {
            settings.secure_cookie = secure;
        }
        if let Some(http_only) = env_bool("AUTH_COOKIE_HTTP_ONLY")? {
            settings.http_only_cookie = http_only;
        }
        if let Some(same_site) = env_same_site("AUTH_COOKIE_SAME_SITE")? {
            settings.same_site = Some(same_site);
        }
        if let Some(fingerprinting) = env_bool("AUTH_COOKIE_FINGERPRINTING")? {
            settings.use_fingerprinting = fingerprinting;
        }
        if let Some(max_age) = env_secs("AUTH_COOKIE_MAX_AGE_SECS")? {
            settings.cookie_max_age = Some(max_age);
        }
        if let Some(idle) = env_secs("AUTH_COOKIE_IDLE_TIMEOUT_SECS")? {
            settings.authenticator_idle_timeout = Some(idle);
        }
        if let Some(expiry) = env_secs("AUTH_COOKIE_EXPIRY_SECS")? {
            settings.authenticator_expiry = expiry;
        }
        Ok(settings)
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_secure_cookie(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    #[must_use]
    pub fn with_http_only_cookie(mut self, http_only: bool) -> Self {
        self.http_only_cookie = http_only;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_fingerprinting(mut self, enabled: bool) -> Self {
        self.use_fingerprinting = enabled;
        self
    }

    /// Persistent cookie lifetime. `None` issues a browser-session cookie.
    #[must_use]
    pub fn with_cookie_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.cookie_max_age = max_age;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.authenticator_idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.authenticator_expiry = expiry;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub(crate) fn cookie_spec(&self) -> CookieSpec<'_> {
        CookieSpec {
            name: &self.cookie_name,
            path: &self.cookie_path,
            domain: self.cookie_domain.as_deref(),
            secure: self.secure_cookie,
            http_only: self.http_only_cookie,
            same_site: self.same_site,
            max_age: self.cookie_max_age,
        }
    }
}

/// Settings for the framework-session carrier.
#[derive(Debug, Clone)]
pub struct SessionAuthenticatorSettings {
    pub(crate) session_key: String,
    pub(crate) use_fingerprinting: bool,
    pub(crate) authenticator_idle_timeout: Option<Duration>,
    pub(crate) authenticator_expiry: Duration,
}

impl Default for SessionAuthenticatorSettings {
    fn default() -> Self {
        Self {
            session_key: "authenticator".into(),
            use_fingerprinting: true,
            authenticator_idle_timeout: None,
            authenticator_expiry: DEFAULT_EXPIRY,
        }
    }
}

impl SessionAuthenticatorSettings {
    /// Create settings from `AUTH_SESSION_KEY`, `AUTH_SESSION_FINGERPRINTING`,
    /// `AUTH_SESSION_IDLE_TIMEOUT_SECS` and `AUTH_SESSION_EXPIRY_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(key) = env_string("AUTH_SESSION_KEY") {
            settings.session_key = key;
        }
        if let Some(fingerprinting) = env_bool("AUTH_SESSION_FINGERPRINTING")? {
            settings.use_fingerprinting = fingerprinting;
        }
        if let Some(idle) = env_secs("AUTH_SESSION_IDLE_TIMEOUT_SECS")? {
            settings.authenticator_idle_timeout = Some(idle);
        }
        if let Some(expiry) = env_secs("AUTH_SESSION_EXPIRY_SECS")? {
            settings.authenticator_expiry = expiry;
        }
        Ok(settings)
    }

    #[must_use]
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    #[must_use]
    pub fn with_fingerprinting(mut self, enabled: bool) -> Self {
        self.use_fingerprinting = enabled;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.authenticator_idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.authenticator_expiry = expiry;
        self
    }

    #[must_use]
    pub fn session_key(&self) -> &str {
        &self.session_key
    }
}

/// Settings for the bearer-token carrier.
#[derive(Debug, Clone)]
pub struct BearerTokenAuthenticatorSettings {
    pub(crate) header_name: HeaderName,
    pub(crate) request_parts: Vec<RequestPart>,
    pub(crate) authenticator_idle_timeout: Option<Duration>,
    pub(crate) authenticator_expiry: Duration,
}

impl Default for BearerTokenAuthenticatorSettings {
    fn default() -> Self {
        Self {
            header_name: HeaderName::from_static(DEFAULT_HEADER_NAME),
            request_parts: vec![RequestPart::Headers],
            authenticator_idle_timeout: None,
            authenticator_expiry: DEFAULT_EXPIRY,
        }
    }
}

impl BearerTokenAuthenticatorSettings {
    /// Create settings from `AUTH_BEARER_HEADER_NAME`,
    /// `AUTH_BEARER_REQUEST_PARTS` (comma-separated `headers`/`query`),
    /// `AUTH_BEARER_IDLE_TIMEOUT_SECS` and `AUTH_BEARER_EXPIRY_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(name) = env_header_name("AUTH_BEARER_HEADER_NAME")? {
            settings.header_name = name;
        }
        if let Some(parts) = env_request_parts("AUTH_BEARER_REQUEST_PARTS")? {
            settings.request_parts = parts;
        }
        if let Some(idle) = env_secs("AUTH_BEARER_IDLE_TIMEOUT_SECS")? {
            settings.authenticator_idle_timeout = Some(idle);
        }
        if let Some(expiry) = env_secs("AUTH_BEARER_EXPIRY_SECS")? {
            settings.authenticator_expiry = expiry;
        }
        Ok(settings)
    }

    #[must_use]
    pub fn with_header_name(mut self, name: HeaderName) -> Self {
        self.header_name = name;
        self
    }

    #[must_use]
    pub fn with_request_parts(mut self, parts: Vec<RequestPart>) -> Self {
        self.request_parts = parts;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.authenticator_idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.authenticator_expiry = expiry;
        self
    }

    #[must_use]
    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }
}

/// Settings for the JWT carrier.
#[derive(Debug, Clone)]
pub struct JwtAuthenticatorSettings {
    pub(crate) header_name: HeaderName,
    pub(crate) request_parts: Vec<RequestPart>,
    pub(crate) issuer: String,
    pub(crate) encrypt_subject: bool,
    pub(crate) authenticator_idle_timeout: Option<Duration>,
    pub(crate) authenticator_expiry: Duration,
}

impl Default for JwtAuthenticatorSettings {
    fn default() -> Self {
        Self {
            header_name: HeaderName::from_static(DEFAULT_HEADER_NAME),
            request_parts: vec![RequestPart::Headers],
            issuer: "authwright".into(),
            encrypt_subject: true,
            authenticator_idle_timeout: None,
            authenticator_expiry: DEFAULT_EXPIRY,
        }
    }
}

impl JwtAuthenticatorSettings {
    /// Create settings from `AUTH_JWT_HEADER_NAME`, `AUTH_JWT_REQUEST_PARTS`,
    /// `AUTH_JWT_ISSUER`, `AUTH_JWT_ENCRYPT_SUBJECT`,
    /// `AUTH_JWT_IDLE_TIMEOUT_SECS` and `AUTH_JWT_EXPIRY_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(name) = env_header_name("AUTH_JWT_HEADER_NAME")? {
            settings.header_name = name;
        }
        if let Some(parts) = env_request_parts("AUTH_JWT_REQUEST_PARTS")? {
            settings.request_parts = parts;
        }
        if let Some(issuer) = env_string("AUTH_JWT_ISSUER") {
            settings.issuer = issuer;
        }
        if let Some(encrypt) = env_bool("AUTH_JWT_ENCRYPT_SUBJECT")? {
            settings.encrypt_subject = encrypt;
        }
        if let Some(idle) = env_secs("AUTH_JWT_IDLE_TIMEOUT_SECS")? {
            settings.authenticator_idle_timeout = Some(idle);
        }
        if let Some(expiry) = env_secs("AUTH_JWT_EXPIRY_SECS")? {
            settings.authenticator_expiry = expiry;
        }
        Ok(settings)
    }

    #[must_use]
    pub fn with_header_name(mut self, name: HeaderName) -> Self {
        self.header_name = name;
        self
    }

    #[must_use]
    pub fn with_request_parts(mut self, parts: Vec<RequestPart>) -> Self {
        self.request_parts = parts;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Encrypt the `sub` claim so token readers cannot see the login info.
    #[must_use]
    pub fn with_encrypt_subject(mut self, encrypt: bool) -> Self {
        self.encrypt_subject = encrypt;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.authenticator_idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.authenticator_expiry = expiry;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }
}

/// Settings for the CSRF companion cookie of the social state.
#[derive(Debug, Clone)]
pub struct CsrfStateSettings {
    pub(crate) cookie_name: String,
    pub(crate) cookie_path: String,
    pub(crate) cookie_domain: Option<String>,
    pub(crate) secure_cookie: bool,
    pub(crate) http_only_cookie: bool,
    pub(crate) same_site: Option<SameSite>,
    pub(crate) expiry: Duration,
}

impl Default for CsrfStateSettings {
    fn default() -> Self {
        Self {
            cookie_name: "OAuth2State".into(),
            cookie_path: "/".into(),
            cookie_domain: None,
            secure_cookie: true,
            http_only_cookie: true,
            same_site: Some(SameSite::Lax),
            expiry: Duration::minutes(5),
        }
    }
}

impl CsrfStateSettings {
    /// Create settings from `AUTH_CSRF_COOKIE_NAME`, `AUTH_CSRF_COOKIE_PATH`,
    /// `AUTH_CSRF_COOKIE_DOMAIN`, `AUTH_CSRF_COOKIE_SECURE`,
    /// `AUTH_CSRF_COOKIE_HTTP_ONLY`, `AUTH_CSRF_COOKIE_SAME_SITE` and
    /// `AUTH_CSRF_EXPIRY_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(name) = env_string("AUTH_CSRF_COOKIE_NAME") {
            settings.cookie_name = name;
        }
        if let Some(path) = env_string("AUTH_CSRF_COOKIE_PATH") {
            settings.cookie_path = path;
        }
        if let Some(domain) = env_string("AUTH_CSRF_COOKIE_DOMAIN") {
            settings.cookie_domain = Some(domain);
        }
        if let Some(secure) = env_bool("AUTH_CSRF_COOKIE_SECURE")? {
            settings.secure_cookie = secure;
        }
        if let Some(http_only) = env_bool("AUTH_CSRF_COOKIE_HTTP_ONLY")? {
            settings.http_only_cookie = http_only;
        }
        if let Some(same_site) = env_same_site("AUTH_CSRF_COOKIE_SAME_SITE")? {
            settings.same_site = Some(same_site);
        }
        if let Some(expiry) = env_secs("AUTH_CSRF_EXPIRY_SECS")? {
            settings.expiry = expiry;
        }
        Ok(settings)
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_secure_cookie(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    #[must_use]
    pub fn with_http_only_cookie(mut self, http_only: bool) -> Self {
        self.http_only_cookie = http_only;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub(crate) fn cookie_spec(&self) -> CookieSpec<'_> {
        CookieSpec {
            name: &self.cookie_name,
            path: &self.cookie_path,
            domain: self.cookie_domain.as_deref(),
            secure: self.secure_cookie,
            http_only: self.http_only_cookie,
            same_site: self.same_site,
            max_age: Some(self.expiry),
        }
    }
}

// ── Env helpers ────────────────────────────────────────────────────

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    env_string(key).map(|v| parse_bool(key, &v)).transpose()
}

fn env_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    env_string(key).map(|v| parse_secs(key, &v)).transpose()
}

fn env_same_site(key: &str) -> Result<Option<SameSite>, ConfigError> {
    env_string(key)
        .map(|v| {
            cookies::parse_same_site(&v)
                .ok_or_else(|| ConfigError(format!("{key}: expected lax, strict or none")))
        })
        .transpose()
}

fn env_header_name(key: &str) -> Result<Option<HeaderName>, ConfigError> {
    env_string(key)
        .map(|v| HeaderName::try_from(v.trim()).map_err(|e| ConfigError(format!("{key}: {e}"))))
        .transpose()
}

fn env_request_parts(key: &str) -> Result<Option<Vec<RequestPart>>, ConfigError> {
    env_string(key).map(|v| parse_request_parts(key, &v)).transpose()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError(format!("{key}: expected a boolean, got '{value}'"))),
    }
}

/// Upper bound for durations read from the environment (100 years).
const MAX_DURATION_SECS: i64 = 100 * 365 * 24 * 60 * 60;

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: i64 = value
        .trim()
        .parse()
        .map_err(|e| ConfigError(format!("{key}: {e}")))?;
    if secs <= 0 {
        return Err(ConfigError(format!("{key}: must be a positive number of seconds")));
    }
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError(format!(
            "{key}: must be at most {MAX_DURATION_SECS} seconds"
        )));
    }
    Ok(Duration::seconds(secs))
}

fn parse_request_parts(key: &str, value: &str) -> Result<Vec<RequestPart>, ConfigError> {
    value
        .split(',')
        .map(|s| match s.trim().to_ascii_lowercase().as_str() {
            "headers" | "header" => Ok(RequestPart::Headers),
            "query" | "querystring" | "query_string" => Ok(RequestPart::QueryString),
            other => Err(ConfigError(format!("{key}: unknown request part '{other}'"))),
        })
        .collect()
}
