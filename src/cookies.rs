use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

/// Borrowed view of the cookie attributes a carrier is configured with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CookieSpec<'a> {
    pub(crate) name: &'a str,
    pub(crate) path: &'a str,
    pub(crate) domain: Option<&'a str>,
    pub(crate) secure: bool,
    pub(crate) http_only: bool,
    pub(crate) same_site: Option<SameSite>,
    pub(crate) max_age: Option<Duration>,
}

/// Create a cookie carrying `value` with the configured attributes.
///
/// Without `max_age` the cookie lives for the browser session.
pub(crate) fn build(spec: CookieSpec<'_>, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::build((spec.name.to_string(), value))
        .http_only(spec.http_only)
        .secure(spec.secure)
        .path(spec.path.to_string())
        .build();
    if let Some(domain) = spec.domain {
        cookie.set_domain(domain.to_string());
    }
    if let Some(same_site) = spec.same_site {
        cookie.set_same_site(same_site);
    }
    if let Some(max_age) = spec.max_age {
        cookie.set_max_age(max_age);
    }
    cookie
}

/// Create removal cookie: same name/path/domain, empty value, already expired.
pub(crate) fn removal(spec: CookieSpec<'_>) -> Cookie<'static> {
    let mut cookie = Cookie::build((spec.name.to_string(), ""))
        .path(spec.path.to_string())
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build();
    if let Some(domain) = spec.domain {
        cookie.set_domain(domain.to_string());
    }
    cookie
}

pub(crate) fn parse_same_site(value: &str) -> Option<SameSite> {
    match value.to_ascii_lowercase().as_str() {
        "lax" => Some(SameSite::Lax),
        "strict" => Some(SameSite::Strict),
        "none" => Some(SameSite::None),
        _ => None,
    }
}
