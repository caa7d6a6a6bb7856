//! Request/response boundary between the authenticator lifecycle and the
//! host framework.
//!
//! The lifecycle only needs to read named values (cookies, headers, query
//! parameters, framework session entries) from the inbound request and to
//! set or clear them on the outbound response. [`AuthRequest`] and
//! [`AuthResponse`] capture exactly that, and plug into Axum as an extractor
//! and as response parts.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AsHeaderName, IntoHeaderName, InvalidHeaderValue};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri};
use axum::response::{IntoResponse, IntoResponseParts, Redirect, Response, ResponseParts};
use axum_extra::extract::cookie::{Cookie, CookieJar};

/// Values the host framework keeps in its own session.
///
/// Place it in the request extensions (e.g. from a session layer) and
/// [`AuthRequest::from_parts`] picks it up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData(BTreeMap<String, String>);

impl SessionData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }
}

/// Session mutations requested by the lifecycle, applied by the host
/// session layer. Inserted into the response extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionChanges {
    set: BTreeMap<String, String>,
    removed: BTreeSet<String>,
}

impl SessionChanges {
    /// Values to write into the session.
    pub fn set(&self) -> impl Iterator<Item = (&str, &str)> {
        self.set.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keys to delete from the session.
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.removed.iter().map(String::as_str)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.set.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_removed(&self, key: &str) -> bool {
        self.removed.contains(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }

    /// Applies the changes to a session snapshot.
    pub fn apply_to(&self, session: &mut SessionData) {
        for key in &self.removed {
            session.remove(key);
        }
        for (key, value) in &self.set {
            session.insert(key.clone(), value.clone());
        }
    }
}

/// Where header-style carriers look for their value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPart {
    Headers,
    QueryString,
}

/// Snapshot of the inbound request as seen by the authenticator lifecycle.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    headers: HeaderMap,
    uri: Uri,
    cookies: CookieJar,
    session: SessionData,
    remote_addr: Option<IpAddr>,
}

impl AuthRequest {
    /// Builds a snapshot from request parts.
    ///
    /// Picks up [`SessionData`] and `ConnectInfo<SocketAddr>` from the
    /// request extensions when present.
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            headers: parts.headers.clone(),
            uri: parts.uri.clone(),
            cookies: CookieJar::from_headers(&parts.headers),
            session: parts
                .extensions
                .get::<SessionData>()
                .cloned()
                .unwrap_or_default(),
            remote_addr: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        }
    }

    #[must_use]
    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query string parameter.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(Cookie::value)
    }

    #[must_use]
    pub fn session_value(&self, key: &str) -> Option<&str> {
        self.session.get(key)
    }

    /// Looks a value up in the given request parts, in order.
    #[must_use]
    pub fn find_value(&self, name: &HeaderName, parts: &[RequestPart]) -> Option<String> {
        parts.iter().find_map(|part| match part {
            RequestPart::Headers => self.header(name).map(str::to_owned),
            RequestPart::QueryString => self.query(name.as_str()),
        })
    }

    /// Client address: `X-Forwarded-For`, then `X-Real-IP`, then the peer
    /// address.
    #[must_use]
    pub fn client_ip(&self) -> Option<String> {
        self.header("x-forwarded-for")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| self.header("x-real-ip").map(|s| s.to_string()))
            .or_else(|| self.remote_addr.map(|ip| ip.to_string()))
    }

    #[must_use]
    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Returns a copy carrying `cookie`, replacing any cookie of the same
    /// name and keeping the others.
    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies = self.cookies.add(cookie);
        self
    }

    /// Returns a copy carrying the header, replacing any previous value.
    #[must_use]
    pub fn with_header_value(mut self, name: impl IntoHeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Like [`with_header_value`](Self::with_header_value) for string values.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not a valid header value.
    pub fn with_header(
        self,
        name: impl IntoHeaderName,
        value: &str,
    ) -> Result<Self, InvalidHeaderValue> {
        let value = HeaderValue::from_str(value)?;
        Ok(self.with_header_value(name, value))
    }

    #[must_use]
    pub fn with_session_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session.insert(key, value);
        self
    }
}

impl<S> FromRequestParts<S> for AuthRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Outbound changes produced by the authenticator lifecycle.
///
/// Use it as response parts (`(auth_response, body)`) or as a complete
/// response when only a redirect is needed.
#[derive(Debug, Clone, Default)]
pub struct AuthResponse {
    cookies: CookieJar,
    headers: HeaderMap,
    session: SessionChanges,
    redirect: Option<String>,
}

impl AuthResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cookie, replacing any cookie of the same name set earlier.
    #[must_use]
    pub fn set_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies = self.cookies.add(cookie);
        self
    }

    /// Instructs the client to drop `cookie`. Path and domain must match
    /// the cookie being removed.
    #[must_use]
    pub fn remove_cookie(self, mut cookie: Cookie<'static>) -> Self {
        cookie.make_removal();
        self.set_cookie(cookie)
    }

    /// # Errors
    ///
    /// Returns an error if `value` is not a valid header value.
    pub fn set_header(
        mut self,
        name: impl IntoHeaderName,
        value: &str,
    ) -> Result<Self, InvalidHeaderValue> {
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(self)
    }

    #[must_use]
    pub fn remove_header(mut self, name: impl AsHeaderName) -> Self {
        self.headers.remove(name);
        self
    }

    #[must_use]
    pub fn set_session_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.session.removed.remove(&key);
        self.session.set.insert(key, value.into());
        self
    }

    #[must_use]
    pub fn remove_session_value(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.session.set.remove(&key);
        self.session.removed.insert(key);
        self
    }

    #[must_use]
    pub fn redirect_to(mut self, target: impl Into<String>) -> Self {
        self.redirect = Some(target.into());
        self
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.get(name)
    }

    #[must_use]
    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn session(&self) -> &SessionChanges {
        &self.session
    }

    #[must_use]
    pub fn redirect(&self) -> Option<&str> {
        self.redirect.as_deref()
    }
}

impl IntoResponseParts for AuthResponse {
    type Error = Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        let mut res = self.cookies.into_response_parts(res)?;
        for (name, value) in &self.headers {
            res.headers_mut().insert(name, value.clone());
        }
        if !self.session.is_empty() {
            res.extensions_mut().insert(self.session);
        }
        Ok(res)
    }
}

impl IntoResponse for AuthResponse {
    fn into_response(mut self) -> Response {
        match self.redirect.take() {
            Some(target) => (self, Redirect::to(&target)).into_response(),
            None => (self, ()).into_response(),
        }
    }
}
