//! Per-request cookie access for the server flavor.
//!
//! There is no delete primitive: `remove` writes an already-expired, zero
//! max-age cookie on the same path.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use url::form_urlencoded;

const EXPIRED_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    /// Seconds; `None` makes a session cookie.
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookieOptions {
    /// `HttpOnly`, `SameSite=Lax`, rooted at `/`.
    #[must_use]
    pub fn session(secure: bool) -> Self {
        Self {
            path: "/".to_string(),
            max_age: None,
            http_only: true,
            secure,
            same_site: SameSite::Lax,
        }
    }

    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Same attributes, already expired.
    #[must_use]
    pub fn expired(&self) -> Self {
        Self {
            max_age: Some(0),
            ..self.clone()
        }
    }
}

pub trait CookieAccessor: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    fn set(&self, name: &str, value: &str, options: &CookieOptions);

    fn remove(&self, name: &str, options: &CookieOptions) {
        self.set(name, "", &options.expired());
    }
}

/// Cookies of one incoming request plus the `Set-Cookie` values to send back.
#[derive(Debug, Default)]
pub struct RequestCookies {
    current: Mutex<HashMap<String, String>>,
    outgoing: Mutex<Vec<String>>,
}

impl RequestCookies {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut current = HashMap::new();
        for header in headers.get_all(COOKIE) {
            let Ok(value) = header.to_str() else {
                continue;
            };
            for pair in value.split(';') {
                let mut parts = pair.trim().splitn(2, '=');
                let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                    continue;
                };
                let key = key.trim();
                if !key.is_empty() {
                    current.insert(key.to_string(), val.trim().to_string());
                }
            }
        }
        Self {
            current: Mutex::new(current),
            outgoing: Mutex::new(Vec::new()),
        }
    }

    /// Raw `Set-Cookie` values recorded so far, in order.
    #[must_use]
    pub fn set_cookie_values(&self) -> Vec<String> {
        self.outgoing.lock().clone()
    }

    /// Appends every recorded cookie to `headers`. Values that are not valid
    /// header text are skipped.
    pub fn write_to(&self, headers: &mut HeaderMap) {
        for cookie in self.outgoing.lock().iter() {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.append(SET_COOKIE, value);
            }
        }
    }
}

impl CookieAccessor for RequestCookies {
    fn get(&self, name: &str) -> Option<String> {
        self.current.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str, options: &CookieOptions) {
        {
            let mut current = self.current.lock();
            if options.max_age == Some(0) {
                current.remove(name);
            } else {
                current.insert(name.to_string(), value.to_string());
            }
        }
        self.outgoing
            .lock()
            .push(render_set_cookie(name, value, options));
    }
}

/// Renders one `Set-Cookie` header value.
#[must_use]
pub fn render_set_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{name}={value}; Path={}", options.path);
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    cookie.push_str("; SameSite=");
    cookie.push_str(options.same_site.as_str());
    if let Some(max_age) = options.max_age {
        cookie.push_str(&format!("; Max-Age={max_age}"));
        if max_age <= 0 {
            cookie.push_str("; Expires=");
            cookie.push_str(EXPIRED_DATE);
        }
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Percent-encodes arbitrary text (such as a JSON session record) so it is a
/// valid cookie value.
#[must_use]
pub fn encode_cookie_value(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// Reverses `encode_cookie_value`.
#[must_use]
pub fn decode_cookie_value(encoded: &str) -> String {
    // Encoded values contain no '=' or '&', so the whole input parses as one key.
    form_urlencoded::parse(encoded.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}
