//! Cookie names and `Set-Cookie` builders shared by the gate and handlers.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

pub const SESSION_COOKIE: &str = "admin_session";
pub const FLASH_COOKIE: &str = "admin_flash";

/// Find a cookie by name in the request `Cookie` headers.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == name {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

/// Build an `HttpOnly` cookie carrying the admin session handle.
///
/// # Errors
/// Returns an error if the value contains bytes not allowed in a header.
pub fn session_cookie(
    value: &str,
    max_age_seconds: u64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Expire the session cookie.
///
/// # Errors
/// Never in practice; kept fallible to match the other builders.
pub fn clear_session_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Short-lived message shown on the failure page after a browser redirect.
///
/// # Errors
/// Returns an error if the message cannot be carried in a header.
pub fn flash_cookie(message: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    let mut cookie = format!("{FLASH_COOKIE}={encoded}; Path=/; HttpOnly; SameSite=Lax; Max-Age=60");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
