//! # Gatekeeper (admin trust and session security)
//!
//! `gatekeeper` decides, on every privileged request, whether the caller is
//! who they claim to be, whether the request was forged cross-site, whether
//! the caller may keep trying after failed logins, and whether a
//! server-to-server callback carries a valid signed credential.
//!
//! ## Sessions
//!
//! Admin sessions live in an in-process registry. Each session has a lookup
//! identifier and a separate secret token; the browser holds both in an
//! `HttpOnly` cookie. Sessions expire after an idle timeout and are bound to
//! the client IP and User-Agent.
//!
//! ## CSRF
//!
//! Mutating admin requests use the double-submit pattern: the token stored
//! in the session, the submitted header or form value, and the
//! `admin_csrf_token` cookie must agree, and `Origin`/`Referer` must name
//! this host. Tokens rotate after every admitted mutating request.
//!
//! ## Service credentials
//!
//! Callbacks from automation tools present an HMAC-SHA256 signed JWT as a
//! bearer token. Verification is stateless.

pub mod api;
pub mod cli;
pub mod directory;
pub mod security;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
