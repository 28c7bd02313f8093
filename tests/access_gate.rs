use anyhow::{anyhow, bail, Context, Result};
use argon2::Params;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, HOST, LOCATION, ORIGIN, SET_COOKIE, USER_AGENT},
        Request, Response, StatusCode,
    },
    Router,
};
use gatekeeper::{
    api::{router, AppState},
    directory::{InMemoryEmailAuthorization, InMemoryUserDirectory},
    security::{
        AuditOutcome, AuthMethod, IpAllowList, SecurityConfig, ServiceCredentialVerifier,
        SessionManager, ADMIN_ROLE,
    },
};
use secrecy::SecretString;
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceExt;

const CLIENT_IP: &str = "198.51.100.7";
const PROXY_IP: &str = "127.0.0.1";
const CLIENT_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) gatekeeper-tests";
const HOST_NAME: &str = "admin.example.com";
const SAME_ORIGIN: &str = "http://admin.example.com";
const SERVICE_SECRET: &str = "workflow-callback-secret";

struct Harness {
    app: Router,
    sessions: Arc<SessionManager>,
    users: Arc<InMemoryUserDirectory>,
    authorization: Arc<InMemoryEmailAuthorization>,
}

struct Login {
    session_cookie: String,
    csrf_token: String,
}

impl Login {
    fn cookies(&self) -> String {
        format!(
            "{}; admin_csrf_token={}",
            self.session_cookie, self.csrf_token
        )
    }

    fn session_id(&self) -> String {
        self.session_cookie
            .trim_start_matches("admin_session=")
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

fn harness(config: SecurityConfig) -> Result<Harness> {
    let users = Arc::new(InMemoryUserDirectory::with_params(
        Params::new(8, 1, 1, None).map_err(|err| anyhow!("argon2 params: {err}"))?,
    ));
    users.insert("alice", "alice@example.com", ADMIN_ROLE, "correct horse")?;
    users.insert("eve", "eve@example.com", "editor", "battery staple")?;

    let authorization = Arc::new(InMemoryEmailAuthorization::new());
    authorization.authorize("alice@example.com", ADMIN_ROLE, None);

    let config = config.with_trusted_proxies(IpAllowList::parse([PROXY_IP])?);
    let sessions = Arc::new(SessionManager::new(Arc::new(config)));
    let credentials = ServiceCredentialVerifier::new(SecretString::from(SERVICE_SECRET.to_string()))
        .with_known_subjects(["n8n"]);
    let state = AppState::new(
        sessions.clone(),
        users.clone(),
        authorization.clone(),
        credentials,
    );

    Ok(Harness {
        app: router(state),
        sessions,
        users,
        authorization,
    })
}

fn peer(ip: &str) -> ConnectInfo<SocketAddr> {
    let addr = ip.parse().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED.into());
    ConnectInfo(SocketAddr::new(addr, 40_000))
}

/// A request arriving through the trusted reverse proxy on behalf of
/// `CLIENT_IP`.
fn client_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(peer(PROXY_IP))
        .header(HOST, HOST_NAME)
        .header("x-forwarded-for", CLIENT_IP)
        .header(USER_AGENT, CLIENT_UA)
}

async fn send(app: &Router, request: Request<Body>) -> Result<Response<Body>> {
    Ok(app.clone().oneshot(request).await?)
}

async fn json_body(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&format!("{name}=")))
        .map(|value| value.split(';').next().unwrap_or_default().to_string())
}

async fn login_attempt(app: &Router, username: &str, password: &str) -> Result<Response<Body>> {
    let body = format!("username={username}&password={password}");
    let request = client_request("POST", "/login")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(Body::from(body.replace(' ', "+")))?;
    send(app, request).await
}

async fn login(app: &Router) -> Result<Login> {
    let response = login_attempt(app, "alice", "correct horse").await?;
    if response.status() != StatusCode::OK {
        bail!("login failed with {}", response.status());
    }
    let session_cookie = set_cookie(&response, "admin_session").context("missing session cookie")?;
    let body = json_body(response).await?;
    let csrf_token = body["csrf_token"]
        .as_str()
        .context("missing csrf token")?
        .to_string();
    Ok(Login {
        session_cookie,
        csrf_token,
    })
}

fn revoke_request(login: &Login, target: &str, csrf_token: &str) -> Result<Request<Body>> {
    Ok(client_request("POST", "/admin/sessions/revoke")
        .header(COOKIE, login.cookies())
        .header(ORIGIN, SAME_ORIGIN)
        .header("x-admin-csrf-token", csrf_token)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(Body::from(format!("session_id={target}")))?)
}

async fn wait_for_audit(authorization: &InMemoryEmailAuthorization, outcome: AuditOutcome) -> bool {
    for _ in 0..50 {
        if authorization
            .audit_records()
            .iter()
            .any(|record| record.outcome == outcome)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn health_is_exempt() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let response = send(&harness.app, client_request("GET", "/health").body(Body::empty())?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    Ok(())
}

#[tokio::test]
async fn anonymous_api_request_gets_json_401() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let request = client_request("GET", "/admin")
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["success"], Value::Bool(false));
    assert!(wait_for_audit(&harness.authorization, AuditOutcome::Denied).await);
    Ok(())
}

#[tokio::test]
async fn anonymous_browser_request_is_redirected() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let response = send(&harness.app, client_request("GET", "/admin").body(Body::empty())?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
        Some("/login")
    );
    assert!(set_cookie(&response, "admin_flash").is_some());
    Ok(())
}

#[tokio::test]
async fn admin_session_cycle() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let login = login(&harness.app).await?;

    let request = client_request("GET", "/admin")
        .header(COOKIE, login.cookies())
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["auth_method"], "local");
    assert!(wait_for_audit(&harness.authorization, AuditOutcome::Granted).await);

    let request = client_request("POST", "/logout")
        .header(COOKIE, login.cookies())
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.sessions.get(&login.session_id()).is_none());

    let request = client_request("GET", "/admin")
        .header(COOKIE, login.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn mutating_request_rotates_csrf_token() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let first = login(&harness.app).await?;
    let second = login(&harness.app).await?;
    assert_eq!(harness.sessions.len(), 2);

    let request = revoke_request(&first, &second.session_id(), &first.csrf_token)?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = set_cookie(&response, "admin_csrf_token").context("missing rotated cookie")?;
    assert_ne!(rotated, format!("admin_csrf_token={}", first.csrf_token));
    assert!(harness.sessions.get(&second.session_id()).is_none());

    // The previous token no longer verifies.
    let request = revoke_request(&first, "whatever", &first.csrf_token)?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn mutating_request_needs_every_csrf_carrier() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let login = login(&harness.app).await?;

    // Header only, no CSRF cookie.
    let request = client_request("POST", "/admin/sessions/revoke")
        .header(COOKIE, login.session_cookie.clone())
        .header(ORIGIN, SAME_ORIGIN)
        .header("x-admin-csrf-token", login.csrf_token.clone())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(Body::from("session_id=x"))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Cookie only, nothing submitted.
    let request = client_request("POST", "/admin/sessions/revoke")
        .header(COOKIE, login.cookies())
        .header(ORIGIN, SAME_ORIGIN)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(Body::from("session_id=x"))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Form field works in place of the header.
    let request = client_request("POST", "/admin/sessions/revoke")
        .header(COOKIE, login.cookies())
        .header(ORIGIN, SAME_ORIGIN)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(Body::from(format!(
            "session_id={}&admin_csrf_token={}",
            login.session_id(),
            login.csrf_token
        )))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn cross_origin_post_is_forbidden() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let login = login(&harness.app).await?;

    let request = client_request("POST", "/admin/sessions/revoke")
        .header(COOKIE, login.cookies())
        .header(ORIGIN, "http://evil.example.net")
        .header("x-admin-csrf-token", login.csrf_token.clone())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(Body::from("session_id=x"))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = client_request("POST", "/admin/sessions/revoke")
        .header(COOKIE, login.cookies())
        .header("x-admin-csrf-token", login.csrf_token.clone())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(Body::from("session_id=x"))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn binding_mismatch_destroys_session() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let login = login(&harness.app).await?;

    let request = Request::builder()
        .method("GET")
        .uri("/admin")
        .extension(peer(PROXY_IP))
        .header(HOST, HOST_NAME)
        .header("x-forwarded-for", CLIENT_IP)
        .header(USER_AGENT, "curl/8.5.0")
        .header(COOKIE, login.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.sessions.is_empty());

    let request = client_request("GET", "/admin")
        .header(COOKIE, login.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn revoked_email_authorization_is_forbidden() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let login = login(&harness.app).await?;
    harness.authorization.revoke("alice@example.com");

    let request = client_request("GET", "/admin")
        .header(COOKIE, login.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(harness.sessions.get(&login.session_id()).is_some());
    Ok(())
}

#[tokio::test]
async fn non_admin_principal_is_forbidden() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;

    let response = login_attempt(&harness.app, "eve", "battery staple").await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A session for a user whose role was later downgraded.
    let eve_id = harness
        .users
        .insert("eve2", "eve2@example.com", "editor", "pw")?;
    let session = harness
        .sessions
        .create_session(eve_id, "eve2", AuthMethod::Local, CLIENT_IP, CLIENT_UA)?;
    let request = client_request("GET", "/admin")
        .header(COOKIE, format!("admin_session={}", session.handle().to_cookie_value()))
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn ip_allow_list_blocks_other_networks() -> Result<()> {
    let config = SecurityConfig::default().with_ip_whitelist(IpAllowList::parse(["10.0.0.0/8"])?);
    let harness = harness(config)?;
    let login = login(&harness.app).await?;

    let request = client_request("GET", "/admin")
        .header(COOKIE, login.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn https_required_rejects_plain_http() -> Result<()> {
    let harness = harness(SecurityConfig::default().with_require_https(true))?;
    let login = login(&harness.app).await?;

    let request = client_request("GET", "/admin")
        .header(COOKIE, login.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = client_request("GET", "/admin")
        .header(COOKIE, login.cookies())
        .header("x-forwarded-proto", "https")
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn repeated_failures_lock_the_identifier() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;

    for _ in 0..2 {
        let response = login_attempt(&harness.app, "alice", "wrong").await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = login_attempt(&harness.app, "alice", "wrong").await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Correct password is refused while locked.
    let response = login_attempt(&harness.app, "alice", "correct horse").await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await?;
    assert!(body["message"]
        .as_str()
        .is_some_and(|message| message.contains("too many failed attempts")));
    assert!(harness.sessions.is_empty());
    Ok(())
}

#[tokio::test]
async fn workflow_callback_requires_service_credential() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;

    let request = client_request("POST", "/api/callbacks/workflow")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"event":"campaign.finished"}"#))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await?;
    assert_eq!(body["success"], Value::Bool(false));

    let issuer = ServiceCredentialVerifier::new(SecretString::from(SERVICE_SECRET.to_string()));
    let token = issuer.issue("n8n", Duration::from_secs(60), chrono::Utc::now().timestamp())?;
    let request = client_request("POST", "/api/callbacks/workflow")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"event":"campaign.finished"}"#))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["subject"], "n8n");
    assert_eq!(body["event"], "campaign.finished");

    let forged = ServiceCredentialVerifier::new(SecretString::from("guess".to_string()))
        .issue("n8n", Duration::from_secs(60), chrono::Utc::now().timestamp())?;
    let request = client_request("POST", "/api/callbacks/workflow")
        .header(AUTHORIZATION, format!("Bearer {forged}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn direct_peer_cannot_forge_forwarded_address() -> Result<()> {
    let config = SecurityConfig::default().with_ip_whitelist(IpAllowList::parse(["10.0.0.0/8"])?);
    let harness = harness(config)?;
    let direct = |method: &str, uri: &str| {
        Request::builder()
            .method(method)
            .uri(uri)
            .extension(peer(CLIENT_IP))
            .header(HOST, HOST_NAME)
            .header("x-forwarded-for", "10.1.2.3")
            .header("x-real-ip", "10.1.2.3")
            .header(USER_AGENT, CLIENT_UA)
    };

    let request = direct("POST", "/login")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(Body::from("username=alice&password=correct+horse"))?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let session_cookie = set_cookie(&response, "admin_session").context("missing session cookie")?;
    let session_id = session_cookie
        .trim_start_matches("admin_session=")
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string();
    let session = harness.sessions.get(&session_id).context("session missing")?;
    assert_eq!(session.ip_address, CLIENT_IP);

    let request = direct("GET", "/admin")
        .header(COOKIE, session_cookie)
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn allow_listed_client_is_admitted() -> Result<()> {
    let config = SecurityConfig::default().with_ip_whitelist(IpAllowList::parse(["198.51.100.0/24"])?);
    let harness = harness(config)?;
    let login = login(&harness.app).await?;

    let request = client_request("GET", "/admin")
        .header(COOKIE, login.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn csrf_token_endpoint_returns_session_token() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let login = login(&harness.app).await?;

    let request = client_request("GET", "/admin/csrf-token")
        .header(COOKIE, login.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        set_cookie(&response, "admin_csrf_token"),
        Some(format!("admin_csrf_token={}", login.csrf_token))
    );
    let body = json_body(response).await?;
    assert_eq!(body["csrf_token"], login.csrf_token.as_str());
    Ok(())
}

#[tokio::test]
async fn expired_csrf_token_is_refused_until_refreshed() -> Result<()> {
    let harness = harness(SecurityConfig::default().with_token_expiry(Duration::from_millis(300)))?;
    let first = login(&harness.app).await?;
    let second = login(&harness.app).await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let request = revoke_request(&first, &second.session_id(), &first.csrf_token)?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(harness.sessions.get(&second.session_id()).is_some());

    let request = client_request("GET", "/admin/csrf-token")
        .header(COOKIE, first.cookies())
        .header(ACCEPT, "application/json")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let fresh = json_body(response).await?["csrf_token"]
        .as_str()
        .context("missing csrf token")?
        .to_string();
    assert_ne!(fresh, first.csrf_token);

    let refreshed = Login {
        session_cookie: first.session_cookie.clone(),
        csrf_token: fresh.clone(),
    };
    let request = revoke_request(&refreshed, &second.session_id(), &fresh)?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.sessions.get(&second.session_id()).is_none());
    Ok(())
}

#[tokio::test]
async fn header_token_admits_large_non_form_body() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let login = login(&harness.app).await?;

    let payload = format!(r#"{{"padding":"{}"}}"#, "x".repeat(1024 * 1024 + 16));
    let request = client_request("POST", "/admin/sessions/revoke")
        .header(COOKIE, login.cookies())
        .header(ORIGIN, SAME_ORIGIN)
        .header("x-admin-csrf-token", login.csrf_token.clone())
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
        .body(Body::from(payload))?;
    let response = send(&harness.app, request).await?;
    assert_ne!(response.status(), StatusCode::FORBIDDEN);
    assert!(set_cookie(&response, "admin_csrf_token").is_some());
    Ok(())
}

#[tokio::test]
async fn username_and_email_share_one_lockout() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;

    let response = login_attempt(&harness.app, "alice", "wrong").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = login_attempt(&harness.app, "alice@example.com", "wrong").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = login_attempt(&harness.app, "ALICE@example.com", "wrong").await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = login_attempt(&harness.app, "alice", "correct horse").await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(harness.sessions.lockouts().is_locked("alice@example.com", chrono::Utc::now()));
    Ok(())
}

#[tokio::test]
async fn session_cookie_is_strict_same_site() -> Result<()> {
    let harness = harness(SecurityConfig::default())?;
    let response = login_attempt(&harness.app, "alice", "correct horse").await?;
    let cookie = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("admin_session="))
        .context("missing session cookie")?
        .to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));

    // A cross-site logout arrives without the cookie and ends nothing.
    let request = client_request("POST", "/logout")
        .header(ORIGIN, "http://evil.example.net")
        .body(Body::empty())?;
    let response = send(&harness.app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.sessions.len(), 1);
    Ok(())
}
