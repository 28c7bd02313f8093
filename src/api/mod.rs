use crate::{
    api::handlers::{admin, callbacks, health, session},
    security::{
        attach_principal, require_service_credential, spawn_reaper, AccessGate,
        EmailAuthorizationService, PrincipalResolver, ServiceCredentialVerifier, SessionManager,
        UserDirectory,
    },
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub gate: Arc<AccessGate>,
    pub users: Arc<dyn UserDirectory>,
    pub authorization: Arc<dyn EmailAuthorizationService>,
    pub credentials: Arc<ServiceCredentialVerifier>,
}

impl AppState {
    #[must_use]
    pub fn new(
        sessions: Arc<SessionManager>,
        users: Arc<dyn UserDirectory>,
        authorization: Arc<dyn EmailAuthorizationService>,
        credentials: ServiceCredentialVerifier,
    ) -> Self {
        let gate = Arc::new(AccessGate::new(sessions.clone(), authorization.clone()));
        Self {
            sessions,
            gate,
            users,
            authorization,
            credentials: Arc::new(credentials),
        }
    }
}

/// Build the application router.
///
/// `/admin/*` sits behind the access gate and `/api/callbacks/*` behind the
/// service credential check. Principal attachment runs for every route.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin", get(admin::dashboard))
        .route("/admin/csrf-token", get(admin::csrf_token))
        .route("/admin/sessions/revoke", post(admin::revoke_session));
    let admin = state.gate.clone().protect(admin);

    let callbacks = Router::new()
        .route("/api/callbacks/workflow", post(callbacks::workflow))
        .route_layer(middleware::from_fn_with_state(
            state.credentials.clone(),
            require_service_credential,
        ));

    let resolver = Arc::new(PrincipalResolver::new(
        state.sessions.clone(),
        state.users.clone(),
    ));

    Router::new()
        .route("/health", get(health::health))
        .route("/login", get(session::login_page).post(session::login))
        .route("/logout", post(session::logout))
        .merge(admin)
        .merge(callbacks)
        .layer(middleware::from_fn_with_state(resolver, attach_principal))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
        .with_state(state)
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, state: AppState) -> Result<()> {
    let reaper = spawn_reaper(
        state.sessions.clone(),
        state.sessions.config().reap_interval(),
    );

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    reaper.abort();

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
