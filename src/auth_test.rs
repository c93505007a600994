use super::*;

use std::sync::atomic::{AtomicU32, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::{get, post};
use reqwest::Url;

// ===== HELPERS =====

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

fn authenticator_for(config: &ClientConfig) -> (Authenticator, Arc<SessionStore>) {
    let store = Arc::new(SessionStore::new(
        Url::parse(&config.base_url).expect("valid base url"),
    ));
    let http = reqwest::Client::builder()
        .cookie_provider(store.jar())
        .build()
        .expect("http client");
    (
        Authenticator::new(http, Arc::clone(&store), config),
        store,
    )
}

fn form_method() -> LoginMethod {
    LoginMethod::Form {
        username: "Supervisor".to_owned(),
        password: "secret".to_owned(),
    }
}

async fn login_ok() -> impl IntoResponse {
    (
        AppendHeaders([
            (header::SET_COOKIE, ".ASPXAUTH=session-abc; Path=/"),
            (header::SET_COOKIE, "BPMCSRF=tok-1; Path=/"),
        ]),
        r#"{"Code":0,"Message":""}"#,
    )
}

async fn pong() -> &'static str {
    "Pong"
}

// ===== SOFT-FAIL CLASSIFIER =====

#[test]
fn code_one_in_a_success_body_is_a_soft_failure() {
    assert!(login_soft_failed(
        r#"{"Code":1,"Message":"Invalid login or password"}"#
    ));
}

#[test]
fn code_zero_and_junk_bodies_are_not_soft_failures() {
    assert!(!login_soft_failed(r#"{"Code":0}"#));
    assert!(!login_soft_failed(r#"{"Code":"1"}"#));
    assert!(!login_soft_failed("not json at all"));
    assert!(!login_soft_failed(""));
}

// ===== FORM LOGIN =====

#[tokio::test]
async fn form_login_yields_a_cookie_session_with_the_csrf_token() {
    let app = Router::new()
        .route("/ServiceModel/AuthService.svc/Login", post(login_ok))
        .route("/0/ping", get(pong));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, form_method());
    let (auth, store) = authenticator_for(&config);

    let session = auth.login().await.expect("form login");
    assert_eq!(*session.credential(), Credential::FormCookie);
    assert_eq!(session.csrf_token(), Some("tok-1"));
    assert_eq!(store.cookie(".ASPXAUTH").as_deref(), Some("session-abc"));
}

#[tokio::test]
async fn soft_failure_in_a_200_body_is_rejected_like_a_bad_status() {
    async fn login_soft_fail() -> &'static str {
        r#"{"Code":1,"Message":"Invalid login or password"}"#
    }
    let app = Router::new().route(
        "/ServiceModel/AuthService.svc/Login",
        post(login_soft_fail),
    );
    let base = serve(app).await;

    let config = ClientConfig::new(&base, form_method());
    let (auth, _) = authenticator_for(&config);

    let err = auth.login().await.expect_err("soft fail");
    assert!(matches!(err, AuthError::Rejected { user, .. } if user == "Supervisor"));
}

#[tokio::test]
async fn form_login_http_rejection_maps_to_rejected() {
    async fn login_denied() -> impl IntoResponse {
        (StatusCode::UNAUTHORIZED, "nope")
    }
    let app = Router::new().route("/ServiceModel/AuthService.svc/Login", post(login_denied));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, form_method());
    let (auth, _) = authenticator_for(&config);

    let err = auth.login().await.expect_err("http rejection");
    assert!(matches!(err, AuthError::Rejected { .. }));
}

#[tokio::test]
async fn form_login_without_the_session_cookie_fails() {
    async fn login_no_cookie() -> &'static str {
        r#"{"Code":0}"#
    }
    let app = Router::new().route("/ServiceModel/AuthService.svc/Login", post(login_no_cookie));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, form_method());
    let (auth, _) = authenticator_for(&config);

    let err = auth.login().await.expect_err("cookie missing");
    assert!(matches!(err, AuthError::MissingAuthCookie(".ASPXAUTH")));
}

// ===== PING PROBE =====

#[tokio::test]
async fn ping_probe_retries_until_the_application_answers() {
    let hits = Arc::new(AtomicU32::new(0));
    async fn flaky_ping(State(hits): State<Arc<AtomicU32>>) -> impl IntoResponse {
        // First two probes land on a still-warming application.
        if hits.fetch_add(1, Ordering::SeqCst) < 2 {
            (StatusCode::SERVICE_UNAVAILABLE, "warming up")
        } else {
            (StatusCode::OK, "Pong")
        }
    }
    let app = Router::new()
        .route("/ServiceModel/AuthService.svc/Login", post(login_ok))
        .route("/0/ping", get(flaky_ping))
        .with_state(Arc::clone(&hits));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, form_method());
    let (auth, _) = authenticator_for(&config);

    auth.login().await.expect("login after flaky pings");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn ping_probe_exhaustion_fails_the_login() {
    async fn dead_ping() -> impl IntoResponse {
        (StatusCode::INTERNAL_SERVER_ERROR, "down")
    }
    let app = Router::new()
        .route("/ServiceModel/AuthService.svc/Login", post(login_ok))
        .route("/0/ping", get(dead_ping));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, form_method());
    let (auth, _) = authenticator_for(&config);

    let err = auth.login().await.expect_err("probe exhausted");
    assert!(matches!(err, AuthError::PingFailed));
}

#[tokio::test]
async fn skip_ping_never_touches_the_ping_route() {
    let hits = Arc::new(AtomicU32::new(0));
    async fn counted_ping(State(hits): State<Arc<AtomicU32>>) -> &'static str {
        hits.fetch_add(1, Ordering::SeqCst);
        "Pong"
    }
    let app = Router::new()
        .route("/ServiceModel/AuthService.svc/Login", post(login_ok))
        .route("/0/ping", get(counted_ping))
        .with_state(Arc::clone(&hits));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, form_method()).skip_ping();
    let (auth, _) = authenticator_for(&config);

    auth.login().await.expect("login without probe");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

// ===== OAUTH LOGIN =====

#[tokio::test]
async fn oauth_login_exchanges_client_credentials_for_a_bearer_session() {
    async fn token(body: String) -> impl IntoResponse {
        assert!(body.contains("grant_type=client_credentials"));
        assert!(body.contains("client_id=app-1"));
        r#"{"access_token":"bearer-xyz","token_type":"Bearer","expires_in":3600}"#
    }
    let app = Router::new().route("/connect/token", post(token));
    let base = serve(app).await;

    let config = ClientConfig::new(
        &base,
        LoginMethod::OAuth {
            token_url: format!("{base}/connect/token"),
            client_id: "app-1".to_owned(),
            client_secret: "s3cr3t".to_owned(),
        },
    );
    let (auth, _) = authenticator_for(&config);

    let session = auth.login().await.expect("token exchange");
    assert_eq!(
        *session.credential(),
        Credential::Bearer("bearer-xyz".to_owned())
    );
    assert_eq!(session.csrf_token(), None);
}

#[tokio::test]
async fn oauth_rejection_carries_the_endpoint_body() {
    async fn token_denied() -> impl IntoResponse {
        (StatusCode::BAD_REQUEST, r#"{"error":"invalid_client"}"#)
    }
    let app = Router::new().route("/connect/token", post(token_denied));
    let base = serve(app).await;

    let config = ClientConfig::new(
        &base,
        LoginMethod::OAuth {
            token_url: format!("{base}/connect/token"),
            client_id: "app-1".to_owned(),
            client_secret: "wrong".to_owned(),
        },
    );
    let (auth, _) = authenticator_for(&config);

    let err = auth.login().await.expect_err("token rejected");
    assert!(matches!(err, AuthError::Token(detail) if detail.contains("invalid_client")));
}

// ===== NTLM LOGIN =====

#[tokio::test]
async fn ntlm_login_harvests_the_csrf_cookie_set_by_the_handshake() {
    async fn ntlm_ok() -> impl IntoResponse {
        (
            AppendHeaders([(header::SET_COOKIE, "BPMCSRF=ntlm-tok; Path=/")]),
            "",
        )
    }
    let app = Router::new()
        .route("/Login/NuiLogin.aspx", get(ntlm_ok))
        .route("/0/ping", get(pong));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, LoginMethod::Ntlm);
    let (auth, _) = authenticator_for(&config);

    let session = auth.login().await.expect("ntlm login");
    assert_eq!(*session.credential(), Credential::NtlmCookie);
    assert_eq!(session.csrf_token(), Some("ntlm-tok"));
}

#[tokio::test]
async fn ntlm_handshake_error_status_is_surfaced() {
    async fn ntlm_denied() -> impl IntoResponse {
        (StatusCode::UNAUTHORIZED, "negotiate failed")
    }
    let app = Router::new().route("/Login/NuiLogin.aspx", get(ntlm_denied));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, LoginMethod::Ntlm);
    let (auth, _) = authenticator_for(&config);

    let err = auth.login().await.expect_err("handshake denied");
    assert!(matches!(err, AuthError::Handshake(401)));
}

#[tokio::test]
async fn ntlm_without_the_csrf_cookie_fails() {
    async fn ntlm_no_cookie() -> &'static str {
        ""
    }
    let app = Router::new().route("/Login/NuiLogin.aspx", get(ntlm_no_cookie));
    let base = serve(app).await;

    let config = ClientConfig::new(&base, LoginMethod::Ntlm);
    let (auth, _) = authenticator_for(&config);

    let err = auth.login().await.expect_err("csrf cookie missing");
    assert!(matches!(err, AuthError::MissingAuthCookie("BPMCSRF")));
}
