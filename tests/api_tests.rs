use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use chrono::{Duration, Utc};
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::ServiceExt;

use cmdb::auth::Claims;
use cmdb::middleware::AppState;
use cmdb::models::{NewServer, NewSslCertificate, NewUser, UserPatch, ADMIN_ROLE};
use cmdb::router;
use cmdb::store::Stores;

struct TestApp {
    state: Arc<AppState>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_auto_approve(true)
    }

    fn with_auto_approve(auto_approve: bool) -> Self {
        let mut state = AppState::new(Stores::memory(), "integration-secret");
        state.password_cost = 4 /* bcrypt minimum cost */;
        state.auto_approve_signups = auto_approve;
        let state = Arc::new(state);
        Self {
            router: router::build(state.clone()),
            state,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn ingest(&self, key: &str, body: &str) -> StatusCode {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/ingest/metrics")
            .header("X-API-Key", key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await.0
    }

    /// Creates an approved user directly in the store and returns (id, token).
    async fn seed_user(&self, email: &str, roles: &[&str]) -> (String, String) {
        let users = &self.state.stores.users;
        let user = users
            .create(NewUser {
                username: email.to_string(),
                email: email.to_string(),
                password_hash: bcrypt::hash("pw", 4 /* bcrypt minimum cost */).unwrap(),
            })
            .await
            .unwrap();
        users
            .update(
                &user.id,
                UserPatch {
                    approved: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        users.set_roles(&user.id, &roles).await.unwrap();

        let token = self
            .state
            .jwt_manager
            .create_token(&Claims::new(&user.id, &user.email))
            .unwrap();
        (user.id, token)
    }

    async fn seed_server(&self, hostname: &str) -> String {
        self.seed_server_as(hostname, Some("ops")).await
    }

    async fn seed_server_as(&self, hostname: &str, ssh_username: Option<&str>) -> String {
        self.state
            .stores
            .servers
            .create(NewServer {
                hostname: hostname.to_string(),
                ip_address: "10.0.0.5".to_string(),
                ssh_port: 22,
                ssh_username: ssh_username.map(str::to_string),
                ssh_key_path: None,
                prometheus_url: None,
                status: "unknown".to_string(),
                group_id: None,
                tags: Vec::new(),
            })
            .await
            .unwrap()
            .id
    }

    async fn seed_certificate(&self, server_id: &str, domain: &str, expires_in: Duration) -> String {
        let now = Utc::now();
        self.state
            .stores
            .certificates
            .create(NewSslCertificate {
                server_id: server_id.to_string(),
                domain: domain.to_string(),
                issuer: Some("Test CA".to_string()),
                issued_at: now - Duration::days(60),
                expires_at: now + expires_in,
                status: "active".to_string(),
                auto_renew: false,
            })
            .await
            .unwrap()
            .id
    }

    /// Serves the router on an ephemeral port and returns its address.
    async fn spawn(&self) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}

/// Throw-away alert receiver recording every batch it is sent.
async fn spawn_alertmanager(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let app = Router::new().route(
        "/api/v1/alerts",
        post(move |Json(batch): Json<Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(batch);
                status
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), received)
}

#[tokio::test]
async fn signup_login_and_me() {
    let app = TestApp::new();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": "a@b", "password": "pw", "username": "a"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!body.to_string().contains("password"));
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app.call(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "a@b");
    assert_eq!(body["roles"], json!([]));

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "a@b", "password": "pw"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": "a@b", "password": "other"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_failures_do_not_reveal_which_part_was_wrong() {
    let app = TestApp::new();
    app.seed_user("known@b", &[]).await;

    let (unknown, unknown_body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "nobody@b", "password": "pw"})),
        )
        .await;
    let (wrong, wrong_body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "known@b", "password": "nope"})),
        )
        .await;

    assert_eq!(unknown, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_body, wrong_body);
}

#[tokio::test]
async fn unapproved_accounts_cannot_log_in() {
    let app = TestApp::with_auto_approve(false);
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": "new@b", "password": "pw"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.get("token").is_none());
    assert_eq!(body["user"]["approved"], false);
    let user_id = body["user"]["id"].as_str().unwrap().to_string();

    let login = json!({"email": "new@b", "password": "pw"});
    let (status, _) = app
        .call(Method::POST, "/api/auth/login", None, Some(login.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/users/{}/approve", user_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(Method::POST, "/api/auth/login", None, Some(login))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer_token() {
    let app = TestApp::new();

    let (status, _) = app.call(Method::GET, "/api/servers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(Method::GET, "/api/servers", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn server_reads_are_gated_by_grants() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;
    let (user_id, user) = app.seed_user("u@b", &[]).await;

    let (status, server) = app
        .call(
            Method::POST,
            "/api/servers",
            Some(&admin),
            Some(json!({"hostname": "web-1", "ip_address": "10.0.0.5"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(server["ssh_port"], 22);
    assert_eq!(server["status"], "unknown");
    let server_id = server["id"].as_str().unwrap().to_string();
    let server_uri = format!("/api/servers/{}", server_id);

    let (status, _) = app.call(Method::GET, &server_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, listed) = app.call(Method::GET, "/api/servers", Some(&user), None).await;
    assert_eq!(listed, json!([]));

    // Non-admins cannot grant themselves access.
    let grant = json!({"user_id": user_id, "server_id": server_id});
    let (status, _) = app
        .call(Method::POST, "/api/permissions", Some(&user), Some(grant.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::POST, "/api/permissions", Some(&admin), Some(grant))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.call(Method::GET, &server_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hostname"], "web-1");

    let (_, listed) = app.call(Method::GET, "/api/servers", Some(&user), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = app
        .call(Method::GET, "/api/servers/missing", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_key_round_trip() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;

    let (status, created) = app
        .call(
            Method::POST,
            "/api/api-keys",
            Some(&admin),
            Some(json!({"name": "agent", "expires_at": null})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = created["key"].as_str().unwrap().to_string();
    let key_id = created["record"]["id"].as_str().unwrap().to_string();
    assert!(key.starts_with("cmdb_"));
    assert_eq!(created["key_prefix"], key[..12]);

    let (_, listed) = app.call(Method::GET, "/api/api-keys", Some(&admin), None).await;
    let listed = listed.to_string();
    assert!(!listed.contains("key_hash"));
    assert!(!listed.contains(&key));

    assert_eq!(app.ingest(&key, r#"{"cpu": 0.5}"#).await, StatusCode::OK);
    assert_eq!(app.ingest(&key, "not json").await, StatusCode::BAD_REQUEST);
    assert_eq!(app.ingest("cmdb_wrong", "{}").await, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/api-keys/status",
            Some(&admin),
            Some(json!({"id": key_id, "active": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "updated");

    assert_eq!(app.ingest(&key, "{}").await, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/api-keys/delete",
            Some(&admin),
            Some(json!({"id": key_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "deleted");
}

#[tokio::test]
async fn only_expiring_certificates_are_alerted() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;
    let server_id = app.seed_server("web-1").await;
    app.seed_certificate(&server_id, "soon.example", Duration::days(3) + Duration::hours(1))
        .await;
    app.seed_certificate(&server_id, "later.example", Duration::days(90))
        .await;

    let (url, received) = spawn_alertmanager(StatusCode::OK).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/ssl-certificates/send-alerts",
            Some(&admin),
            Some(json!({ "alertmanager_url": url })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent"], 1);

    let batches = received.lock().unwrap().clone();
    assert_eq!(batches.len(), 1);
    let alerts = batches[0].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["labels"]["severity"], "critical");
    assert_eq!(alerts[0]["labels"]["domain"], "soon.example");
    assert_eq!(
        alerts[0]["annotations"]["summary"],
        "SSL certificate for soon.example expires in 3 days"
    );
}

#[tokio::test]
async fn alert_receiver_failures_surface_as_errors() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;
    let server_id = app.seed_server("web-1").await;
    app.seed_certificate(&server_id, "soon.example", Duration::days(10))
        .await;

    let (url, _) = spawn_alertmanager(StatusCode::SERVICE_UNAVAILABLE).await;
    let (status, body) = app
        .call(
            Method::POST,
            "/api/ssl-certificates/send-alerts",
            Some(&admin),
            Some(json!({ "alertmanager_url": url })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Alertmanager returned status: 503");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/ssl-certificates/send-alerts",
            Some(&admin),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn role_replacement_is_exact() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;
    let (user_id, _) = app.seed_user("u@b", &["op"]).await;

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/users/{}/roles", user_id),
            Some(&admin),
            Some(json!({"roles": ["admin", "viewer"]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/users/{}", user_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let mut roles: Vec<String> = serde_json::from_value(body["roles"].clone()).unwrap();
    roles.sort();
    assert_eq!(roles, vec!["admin", "viewer"]);
}

#[tokio::test]
async fn user_listing_never_exposes_password_hashes() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;
    let (_, user) = app.seed_user("u@b", &[]).await;

    let (status, body) = app.call(Method::GET, "/api/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert!(!body.to_string().contains("password"));
    assert!(!body.to_string().contains("$2"));

    let (status, _) = app.call(Method::GET, "/api/users", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn groups_validate_color() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;

    let (status, group) = app
        .call(
            Method::POST,
            "/api/groups",
            Some(&admin),
            Some(json!({"name": "web"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(group["color"], "#06b6d4");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/groups",
            Some(&admin),
            Some(json!({"name": "db", "color": "blue"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_render_expired_certificates_as_negative() {
    let app = TestApp::new();
    let server_id = app.seed_server("web-1").await;
    app.seed_certificate(&server_id, "old.example", -Duration::days(3))
        .await;

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ssl_certificate_expiry_days{domain=\"old.example\""));
    assert!(text.contains("} -3.00"));
    assert!(text.contains("ssl_certificate_auto_renew{domain=\"old.example\""));
}

#[tokio::test]
async fn shell_bridge_checks_access_before_upgrading() {
    let app = TestApp::new();
    let (_, user) = app.seed_user("u@b", &[]).await;
    let server_id = app.seed_server("web-1").await;

    let (status, _) = app
        .call(Method::GET, &format!("/ws/ssh/{}", server_id), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/ws/ssh/{}?token={}", server_id, user),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::GET, &format!("/ws/ssh/missing?token={}", user), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_updates_gate_approval() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;
    let (user_id, user) = app.seed_user("u@b", &[]).await;
    let (other_id, _) = app.seed_user("other@b", &[]).await;
    let own_uri = format!("/api/users/{}", user_id);

    let (status, _) = app
        .call(Method::PUT, &own_uri, Some(&user), Some(json!({"display_name": "Pat"})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::PUT, &own_uri, Some(&user), Some(json!({"approved": false})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Only admins can change approval status");

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/users/{}", other_id),
            Some(&user),
            Some(json!({"display_name": "Mallory"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::PUT, &own_uri, Some(&admin), Some(json!({"approved": false})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call(Method::GET, &own_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["approved"], false);
    assert_eq!(body["user"]["display_name"], "Pat");
}

#[tokio::test]
async fn certificate_reads_are_gated_by_server_grants() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;
    let (user_id, user) = app.seed_user("u@b", &[]).await;
    let server_id = app.seed_server("web-1").await;
    let cert_id = app
        .seed_certificate(&server_id, "web.example", Duration::days(40))
        .await;
    let cert_uri = format!("/api/ssl-certificates/{}", cert_id);

    let (status, _) = app.call(Method::GET, &cert_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, listed) = app
        .call(Method::GET, "/api/ssl-certificates", Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));

    let (status, _) = app
        .call(
            Method::POST,
            "/api/permissions",
            Some(&admin),
            Some(json!({"user_id": user_id, "server_id": server_id})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.call(Method::GET, &cert_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domain"], "web.example");
    let (_, listed) = app
        .call(Method::GET, "/api/ssl-certificates", Some(&user), None)
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn shell_bridge_reports_missing_ssh_username_then_closes() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("root@b", &[ADMIN_ROLE]).await;
    let server_id = app.seed_server_as("no-user", None).await;
    let addr = app.spawn().await;

    let url = format!("ws://{}/ws/ssh/{}?token={}", addr, server_id, admin);
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    match socket.next().await {
        Some(Ok(WsMessage::Text(text))) => {
            assert_eq!(text, "Error: SSH username not configured for this server")
        }
        other => panic!("expected an error text frame, got {:?}", other),
    }
    match socket.next().await {
        Some(Ok(WsMessage::Close(_))) | None => {}
        other => panic!("expected the socket to close, got {:?}", other),
    }
}
