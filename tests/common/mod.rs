//! In-process stand-in for the authorization server's introspection endpoint.
//!
//! Answers depend on the token:
//!
//! | token          | answer                                          |
//! |----------------|-------------------------------------------------|
//! | `valid`        | active, `aud` = resource, scope `mcp:tools`     |
//! | `valid-list`   | active, `aud` = [other, resource]               |
//! | `narrow`       | active, `aud` = resource, scope `profile`       |
//! | `float-exp`    | active, `aud` = resource, `exp` = 1700000000.0  |
//! | `no-client`    | active, no `client_id`                          |
//! | `other-aud`    | active, `aud` = another server                  |
//! | `no-aud`       | active, no `aud`                                |
//! | `inactive`     | `{"active": false}`                             |
//! | `broken`       | 200 with a non-JSON body                        |
//! | `boom`         | 500                                             |
//! | `slow`         | `valid`, after 150 ms                           |
//! | `stall`        | `valid`, after 3 s                              |
//!
//! Requests with the wrong client credentials get 401.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::json;

pub const RESOURCE: &str = "http://localhost:3000";
pub const CLIENT_ID: &str = "mcp-server";
pub const CLIENT_SECRET: &str = "s3cr3t";
pub const REALM_PATH: &str = "/realms/test/";
pub const INTROSPECT_PATH: &str = "/realms/test/protocol/openid-connect/token/introspect";

#[derive(Default)]
pub struct Authority {
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

pub struct MockAuthority {
    pub base_url: String,
    pub state: Arc<Authority>,
}

impl MockAuthority {
    pub fn introspection_endpoint(&self) -> String {
        format!("{}{}", self.base_url, INTROSPECT_PATH)
    }

    pub fn realm_url(&self) -> String {
        format!("{}{}", self.base_url, REALM_PATH)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

pub async fn spawn_authority() -> MockAuthority {
    let state = Arc::new(Authority::default());
    let app = Router::new()
        .route(INTROSPECT_PATH, post(introspect))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockAuthority {
        base_url: format!("http://{}", addr),
        state,
    }
}

async fn introspect(
    State(state): State<Arc<Authority>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let response = answer(&form).await;

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

async fn answer(form: &HashMap<String, String>) -> Response {
    if form.get("client_id").map(String::as_str) != Some(CLIENT_ID)
        || form.get("client_secret").map(String::as_str) != Some(CLIENT_SECRET)
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"}))).into_response();
    }

    let active = |aud: serde_json::Value, scope: &str| {
        Json(json!({
            "active": true,
            "client_id": "demo-client",
            "scope": scope,
            "exp": 4_102_444_800u64,
            "aud": aud,
        }))
        .into_response()
    };

    match form.get("token").map(String::as_str).unwrap_or_default() {
        "valid" => active(json!(RESOURCE), "openid mcp:tools"),
        "valid-list" => active(json!(["http://elsewhere.test", RESOURCE]), "mcp:tools"),
        "narrow" => active(json!(RESOURCE), "profile"),
        "float-exp" => Json(json!({
            "active": true,
            "client_id": "demo-client",
            "scope": "mcp:tools",
            "exp": 1700000000.0,
            "aud": RESOURCE,
        }))
        .into_response(),
        "no-client" => Json(json!({"active": true, "aud": RESOURCE, "scope": "mcp:tools"}))
            .into_response(),
        "other-aud" => active(json!("http://elsewhere.test"), "mcp:tools"),
        "no-aud" => Json(json!({"active": true, "scope": "mcp:tools"})).into_response(),
        "broken" => (StatusCode::OK, "<html>not json</html>").into_response(),
        "boom" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_millis(150)).await;
            active(json!(RESOURCE), "mcp:tools")
        }
        "stall" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            active(json!(RESOURCE), "mcp:tools")
        }
        _ => Json(json!({"active": false})).into_response(),
    }
}
