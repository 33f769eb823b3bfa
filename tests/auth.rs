use std::sync::Arc;

use serde_json::{json, Value};

use capbridge::api;
use capbridge::auth::build_allowed_key_set;
use capbridge::config::{
    AppConfig, ClientAuthConfig, FeaturesConfig, SamplingConfig, ServerConfig, UpstreamConfig,
};
use capbridge::state::AppState;
use capbridge::upstream::QueueClient;

async fn spawn_bridge(allowed_keys: Vec<String>) -> String {
    let config = AppConfig {
        server: ServerConfig::default(),
        upstream: UpstreamConfig {
            origin: "http://127.0.0.1:9".to_string(),
            user_agent: "capbridge-test".to_string(),
            fn_index: 5,
            default_prompt: "Write a long detailed description for this image.".to_string(),
            sampling: SamplingConfig::default(),
        },
        client_authentication: ClientAuthConfig { allowed_keys },
        features: FeaturesConfig::default(),
    };
    let client = QueueClient::new(&config.upstream, &config.server).unwrap();
    let allowed = build_allowed_key_set(&config);
    let state = Arc::new(AppState::new(config, client, allowed));
    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn chat_body() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "messages": [{"role": "user", "content": "data:image/png;base64,AAAA describe"}]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_missing_key_is_rejected() {
    let bridge = spawn_bridge(vec!["secret".to_string()]).await;
    let response = reqwest::Client::new()
        .post(format!("{bridge}/v1/chat/completions"))
        .header("content-type", "application/json")
        .body(chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    let body: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["error"]["type"], "authentication_error");
    assert_eq!(body["error"]["code"], "invalid_api_key");
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let bridge = spawn_bridge(vec!["secret".to_string()]).await;
    let response = reqwest::Client::new()
        .post(format!("{bridge}/v1/chat/completions"))
        .header("authorization", "Bearer not-secret")
        .header("content-type", "application/json")
        .body(chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_any_configured_key_is_accepted() {
    // Auth passes, then the unreachable upstream fails the pipeline: the
    // request must get past the 401 layer.
    let bridge = spawn_bridge(vec!["first".to_string(), "second".to_string()]).await;
    let response = reqwest::Client::new()
        .post(format!("{bridge}/v1/chat/completions"))
        .header("authorization", "Bearer second")
        .header("content-type", "application/json")
        .body(chat_body())
        .send()
        .await
        .unwrap();

    assert_ne!(response.status(), 401);
}

#[tokio::test]
async fn test_preflight_carries_cors_headers() {
    let bridge = spawn_bridge(vec!["secret".to_string()]).await;
    let response = reqwest::Client::new()
        .request(
            reqwest::Method::OPTIONS,
            format!("{bridge}/v1/chat/completions"),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-headers")
            .unwrap(),
        "Content-Type, Authorization"
    );
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let bridge = spawn_bridge(vec!["secret".to_string()]).await;
    let response = reqwest::Client::new()
        .get(format!("{bridge}/v1/models"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
