//! Integration tests for the gateway HTTP routes.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{publish_doc, seeded_broker, FaultyBroker};
use pubsub_gateway::broker::SharedBroker;
use pubsub_gateway::config::GatewayConfig;
use pubsub_gateway::registry::SubscriberInfo;
use pubsub_gateway::server::gateway::{create_router, AppState, HealthResponse};
use pubsub_gateway::types::DocumentPayload;
use tower::ServiceExt; // for oneshot

struct Reply {
    status: StatusCode,
    location: Option<String>,
    body: String,
}

async fn send(app: &Router, method: Method, uri: &str, body: &str) -> Reply {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    Reply {
        status,
        location,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

fn app_over(broker: SharedBroker) -> Router {
    create_router(AppState::new(broker, &GatewayConfig::default()))
}

async fn seeded_app() -> (FaultyBroker, Router) {
    let broker = FaultyBroker::new(seeded_broker().await);
    let app = app_over(Arc::new(broker.clone()));
    (broker, app)
}

#[tokio::test]
async fn test_create_topic_and_subscription() {
    let broker = FaultyBroker::default();
    let app = app_over(Arc::new(broker.clone()));

    let reply = send(&app, Method::POST, "/createTopic?topicName=docs", "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "Topic created successfully.");

    let reply = send(
        &app,
        Method::POST,
        "/createSubscription?topicName=docs&subscriptionName=sub-a",
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "Subscription created successfully.");
    assert_eq!(broker.inner.list_subscriptions().await, vec!["sub-a"]);
}

#[tokio::test]
async fn test_crud_failures_keep_success_status() {
    let (_broker, app) = seeded_app().await;

    let reply = send(&app, Method::POST, "/createTopic?topicName=docs", "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body,
        "Failed to create topic: Topic already exists: docs"
    );

    let reply = send(
        &app,
        Method::POST,
        "/createSubscription?topicName=missing&subscriptionName=sub-x",
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.starts_with("Failed to create subscription: "));

    let reply = send(&app, Method::POST, "/createTopic?topicName=bad%20name", "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.starts_with("Invalid request: "));
}

#[tokio::test]
async fn test_missing_parameter_is_rejected() {
    let (_broker, app) = seeded_app().await;

    let reply = send(&app, Method::POST, "/createTopic", "").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_message_then_pull() {
    let (_broker, app) = seeded_app().await;

    let reply = send(
        &app,
        Method::POST,
        "/postMessage?topicName=docs&message=hello%20world",
        r#"{"documentId":"d1"}"#,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body,
        "Messages published asynchronously; status unknown."
    );

    // The publish runs in the background.
    let mut documents: Vec<DocumentPayload> = Vec::new();
    for _ in 0..50 {
        let reply = send(&app, Method::GET, "/pull?subscription=sub-a", "").await;
        assert_eq!(reply.status, StatusCode::OK);
        documents = serde_json::from_str::<Option<Vec<DocumentPayload>>>(&reply.body)
            .unwrap()
            .unwrap();
        if !documents.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].document_id.as_deref(), Some("d1"));
    assert_eq!(documents[0].body, "hello world");
}

#[tokio::test]
async fn test_post_message_rejects_bad_attributes() {
    let (_broker, app) = seeded_app().await;

    let reply = send(
        &app,
        Method::POST,
        "/postMessage?topicName=docs&message=hi",
        "not json",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.starts_with("Invalid request: "));
}

#[tokio::test]
async fn test_pull_shape() {
    let (broker, app) = seeded_app().await;
    publish_doc(&broker, "docs", "d1", "one").await;
    publish_doc(&broker, "docs", "d2", "two").await;

    let reply = send(&app, Method::GET, "/pull?subscription=sub-a", "").await;

    let json: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            {"documentId": "d1", "body": "one"},
            {"documentId": "d2", "body": "two"}
        ])
    );
}

#[tokio::test]
async fn test_pull_failure_answers_null() {
    let (broker, app) = seeded_app().await;

    let reply = send(&app, Method::GET, "/pull?subscription=missing", "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "null");

    publish_doc(&broker, "docs", "d1", "one").await;
    broker.fail_ack.store(true, Ordering::SeqCst);
    let reply = send(&app, Method::GET, "/pull?subscription=sub-a", "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "null");
}

#[tokio::test]
async fn test_multipull_redirects_with_status() {
    let (broker, app) = seeded_app().await;

    let reply = send(
        &app,
        Method::GET,
        "/multipull?subscription1=sub-a&subscription2=sub-b",
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(
        reply.location.as_deref(),
        Some("/?statusMessage=No%20messages%20available%20for%20retrieval%2E")
    );

    publish_doc(&broker, "docs", "d1", "one").await;
    publish_doc(&broker, "docs", "d2", "two").await;
    let reply = send(
        &app,
        Method::GET,
        "/multipull?subscription1=sub-a&subscription2=sub-b",
        "",
    )
    .await;
    assert_eq!(
        reply.location.as_deref(),
        Some("/?statusMessage=Pulled%20and%20acked%202%20message%28s%29")
    );
}

#[tokio::test]
async fn test_multipull_ack_failure() {
    let (broker, app) = seeded_app().await;
    publish_doc(&broker, "docs", "d1", "one").await;
    broker.fail_ack.store(true, Ordering::SeqCst);

    let reply = send(
        &app,
        Method::GET,
        "/multipull?subscription1=sub-a&subscription2=sub-b",
        "",
    )
    .await;

    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(
        reply.location.as_deref(),
        Some("/?statusMessage=Acking%20failed")
    );
}

#[tokio::test]
async fn test_subscribe_list_and_unsubscribe() {
    let (_broker, app) = seeded_app().await;

    let reply = send(&app, Method::GET, "/subscribe?subscription=sub-a", "").await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(
        reply.location.as_deref(),
        Some("/?statusMessage=Subscribed%2E")
    );

    let reply = send(&app, Method::GET, "/subscribers", "").await;
    let subscribers: Vec<SubscriberInfo> = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].subscription, "sub-a");
    let id = subscribers[0].id;

    let reply = send(&app, Method::POST, &format!("/unsubscribe?id={}", id), "").await;
    assert_eq!(
        reply.location.as_deref(),
        Some("/?statusMessage=Unsubscribed%2E")
    );

    let reply = send(&app, Method::GET, "/subscribers", "").await;
    let json: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(json[0]["state"], "stopped");

    let reply = send(&app, Method::POST, "/unsubscribe?id=nope", "").await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert!(reply
        .location
        .unwrap()
        .starts_with("/?statusMessage=Failed%20to%20unsubscribe"));
}

#[tokio::test]
async fn test_subscribe_failure_registers_nothing() {
    let (broker, app) = seeded_app().await;
    broker.fail_subscribe.store(true, Ordering::SeqCst);

    let reply = send(&app, Method::GET, "/subscribe?subscription=sub-a", "").await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert!(reply
        .location
        .unwrap()
        .starts_with("/?statusMessage=Failed%20to%20subscribe"));

    let reply = send(&app, Method::GET, "/subscribers", "").await;
    assert_eq!(reply.body, "[]");
}

#[tokio::test]
async fn test_delete_routes_redirect() {
    let (broker, app) = seeded_app().await;

    let reply = send(&app, Method::POST, "/deleteSubscription?subscription=sub-b", "").await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(
        reply.location.as_deref(),
        Some("/?statusMessage=Subscription%20deleted%20successfully%2E")
    );

    let reply = send(&app, Method::POST, "/deleteTopic?topic=docs", "").await;
    assert_eq!(
        reply.location.as_deref(),
        Some("/?statusMessage=Topic%20deleted%20successfully%2E")
    );
    assert!(broker.inner.list_topics().await.is_empty());

    let reply = send(&app, Method::POST, "/deleteTopic?topic=docs", "").await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert!(reply
        .location
        .unwrap()
        .starts_with("/?statusMessage=Failed%20to%20delete%20topic"));
}

#[tokio::test]
async fn test_index_echoes_status() {
    let (_broker, app) = seeded_app().await;

    let reply = send(&app, Method::GET, "/?statusMessage=Acking%20failed", "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "Acking failed");

    let reply = send(&app, Method::GET, "/", "").await;
    assert_eq!(reply.body, "pubsub-gateway is running.");
}

#[tokio::test]
async fn test_health() {
    let (_broker, app) = seeded_app().await;
    send(&app, Method::GET, "/subscribe?subscription=sub-a", "").await;

    let reply = send(&app, Method::GET, "/health", "").await;
    assert_eq!(reply.status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.active_subscribers, 1);
}
