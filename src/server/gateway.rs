//! Gateway HTTP API.
//!
//! Every endpoint answers with the status code of its success path. Failures
//! are reported through the status text (or a `null` payload for `/pull`), so
//! callers tell outcomes apart by reading the message.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::broker::{HealthStatus, SharedBroker};
use crate::config::GatewayConfig;
use crate::coordinator::PullMergeCoordinator;
use crate::registry::{SubscriberId, SubscriberInfo, SubscriberRegistry};
use crate::server::shutdown::shutdown_receiver;
use crate::types::validation::{
    validate_attributes, validate_message_size, validate_subscription_name, validate_topic_name,
};
use crate::types::{Attributes, DocumentPayload};
use crate::Error;

/// Banner served on `/` when no status is attached.
pub const INDEX_BANNER: &str = "pubsub-gateway is running.";

/// Shared state of the gateway handlers.
#[derive(Clone)]
pub struct AppState {
    broker: SharedBroker,
    coordinator: PullMergeCoordinator,
    registry: Arc<SubscriberRegistry>,
}

impl AppState {
    /// Build handler state over a broker.
    pub fn new(broker: SharedBroker, config: &GatewayConfig) -> Self {
        Self {
            coordinator: PullMergeCoordinator::new(broker.clone(), config.pull.clone()),
            registry: Arc::new(SubscriberRegistry::new(broker.clone())),
            broker,
        }
    }

    /// Subscriber registry shared with the process.
    pub fn registry(&self) -> Arc<SubscriberRegistry> {
        self.registry.clone()
    }

    /// Pull coordinator.
    pub fn coordinator(&self) -> &PullMergeCoordinator {
        &self.coordinator
    }
}

/// Status reply of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReply {
    /// `200 OK` with the status as plain text.
    Text(String),
    /// `303 See Other` to `/?statusMessage=<status>`.
    Redirect(String),
}

impl StatusReply {
    /// Status text carried by the reply.
    pub fn message(&self) -> &str {
        match self {
            StatusReply::Text(message) | StatusReply::Redirect(message) => message,
        }
    }
}

impl IntoResponse for StatusReply {
    fn into_response(self) -> Response {
        match self {
            StatusReply::Text(message) => (StatusCode::OK, message).into_response(),
            StatusReply::Redirect(message) => {
                Redirect::to(&status_location(&message)).into_response()
            }
        }
    }
}

/// Location of the index page carrying `message`.
pub fn status_location(message: &str) -> String {
    format!(
        "/?statusMessage={}",
        utf8_percent_encode(message, NON_ALPHANUMERIC)
    )
}

fn failure_status(operation: &str, err: &Error) -> String {
    match err {
        Error::Validation(e) => format!("Invalid request: {}", e),
        other => format!("Failed to {}: {}", operation, other),
    }
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicNameQuery {
    topic_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubscriptionQuery {
    topic_name: String,
    subscription_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageQuery {
    topic_name: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionQuery {
    subscription: String,
}

#[derive(Debug, Deserialize)]
struct MultipullQuery {
    subscription1: String,
    subscription2: String,
}

#[derive(Debug, Deserialize)]
struct TopicQuery {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct UnsubscribeQuery {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexQuery {
    status_message: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Broker detail.
    pub broker_status: String,
    /// Running push subscribers.
    pub active_subscribers: usize,
}

// ============================================================================
// Handlers
// ============================================================================

async fn index(Query(query): Query<IndexQuery>) -> String {
    query
        .status_message
        .unwrap_or_else(|| INDEX_BANNER.to_string())
}

async fn create_topic(
    State(state): State<AppState>,
    Query(query): Query<TopicNameQuery>,
) -> StatusReply {
    let result = match validate_topic_name(&query.topic_name) {
        Ok(()) => state.broker.create_topic(&query.topic_name).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            info!(topic = %query.topic_name, "Topic created");
            StatusReply::Text("Topic created successfully.".to_string())
        }
        Err(e) => {
            error!(topic = %query.topic_name, "Failed to create topic: {}", e);
            StatusReply::Text(failure_status("create topic", &e))
        }
    }
}

async fn create_subscription(
    State(state): State<AppState>,
    Query(query): Query<CreateSubscriptionQuery>,
) -> StatusReply {
    let result = match validate_subscription_name(&query.subscription_name) {
        Ok(()) => {
            state
                .broker
                .create_subscription(&query.subscription_name, &query.topic_name)
                .await
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            info!(
                subscription = %query.subscription_name,
                topic = %query.topic_name,
                "Subscription created"
            );
            StatusReply::Text("Subscription created successfully.".to_string())
        }
        Err(e) => {
            error!(subscription = %query.subscription_name, "Failed to create subscription: {}", e);
            StatusReply::Text(failure_status("create subscription", &e))
        }
    }
}

/// Publishing is fire-and-forget: the request is validated, then the publish
/// runs on its own task and its outcome is only logged.
async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<PostMessageQuery>,
    body: Bytes,
) -> StatusReply {
    let attributes: Attributes = if body.is_empty() {
        Attributes::new()
    } else {
        match serde_json::from_slice(&body) {
            Ok(attributes) => attributes,
            Err(e) => {
                return StatusReply::Text(format!("Invalid request: attributes: {}", e));
            }
        }
    };

    let data = query.message.into_bytes();
    let checked = validate_topic_name(&query.topic_name)
        .and_then(|_| validate_message_size(data.len()))
        .and_then(|_| validate_attributes(&attributes));
    if let Err(e) = checked {
        return StatusReply::Text(failure_status("publish", &e));
    }

    let broker = state.broker.clone();
    let topic = query.topic_name;
    tokio::spawn(async move {
        match broker.publish(&topic, data, attributes).await {
            Ok(message_id) => debug!(topic = %topic, message_id = %message_id, "Message published"),
            Err(e) => error!(topic = %topic, "Publish failed: {}", e),
        }
    });

    StatusReply::Text("Messages published asynchronously; status unknown.".to_string())
}

async fn pull(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> Json<Option<Vec<DocumentPayload>>> {
    match state.coordinator.pull_single(&query.subscription).await {
        Ok(documents) => Json(Some(documents)),
        Err(e) => {
            debug!(subscription = %query.subscription, "Pull answered with null: {}", e);
            Json(None)
        }
    }
}

async fn multipull(
    State(state): State<AppState>,
    Query(query): Query<MultipullQuery>,
) -> StatusReply {
    let outcome = state
        .coordinator
        .pull_merge(&query.subscription1, &query.subscription2)
        .await;
    StatusReply::Redirect(outcome.status_message())
}

async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> StatusReply {
    match state.registry.subscribe(&query.subscription).await {
        Ok(_) => StatusReply::Redirect("Subscribed.".to_string()),
        Err(e) => {
            error!(subscription = %query.subscription, "Failed to subscribe: {}", e);
            StatusReply::Redirect(failure_status("subscribe", &e))
        }
    }
}

async fn unsubscribe(
    State(state): State<AppState>,
    Query(query): Query<UnsubscribeQuery>,
) -> StatusReply {
    let result = match query.id.parse::<SubscriberId>() {
        Ok(id) => state.registry.stop(id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => StatusReply::Redirect("Unsubscribed.".to_string()),
        Err(e) => StatusReply::Redirect(failure_status("unsubscribe", &e)),
    }
}

async fn list_subscribers(State(state): State<AppState>) -> Json<Vec<SubscriberInfo>> {
    Json(state.registry.list().await)
}

async fn delete_topic(
    State(state): State<AppState>,
    Query(query): Query<TopicQuery>,
) -> StatusReply {
    match state.broker.delete_topic(&query.topic).await {
        Ok(()) => {
            info!(topic = %query.topic, "Topic deleted");
            StatusReply::Redirect("Topic deleted successfully.".to_string())
        }
        Err(e) => {
            error!(topic = %query.topic, "Failed to delete topic: {}", e);
            StatusReply::Redirect(failure_status("delete topic", &e))
        }
    }
}

async fn delete_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> StatusReply {
    match state.broker.delete_subscription(&query.subscription).await {
        Ok(()) => {
            info!(subscription = %query.subscription, "Subscription deleted");
            StatusReply::Redirect("Subscription deleted successfully.".to_string())
        }
        Err(e) => {
            error!(subscription = %query.subscription, "Failed to delete subscription: {}", e);
            StatusReply::Redirect(failure_status("delete subscription", &e))
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, broker_status) = match state.broker.health_check().await {
        Ok(HealthStatus::Healthy) => ("healthy", "healthy".to_string()),
        Ok(HealthStatus::Unhealthy(reason)) => ("unhealthy", reason),
        Err(e) => ("unhealthy", e.to_string()),
    };

    Json(HealthResponse {
        status: status.to_string(),
        broker_status,
        active_subscribers: state.registry.running().await,
    })
}

// ============================================================================
// Router and server
// ============================================================================

/// Create the gateway router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/createTopic", post(create_topic))
        .route("/createSubscription", post(create_subscription))
        .route("/postMessage", post(post_message))
        .route("/pull", get(pull))
        .route("/multipull", get(multipull))
        .route("/subscribe", get(subscribe))
        .route("/unsubscribe", post(unsubscribe))
        .route("/subscribers", get(list_subscribers))
        .route("/deleteTopic", post(delete_topic))
        .route("/deleteSubscription", post(delete_subscription))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start_gateway_server(
    bind_address: String,
    port: u16,
    state: AppState,
    shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", bind_address, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_receiver(shutdown_rx))
        .await
        .map_err(|e| {
            error!("Gateway server error: {}", e);
            anyhow::anyhow!("Gateway server failed: {}", e)
        })?;

    info!("Gateway server shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_location_is_encoded() {
        assert_eq!(
            status_location("Pulled and acked 2 message(s)"),
            "/?statusMessage=Pulled%20and%20acked%202%20message%28s%29"
        );
        assert_eq!(status_location("Subscribed."), "/?statusMessage=Subscribed%2E");
    }

    #[test]
    fn test_redirect_reply() {
        let response = StatusReply::Redirect("Acking failed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "/?statusMessage=Acking%20failed"
        );
    }

    #[test]
    fn test_text_reply() {
        let response = StatusReply::Text("Topic created successfully.".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_failure_status() {
        let err = Error::TopicAlreadyExists("t1".to_string());
        assert_eq!(
            failure_status("create topic", &err),
            "Failed to create topic: Topic already exists: t1"
        );

        let err: Error =
            crate::error::ValidationError::InvalidTopicName("".to_string()).into();
        assert!(failure_status("create topic", &err).starts_with("Invalid request: "));
    }
}
