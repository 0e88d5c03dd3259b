//! HTTP request handlers. Each publish or consume request is one trigger.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info};

use crate::error::TriggerError;
use crate::roles::{ConsumeController, PublishController};
use crate::types::{InboundMessage, OutboundMessage};

/// Application state shared across handlers.
pub struct AppState {
    pub publisher: PublishController,
    pub consumer: ConsumeController,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Publish response.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    published: bool,
    exchange: String,
    routing_key: String,
}

/// Publish one message.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Json(message): Json<OutboundMessage>,
) -> Result<Json<PublishResponse>, ApiError> {
    let routing_key = state.publisher.step().routing_key_for(&message).to_string();
    let exchange = state.publisher.step().exchange().to_string();

    state.publisher.on_trigger(message).await?;

    info!(exchange = %exchange, routing_key = %routing_key, "Published message");

    Ok(Json(PublishResponse {
        published: true,
        exchange,
        routing_key,
    }))
}

/// Consume response.
#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    message: Option<InboundMessage>,
}

/// Pull at most one message.
pub async fn consume(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConsumeResponse>, ApiError> {
    let message = state.consumer.on_trigger(()).await?;
    Ok(Json(ConsumeResponse { message }))
}

/// Pool status response.
#[derive(Debug, Serialize)]
pub struct PoolStatusResponse {
    publisher_idle: usize,
    consumer_idle: usize,
}

/// Idle resource counts per role.
pub async fn pool_status(State(state): State<Arc<AppState>>) -> Json<PoolStatusResponse> {
    Json(PoolStatusResponse {
        publisher_idle: state.publisher.idle_count(),
        consumer_idle: state.consumer.idle_count(),
    })
}

/// Error body returned for failed triggers.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
    suppressed: Option<String>,
}

/// A failed trigger, rendered as JSON.
#[derive(Debug)]
pub struct ApiError(TriggerError);

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            TriggerError::Connection(_) => StatusCode::BAD_GATEWAY,
            TriggerError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TriggerError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let suppressed = match &self.0 {
            TriggerError::Processing(err) => err.suppressed().map(ToString::to_string),
            _ => None,
        };

        error!(status = %status, error = %self.0, "Trigger failed");

        let body = ErrorResponse {
            error: format!("{:#}", anyhow::Error::from(self.0)),
            suppressed,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CloseError, ConnectionError, ProcessingError, ResourceId};

    #[test]
    fn test_status_mapping() {
        let connection = ApiError(TriggerError::Connection(ConnectionError::Establish {
            target: "localhost:5672/".to_string(),
            source: anyhow::anyhow!("connection refused"),
        }));
        assert_eq!(connection.status(), StatusCode::BAD_GATEWAY);

        let resource_id = ResourceId::new();
        let processing = ApiError(TriggerError::Processing(ProcessingError {
            resource_id,
            cause: anyhow::anyhow!("NACK"),
            suppressed: Some(CloseError::Worker {
                resource_id,
                source: anyhow::anyhow!("channel gone"),
            }),
        }));
        assert_eq!(processing.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError(TriggerError::Shutdown).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_shutdown_response() {
        let response = ApiError(TriggerError::Shutdown).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
