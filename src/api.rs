use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::ApiError;
use crate::gate::{GateOutcome, NotifyGate, NotifyRequest};
use crate::model::{ChannelResult, NotificationResult};

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<NotifyGate>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/notify-host", post(notify_host))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct NotifyHostBody {
    #[serde(default)]
    reservation_id: String,
}

/// Response envelope. Gate errors carry their own status; everything that
/// reaches the dispatcher reports 200 with per-channel detail.
#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct NotifyHostResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_app: Option<ChannelResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<ChannelResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sms: Option<ChannelResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl NotifyHostResponse {
    fn dispatched(result: NotificationResult) -> Self {
        Self {
            success: true,
            in_app: Some(result.in_app),
            email: Some(result.email),
            sms: Some(result.sms),
            ..Self::default()
        }
    }

    fn skipped(reason: &str, remaining_seconds: Option<i64>) -> Self {
        Self {
            success: true,
            skipped: Some(true),
            reason: Some(reason.to_string()),
            remaining_seconds,
            ..Self::default()
        }
    }

    fn error(code: &str) -> Self {
        Self {
            success: false,
            error: Some(code.to_string()),
            ..Self::default()
        }
    }
}

async fn notify_host(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<NotifyHostBody>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let req = NotifyRequest {
        reservation_id: body.reservation_id,
        bearer_token: bearer_token(&headers),
        client_ip: client_ip(&headers),
    };

    match state.gate.handle(&req, Utc::now()).await {
        Ok(GateOutcome::Dispatched(result)) => {
            (StatusCode::OK, Json(NotifyHostResponse::dispatched(result))).into_response()
        }
        Ok(GateOutcome::Skipped {
            reason,
            remaining_seconds,
        }) => (
            StatusCode::OK,
            Json(NotifyHostResponse::skipped(reason, remaining_seconds)),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &ApiError) -> Response {
    (err.status(), Json(NotifyHostResponse::error(err.code()))).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// First hop of `x-forwarded-for`; the service always sits behind a proxy
/// that sets it, so a missing header collapses onto one shared bucket.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                shuttle_axum::axum::http::HeaderName::try_from(*name).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn bearer_token_requires_the_scheme_prefix() {
        assert_eq!(
            bearer_token(&headers(&[("authorization", "Bearer tok-1")])).as_deref(),
            Some("tok-1")
        );
        assert_eq!(bearer_token(&headers(&[("authorization", "tok-1")])), None);
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer ")])), None);
        assert_eq!(bearer_token(&headers(&[])), None);
    }

    #[test]
    fn client_ip_takes_the_first_forwarded_hop() {
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")])),
            "203.0.113.9"
        );
        assert_eq!(client_ip(&headers(&[])), "unknown");
    }
}
