//! error.rs — typed errors for the gate's precondition checks.
//!
//! Only the gate's own checks (input shape, auth, authorization, state,
//! rate) surface as HTTP-level errors. Everything below the gate degrades to
//! per-channel reasons inside a success envelope; an unexpected internal
//! failure is reported as `Internal`, which the HTTP layer intentionally
//! maps to a 200 with `success: false` so notification plumbing can never
//! masquerade as a failed reservation.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid_reservation_id")]
    InvalidReservationId,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("reservation_not_found")]
    ReservationNotFound,
    #[error("event_not_found")]
    EventNotFound,
    #[error("reservation_not_active")]
    ReservationNotActive,
    #[error("rate_limited")]
    RateLimited {
        /// Which guard denied: "ip", "reservation", or "event".
        scope: &'static str,
    },
    #[error("internal")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidReservationId => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::ReservationNotFound | Self::EventNotFound => StatusCode::NOT_FOUND,
            Self::ReservationNotActive => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            // Deliberate: the caller already holds a created reservation.
            Self::Internal(_) => StatusCode::OK,
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidReservationId => "invalid_reservation_id",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::ReservationNotFound => "reservation_not_found",
            Self::EventNotFound => "event_not_found",
            Self::ReservationNotActive => "reservation_not_active",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal(_) => "internal_error",
        }
    }
}
