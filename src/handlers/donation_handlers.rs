use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::DonationError;
use crate::progress::{self, ProgressSnapshot};
use crate::AppState;

#[derive(Deserialize)]
pub struct DonationForm {
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct ProgressQuery {
    pub preview: Option<f64>,
}

/// The form field arrives as whatever the page put in it; accept a JSON
/// number or a numeric string, anything else fails validation downstream.
fn parse_amount(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProgressQuery>,
) -> Json<ProgressSnapshot> {
    let core = &state.sync_core;
    Json(progress::snapshot(core.total(), core.goal(), query.preview))
}

/// One snapshot per change of the shared total, starting with the current
/// value. This is what keeps every open page's bar in step with donations
/// made by other visitors.
pub async fn stream_progress(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let core = state.sync_core.clone();
    let rx = core.watch_total();

    let stream = futures::stream::unfold((rx, true), move |(mut rx, first)| {
        let core = core.clone();
        async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let total = *rx.borrow_and_update();
            let snapshot = progress::snapshot(total, core.goal(), None);
            let event = Event::default().event("progress").json_data(&snapshot).ok()?;
            Some((Ok::<Event, Infallible>(event), (rx, false)))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn create_donation(
    State(state): State<Arc<AppState>>,
    Json(form): Json<DonationForm>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let amount = parse_amount(&form.amount);
    match state.donation_flow.submit(amount, &form.name, &form.email).await {
        Ok(redirect_url) => Ok(Json(json!({ "redirect_url": redirect_url }))),
        Err(DonationError::Validation(message)) => {
            Err((StatusCode::BAD_REQUEST, Json(json!({ "error": message }))))
        }
        Err(e) => {
            // The flow only refuses on validation; anything else is a bug.
            tracing::error!("donation flow returned an unexpected error: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_parse_from_numbers_and_strings() {
        assert_eq!(parse_amount(&json!(50)), Some(50.0));
        assert_eq!(parse_amount(&json!(49.5)), Some(49.5));
        assert_eq!(parse_amount(&json!("25")), Some(25.0));
        assert_eq!(parse_amount(&json!(" 25 ")), Some(25.0));
        assert_eq!(parse_amount(&json!("donate")), None);
        assert_eq!(parse_amount(&json!(null)), None);
        assert_eq!(parse_amount(&json!([1])), None);
    }
}
