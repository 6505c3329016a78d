//! http endpoint receiving alert groups from the prometheus alertmanager
//!
//! Every received alert group is rendered and sent to telegram before the
//! request is answered, so alertmanager sees delivery failures as a 5xx.
use std::{
	net::{IpAddr, SocketAddr},
	sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
	body::Bytes,
	extract::Extension,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use prometheus::{opts, IntCounterVec, Registry};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
	alert,
	alert_renderer::render_alert,
	telegram::{SendError, TelegramClient},
};

#[derive(Debug, Deserialize, Clone)]
/// listen address of the webhook receiver
pub struct AlertReceiverSettings {
	pub bind_address: IpAddr,
	pub port: u16,
}

impl AlertReceiverSettings {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

/// shared by all requests, immutable after startup
pub struct State {
	telegram: TelegramClient,
	metric: IntCounterVec,
}

impl State {
	/// construct the receiver state, its meters are registered in `registry`
	pub fn new(telegram: TelegramClient, registry: &Registry) -> Result<Self> {
		let metric = IntCounterVec::new(
			opts!("requests_total", "total number of received alertmanager webhooks")
				.namespace("telegram_howler")
				.subsystem("alertmanager_webhook"),
			&["outcome"],
		)?;
		registry.register(Box::new(metric.clone()))?;

		Ok(Self { telegram, metric })
	}
}

/// Reasons a webhook request couldn't be forwarded
#[derive(Error, Debug)]
pub enum ReceiverError {
	/// body is missing, isn't json or is an empty json value
	#[error("no data received")]
	NoData,
	/// body is json but not shaped like an alert group
	#[error("{0}")]
	InvalidPayload(#[source] serde_json::Error),
	/// rendered alert couldn't be delivered
	#[error("failed to send alert to telegram: {0}")]
	Delivery(#[from] SendError),
}

impl ReceiverError {
	/// label value for the request counter
	fn outcome(&self) -> &'static str {
		match self {
			Self::NoData => "no_data",
			Self::InvalidPayload(_) => "invalid_payload",
			Self::Delivery(_) => "delivery_failed",
		}
	}
}

impl IntoResponse for ReceiverError {
	fn into_response(self) -> Response {
		match self {
			Self::NoData => {
				(StatusCode::BAD_REQUEST, Json(json!({ "error": "No data received" })))
					.into_response()
			}
			Self::InvalidPayload(err) => {
				(StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() })))
					.into_response()
			}
			Self::Delivery(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(json!({ "status": "error", "message": "Failed to send to Telegram" })),
			)
				.into_response(),
		}
	}
}

/// `null`, `false`, `0`, `""`, `[]` and `{}` carry no alert
fn is_empty_value(value: &Value) -> bool {
	match value {
		Value::Null => true,
		Value::Bool(value) => !value,
		Value::Number(value) => value.as_f64() == Some(0.0),
		Value::String(value) => value.is_empty(),
		Value::Array(value) => value.is_empty(),
		Value::Object(value) => value.is_empty(),
	}
}

/// deserialize the request body into an alert group
fn parse_alert(body: &[u8]) -> Result<alert::Data, ReceiverError> {
	let value: Value = serde_json::from_slice(body).map_err(|err| {
		tracing::debug!("webhook body is not json: {:?}", err);
		ReceiverError::NoData
	})?;

	if is_empty_value(&value) {
		return Err(ReceiverError::NoData);
	}

	serde_json::from_value(value).map_err(ReceiverError::InvalidPayload)
}

/// render the alert group and send it to telegram
async fn forward_alert(state: &State, body: &[u8]) -> Result<(), ReceiverError> {
	let alert = parse_alert(body)?;
	let message = render_alert(&alert);

	state.telegram.send(&message).await?;

	Ok(())
}

async fn alert_receiver(Extension(state): Extension<Arc<State>>, body: Bytes) -> Response {
	let result = forward_alert(&state, &body).await;

	let outcome = result.as_ref().map_or_else(ReceiverError::outcome, |_| "success");
	state.metric.with_label_values(&[outcome]).inc();

	match result {
		Ok(()) => (StatusCode::OK, Json(json!({ "status": "success" }))).into_response(),
		Err(err) => {
			match &err {
				ReceiverError::Delivery(_) => tracing::warn!("{}", err),
				_ => tracing::debug!("rejected webhook: {}", err),
			}
			err.into_response()
		}
	}
}

async fn health() -> Json<Value> {
	Json(json!({ "status": "healthy" }))
}

/// routes of the webhook receiver
pub fn router(state: Arc<State>) -> Router {
	Router::new()
		.route("/webhook", post(alert_receiver))
		.route("/health", get(health))
		.layer(Extension(state))
}

pub async fn run_alert_receiver(settings: &AlertReceiverSettings, state: Arc<State>) -> Result<()> {
	let addr = settings.to_socket_addr();

	let server = axum::Server::try_bind(&addr)
		.context(format!("failed to bind webhook receiver to {addr}"))?;

	tracing::info!("receiving alertmanager webhooks on http://{}/webhook", addr);

	server
		.serve(router(state).into_make_service())
		.await
		.context("alertmanager webhook receiver crashed")?;

	Ok(())
}
