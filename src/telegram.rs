//! Sends rendered alerts to a telegram chat via the bot api `sendMessage`
//! method.
use std::{fmt, time::Duration};

use anyhow::{Context, Result};
use prometheus::{
	exponential_buckets, histogram_opts, opts, Histogram, IntCounter, IntCounterVec, Registry,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use thiserror::Error;
use url::Url;

/// parse mode matching the markup emitted by [crate::alert_renderer]
const PARSE_MODE: &str = "Markdown";

#[serde_as]
#[derive(Clone, Deserialize)]
/// config file options for the telegram bot
pub struct TelegramSettings {
	/// base url of the bot api
	pub api_url: Url,
	/// bot token as issued by @BotFather
	pub bot_token: String,
	/// target chat, numeric id or `@channelusername`
	pub chat_id: String,
	/// upper bound for a complete `sendMessage` request, fractional seconds
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	pub timeout: Duration,
}

impl TelegramSettings {
	/// both the bot token and the chat id are set
	pub fn is_configured(&self) -> bool {
		!self.bot_token.is_empty() && !self.chat_id.is_empty()
	}
}

// the bot token is a credential, keep it out of logs
impl fmt::Debug for TelegramSettings {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let bot_token = if self.bot_token.is_empty() { "" } else { "<redacted>" };

		f.debug_struct("TelegramSettings")
			.field("api_url", &self.api_url.as_str())
			.field("bot_token", &bot_token)
			.field("chat_id", &self.chat_id)
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Error occurring while delivering a message to telegram
#[derive(Error, Debug)]
pub enum SendError {
	/// bot token or chat id is empty, nothing was sent
	#[error("telegram bot token or chat id not configured")]
	NotConfigured,
	/// the request couldn't be sent or timed out
	#[error("telegram request failed: {0}")]
	Request(#[from] reqwest::Error),
	/// telegram answered with a non success status
	#[error("telegram responded with {status}: {body}")]
	Rejected { status: StatusCode, body: String },
}

#[derive(Debug, Serialize)]
/// body of the `sendMessage` request
struct SendMessage<'a> {
	chat_id: &'a str,
	text: &'a str,
	parse_mode: &'a str,
}

#[derive(Debug, Clone)]
/// prometheus meters for the telegram http client
struct Metrics {
	/// total number of `sendMessage` requests
	requests: IntCounter,
	/// number of failed `sendMessage` requests
	requests_failed: IntCounterVec,
	/// time spent by `sendMessage` requests
	request_duration: Histogram,
}

impl Metrics {
	/// construct meters and register them in `registry`
	fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		let requests = IntCounter::with_opts(
			opts!("requests_total", "total number of sendMessage requests")
				.namespace("telegram_howler")
				.subsystem("telegram"),
		)?;

		let requests_failed = IntCounterVec::new(
			opts!("requests_failed", "number of failed sendMessage requests")
				.namespace("telegram_howler")
				.subsystem("telegram"),
			&["status_code"],
		)?;

		let request_duration = Histogram::with_opts(
			histogram_opts!(
				"request_duration_seconds",
				"total time of a sendMessage request in seconds",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("telegram_howler")
			.subsystem("telegram"),
		)?;

		registry.register(Box::new(requests.clone()))?;
		registry.register(Box::new(requests_failed.clone()))?;
		registry.register(Box::new(request_duration.clone()))?;

		Ok(Self { requests, requests_failed, request_duration })
	}
}

#[derive(Debug, Clone)]
/// telegram bot api client. Doesn't retry, a failed delivery is reported to
/// the caller.
pub struct TelegramClient {
	/// http client
	client: reqwest::Client,
	/// credentials and api location
	settings: TelegramSettings,
	/// prometheus meters for `sendMessage` requests
	metrics: Metrics,
}

impl TelegramClient {
	/// construct the client, its meters are registered in `registry`
	pub fn new(settings: &TelegramSettings, registry: &Registry) -> Result<Self> {
		Ok(Self {
			client: reqwest::Client::builder()
				.timeout(settings.timeout)
				.build()
				.context("failed to build reqwest client")?,
			settings: settings.clone(),
			metrics: Metrics::new(registry).context("failed to register prometheus meters")?,
		})
	}

	/// `sendMessage` endpoint, contains the bot token
	fn send_message_url(&self) -> String {
		format!(
			"{}/bot{}/sendMessage",
			self.settings.api_url.as_str().trim_end_matches('/'),
			self.settings.bot_token
		)
	}

	/// Send `text` to the configured chat.
	///
	/// # Arguments
	///
	/// * `text` - message text in telegram markdown
	pub async fn send(&self, text: &str) -> Result<(), SendError> {
		if !self.settings.is_configured() {
			tracing::error!("telegram bot token or chat id not configured");
			return Err(SendError::NotConfigured);
		}

		let body =
			SendMessage { chat_id: self.settings.chat_id.as_str(), text, parse_mode: PARSE_MODE };

		self.metrics.requests.inc();
		let _timer = self.metrics.request_duration.start_timer();

		// the url carries the bot token, strip it from errors
		let response = self
			.client
			.post(self.send_message_url())
			.json(&body)
			.send()
			.await
			.map_err(|err| {
				self.metrics.requests_failed.with_label_values(&["none"]).inc();
				SendError::Request(err.without_url())
			})?;

		let status = response.status();
		if !status.is_success() {
			self.metrics.requests_failed.with_label_values(&[status.as_str()]).inc();
			let body = response.text().await.unwrap_or_default();
			return Err(SendError::Rejected { status, body });
		}

		tracing::debug!(chat_id = %self.settings.chat_id, "message sent to telegram");

		Ok(())
	}
}
