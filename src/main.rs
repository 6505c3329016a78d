//! prometheus alertmanager receiver that forwards alert groups into a telegram chat
//!
//! Features:
//! - renders alert groups into a markdown message (status, labels, annotations)
//! - delivers them synchronously, alertmanager sees failed deliveries as 5xx
//! - exposes prometheus metrics about received webhooks and telegram requests

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use settings::Settings;

use crate::{alertmanager_webhook_receiver::State, telegram::TelegramClient};

mod alert;
mod alert_renderer;
mod alertmanager_webhook_receiver;
mod log;
mod settings;
mod telegram;
mod telemetry_endpoint;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	// tracing isn't set up yet, errors are printed by returning from main
	let settings = Settings::load().context("failed to load config and command line arguments")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	tracing::debug!("loaded settings: {:?}", settings);

	if !settings.telegram.is_configured() {
		tracing::warn!("telegram bot token or chat id not configured, every delivery will fail");
	}

	let registry = Registry::new();

	let telegram = TelegramClient::new(&settings.telegram, &registry)
		.context("failed to construct telegram client")?;
	let state = Arc::new(State::new(telegram, &registry).context("failed to construct receiver")?);

	tokio::try_join!(
		alertmanager_webhook_receiver::run_alert_receiver(&settings.webhook_receiver, state),
		telemetry_endpoint::run_telemetry_endpoint(&settings.telemetry_endpoint, registry),
	)?;

	Ok(())
}
