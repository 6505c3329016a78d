#[cfg(test)]
use std::ffi::OsString;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use config::{Config, File};
use serde::Deserialize;

use crate::{
	alertmanager_webhook_receiver::AlertReceiverSettings, log::LogSettings,
	telegram::TelegramSettings, telemetry_endpoint::TelemetryEndpointSettings,
};

/// config file used when none is given on the command line, may be missing
const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	pub log: LogSettings,
	pub webhook_receiver: AlertReceiverSettings,
	pub telemetry_endpoint: TelemetryEndpointSettings,
	pub telegram: TelegramSettings,
}

/// command line interface, credentials can also be passed via the environment
fn command() -> Command<'static> {
	Command::new(clap::crate_name!())
		.version(clap::crate_version!())
		.about(clap::crate_description!())
		.args([
			Arg::new("config")
				.help("path of config file [default: ./config.yaml if present]")
				.takes_value(true)
				.short('c')
				.long("config"),
			Arg::new("level")
				.help("log level")
				.possible_values(["error", "warn", "info", "debug", "trace"])
				.ignore_case(true)
				.takes_value(true)
				.long("log"),
			Arg::new("bot-token")
				.help("telegram bot token")
				.takes_value(true)
				.long("bot-token")
				.env("TELEGRAM_BOT_TOKEN")
				.hide_env_values(true),
			Arg::new("chat-id")
				.help("telegram chat to send alerts to")
				.takes_value(true)
				.long("chat-id")
				.env("TELEGRAM_CHAT_ID"),
		])
}

impl Settings {
	/// load settings from the process arguments, environment and config file.
	/// Exits the process on `--help`, `--version` and invalid arguments.
	pub fn load() -> Result<Self> {
		Self::from_matches(&command().get_matches())
	}

	/// load settings from the given command line
	#[cfg(test)]
	pub fn load_from<I, T>(args: I) -> Result<Self>
	where
		I: IntoIterator<Item = T>,
		T: Into<OsString> + Clone,
	{
		Self::from_matches(&command().try_get_matches_from(args)?)
	}

	fn from_matches(opts: &ArgMatches) -> Result<Self> {
		// an explicitly given config file has to exist
		let config_file = match opts.value_of("config") {
			Some(path) => File::with_name(path).required(true),
			None => File::with_name(DEFAULT_CONFIG_PATH).required(false),
		};

		let mut builder = Config::builder()
			.set_default("log.level", "info")?
			.set_default("webhook_receiver.bind_address", "0.0.0.0")?
			.set_default("webhook_receiver.port", 5000_i64)?
			.set_default("telemetry_endpoint.bind_address", "0.0.0.0")?
			.set_default("telemetry_endpoint.port", 9090_i64)?
			.set_default("telegram.api_url", "https://api.telegram.org")?
			.set_default("telegram.bot_token", "")?
			.set_default("telegram.chat_id", "")?
			.set_default("telegram.timeout", 10.0)?
			.add_source(config_file);

		for (arg, key) in
			[("level", "log.level"), ("bot-token", "telegram.bot_token"), ("chat-id", "telegram.chat_id")]
		{
			if let Some(value) = opts.value_of(arg) {
				builder = builder.set_override(key, value)?;
			}
		}

		let settings: Self = builder
			.build()
			.context("can't load config")?
			.try_deserialize()
			.context("invalid config")?;

		// a zero timeout would fail every delivery immediately
		if settings.telegram.timeout.is_zero() {
			bail!("invalid config: telegram.timeout must be greater than zero");
		}

		Ok(settings)
	}
}
