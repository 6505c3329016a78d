//! Renders alert groups into telegram messages.
//!
//! Alert groups are received from [alertmanager_webhook_receiver](crate::alertmanager_webhook_receiver)
//! and the rendered text is sent with [TelegramClient](crate::telegram::TelegramClient). The
//! output uses telegram's legacy `Markdown` parse mode (`*bold*`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};

use crate::alert;

/// status line marker of a firing alert group
pub const FIRING_EMOJI: &str = "\u{1F534}";
/// status line marker of a resolved alert group
pub const RESOLVED_EMOJI: &str = "\u{2705}";

/// common labels already shown in the header, they are left out of the label list
///
/// `alertname` is a group label and normally never shows up here, but a
/// common label of that name is still left out
const HEADER_LABELS: [&str; 3] = ["alertname", "severity", "service"];

/// format of the `Started:` line
const STARTED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// timestamp formats with utc offset, tried after rfc3339
const OFFSET_FORMATS: [&str; 4] = [
	"%Y-%m-%dT%H:%M:%S%.f%:z",
	"%Y-%m-%d %H:%M:%S%.f%:z",
	"%Y-%m-%dT%H:%M:%S%.f%z",
	"%Y-%m-%d %H:%M:%S%.f%z",
];

/// timestamp formats without utc offset
const NAIVE_FORMATS: [&str; 4] = [
	"%Y-%m-%dT%H:%M:%S%.f",
	"%Y-%m-%d %H:%M:%S%.f",
	"%Y-%m-%dT%H:%M",
	"%Y-%m-%d %H:%M",
];

/// Render an alert group into the message text.
///
/// Never fails, missing fields have already been defaulted by [alert::Data].
///
/// # Arguments
///
/// * `alert` - the alert group to render
pub fn render_alert(alert: &alert::Data) -> String {
	let (emoji, status) =
		if alert.is_firing() { (FIRING_EMOJI, "FIRING") } else { (RESOLVED_EMOJI, "RESOLVED") };

	let mut message = format!("{emoji} *{status}*\n\n");
	message.push_str(format!("*Alert:* {}\n", alert.alert_name()).as_str());
	message.push_str(format!("*Severity:* {}\n", alert.severity()).as_str());
	message.push_str(format!("*Service:* {}\n\n", alert.service()).as_str());

	for entry in alert.alerts() {
		if let Some(description) = entry.description() {
			message.push_str(format!("*Description:* {description}\n").as_str());
		}
		if let Some(summary) = entry.summary() {
			message.push_str(format!("*Summary:* {summary}\n").as_str());
		}
		if let Some(starts_at) = entry.starts_at() {
			message.push_str(format!("*Started:* {}\n", format_timestamp(starts_at)).as_str());
		}

		message.push('\n');
	}

	let common_labels = alert.common_labels();
	if !common_labels.is_empty() {
		message.push_str("*Labels:*\n");
		for (key, value) in common_labels {
			if !HEADER_LABELS.contains(&key.as_str()) {
				message.push_str(format!("  • {key}: {value}\n").as_str());
			}
		}
	}

	message
}

/// Reformat an iso8601 timestamp as `YYYY-MM-DD HH:MM:SS`, keeping the wall
/// clock time of its own offset. Returns the input unchanged if it can't be
/// parsed.
pub fn format_timestamp(raw: &str) -> String {
	parse_timestamp(raw)
		// a leap second (`:60`) parses with nanoseconds >= 1s, it is passed through raw
		.filter(|timestamp| timestamp.nanosecond() < 1_000_000_000)
		.map(|timestamp| timestamp.format(STARTED_FORMAT).to_string())
		.unwrap_or_else(|| raw.to_owned())
}

/// parse the timestamp into the local time of its offset (if it had one)
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
	// `Z` is the only utc designator we accept
	let normalized = raw.replace('Z', "+00:00");
	let normalized = normalized.as_str();

	if let Ok(timestamp) = DateTime::parse_from_rfc3339(normalized) {
		return Some(timestamp.naive_local());
	}

	OFFSET_FORMATS
		.iter()
		.find_map(|format| DateTime::parse_from_str(normalized, format).ok())
		.map(|timestamp| timestamp.naive_local())
		.or_else(|| {
			NAIVE_FORMATS
				.iter()
				.find_map(|format| NaiveDateTime::parse_from_str(normalized, format).ok())
		})
		.or_else(|| {
			NaiveDate::parse_from_str(normalized, "%Y-%m-%d")
				.ok()
				.and_then(|date| date.and_hms_opt(0, 0, 0))
		})
}

#[cfg(test)]
mod tests {
	use serde_json::{json, Value};

	use super::*;

	fn render(payload: Value) -> String {
		render_alert(&serde_json::from_value(payload).unwrap())
	}

	#[test]
	fn renders_complete_firing_group() {
		let message = render(json!({
			"status": "firing",
			"groupLabels": { "alertname": "HighLatency" },
			"commonLabels": {
				"severity": "critical",
				"service": "api",
				"team": "backend",
				"env": "prod"
			},
			"alerts": [
				{
					"annotations": { "description": "p99 latency is 2.3s", "summary": "latency high" },
					"labels": { "instance": "api-0" },
					"startsAt": "2024-01-15T10:30:00Z"
				},
				{
					"annotations": { "summary": "latency high" },
					"startsAt": "not-a-date"
				}
			]
		}));

		assert_eq!(
			message,
			"\u{1F534} *FIRING*\n\
			 \n\
			 *Alert:* HighLatency\n\
			 *Severity:* critical\n\
			 *Service:* api\n\
			 \n\
			 *Description:* p99 latency is 2.3s\n\
			 *Summary:* latency high\n\
			 *Started:* 2024-01-15 10:30:00\n\
			 \n\
			 *Summary:* latency high\n\
			 *Started:* not-a-date\n\
			 \n\
			 *Labels:*\n  \
			 • env: prod\n  \
			 • team: backend\n"
		);
	}

	#[test]
	fn firing_header() {
		assert!(render(json!({ "status": "firing" })).starts_with("\u{1F534} *FIRING*\n\n"));
	}

	#[test]
	fn anything_but_firing_is_resolved() {
		for payload in [
			json!({ "status": "resolved" }),
			json!({ "status": "pending" }),
			json!({ "status": "" }),
			json!({}),
		] {
			assert!(render(payload).starts_with("\u{2705} *RESOLVED*\n\n"));
		}
	}

	#[test]
	fn empty_group_uses_defaults() {
		assert_eq!(
			render(json!({})),
			"\u{2705} *RESOLVED*\n\n*Alert:* Unknown Alert\n*Severity:* unknown\n*Service:* unknown\n\n"
		);
	}

	#[test]
	fn every_alert_ends_with_blank_line() {
		let message = render(json!({ "alerts": [{}, { "annotations": {} }] }));

		assert!(message.ends_with("*Service:* unknown\n\n\n\n"));
	}

	#[test]
	fn label_list_is_sorted_and_skips_header_labels() {
		let message = render(json!({
			"commonLabels": {
				"zone": "eu-1",
				"alertname": "Disk",
				"severity": "warning",
				"service": "db",
				"instance": "db-0",
				"Job": "node"
			}
		}));

		let labels = message.split("*Labels:*\n").nth(1).unwrap();
		assert_eq!(labels, "  • Job: node\n  • instance: db-0\n  • zone: eu-1\n");
	}

	#[test]
	fn label_header_is_kept_when_every_label_is_excluded() {
		let message = render(json!({ "commonLabels": { "severity": "info" } }));

		assert!(message.ends_with("*Service:* unknown\n\n*Labels:*\n"));
	}

	#[test]
	fn no_label_header_without_common_labels() {
		assert!(!render(json!({ "commonLabels": {} })).contains("*Labels:*"));
	}

	#[test]
	fn timestamps() {
		let cases = [
			("2024-01-15T10:30:00Z", "2024-01-15 10:30:00"),
			("2024-01-15T10:30:00.123456789Z", "2024-01-15 10:30:00"),
			("2024-01-15T10:30:00+02:00", "2024-01-15 10:30:00"),
			("2024-01-15T10:30:00-0500", "2024-01-15 10:30:00"),
			("2024-01-15 10:30:00", "2024-01-15 10:30:00"),
			("2024-01-15T10:30", "2024-01-15 10:30:00"),
			("2024-01-15", "2024-01-15 00:00:00"),
			("not-a-date", "not-a-date"),
			("2024-13-45T10:30:00Z", "2024-13-45T10:30:00Z"),
			("10:30:00Z", "10:30:00Z"),
			("2016-12-31T23:59:60Z", "2016-12-31T23:59:60Z"),
			("2016-12-31T23:59:60.5+01:00", "2016-12-31T23:59:60.5+01:00"),
			("2024-01-15T10", "2024-01-15T10"),
		];

		for (raw, expected) in cases {
			assert_eq!(format_timestamp(raw), expected, "timestamp {raw:?}");
		}
	}

	#[test]
	fn started_line_passes_unparsable_value_through() {
		let message = render(json!({ "alerts": [{ "startsAt": "yesterday" }] }));

		assert!(message.contains("\n*Started:* yesterday\n\n"));
	}
}
