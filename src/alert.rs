//! data structures for deserializing incoming alert groups
//!
//! Alertmanager sends a lot more than we look at (`version`, `groupKey`,
//! `receiver`, `externalURL`, ...). Unknown fields are ignored. Fields we do
//! read may be missing or `null`; they are defaulted here so the renderer
//! never has to care.
use std::collections::BTreeMap;

use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};

/// label or annotation set, ordered by key
pub type Labels = BTreeMap<String, String>;

/// fallback for a missing `alertname` group label
pub const UNKNOWN_ALERT_NAME: &str = "Unknown Alert";
/// fallback for missing `severity` and `service` common labels
pub const UNKNOWN_LABEL_VALUE: &str = "unknown";

/// the only status we treat as firing, everything else counts as resolved
const STATUS_FIRING: &str = "firing";

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// alert group received by the alertmanager webhook receiver
pub struct Data {
	#[serde(default)]
	status: Option<String>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	group_labels: Labels,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	common_labels: Labels,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	alerts: Vec<Alert>,
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// a single alert of an alert group
pub struct Alert {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	annotations: Labels,
	#[serde(default)]
	starts_at: Option<String>,
}

impl Data {
	/// `true` only for the status `firing`, an unknown or missing status is
	/// treated as resolved
	pub fn is_firing(&self) -> bool {
		self.status.as_deref() == Some(STATUS_FIRING)
	}

	/// `alertname` group label
	pub fn alert_name(&self) -> &str {
		self.group_labels.get("alertname").map_or(UNKNOWN_ALERT_NAME, String::as_str)
	}

	/// `severity` common label
	pub fn severity(&self) -> &str {
		self.common_labels.get("severity").map_or(UNKNOWN_LABEL_VALUE, String::as_str)
	}

	/// `service` common label
	pub fn service(&self) -> &str {
		self.common_labels.get("service").map_or(UNKNOWN_LABEL_VALUE, String::as_str)
	}

	pub fn common_labels(&self) -> &Labels {
		&self.common_labels
	}

	pub fn alerts(&self) -> &[Alert] {
		&self.alerts
	}
}

impl Alert {
	/// `description` annotation, `None` if missing or empty
	pub fn description(&self) -> Option<&str> {
		non_empty(self.annotations.get("description").map(String::as_str))
	}

	/// `summary` annotation, `None` if missing or empty
	pub fn summary(&self) -> Option<&str> {
		non_empty(self.annotations.get("summary").map(String::as_str))
	}

	/// raw `startsAt` timestamp, `None` if missing or empty
	pub fn starts_at(&self) -> Option<&str> {
		non_empty(self.starts_at.as_deref())
	}
}

fn non_empty(value: Option<&str>) -> Option<&str> {
	value.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn missing_fields_fall_back_to_defaults() {
		let data: Data = serde_json::from_value(json!({})).unwrap();

		assert!(!data.is_firing());
		assert_eq!(data.alert_name(), "Unknown Alert");
		assert_eq!(data.severity(), "unknown");
		assert_eq!(data.service(), "unknown");
		assert!(data.common_labels().is_empty());
		assert!(data.alerts().is_empty());
	}

	#[test]
	fn null_fields_fall_back_to_defaults() {
		let data: Data = serde_json::from_value(json!({
			"status": null,
			"groupLabels": null,
			"commonLabels": null,
			"alerts": [{ "annotations": null, "startsAt": null }]
		}))
		.unwrap();

		assert!(!data.is_firing());
		assert_eq!(data.alert_name(), "Unknown Alert");
		assert_eq!(data.alerts().len(), 1);
		assert_eq!(data.alerts()[0].description(), None);
		assert_eq!(data.alerts()[0].starts_at(), None);
	}

	#[test]
	fn present_but_empty_label_is_kept() {
		let data: Data = serde_json::from_value(json!({
			"groupLabels": { "alertname": "" },
			"commonLabels": { "severity": "" }
		}))
		.unwrap();

		assert_eq!(data.alert_name(), "");
		assert_eq!(data.severity(), "");
		assert_eq!(data.service(), "unknown");
	}

	#[test]
	fn empty_annotations_are_treated_as_missing() {
		let alert: Alert = serde_json::from_value(json!({
			"annotations": { "description": "", "summary": "disk full" },
			"startsAt": ""
		}))
		.unwrap();

		assert_eq!(alert.description(), None);
		assert_eq!(alert.summary(), Some("disk full"));
		assert_eq!(alert.starts_at(), None);
	}

	#[test]
	fn only_firing_is_firing() {
		for (status, firing) in [("firing", true), ("resolved", false), ("FIRING", false), ("", false)] {
			let data: Data = serde_json::from_value(json!({ "status": status })).unwrap();
			assert_eq!(data.is_firing(), firing, "status {status:?}");
		}
	}

	#[test]
	fn full_alertmanager_payload_deserializes() {
		let data: Data = serde_json::from_value(json!({
			"version": "4",
			"groupKey": "{}:{alertname=\"HighLatency\"}",
			"truncatedAlerts": 0,
			"status": "firing",
			"receiver": "telegram",
			"groupLabels": { "alertname": "HighLatency" },
			"commonLabels": { "alertname": "HighLatency", "severity": "critical", "service": "api" },
			"commonAnnotations": {},
			"externalURL": "http://alertmanager:9093",
			"alerts": [{
				"status": "firing",
				"labels": { "alertname": "HighLatency", "instance": "api-0" },
				"annotations": { "summary": "p99 above 2s" },
				"startsAt": "2024-01-15T10:30:00.123456789Z",
				"endsAt": "0001-01-01T00:00:00Z",
				"generatorURL": "http://prometheus:9090/graph",
				"fingerprint": "c6b3f6a5e3f6f2d1"
			}]
		}))
		.unwrap();

		assert!(data.is_firing());
		assert_eq!(data.alert_name(), "HighLatency");
		assert_eq!(data.severity(), "critical");
		assert_eq!(data.service(), "api");
		assert_eq!(data.alerts()[0].summary(), Some("p99 above 2s"));
	}

	#[test]
	fn wrong_field_type_is_rejected() {
		assert!(serde_json::from_value::<Data>(json!({ "groupLabels": [] })).is_err());
		assert!(serde_json::from_value::<Data>(json!([1, 2])).is_err());
	}
}
