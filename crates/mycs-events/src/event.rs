// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CloudEvents type attribute of every metric event posted by this client.
pub const NETWORK_METRIC_EVENT_TYPE: &str = "io.appbricks.mycs.network.metric";

const SPEC_VERSION: &str = "1.0";
const METRIC_SUBJECT: &str = "Application Monitor Snapshot";
const JSON_CONTENT_TYPE: &str = "application/json";

/// A CloudEvents 1.0 JSON envelope.
///
/// Field order matches the wire layout produced by the node's other
/// clients; `time` is kept as the rendered RFC-3339 string so decoded
/// events re-serialize byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
	pub specversion: String,
	pub id: String,
	pub source: String,
	#[serde(rename = "type")]
	pub event_type: String,
	pub subject: String,
	pub datacontenttype: String,
	pub time: String,
	pub data: serde_json::Value,
}

impl CloudEvent {
	/// Builds a network metric event carrying `data`, stamped with a fresh
	/// UUID and the current time.
	pub fn new_network_metric(source: &str, data: serde_json::Value) -> Self {
		Self {
			specversion: SPEC_VERSION.to_string(),
			id: Uuid::new_v4().to_string(),
			source: source.to_string(),
			event_type: NETWORK_METRIC_EVENT_TYPE.to_string(),
			subject: METRIC_SUBJECT.to_string(),
			datacontenttype: JSON_CONTENT_TYPE.to_string(),
			time: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
			data,
		}
	}
}

/// A cloud event the node rejected, paired with the node's error text.
#[derive(Debug, Clone)]
pub struct CloudEventError {
	pub event: CloudEvent,
	pub error: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_network_metric_sets_envelope_attributes() {
		let event =
			CloudEvent::new_network_metric("urn:mycs:device:12345", serde_json::json!({"k": 1}));

		assert_eq!(event.specversion, "1.0");
		assert_eq!(event.event_type, NETWORK_METRIC_EVENT_TYPE);
		assert_eq!(event.subject, "Application Monitor Snapshot");
		assert_eq!(event.datacontenttype, "application/json");
		assert_eq!(event.source, "urn:mycs:device:12345");
		assert!(Uuid::parse_str(&event.id).is_ok());
	}

	#[test]
	fn serializes_type_attribute_name() {
		let event = CloudEvent::new_network_metric("urn:mycs", serde_json::json!({}));
		let json = serde_json::to_string(&event).unwrap();
		assert!(json.contains(r#""type":"io.appbricks.mycs.network.metric""#));
	}
}
