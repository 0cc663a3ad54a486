// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Publish payload framing: JSON serialize, zlib compress, base64 wrap.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{EventError, Result};
use crate::event::{CloudEvent, CloudEventError};

/// One element of the upload request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishDataInput {
	#[serde(rename = "type")]
	pub data_type: String,
	pub compressed: bool,
	pub payload: String,
}

/// Per-event outcome returned by the node, index-correlated with the
/// request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishEventResult {
	pub success: bool,
	#[serde(default)]
	pub error: String,
}

/// Encodes one cloud event into its upload framing.
pub fn new_publish_data_input(event: &CloudEvent) -> Result<PublishDataInput> {
	let json = serde_json::to_vec(event)?;

	let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(&json)?;
	let compressed = encoder.finish()?;

	Ok(PublishDataInput {
		data_type: "event".to_string(),
		compressed: true,
		payload: BASE64.encode(compressed),
	})
}

/// Decodes an upload framing back into the cloud event it carries. Fails
/// on malformed base64, zlib or JSON.
pub fn decode_publish_data_input(input: &PublishDataInput) -> Result<CloudEvent> {
	if !input.compressed {
		return Err(EventError::NotCompressed);
	}

	let compressed = BASE64.decode(&input.payload)?;
	let mut json = Vec::new();
	ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut json)?;

	Ok(serde_json::from_slice(&json)?)
}

/// Stamps `event_source` on each event and encodes the batch. An event
/// that fails to encode is dropped from the batch; the rest go through.
pub fn create_publish_event_list(
	event_source: &str,
	events: &mut [CloudEvent],
) -> Vec<PublishDataInput> {
	let mut payloads = Vec::with_capacity(events.len());
	for event in events.iter_mut() {
		event.source = event_source.to_string();
		match new_publish_data_input(event) {
			Ok(payload) => payloads.push(payload),
			Err(e) => {
				error!(event_id = %event.id, error = %e, "dropping event that failed to encode");
			}
		}
	}
	payloads
}

/// Pairs each failed publish result with its event, preserving request
/// order.
pub fn filter_events_with_errors(
	results: &[PublishEventResult],
	events: &[CloudEvent],
) -> Vec<CloudEventError> {
	results
		.iter()
		.zip(events.iter())
		.filter(|(result, _)| !result.success)
		.map(|(result, event)| {
			error!(
				event_id = %event.id,
				error = %result.error,
				"event failed to publish"
			);
			CloudEventError {
				event: event.clone(),
				error: result.error.clone(),
			}
		})
		.collect()
}
