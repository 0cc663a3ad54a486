// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The measurement-event uploader: the metrics pipeline's `Sender`
//! capability, delivering batches to the node over signed API requests.

use async_trait::async_trait;
use mycs_events::{new_publish_data_input, CloudEvent, CloudEventError, PublishEventResult};
use mycs_monitors::{SendError, Sender};
use tracing::{debug, error};

use crate::api_client::ApiClient;

const EVENTS_API_PATH: &str = "/events";

/// Posts measurement events to the space node, authorized by the api
/// client's live session. The device URN is stamped as the source of
/// every event before upload.
pub struct MeasurementEventSender {
	client: ApiClient,
	event_source: String,
}

impl MeasurementEventSender {
	pub fn new(client: ApiClient, device_id: &str) -> Self {
		Self {
			client,
			event_source: format!("urn:mycs:device:{device_id}"),
		}
	}
}

#[async_trait]
impl Sender for MeasurementEventSender {
	async fn post_measurement_events(
		&self,
		mut events: Vec<CloudEvent>,
	) -> std::result::Result<Vec<CloudEventError>, SendError> {
		let mut payloads = Vec::with_capacity(events.len());
		let mut published = Vec::with_capacity(events.len());
		for mut event in events.drain(..) {
			event.source = self.event_source.clone();
			match new_publish_data_input(&event) {
				Ok(payload) => {
					payloads.push(payload);
					published.push(event);
				}
				Err(e) => {
					error!(event_id = %event.id, error = %e, "dropping event that failed to encode");
				}
			}
		}
		if payloads.is_empty() {
			return Ok(Vec::new());
		}

		let node = self.client.node();
		let url = node
			.api_url()
			.join(EVENTS_API_PATH)
			.map_err(|e| SendError(e.to_string()))?;
		let http = node.http_client();

		let mut request = http
			.post(url)
			.json(&payloads)
			.build()
			.map_err(|e| SendError(e.to_string()))?;
		self.client
			.set_authorized(&mut request)
			.await
			.map_err(|e| SendError(e.to_string()))?;

		let response = http
			.execute(request)
			.await
			.map_err(|e| SendError(e.to_string()))?;
		if !response.status().is_success() {
			return Err(SendError(format!(
				"events endpoint returned {}",
				response.status()
			)));
		}

		let results: Vec<PublishEventResult> = response
			.json()
			.await
			.map_err(|e| SendError(e.to_string()))?;
		debug!(
			posted = published.len(),
			failed = results.iter().filter(|r| !r.success).count(),
			"posted measurement events"
		);

		Ok(collect_event_errors(&results, &published))
	}
}

/// Pairs failed publish results with their events by request index.
fn collect_event_errors(
	results: &[PublishEventResult],
	events: &[CloudEvent],
) -> Vec<CloudEventError> {
	results
		.iter()
		.zip(events.iter())
		.filter(|(result, _)| !result.success)
		.map(|(result, event)| CloudEventError {
			event: event.clone(),
			error: result.error.clone(),
		})
		.collect()
}
