// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use mycs_events::{CloudEvent, CloudEventError};
use thiserror::Error;

/// Transport-level failure posting a batch. The whole batch is assumed
/// undelivered and will be re-queued by the pipeline.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SendError(pub String);

/// Upstream capability that delivers measurement events to the node.
///
/// A successful call returns the per-event rejections (empty when the
/// whole batch was accepted); a `SendError` means nothing was delivered.
#[async_trait]
pub trait Sender: Send + Sync {
	async fn post_measurement_events(
		&self,
		events: Vec<CloudEvent>,
	) -> Result<Vec<CloudEventError>, SendError>;
}
