// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! CloudEvents 1.0 envelopes and the publish-input codec used to upload
//! network metric events to the space node's event bus.

pub mod codec;
pub mod error;
pub mod event;

pub use codec::{
	create_publish_event_list, decode_publish_data_input, filter_events_with_errors,
	new_publish_data_input, PublishDataInput, PublishEventResult,
};
pub use error::{EventError, Result};
pub use event::{CloudEvent, CloudEventError, NETWORK_METRIC_EVENT_TYPE};
