// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Network metric counters and the collection pipeline that batches their
//! snapshots into cloud events for upload to the space node.
//!
//! Delivery is at-least-once: a batch that fails to post in full is
//! re-queued ahead of newly collected payloads, and individually rejected
//! events are decoded back into payloads and re-queued the same way.

pub mod counter;
pub mod error;
pub mod monitor;
pub mod payload;
pub mod sender;

pub use counter::{Counter, CounterSnapshot};
pub use error::{MonitorError, Result};
pub use monitor::{Monitor, MonitorService};
pub use payload::{EventPayload, MonitorSnapshot};
pub use sender::{SendError, Sender};
