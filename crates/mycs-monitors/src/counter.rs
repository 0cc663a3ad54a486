// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A named integer accumulator.
///
/// In cumulative mode [`Counter::set`] receives absolute readings (for
/// example a device's total bytes transferred) and the counter turns them
/// into per-snapshot deltas against the accumulated baseline. Handles are
/// cheap clones over shared state; a [`crate::Monitor`] owns the counters
/// attached to it while callers keep observing handles.
#[derive(Clone)]
pub struct Counter {
	inner: Arc<CounterInner>,
}

struct CounterInner {
	name: String,
	cumulative: bool,
	ignore_zero_snapshots: bool,
	state: Mutex<CounterState>,
}

struct CounterState {
	attribs: HashMap<String, String>,
	inc_by: i64,
	value: i64,
	cumulative_value: i64,
}

/// An atomic capture of a counter's value at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
	pub name: String,
	pub timestamp: i64,
	pub value: i64,
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub attribs: HashMap<String, String>,
}

impl Counter {
	/// Creates a counter. With `cumulative` set, values passed to `set`
	/// are treated as absolute readings and snapshots carry the delta
	/// since the previous snapshot. With `ignore_zero_snapshots` set, a
	/// zero value produces no snapshot at all.
	pub fn new(name: &str, cumulative: bool, ignore_zero_snapshots: bool) -> Self {
		Self::with_attribs(name, cumulative, ignore_zero_snapshots, HashMap::new())
	}

	pub fn with_attribs(
		name: &str,
		cumulative: bool,
		ignore_zero_snapshots: bool,
		attribs: HashMap<String, String>,
	) -> Self {
		Self {
			inner: Arc::new(CounterInner {
				name: name.to_string(),
				cumulative,
				ignore_zero_snapshots,
				state: Mutex::new(CounterState {
					attribs,
					inc_by: 1,
					value: 0,
					cumulative_value: 0,
				}),
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn add_attribute(&self, name: &str, value: &str) {
		self.lock_state()
			.attribs
			.insert(name.to_string(), value.to_string());
	}

	/// Reconfigures the step applied by [`Counter::inc`].
	pub fn set_inc(&self, inc_value: i64) {
		self.lock_state().inc_by = inc_value;
	}

	/// Current value including the accumulated baseline.
	pub fn get(&self) -> i64 {
		let state = self.lock_state();
		state.value + state.cumulative_value
	}

	pub fn set(&self, value: i64) {
		let mut state = self.lock_state();
		if self.inner.cumulative {
			state.value = value - state.cumulative_value;
		} else {
			state.value = value;
		}
	}

	pub fn inc(&self) {
		let mut state = self.lock_state();
		let step = state.inc_by;
		state.value += step;
	}

	pub fn add(&self, value: i64) {
		self.lock_state().value += value;
	}

	/// Takes a snapshot, folding the pending value into the baseline and
	/// resetting it. Returns `None` when zero snapshots are suppressed and
	/// nothing accumulated since the last collection.
	pub(crate) fn collect(&self) -> Option<CounterSnapshot> {
		let mut state = self.lock_state();

		if self.inner.ignore_zero_snapshots && state.value == 0 {
			return None;
		}

		let snapshot = CounterSnapshot {
			name: self.inner.name.clone(),
			timestamp: Utc::now().timestamp_millis(),
			value: state.value,
			attribs: state.attribs.clone(),
		};
		state.cumulative_value += state.value;
		state.value = 0;
		Some(snapshot)
	}

	pub(crate) fn same_counter(&self, other: &Counter) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	fn lock_state(&self) -> MutexGuard<'_, CounterState> {
		// A poisoned lock only means a panic elsewhere; the counter state
		// itself is always consistent between operations.
		self.inner
			.state
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn inc_and_add_accumulate() {
		let counter = Counter::new("c", false, false);
		counter.inc();
		counter.inc();
		counter.add(5);
		assert_eq!(counter.get(), 7);
	}

	#[test]
	fn set_inc_changes_step() {
		let counter = Counter::new("c", false, false);
		counter.set_inc(10);
		counter.inc();
		counter.inc();
		assert_eq!(counter.get(), 20);
	}

	#[test]
	fn snapshots_sum_to_total_in_non_cumulative_mode() {
		let counter = Counter::new("c", false, false);

		let mut collected = 0;
		for i in 1..=10 {
			counter.add(i);
			if i % 3 == 0 {
				collected += counter.collect().unwrap().value;
			}
		}
		collected += counter.collect().unwrap().value;

		assert_eq!(collected, (1..=10).sum::<i64>());
		assert_eq!(counter.get(), (1..=10).sum::<i64>());
	}

	#[test]
	fn cumulative_snapshots_are_deltas() {
		let counter = Counter::new("c", true, false);

		counter.set(100);
		assert_eq!(counter.collect().unwrap().value, 100);

		counter.set(130);
		assert_eq!(counter.collect().unwrap().value, 30);

		counter.set(135);
		counter.set(142);
		assert_eq!(counter.collect().unwrap().value, 42);

		assert_eq!(counter.get(), 142);
	}

	#[test]
	fn zero_snapshots_suppressed_when_configured() {
		let counter = Counter::new("c", true, true);
		assert!(counter.collect().is_none());

		counter.set(10);
		assert_eq!(counter.collect().unwrap().value, 10);
		assert!(counter.collect().is_none());
	}

	#[test]
	fn zero_snapshots_emitted_by_default() {
		let counter = Counter::new("c", false, false);
		let snapshot = counter.collect().unwrap();
		assert_eq!(snapshot.value, 0);
	}

	#[test]
	fn attribs_travel_with_snapshots() {
		let counter = Counter::new("c", false, false);
		counter.add_attribute("device", "utun7");

		let snapshot = counter.collect().unwrap();
		assert_eq!(snapshot.attribs.get("device").unwrap(), "utun7");

		let json = serde_json::to_string(&snapshot).unwrap();
		assert!(json.contains("utun7"));
	}

	#[test]
	fn empty_attribs_omitted_from_json() {
		let counter = Counter::new("c", false, false);
		let json = serde_json::to_string(&counter.collect().unwrap()).unwrap();
		assert!(!json.contains("attribs"));
	}
}
