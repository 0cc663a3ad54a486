// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mycs_common_exec::ExecTimer;
use mycs_events::CloudEvent;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::counter::Counter;
use crate::error::{MonitorError, Result};
use crate::payload::{EventPayload, MonitorSnapshot};
use crate::sender::Sender;

const EVENT_SOURCE: &str = "urn:mycs";

/// A named grouping of counters. Created only through
/// [`MonitorService::new_monitor`]; counter-list mutation is serialized by
/// the service's registry lock, which every monitor handle shares.
#[derive(Clone)]
pub struct Monitor {
	name: String,
	service: Arc<ServiceInner>,
}

impl Monitor {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn add_counter(&self, counter: &Counter) {
		let mut registry = self.service.lock_registry();
		if let Some(entry) = registry.monitors.iter_mut().find(|m| m.name == self.name) {
			entry.counters.push(counter.clone());
		}
	}

	pub fn delete_counter(&self, counter: &Counter) {
		let mut registry = self.service.lock_registry();
		if let Some(entry) = registry.monitors.iter_mut().find(|m| m.name == self.name) {
			entry.counters.retain(|c| !c.same_counter(counter));
		}
	}
}

/// The metric collection pipeline.
///
/// Every `collect_interval` the service snapshots all registered counters
/// into at most one [`EventPayload`]; every `send_interval` collections the
/// pending payloads are detached and posted through the injected
/// [`Sender`] as cloud events.
pub struct MonitorService {
	inner: Arc<ServiceInner>,
}

struct ServiceInner {
	sender: Arc<dyn Sender>,
	collect_interval: Duration,
	send_interval: usize,
	registry: Mutex<Registry>,
	uploads: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
	timer: tokio::sync::Mutex<Option<ExecTimer>>,
}

struct Registry {
	monitors: Vec<MonitorEntry>,
	send_countdown: usize,
	event_payloads: Vec<EventPayload>,
}

struct MonitorEntry {
	name: String,
	counters: Vec<Counter>,
}

impl MonitorService {
	/// Creates a pipeline posting through `sender` every `send_interval`
	/// seconds and collecting counters every `collect_interval_ms`
	/// milliseconds.
	pub fn new(
		sender: Arc<dyn Sender>,
		send_interval: usize,
		collect_interval_ms: u64,
	) -> Result<Self> {
		if send_interval == 0 {
			return Err(MonitorError::BadConfig(
				"'send_interval' in seconds must be greater than zero".to_string(),
			));
		}
		if collect_interval_ms > send_interval as u64 * 1000 {
			return Err(MonitorError::BadConfig(
				"'collect_interval' in milliseconds should be less than or equal to 'send_interval' in seconds"
					.to_string(),
			));
		}

		Ok(Self {
			inner: Arc::new(ServiceInner {
				sender,
				collect_interval: Duration::from_millis(collect_interval_ms),
				send_interval: send_interval - 1,
				registry: Mutex::new(Registry {
					monitors: Vec::new(),
					send_countdown: send_interval - 1,
					// one payload per collect tick of a send window
					event_payloads: Vec::with_capacity(send_interval),
				}),
				uploads: tokio::sync::Mutex::new(Vec::new()),
				timer: tokio::sync::Mutex::new(None),
			}),
		})
	}

	pub fn new_monitor(&self, name: &str) -> Monitor {
		let mut registry = self.inner.lock_registry();
		registry.monitors.push(MonitorEntry {
			name: name.to_string(),
			counters: Vec::new(),
		});
		Monitor {
			name: name.to_string(),
			service: Arc::clone(&self.inner),
		}
	}

	/// Starts the periodic collection tick.
	pub async fn start(&self) {
		let inner = Arc::clone(&self.inner);
		let timer = ExecTimer::start(self.inner.collect_interval, move |_| {
			let inner = Arc::clone(&inner);
			async move {
				let next = inner.collect_interval;
				ServiceInner::collect_tick(&inner).await;
				Ok(Some(next))
			}
		});
		*self.inner.timer.lock().await = Some(timer);
	}

	/// Stops the tick, drains in-flight uploads, then performs one final
	/// collect and posts it synchronously. On return no pipeline work is
	/// outstanding.
	pub async fn stop(&self) {
		if let Some(timer) = self.inner.timer.lock().await.take() {
			if let Some(e) = timer.stop().await {
				debug!(error = %e, "snapshot timer stopped with error");
			}
		}

		self.inner.await_uploads().await;

		let payloads = {
			let mut registry = self.inner.lock_registry();
			registry.collect_events();
			std::mem::take(&mut registry.event_payloads)
		};
		if !payloads.is_empty() {
			ServiceInner::post_events(&self.inner, payloads).await;
		}

		self.inner.await_uploads().await;
	}
}

impl ServiceInner {
	fn lock_registry(&self) -> MutexGuard<'_, Registry> {
		self.registry
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	async fn await_uploads(&self) {
		let handles: Vec<_> = self.uploads.lock().await.drain(..).collect();
		for handle in handles {
			let _ = handle.await;
		}
	}

	async fn collect_tick(inner: &Arc<ServiceInner>) {
		let batch = {
			let mut registry = inner.lock_registry();
			registry.collect_events();

			if registry.send_countdown == 0 {
				registry.send_countdown = inner.send_interval;
				Some(std::mem::take(&mut registry.event_payloads))
			} else {
				registry.send_countdown -= 1;
				None
			}
		};

		if let Some(payloads) = batch {
			if !payloads.is_empty() {
				let upload = Arc::clone(inner);
				let handle = tokio::spawn(async move {
					ServiceInner::post_events(&upload, payloads).await;
				});
				inner.uploads.lock().await.push(handle);
			}
		}
	}

	async fn post_events(inner: &Arc<ServiceInner>, payloads: Vec<EventPayload>) {
		let mut events = Vec::with_capacity(payloads.len());
		let mut queued = Vec::with_capacity(payloads.len());

		for payload in payloads {
			match serde_json::to_value(&payload) {
				Ok(data) => {
					events.push(CloudEvent::new_network_metric(EVENT_SOURCE, data));
					queued.push(payload);
				}
				Err(e) => {
					error!(error = %e, "unable to attach monitor payload to cloud event");
				}
			}
		}
		if events.is_empty() {
			return;
		}

		match inner.sender.post_measurement_events(events).await {
			Err(e) => {
				error!(
					error = %e,
					"unable to post measurement events; will attempt to re-post in next cycle"
				);
				inner.requeue(queued);
			}
			Ok(event_errors) if !event_errors.is_empty() => {
				let mut repost = Vec::with_capacity(event_errors.len());
				for event_error in event_errors {
					error!(
						event_id = %event_error.event.id,
						error = %event_error.error,
						"event failed to post"
					);
					match serde_json::from_value::<EventPayload>(event_error.event.data.clone()) {
						Ok(payload) => repost.push(payload),
						Err(e) => {
							error!(
								event_id = %event_error.event.id,
								error = %e,
								"unable to decode data of failed event to queue for reposting"
							);
						}
					}
				}
				inner.requeue(repost);
			}
			Ok(_) => {
				debug!(count = queued.len(), "posted measurement events");
			}
		}
	}

	/// Puts payloads back at the head of the pending queue so they keep
	/// temporal priority over newly collected ones.
	fn requeue(&self, mut payloads: Vec<EventPayload>) {
		if payloads.is_empty() {
			return;
		}
		let mut registry = self.lock_registry();
		payloads.extend(registry.event_payloads.drain(..));
		registry.event_payloads = payloads;
	}
}

impl Registry {
	fn collect_events(&mut self) {
		let mut add_payload = false;
		let mut payload = EventPayload {
			monitors: Vec::new(),
		};

		for entry in &self.monitors {
			if entry.counters.is_empty() {
				continue;
			}
			let mut snapshot = MonitorSnapshot {
				name: entry.name.clone(),
				counters: Vec::new(),
			};
			for counter in &entry.counters {
				if let Some(counter_snapshot) = counter.collect() {
					snapshot.counters.push(counter_snapshot);
					add_payload = true;
				}
			}
			payload.monitors.push(snapshot);
		}

		if add_payload {
			self.event_payloads.push(payload);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use mycs_events::CloudEventError;
	use std::sync::atomic::{AtomicI64, Ordering};
	use uuid::Uuid;

	#[derive(Default)]
	struct SenderState {
		iteration: usize,
		num_events: usize,
		value_total: i64,
		batch_sizes: Vec<usize>,
	}

	/// Fails the first post outright and rejects the second event of the
	/// second post, mirroring the repost scenarios the node can produce.
	struct TestSender {
		state: Mutex<SenderState>,
	}

	impl TestSender {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				state: Mutex::new(SenderState::default()),
			})
		}

		fn snapshot(&self) -> (usize, i64, Vec<usize>) {
			let state = self.state.lock().unwrap();
			(state.num_events, state.value_total, state.batch_sizes.clone())
		}
	}

	struct OkSender;

	#[async_trait]
	impl crate::Sender for OkSender {
		async fn post_measurement_events(
			&self,
			_events: Vec<CloudEvent>,
		) -> std::result::Result<Vec<CloudEventError>, crate::SendError> {
			Ok(Vec::new())
		}
	}

	fn payload_value_sum(event: &CloudEvent) -> i64 {
		let payload: EventPayload = serde_json::from_value(event.data.clone()).unwrap();
		payload
			.monitors
			.iter()
			.flat_map(|m| m.counters.iter())
			.map(|c| c.value)
			.sum()
	}

	#[async_trait]
	impl crate::Sender for TestSender {
		async fn post_measurement_events(
			&self,
			events: Vec<CloudEvent>,
		) -> std::result::Result<Vec<CloudEventError>, crate::SendError> {
			let mut state = self.state.lock().unwrap();
			state.iteration += 1;
			state.batch_sizes.push(events.len());

			if state.iteration == 1 {
				// first iteration fails the entire post; payloads repost
				return Err(crate::SendError("failing post".to_string()));
			}

			let mut errors = Vec::new();
			for (i, event) in events.iter().enumerate() {
				if state.iteration == 2 && i == 1 {
					errors.push(CloudEventError {
						event: event.clone(),
						error: format!("{} failed to post", event.id),
					});
					continue;
				}

				assert!(Uuid::parse_str(&event.id).is_ok());
				assert_eq!(event.event_type, "io.appbricks.mycs.network.metric");
				assert_eq!(event.subject, "Application Monitor Snapshot");
				assert_eq!(event.datacontenttype, "application/json");

				state.num_events += 1;
				state.value_total += payload_value_sum(event);
			}
			Ok(errors)
		}
	}

	fn spawn_increments(
		counter: Counter,
		interval_ms: u64,
		total: Arc<AtomicI64>,
	) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut t = 0u64;
			while t < 15_500 {
				tokio::time::sleep(Duration::from_millis(interval_ms)).await;
				counter.inc();
				total.fetch_add(1, Ordering::SeqCst);
				t += interval_ms;
			}
		})
	}

	#[tokio::test(start_paused = true)]
	async fn collects_and_reposts_incrementing_counter() {
		let sender = TestSender::new();
		let service = MonitorService::new(sender.clone(), 5, 1000).unwrap();

		let monitor = service.new_monitor("testMonitor");
		let counter = Counter::new("testCounter", false, false);
		monitor.add_counter(&counter);

		service.start().await;

		let total = Arc::new(AtomicI64::new(0));
		let tasks: Vec<_> = [100u64, 200, 500]
			.into_iter()
			.map(|interval| spawn_increments(counter.clone(), interval, Arc::clone(&total)))
			.collect();
		for task in tasks {
			task.await.unwrap();
		}

		service.stop().await;

		let (num_events, value_total, batch_sizes) = sender.snapshot();
		assert_eq!(num_events, 16);
		assert_eq!(value_total, total.load(Ordering::SeqCst));
		// full-batch repost makes the second batch twice the send window;
		// the rejected event leads the third batch
		assert_eq!(batch_sizes, vec![5, 10, 6, 1]);
	}

	#[tokio::test(start_paused = true)]
	async fn collects_cumulative_counter_totals() {
		let sender = TestSender::new();
		let service = MonitorService::new(sender.clone(), 5, 1000).unwrap();

		let monitor = service.new_monitor("testMonitor");
		let counter = Counter::new("testCounter", true, false);
		monitor.add_counter(&counter);

		service.start().await;

		let total = Arc::new(AtomicI64::new(0));
		let tasks: Vec<_> = [100u64, 200, 500]
			.into_iter()
			.map(|interval| {
				let counter = counter.clone();
				let total = Arc::clone(&total);
				tokio::spawn(async move {
					let mut t = 0u64;
					while t < 15_500 {
						tokio::time::sleep(Duration::from_millis(interval)).await;
						let step = 1 + rand::random::<u8>() as i64 % 4;
						counter.set(total.fetch_add(step, Ordering::SeqCst) + step);
						t += interval;
					}
				})
			})
			.collect();
		for task in tasks {
			task.await.unwrap();
		}

		service.stop().await;

		let final_total = total.load(Ordering::SeqCst);
		let (num_events, value_total, _) = sender.snapshot();
		assert_eq!(counter.get(), final_total);
		assert_eq!(num_events, 16);
		assert_eq!(value_total, final_total);
	}

	#[tokio::test(start_paused = true)]
	async fn stop_leaves_no_pending_state() {
		let service = MonitorService::new(Arc::new(OkSender), 5, 1000).unwrap();

		let monitor = service.new_monitor("m");
		let counter = Counter::new("c", false, false);
		monitor.add_counter(&counter);

		service.start().await;
		counter.add(3);
		tokio::time::sleep(Duration::from_millis(1500)).await;
		service.stop().await;

		let registry = service.inner.lock_registry();
		assert!(registry.event_payloads.is_empty());
		drop(registry);
		assert!(service.inner.uploads.try_lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn rejects_collect_interval_longer_than_send_interval() {
		assert!(MonitorService::new(Arc::new(OkSender), 5, 5001).is_err());
		assert!(MonitorService::new(Arc::new(OkSender), 0, 100).is_err());
		assert!(MonitorService::new(Arc::new(OkSender), 5, 5000).is_ok());
	}

	#[tokio::test(start_paused = true)]
	async fn counters_can_be_detached() {
		let sender = TestSender::new();
		let service = MonitorService::new(sender.clone(), 5, 1000).unwrap();

		let monitor = service.new_monitor("m");
		let counter = Counter::new("c", false, true);
		monitor.add_counter(&counter);
		monitor.delete_counter(&counter);

		counter.add(42);
		service.start().await;
		tokio::time::sleep(Duration::from_millis(6500)).await;
		service.stop().await;

		// nothing attached, so nothing was ever collected or posted
		let (num_events, _, batch_sizes) = sender.snapshot();
		assert_eq!(num_events, 0);
		assert!(batch_sizes.is_empty());
	}
}
