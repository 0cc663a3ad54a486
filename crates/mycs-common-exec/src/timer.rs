// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

/// Error returned by a timer task. Tasks belong to different subsystems, so
/// the timer is not generic over their error types.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cancellation signal handed to every task invocation. Cloneable so the
/// task can pass it into futures it spawns.
#[derive(Clone)]
pub struct Shutdown {
	rx: watch::Receiver<bool>,
}

impl Shutdown {
	/// Returns true once the owning timer has been stopped.
	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolves when the owning timer is stopped. Resolves immediately if it
	/// already was.
	pub async fn cancelled(&mut self) {
		while !*self.rx.borrow() {
			if self.rx.changed().await.is_err() {
				break;
			}
		}
	}
}

/// A recurring background task.
///
/// The task function receives a [`Shutdown`] signal and returns the delay
/// until its next invocation. Returning `Ok(None)` ends the timer normally;
/// returning an error ends it with the error latched for [`ExecTimer::stop`].
pub struct ExecTimer {
	shutdown_tx: watch::Sender<bool>,
	handle: Mutex<Option<JoinHandle<Option<TaskError>>>>,
}

impl ExecTimer {
	/// Schedules `task` to first run after `initial_delay`. A zero delay
	/// means the first invocation happens immediately.
	pub fn start<F, Fut>(initial_delay: Duration, mut task: F) -> Self
	where
		F: FnMut(Shutdown) -> Fut + Send + 'static,
		Fut: Future<Output = Result<Option<Duration>, TaskError>> + Send,
	{
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let signal = Shutdown { rx: shutdown_rx };

		let handle = tokio::spawn(async move {
			let mut delay = initial_delay;
			loop {
				let mut cancel = signal.clone();
				tokio::select! {
					biased;

					_ = cancel.cancelled() => {
						return None;
					}

					_ = tokio::time::sleep(delay) => {}
				}

				match task(signal.clone()).await {
					Ok(Some(next)) => delay = next,
					Ok(None) => return None,
					Err(e) => {
						warn!(error = %e, "timer task stopped with error");
						return Some(e);
					}
				}
			}
		});

		Self {
			shutdown_tx,
			handle: Mutex::new(Some(handle)),
		}
	}

	/// Cancels the timer and waits for the task to wind down. An invocation
	/// already in flight runs to completion first. Safe to call more than
	/// once; returns the task's terminal error, if any, on the call that
	/// reaps it.
	pub async fn stop(&self) -> Option<TaskError> {
		let _ = self.shutdown_tx.send(true);

		let handle = self.handle.lock().await.take();
		match handle {
			Some(handle) => match handle.await {
				Ok(err) => err,
				Err(e) => Some(Box::new(e)),
			},
			None => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[tokio::test(start_paused = true)]
	async fn runs_on_schedule_until_stopped() {
		let runs = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&runs);

		let timer = ExecTimer::start(Duration::from_millis(100), move |_| {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok(Some(Duration::from_millis(100)))
			}
		});

		tokio::time::sleep(Duration::from_millis(550)).await;
		let err = timer.stop().await;

		assert!(err.is_none());
		assert_eq!(runs.load(Ordering::SeqCst), 5);
	}

	#[tokio::test(start_paused = true)]
	async fn zero_initial_delay_runs_immediately() {
		let runs = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&runs);

		let timer = ExecTimer::start(Duration::ZERO, move |_| {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok(Some(Duration::from_secs(3600)))
			}
		});

		tokio::time::sleep(Duration::from_millis(1)).await;
		assert_eq!(runs.load(Ordering::SeqCst), 1);

		timer.stop().await;
	}

	#[tokio::test(start_paused = true)]
	async fn task_can_finish_itself() {
		let runs = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&runs);

		let timer = ExecTimer::start(Duration::from_millis(10), move |_| {
			let counter = Arc::clone(&counter);
			async move {
				if counter.fetch_add(1, Ordering::SeqCst) == 2 {
					Ok(None)
				} else {
					Ok(Some(Duration::from_millis(10)))
				}
			}
		});

		tokio::time::sleep(Duration::from_millis(200)).await;
		let err = timer.stop().await;

		assert!(err.is_none());
		assert_eq!(runs.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn stop_reports_task_error() {
		let timer = ExecTimer::start(Duration::from_millis(10), move |_| async move {
			Err::<Option<Duration>, TaskError>("boom".into())
		});

		tokio::time::sleep(Duration::from_millis(50)).await;
		let err = timer.stop().await;

		assert_eq!(err.unwrap().to_string(), "boom");
	}

	#[tokio::test(start_paused = true)]
	async fn stop_is_idempotent() {
		let timer = ExecTimer::start(Duration::from_millis(10), move |_| async move {
			Ok(Some(Duration::from_millis(10)))
		});

		assert!(timer.stop().await.is_none());
		assert!(timer.stop().await.is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn shutdown_is_observable_inside_task() {
		let saw_cancel = Arc::new(AtomicUsize::new(0));
		let observer = Arc::clone(&saw_cancel);

		let timer = ExecTimer::start(Duration::ZERO, move |shutdown| {
			let observer = Arc::clone(&observer);
			async move {
				let mut shutdown = shutdown;
				shutdown.cancelled().await;
				observer.fetch_add(1, Ordering::SeqCst);
				Ok(None)
			}
		});

		tokio::time::sleep(Duration::from_millis(10)).await;
		timer.stop().await;

		assert_eq!(saw_cancel.load(Ordering::SeqCst), 1);
	}
}
