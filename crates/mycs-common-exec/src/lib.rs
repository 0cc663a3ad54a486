// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cancellable periodic task execution.
//!
//! An [`ExecTimer`] drives a recurring task on the tokio runtime. The task
//! decides its own cadence: every invocation returns the delay until the
//! next one, `None` to finish, or an error to stop the timer with that
//! error latched for [`ExecTimer::stop`] to report.

pub mod timer;

pub use timer::{ExecTimer, Shutdown, TaskError};
