// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
	#[error("invalid monitor configuration: {0}")]
	BadConfig(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
