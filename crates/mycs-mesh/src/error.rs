// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
	#[error("wireguard not initialized")]
	NoDevice,

	#[error("invalid device info: {0}")]
	InvalidDeviceInfo(String),

	#[error("mesh engine error: {0}")]
	Engine(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MeshError>;
