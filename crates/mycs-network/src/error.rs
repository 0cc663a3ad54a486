// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpnpError {
	#[error("no routers offering upnp services found")]
	NoGateway,

	#[error("found multiple routes in the network")]
	AmbiguousTopology,

	#[error("port mapper is not connected")]
	NotConnected,

	#[error("gateway returned an invalid response: {0}")]
	BadResponse(String),

	#[error("SOAP fault from gateway: {0}")]
	SoapFault(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("invalid URL: {0}")]
	Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, UpnpError>;
