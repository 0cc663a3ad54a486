// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
	Running,
	Stopped,
	Unknown,
}

/// Capability surface of a space node as seen by this client.
///
/// Implementations come from the hosting application (an owned cloud
/// target, a shared node, ...) and are injected at client construction.
pub trait SpaceNode: Send + Sync {
	fn name(&self) -> &str;

	fn status(&self) -> NodeStatus;

	/// The node's RSA public key in PEM form.
	fn public_key_pem(&self) -> &str;

	/// Base URL of the node's REST API.
	fn api_url(&self) -> &Url;

	/// An HTTP client trusted to reach the node (carries any private CA
	/// the node's certificate chains to).
	fn http_client(&self) -> reqwest::Client;
}
