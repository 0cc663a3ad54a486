// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A peer of this device in the mesh overlay.
#[derive(Debug, Clone)]
pub struct MeshPeer {
	pub name: String,
	/// The peer's resolvable mesh DNS name.
	pub dns_name: String,
	pub online: bool,
}

/// Outcome of a successful disco ping.
#[derive(Debug, Clone)]
pub struct PingReport {
	pub latency: Duration,
	/// The endpoint that answered, as reported by the engine.
	pub endpoint: String,
}

/// Capability surface of the embedded mesh daemon.
#[async_trait]
pub trait MeshEngine: Send + Sync {
	/// Current peers of this device and their reported liveness.
	async fn peer_status(&self) -> Result<Vec<MeshPeer>>;

	/// Sends a discovery-layer ping to a peer address.
	async fn disco_ping(&self, addr: IpAddr) -> Result<PingReport>;

	/// The raw key=value dump of the daemon's wireguard device.
	async fn wireguard_device_info(&self) -> Result<String>;
}
