// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::Result;

/// One gateway device's port-mapping control surface.
///
/// The production implementation speaks SOAP to a discovered IGD; tests
/// substitute a recorder.
#[async_trait]
pub trait UpnpClient: Send + Sync {
	#[allow(clippy::too_many_arguments)]
	async fn add_port_mapping(
		&self,
		remote_host: &str,
		external_port: u16,
		protocol: &str,
		internal_port: u16,
		internal_client: &str,
		enabled: bool,
		description: &str,
		lease_duration_secs: u32,
	) -> Result<()>;

	/// The router's externally visible address.
	async fn external_ip(&self) -> Result<IpAddr>;

	/// The local address this host uses to reach the router.
	fn local_addr(&self) -> IpAddr;
}
