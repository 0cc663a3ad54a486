// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mycs_common_exec::ExecTimer;
use tokio::join;
use tracing::{debug, error, info};

use crate::client::UpnpClient;
use crate::error::{Result, UpnpError};
use crate::igd::{IgdClient, WAN_IP_CONNECTION_1, WAN_IP_CONNECTION_2, WAN_PPP_CONNECTION_1};

// Persistent leases outlive the refresh interval by this much, so a
// missed refresh does not drop the mapping immediately.
const LEASE_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	Tcp,
	Udp,
}

impl std::fmt::Display for Protocol {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Protocol::Tcp => write!(f, "TCP"),
			Protocol::Udp => write!(f, "UDP"),
		}
	}
}

/// Maintains leased port mappings on the network's gateway.
#[derive(Clone)]
pub struct PortMapper {
	inner: Arc<MapperInner>,
}

struct MapperInner {
	refresh_interval: Duration,
	mapping_lease: Duration,
	state: Mutex<MapperState>,
	timer: tokio::sync::Mutex<Option<ExecTimer>>,
}

#[derive(Default)]
struct MapperState {
	client: Option<Arc<dyn UpnpClient>>,
	external_addr: Option<IpAddr>,
	local_addr: Option<IpAddr>,
	persistent: Vec<PersistentMapping>,
}

#[derive(Clone)]
struct PersistentMapping {
	description: String,
	protocol: Protocol,
	external_port: u16,
	forward_port: u16,
	forward_addr: IpAddr,
}

impl PortMapper {
	pub fn new(refresh_interval: Duration) -> Self {
		Self {
			inner: Arc::new(MapperInner {
				refresh_interval,
				mapping_lease: refresh_interval + LEASE_GRACE,
				state: Mutex::new(MapperState::default()),
				timer: tokio::sync::Mutex::new(None),
			}),
		}
	}

	/// Discovers the gateway and starts the refresh loop. The three IGD
	/// connection variants are queried in parallel; the first variant
	/// with any gateways wins, and all of that variant's gateways must
	/// agree on the external address.
	pub async fn connect(&self, timeout: Duration) -> Result<()> {
		let (ip1, ip2, ppp1) = join!(
			IgdClient::discover(WAN_IP_CONNECTION_1, timeout),
			IgdClient::discover(WAN_IP_CONNECTION_2, timeout),
			IgdClient::discover(WAN_PPP_CONNECTION_1, timeout),
		);

		let variants = [ip1, ip2, ppp1].map(|result| {
			result.unwrap_or_else(|e| {
				debug!(error = %e, "IGD variant discovery failed");
				Vec::new()
			})
		});
		let clients = variants
			.into_iter()
			.find(|clients| !clients.is_empty())
			.unwrap_or_default()
			.into_iter()
			.map(|client| Arc::new(client) as Arc<dyn UpnpClient>)
			.collect();

		self.connect_with_clients(clients).await
	}

	async fn connect_with_clients(&self, clients: Vec<Arc<dyn UpnpClient>>) -> Result<()> {
		let Some(first) = clients.first() else {
			return Err(UpnpError::NoGateway);
		};

		let external_addr = first.external_ip().await?;
		for other in &clients[1..] {
			// a mapping is only meaningful behind a single NAT boundary
			if let Ok(addr) = other.external_ip().await {
				if addr != external_addr {
					return Err(UpnpError::AmbiguousTopology);
				}
			}
		}

		let client = Arc::clone(first);
		let local_addr = client.local_addr();
		{
			let mut state = self.inner.lock_state();
			state.client = Some(client);
			state.external_addr = Some(external_addr);
			state.local_addr = Some(local_addr);
		}
		info!(%external_addr, %local_addr, "connected to upnp gateway");

		self.start_refresh_timer().await;
		Ok(())
	}

	/// Stops the refresh loop. Mappings already issued expire with their
	/// leases.
	pub async fn close(&self) {
		if let Some(timer) = self.inner.timer.lock().await.take() {
			if let Some(e) = timer.stop().await {
				error!(error = %e, "port refresh timer stopped with error");
			}
		}
	}

	pub fn external_ip(&self) -> Option<IpAddr> {
		self.inner.lock_state().external_addr
	}

	pub fn local_ip(&self) -> Option<IpAddr> {
		self.inner.lock_state().local_addr
	}

	/// Issues a single mapping with an explicit lease.
	pub async fn add_port_mapping(
		&self,
		description: &str,
		protocol: Protocol,
		external_port: u16,
		forward_port: u16,
		forward_addr: IpAddr,
		lease: Duration,
	) -> Result<()> {
		let client = self
			.inner
			.lock_state()
			.client
			.clone()
			.ok_or(UpnpError::NotConnected)?;
		client
			.add_port_mapping(
				"",
				external_port,
				&protocol.to_string(),
				forward_port,
				&forward_addr.to_string(),
				true,
				description,
				lease.as_secs() as u32,
			)
			.await
	}

	pub async fn add_port_mapping_to_self(
		&self,
		description: &str,
		protocol: Protocol,
		external_port: u16,
		forward_port: u16,
		lease: Duration,
	) -> Result<()> {
		let forward_addr = self.self_addr()?;
		self.add_port_mapping(
			description,
			protocol,
			external_port,
			forward_port,
			forward_addr,
			lease,
		)
		.await
	}

	/// Issues a mapping leased past the refresh interval and records it
	/// for periodic re-issue.
	pub async fn add_persistent_port_mapping(
		&self,
		description: &str,
		protocol: Protocol,
		external_port: u16,
		forward_port: u16,
		forward_addr: IpAddr,
	) -> Result<()> {
		self.add_port_mapping(
			description,
			protocol,
			external_port,
			forward_port,
			forward_addr,
			self.inner.mapping_lease,
		)
		.await?;

		self.inner.lock_state().persistent.push(PersistentMapping {
			description: description.to_string(),
			protocol,
			external_port,
			forward_port,
			forward_addr,
		});
		Ok(())
	}

	pub async fn add_persistent_port_mapping_to_self(
		&self,
		description: &str,
		protocol: Protocol,
		external_port: u16,
		forward_port: u16,
	) -> Result<()> {
		let forward_addr = self.self_addr()?;
		self.add_persistent_port_mapping(
			description,
			protocol,
			external_port,
			forward_port,
			forward_addr,
		)
		.await
	}

	fn self_addr(&self) -> Result<IpAddr> {
		self.inner
			.lock_state()
			.local_addr
			.ok_or(UpnpError::NotConnected)
	}

	async fn start_refresh_timer(&self) {
		let inner = Arc::clone(&self.inner);
		let timer = ExecTimer::start(Duration::ZERO, move |_| {
			let inner = Arc::clone(&inner);
			async move {
				inner.refresh_mappings().await;
				Ok(Some(inner.refresh_interval))
			}
		});
		*self.inner.timer.lock().await = Some(timer);
	}
}

impl MapperInner {
	fn lock_state(&self) -> MutexGuard<'_, MapperState> {
		self.state
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	async fn refresh_mappings(&self) {
		let (client, mappings) = {
			let state = self.lock_state();
			(state.client.clone(), state.persistent.clone())
		};
		let Some(client) = client else {
			return;
		};

		for mapping in mappings {
			if let Err(e) = client
				.add_port_mapping(
					"",
					mapping.external_port,
					&mapping.protocol.to_string(),
					mapping.forward_port,
					&mapping.forward_addr.to_string(),
					true,
					&mapping.description,
					self.mapping_lease.as_secs() as u32,
				)
				.await
			{
				error!(
					description = %mapping.description,
					external_port = mapping.external_port,
					error = %e,
					"failed to refresh port mapping"
				);
			}
		}
	}
}
