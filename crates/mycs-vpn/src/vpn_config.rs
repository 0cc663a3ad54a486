// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::Path;

use async_trait::async_trait;
use mycs_monitors::MonitorService;

use crate::config_data::ConfigData;
use crate::error::Result;
use crate::openvpn::OpenVpnConfig;
use crate::service::VpnType;
use crate::wireguard::{WireguardClient, WireguardConfig};

/// A connected VPN client.
#[async_trait]
pub trait VpnClient: Send + Sync {
	async fn connect(&mut self) -> Result<()>;

	async fn disconnect(&mut self) -> Result<()>;

	/// Bytes received and sent through the tunnel, plus the last counter
	/// sampling error if any.
	fn bytes_transmitted(&self) -> (i64, i64, Option<String>);
}

/// A parsed VPN client configuration, dispatched on the node-declared
/// type.
pub enum VpnConfig {
	Wireguard(WireguardConfig),
	OpenVpn(OpenVpnConfig),
}

impl VpnConfig {
	pub async fn from_config_data(data: &dyn ConfigData) -> Result<Self> {
		match data.vpn_type() {
			VpnType::Wireguard => Ok(Self::Wireguard(
				WireguardConfig::parse(data.name(), data.data()).await?,
			)),
			VpnType::OpenVpn => Ok(Self::OpenVpn(OpenVpnConfig::new(data.name(), data.data()))),
		}
	}

	pub fn config_text(&self) -> String {
		match self {
			Self::Wireguard(config) => config.config_text(),
			Self::OpenVpn(config) => config.config_text(),
		}
	}

	/// Writes the config under `path` for import elsewhere and returns
	/// user-facing instructions.
	pub fn save(&self, path: &Path) -> Result<String> {
		match self {
			Self::Wireguard(config) => config.save(path),
			Self::OpenVpn(config) => config.save(path),
		}
	}

	/// Builds the client for this config. Tunnel byte counters register
	/// with `monitor_service` when one is provided.
	pub fn new_client(
		&self,
		monitor_service: Option<&MonitorService>,
	) -> Result<Box<dyn VpnClient>> {
		match self {
			Self::Wireguard(config) => Ok(Box::new(WireguardClient::new(
				config.clone(),
				monitor_service,
			))),
			Self::OpenVpn(config) => config.new_client(),
		}
	}
}
