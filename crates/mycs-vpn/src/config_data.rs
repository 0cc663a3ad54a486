// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The two VPN parameter acquisition strategies: a structured config block
//! returned by the node, rendered locally into wireguard INI text, or a
//! pre-rendered config downloaded from the bastion's static file endpoint.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, VpnError};
use crate::service::{InstanceState, SpaceTarget, TargetStatus, VpnService, VpnType};

/// Acquired VPN parameters: a named blob of config text plus the type of
/// client that understands it.
#[async_trait]
pub trait ConfigData: Send + Sync {
	fn name(&self) -> &str;

	fn vpn_type(&self) -> VpnType;

	fn data(&self) -> &[u8];

	/// Releases whatever the acquisition created on the node side.
	async fn delete(&self) -> Result<()>;
}

/// Retrieves the VPN configuration for the device from the space node.
pub async fn new_vpn_config_data(service: Arc<dyn VpnService>) -> Result<Box<dyn ConfigData>> {
	let cfg = service.connect().await?;

	if let Some(raw_config) = cfg.raw_config.clone() {
		return match cfg.vpn_type.parse::<VpnType>()? {
			VpnType::Wireguard => Ok(Box::new(WireguardConfigData::new(
				Arc::clone(&service),
				&cfg.name,
				&cfg.private_key,
				raw_config,
			)?)),
			VpnType::OpenVpn => Err(VpnError::UnsupportedVpn(cfg.vpn_type)),
		};
	}

	// no config block returned, so download a static configuration from
	// the bastion instance of the owned target
	let target = service.space_target().ok_or_else(|| {
		VpnError::BadState("cannot connect to a space node that is not an owned target".to_string())
	})?;
	let instance = target.bastion_instance().ok_or_else(|| {
		VpnError::BadState(format!(
			"space target \"{}\" does not have a deployed bastion instance",
			target.key()
		))
	})?;

	let (user, password) = if cfg.is_admin_user {
		(instance.root_user(), instance.root_password())
	} else {
		(instance.non_root_user(), instance.non_root_password())
	};
	let data = StaticConfigData::fetch(target.as_ref(), &user, &password).await?;
	Ok(Box::new(data))
}

/// A structured wireguard config block returned by the node, rendered into
/// canonical INI text with the caller-provided device private key.
pub struct WireguardConfigData {
	service: Arc<dyn VpnService>,
	name: String,
	rendered: Vec<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireguardConfigBlock {
	#[serde(default)]
	client_addr: String,
	#[serde(default)]
	dns: String,
	#[serde(default)]
	peer_endpoint: String,
	#[serde(default)]
	peer_public_key: String,
	#[serde(default)]
	allowed_subnets: Vec<String>,
	#[serde(default)]
	keep_alive_ping: i64,
}

impl WireguardConfigData {
	pub fn new(
		service: Arc<dyn VpnService>,
		name: &str,
		private_key: &str,
		raw_config: serde_json::Value,
	) -> Result<Self> {
		let block: WireguardConfigBlock = serde_json::from_value(raw_config)?;

		let mut text = String::new();
		let _ = writeln!(text, "[Interface]");
		let _ = writeln!(text, "PrivateKey = {private_key}");
		let _ = writeln!(text, "Address = {}/32", block.client_addr);
		if !block.dns.is_empty() {
			let _ = writeln!(text, "DNS = {}", block.dns);
		}
		let _ = writeln!(text);
		let _ = writeln!(text, "[Peer]");
		let _ = writeln!(text, "PublicKey = {}", block.peer_public_key);
		let _ = writeln!(text, "Endpoint = {}", block.peer_endpoint);
		let _ = writeln!(text, "PersistentKeepalive = {}", block.keep_alive_ping);
		if !block.allowed_subnets.is_empty() {
			let _ = writeln!(text, "AllowedIPs = {}", block.allowed_subnets.join(","));
		}

		Ok(Self {
			service,
			name: name.to_string(),
			rendered: text.into_bytes(),
		})
	}
}

#[async_trait]
impl ConfigData for WireguardConfigData {
	fn name(&self) -> &str {
		&self.name
	}

	fn vpn_type(&self) -> VpnType {
		VpnType::Wireguard
	}

	fn data(&self) -> &[u8] {
		&self.rendered
	}

	async fn delete(&self) -> Result<()> {
		self.service.disconnect().await
	}
}

/// A pre-rendered config fetched from the bastion's static file endpoint
/// with basic auth.
pub struct StaticConfigData {
	name: String,
	vpn_type: VpnType,
	data: Vec<u8>,
}

impl StaticConfigData {
	pub async fn fetch(target: &dyn SpaceTarget, user: &str, password: &str) -> Result<Self> {
		if !target.is_bastion() {
			return Err(VpnError::BadState(format!(
				"target \"{}\" is not a bastion node",
				target.key()
			)));
		}
		if target.status() != TargetStatus::Running {
			return Err(VpnError::BadState("target is not running".to_string()));
		}
		let instance = target.bastion_instance().ok_or_else(|| {
			VpnError::BadState("unable to find a bastion instance to connect to".to_string())
		})?;
		if instance.state() != InstanceState::Running {
			return Err(VpnError::BadState(
				"bastion instance is not running".to_string(),
			));
		}

		let name = string_output(target, "cb_vpc_name", "vpc name")?;
		let vpn_type = string_output(target, "cb_vpn_type", "vpn type")?.parse::<VpnType>()?;

		let mut url = instance.https_url();
		url.set_path(&format!("static/~{user}/{name}.conf"));
		debug!(%url, "downloading static vpn config");

		let response = instance
			.http_client()
			.get(url)
			.basic_auth(user, Some(password))
			.send()
			.await?;
		if response.status().as_u16() != 200 {
			return Err(VpnError::ConfigFetch(response.status().as_u16()));
		}
		let data = response.bytes().await?.to_vec();

		Ok(Self {
			name,
			vpn_type,
			data,
		})
	}
}

fn string_output(target: &dyn SpaceTarget, key: &str, what: &str) -> Result<String> {
	let value = target.output(key).ok_or_else(|| {
		VpnError::BadMetadata(format!("the {what} was not present in the sandbox build output"))
	})?;
	value
		.as_str()
		.map(str::to_string)
		.ok_or_else(|| VpnError::BadMetadata(format!("target's \"{key}\" output was not a string")))
}

#[async_trait]
impl ConfigData for StaticConfigData {
	fn name(&self) -> &str {
		&self.name
	}

	fn vpn_type(&self) -> VpnType {
		self.vpn_type
	}

	fn data(&self) -> &[u8] {
		&self.data
	}

	async fn delete(&self) -> Result<()> {
		Ok(())
	}
}
