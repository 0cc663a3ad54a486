// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capability traits for the collaborators that hand this crate its VPN
//! parameters: the node-facing service and the owned cloud target hosting
//! the bastion.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::{Result, VpnError};

/// What the node returned when the service connected the device to the
/// space: either a structured config block (`raw_config`) or nothing, in
/// which case a static config is fetched from the bastion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
	#[serde(skip)]
	pub private_key: String,
	#[serde(skip)]
	pub public_key: String,
	#[serde(skip)]
	pub is_admin_user: bool,

	#[serde(default)]
	pub name: String,
	#[serde(rename = "vpnType", default)]
	pub vpn_type: String,
	#[serde(rename = "config", default)]
	pub raw_config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpnType {
	Wireguard,
	OpenVpn,
}

impl FromStr for VpnType {
	type Err = VpnError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"wireguard" => Ok(VpnType::Wireguard),
			"openvpn" => Ok(VpnType::OpenVpn),
			other => Err(VpnError::UnsupportedVpn(other.to_string())),
		}
	}
}

impl std::fmt::Display for VpnType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			VpnType::Wireguard => write!(f, "wireguard"),
			VpnType::OpenVpn => write!(f, "openvpn"),
		}
	}
}

/// The space-connection service this client acquires VPN parameters
/// through.
#[async_trait]
pub trait VpnService: Send + Sync {
	async fn connect(&self) -> Result<ServiceConfig>;

	async fn disconnect(&self) -> Result<()>;

	/// The owned target backing this space, when the space is one the
	/// user deployed themselves. Static config download is only possible
	/// against an owned target.
	fn space_target(&self) -> Option<Arc<dyn SpaceTarget>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
	Running,
	Stopped,
	Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
	Running,
	Stopped,
	Unknown,
}

/// An owned cloud deployment of a space: sandbox build metadata plus the
/// managed instances it created.
pub trait SpaceTarget: Send + Sync {
	fn key(&self) -> String;

	fn is_bastion(&self) -> bool;

	fn status(&self) -> TargetStatus;

	fn bastion_instance(&self) -> Option<Arc<dyn ManagedInstance>>;

	/// A named value from the target's sandbox build output.
	fn output(&self, name: &str) -> Option<serde_json::Value>;
}

/// A managed cloud instance belonging to a target.
pub trait ManagedInstance: Send + Sync {
	fn state(&self) -> InstanceState;

	/// Base HTTPS URL of the instance's management endpoint.
	fn https_url(&self) -> Url;

	/// Client trusted to call that endpoint (carries the instance CA).
	fn http_client(&self) -> reqwest::Client;

	fn root_user(&self) -> String;
	fn root_password(&self) -> String;
	fn non_root_user(&self) -> String;
	fn non_root_password(&self) -> String;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vpn_type_parses_known_values() {
		assert_eq!("wireguard".parse::<VpnType>().unwrap(), VpnType::Wireguard);
		assert_eq!("openvpn".parse::<VpnType>().unwrap(), VpnType::OpenVpn);
		assert!(matches!(
			"ipsec".parse::<VpnType>(),
			Err(VpnError::UnsupportedVpn(t)) if t == "ipsec"
		));
	}

	#[test]
	fn service_config_decodes_node_response() {
		let cfg: ServiceConfig = serde_json::from_str(
			r#"{"name":"mycs-test","vpnType":"wireguard","config":{"client_addr":"192.168.111.2"}}"#,
		)
		.unwrap();
		assert_eq!(cfg.name, "mycs-test");
		assert_eq!(cfg.vpn_type, "wireguard");
		assert!(cfg.raw_config.is_some());
	}
}
