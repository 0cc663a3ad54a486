// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Line-oriented parser for the canonical wireguard INI text, plus saving
//! the config for import into other clients.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use ipnet::IpNet;
use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};
use tokio::net::lookup_host;

use crate::error::{Result, VpnError};
use crate::wireguard::keys::WgKey;

/// Parameters handed to the packet engine.
#[derive(Clone, Debug)]
pub struct WgDeviceConfig {
	pub private_key: WgKey,
	pub peers: Vec<WgPeerConfig>,
}

#[derive(Clone, Debug)]
pub struct WgPeerConfig {
	pub public_key: WgKey,
	pub allowed_ips: Vec<IpNet>,
	pub endpoint: SocketAddr,
	pub persistent_keepalive: Option<u16>,
}

/// A parsed wireguard client configuration.
#[derive(Clone, Debug)]
pub struct WireguardConfig {
	config_file_name: String,
	config_data: Vec<u8>,

	pub(crate) tun_address: String,
	pub(crate) tun_dns: String,

	// resolved peer endpoint addresses, for host-route installation
	pub(crate) peer_addresses: Vec<IpAddr>,
	pub(crate) is_default_route: bool,

	pub(crate) device_config: WgDeviceConfig,
}

#[derive(Default)]
struct PendingPeer {
	public_key: Option<WgKey>,
	allowed_ips: Vec<IpNet>,
	endpoint: Option<SocketAddr>,
	persistent_keepalive: Option<u16>,
}

#[derive(PartialEq)]
enum Section {
	None,
	Interface,
	Peer,
}

impl WireguardConfig {
	/// Parses the INI text of a named config, resolving peer endpoints.
	pub async fn parse(name: &str, data: &[u8]) -> Result<Self> {
		let text = std::str::from_utf8(data)
			.map_err(|_| VpnError::BadConfig("config text is not valid UTF-8".to_string()))?;

		let mut private_key: Option<WgKey> = None;
		let mut tun_address = String::new();
		let mut tun_dns = String::new();
		let mut peer_addresses: Vec<IpAddr> = Vec::new();
		let mut is_default_route = false;
		let mut peers: Vec<WgPeerConfig> = Vec::new();

		let mut section = Section::None;
		let mut interface_sections = 0usize;
		let mut pending = PendingPeer::default();

		for line in text.lines() {
			if let Some(section_name) = parse_section(line) {
				if section == Section::Peer {
					peers.push(pending.build()?);
					pending = PendingPeer::default();
				}
				section = match section_name {
					"Interface" => {
						interface_sections += 1;
						Section::Interface
					}
					"Peer" => Section::Peer,
					_ => Section::None,
				};
				continue;
			}

			let Some((key, value)) = parse_attrib(line) else {
				continue;
			};

			match section {
				Section::Interface => match key {
					"PrivateKey" => private_key = Some(WgKey::from_base64(value)?),
					"Address" => tun_address = value.to_string(),
					"DNS" => tun_dns = value.to_string(),
					_ => {
						return Err(VpnError::BadConfig(format!(
							"wireguard config key '{key}' within the 'Interface' section is not supported"
						)));
					}
				},
				Section::Peer => match key {
					"PublicKey" => pending.public_key = Some(WgKey::from_base64(value)?),
					"AllowedIPs" => {
						for ip in value.split(',') {
							let ip = ip.trim();
							if !is_default_route && ip == "0.0.0.0/0" {
								// all traffic without a more specific route
								// goes through this tunnel
								is_default_route = true;
							}
							let net: IpNet = ip.parse().map_err(|e| {
								VpnError::BadConfig(format!("invalid allowed IP \"{ip}\": {e}"))
							})?;
							pending.allowed_ips.push(net);
						}
					}
					"Endpoint" => {
						let endpoint = resolve_endpoint(value).await?;
						peer_addresses.push(endpoint.ip());
						pending.endpoint = Some(endpoint);
					}
					"PersistentKeepalive" => {
						let secs: u16 = value.parse().map_err(|e| {
							VpnError::BadConfig(format!("invalid keepalive \"{value}\": {e}"))
						})?;
						pending.persistent_keepalive = Some(secs);
					}
					_ => {
						return Err(VpnError::BadConfig(format!(
							"wireguard config key '{key}' within the 'Peer' section is not supported"
						)));
					}
				},
				Section::None => {}
			}
		}
		if section == Section::Peer {
			peers.push(pending.build()?);
		}

		if interface_sections != 1 {
			return Err(VpnError::BadConfig(
				"exactly one [Interface] section is required".to_string(),
			));
		}
		let private_key = private_key.ok_or_else(|| {
			VpnError::BadConfig("the [Interface] section is missing a PrivateKey".to_string())
		})?;
		if tun_address.is_empty() {
			return Err(VpnError::BadConfig(
				"the [Interface] section is missing an Address".to_string(),
			));
		}
		if peers.is_empty() {
			return Err(VpnError::BadConfig(
				"at least one [Peer] section is required".to_string(),
			));
		}

		Ok(Self {
			config_file_name: format!("{name}.conf"),
			config_data: data.to_vec(),
			tun_address,
			tun_dns,
			peer_addresses,
			is_default_route,
			device_config: WgDeviceConfig { private_key, peers },
		})
	}

	pub fn config_text(&self) -> String {
		String::from_utf8_lossy(&self.config_data).into_owned()
	}

	pub fn file_name(&self) -> &str {
		&self.config_file_name
	}

	pub fn is_default_route(&self) -> bool {
		self.is_default_route
	}

	pub fn peer_addresses(&self) -> &[IpAddr] {
		&self.peer_addresses
	}

	/// Writes the config under `path` and renders a QR code of the text
	/// for import on a mobile client. Returns the user-facing
	/// instructions.
	pub fn save(&self, path: &Path) -> Result<String> {
		let file_path = path.join(&self.config_file_name);
		std::fs::write(&file_path, &self.config_data)?;

		let qr_code = QrCode::with_error_correction_level(&self.config_data, EcLevel::L)
			.map_err(|e| VpnError::Qr(e.to_string()))?;
		let rendered = qr_code
			.render::<unicode::Dense1x2>()
			.quiet_zone(false)
			.build();

		Ok(format!(
			r#"The VPN configuration has been downloaded to the file shown below.
You need import it to the wireguard vpn client via the option "Import
Tunnels from file...".

{}

Scan the following QR code with the mobile client to configure the
VPN on you mobile device.

{}"#,
			file_path.display(),
			rendered
		))
	}
}

impl PendingPeer {
	fn build(self) -> Result<WgPeerConfig> {
		let public_key = self.public_key.ok_or_else(|| {
			VpnError::BadConfig("a [Peer] section is missing a PublicKey".to_string())
		})?;
		let endpoint = self.endpoint.ok_or_else(|| {
			VpnError::BadConfig("a [Peer] section is missing an Endpoint".to_string())
		})?;
		Ok(WgPeerConfig {
			public_key,
			allowed_ips: self.allowed_ips,
			endpoint,
			persistent_keepalive: self.persistent_keepalive,
		})
	}
}

fn parse_section(line: &str) -> Option<&str> {
	let trimmed = line.trim();
	trimmed.strip_prefix('[')?.strip_suffix(']')
}

/// Splits a `Key = value` line. The key must start at the first column and
/// consist of alphanumerics, `-` or `_`; anything else (comments, blank
/// lines) is skipped by the caller.
fn parse_attrib(line: &str) -> Option<(&str, &str)> {
	let eq = line.find('=')?;
	let key = line[..eq].trim_end();
	if key.is_empty()
		|| !key
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
	{
		return None;
	}
	Some((key, line[eq + 1..].trim()))
}

async fn resolve_endpoint(value: &str) -> Result<SocketAddr> {
	let addrs = lookup_host(value)
		.await
		.map_err(|e| VpnError::BadConfig(format!("unable to resolve peer endpoint \"{value}\": {e}")))?;

	let mut first: Option<SocketAddr> = None;
	for addr in addrs {
		if addr.is_ipv4() {
			return Ok(addr);
		}
		first.get_or_insert(addr);
	}
	first.ok_or_else(|| {
		VpnError::BadConfig(format!("peer endpoint \"{value}\" did not resolve to any address"))
	})
}
