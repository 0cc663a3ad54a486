// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Typed view over the wireguard userspace IPC device dump.
//!
//! The dump is the key=value format of the cross-platform userspace
//! configuration protocol: device fields first, then one block per peer
//! introduced by its `public_key`, terminated by `errno=` and a blank
//! line.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use ipnet::IpNet;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{MeshError, Result};

#[derive(Debug, Clone, Default)]
pub struct WireguardDevice {
	pub private_key: Option<[u8; 32]>,
	pub public_key: Option<[u8; 32]>,
	pub listen_port: u16,
	pub fwmark: u32,
	pub peers: Vec<WireguardPeer>,
}

#[derive(Debug, Clone)]
pub struct WireguardPeer {
	pub public_key: [u8; 32],
	pub endpoint: Option<SocketAddr>,
	pub last_handshake: Option<DateTime<Utc>>,
	pub rx_bytes: i64,
	pub tx_bytes: i64,
	pub persistent_keepalive: Option<Duration>,
	pub allowed_ips: Vec<IpNet>,
	pub protocol_version: u32,
}

impl WireguardPeer {
	fn new(public_key: [u8; 32]) -> Self {
		Self {
			public_key,
			endpoint: None,
			last_handshake: None,
			rx_bytes: 0,
			tx_bytes: 0,
			persistent_keepalive: None,
			allowed_ips: Vec::new(),
			protocol_version: 0,
		}
	}
}

/// Parses a device and its peers from the IPC dump text.
pub fn parse_wireguard_device(text: &str) -> Result<WireguardDevice> {
	let mut device = WireguardDevice::default();
	let mut handshake_sec: i64 = 0;
	let mut handshake_nsec: i64 = 0;

	for line in text.lines() {
		if line.is_empty() {
			break;
		}
		let Some((key, value)) = line.split_once('=') else {
			return Err(MeshError::InvalidDeviceInfo(format!(
				"invalid key=value pair: \"{line}\""
			)));
		};

		match key {
			"errno" => {
				let errno = parse_int(key, value)?;
				if errno != 0 {
					return Err(MeshError::InvalidDeviceInfo(format!("errno={errno}")));
				}
			}
			"private_key" => device.private_key = Some(parse_key(value)?),
			"listen_port" => device.listen_port = parse_int(key, value)? as u16,
			"fwmark" => device.fwmark = parse_int(key, value)? as u32,
			"public_key" => {
				device.peers.push(WireguardPeer::new(parse_key(value)?));
				handshake_sec = 0;
				handshake_nsec = 0;
			}
			_ => {
				let Some(peer) = device.peers.last_mut() else {
					continue;
				};
				match key {
					"preshared_key" => {}
					"endpoint" => peer.endpoint = value.parse().ok(),
					"last_handshake_time_sec" => handshake_sec = parse_int(key, value)?,
					"last_handshake_time_nsec" => {
						handshake_nsec = parse_int(key, value)?;
						// both zero means no handshake has completed yet
						if handshake_sec > 0 {
							peer.last_handshake = Utc
								.timestamp_opt(handshake_sec, handshake_nsec as u32)
								.single();
						}
					}
					"rx_bytes" => peer.rx_bytes = parse_int(key, value)?,
					"tx_bytes" => peer.tx_bytes = parse_int(key, value)?,
					"persistent_keepalive_interval" => {
						let secs = parse_int(key, value)?;
						if secs > 0 {
							peer.persistent_keepalive = Some(Duration::from_secs(secs as u64));
						}
					}
					"allowed_ip" => {
						let net: IpNet = value.parse().map_err(|e| {
							MeshError::InvalidDeviceInfo(format!(
								"invalid allowed_ip \"{value}\": {e}"
							))
						})?;
						peer.allowed_ips.push(net);
					}
					"protocol_version" => peer.protocol_version = parse_int(key, value)? as u32,
					_ => {}
				}
			}
		}
	}

	if let Some(private_key) = device.private_key {
		let public = PublicKey::from(&StaticSecret::from(private_key));
		device.public_key = Some(*public.as_bytes());
	}
	Ok(device)
}

fn parse_key(value: &str) -> Result<[u8; 32]> {
	if value.len() != 64 {
		return Err(MeshError::InvalidDeviceInfo(format!(
			"key \"{value}\" is not 32 hex bytes"
		)));
	}
	let mut key = [0u8; 32];
	for (i, byte) in key.iter_mut().enumerate() {
		*byte = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16).map_err(|e| {
			MeshError::InvalidDeviceInfo(format!("invalid hex key \"{value}\": {e}"))
		})?;
	}
	Ok(key)
}

fn parse_int(key: &str, value: &str) -> Result<i64> {
	value
		.parse()
		.map_err(|e| MeshError::InvalidDeviceInfo(format!("invalid {key} value \"{value}\": {e}")))
}

/// Renders the human-readable device status, one `interface:` block
/// followed by a `peer:` block per peer.
pub fn status_text(iface_name: &str, device: &WireguardDevice) -> String {
	let mut out = String::new();

	let public_key = device
		.public_key
		.map(|k| BASE64.encode(k))
		.unwrap_or_else(|| "(none)".to_string());
	let _ = write!(
		out,
		"interface: {} (userspace)\n  public key: {}\n  private key: (hidden)\n  listening port: {}\n\n",
		iface_name, public_key, device.listen_port
	);

	for peer in &device.peers {
		let endpoint = peer
			.endpoint
			.map(|e| e.to_string())
			.unwrap_or_else(|| "(none)".to_string());
		let allowed_ips = peer
			.allowed_ips
			.iter()
			.map(|net| net.to_string())
			.collect::<Vec<_>>()
			.join(", ");
		let handshake = peer
			.last_handshake
			.map(|t| t.to_rfc3339())
			.unwrap_or_else(|| "(never)".to_string());
		let _ = write!(
			out,
			"peer: {}\n  endpoint: {}\n  allowed ips: {}\n  latest handshake: {}\n  transfer: {} B received, {} B sent\n\n",
			BASE64.encode(peer.public_key),
			endpoint,
			allowed_ips,
			handshake,
			peer.rx_bytes,
			peer.tx_bytes
		);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_dump() -> String {
		format!(
			"private_key={}
listen_port=51820
public_key={}
endpoint=34.1.2.3:3399
last_handshake_time_sec=1640648486
last_handshake_time_nsec=858000000
tx_bytes=2424
rx_bytes=4242
persistent_keepalive_interval=25
allowed_ip=0.0.0.0/0
protocol_version=1
errno=0

",
			"10".repeat(32),
			"ab".repeat(32)
		)
	}

	#[test]
	fn parses_device_and_peer_fields() {
		let device = parse_wireguard_device(&test_dump()).unwrap();

		assert_eq!(device.listen_port, 51820);
		assert_eq!(device.private_key.unwrap(), [0x10u8; 32]);
		assert!(device.public_key.is_some());
		assert_eq!(device.peers.len(), 1);

		let peer = &device.peers[0];
		assert_eq!(peer.public_key, [0xabu8; 32]);
		assert_eq!(peer.endpoint.unwrap(), "34.1.2.3:3399".parse().unwrap());
		assert_eq!(peer.rx_bytes, 4242);
		assert_eq!(peer.tx_bytes, 2424);
		assert_eq!(peer.persistent_keepalive.unwrap(), Duration::from_secs(25));
		assert_eq!(peer.allowed_ips.len(), 1);
		assert_eq!(peer.protocol_version, 1);
		assert_eq!(
			peer.last_handshake.unwrap().timestamp_millis(),
			1640648486858
		);
	}

	#[test]
	fn zero_handshake_times_mean_no_handshake() {
		let dump = test_dump()
			.replace("last_handshake_time_sec=1640648486", "last_handshake_time_sec=0")
			.replace("last_handshake_time_nsec=858000000", "last_handshake_time_nsec=0");

		let device = parse_wireguard_device(&dump).unwrap();
		assert!(device.peers[0].last_handshake.is_none());
	}

	#[test]
	fn nonzero_errno_is_an_error() {
		let dump = "errno=11\n\n";
		assert!(matches!(
			parse_wireguard_device(dump),
			Err(MeshError::InvalidDeviceInfo(_))
		));
	}

	#[test]
	fn malformed_lines_are_rejected() {
		assert!(parse_wireguard_device("not a pair\n").is_err());
		assert!(parse_wireguard_device("private_key=zz\n").is_err());
	}

	#[test]
	fn renders_status_text() {
		let device = parse_wireguard_device(&test_dump()).unwrap();
		let text = status_text("utun7", &device);

		assert!(text.contains("interface: utun7 (userspace)"));
		assert!(text.contains("private key: (hidden)"));
		assert!(text.contains("listening port: 51820"));
		assert!(text.contains(&format!("peer: {}", BASE64.encode([0xabu8; 32]))));
		assert!(text.contains("endpoint: 34.1.2.3:3399"));
		assert!(text.contains("allowed ips: 0.0.0.0/0"));
		assert!(text.contains("transfer: 4242 B received, 2424 B sent"));
	}
}
