// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parsers for the platform tool output the network context relies on.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::{Result, VpnError};

/// Extracts a field like `gateway: 192.168.1.1` from `route -n get
/// default` output.
pub fn route_get_field(output: &str, field: &str) -> Option<String> {
	output.lines().find_map(|line| {
		let (key, value) = line.trim().split_once(':')?;
		(key.trim() == field).then(|| value.trim().to_string())
	})
}

/// Extracts the gateway from `ip route show default` output
/// (`default via 192.168.1.1 dev eth0 ...`).
pub fn ip_route_default_gateway(output: &str) -> Option<String> {
	let mut words = output.split_whitespace();
	while let Some(word) = words.next() {
		if word == "via" {
			return words.next().map(str::to_string);
		}
	}
	None
}

/// Finds the network service owning `device` in `networksetup
/// -listnetworkserviceorder` output, e.g.
///
/// ```text
/// (1) Wi-Fi
/// (Hardware Port: Wi-Fi, Device: en0)
/// ```
pub fn service_for_device(output: &str, device: &str) -> Option<String> {
	let mut current_service: Option<String> = None;
	for line in output.lines() {
		let line = line.trim();
		if let Some(rest) = line.strip_prefix('(') {
			if let Some((index, name)) = rest.split_once(')') {
				if index.chars().all(|c| c.is_ascii_digit()) {
					current_service = Some(name.trim().to_string());
					continue;
				}
			}
		}
		if line.starts_with("(Hardware Port:") && line.contains(&format!("Device: {device})")) {
			return current_service;
		}
	}
	None
}

/// The next free `<base><n>` interface name given the interfaces that
/// already exist.
pub fn next_available_interface(base: &str, existing: &[String]) -> String {
	let mut n = 0u32;
	loop {
		let candidate = format!("{base}{n}");
		if !existing.iter().any(|name| *name == candidate) {
			return candidate;
		}
		n += 1;
	}
}

/// The gateway address used as next-hop when the tunnel becomes the
/// default route: the first host of the tunnel CIDR, or the address
/// itself for a point-to-point /32.
pub fn tunnel_gateway(cidr: &str) -> Result<Ipv4Addr> {
	let net = parse_tunnel_cidr(cidr)?;
	if net.prefix_len() == 32 {
		return Ok(net.addr());
	}
	Ok(Ipv4Addr::from(u32::from(net.network()) + 1))
}

/// Parses a tunnel address that may or may not carry a prefix; a bare
/// address is treated as /32.
pub fn parse_tunnel_cidr(cidr: &str) -> Result<Ipv4Net> {
	if cidr.contains('/') {
		cidr.parse::<Ipv4Net>()
			.map_err(|e| VpnError::BadConfig(format!("invalid tunnel address \"{cidr}\": {e}")))
	} else {
		let addr: Ipv4Addr = cidr
			.parse()
			.map_err(|e| VpnError::BadConfig(format!("invalid tunnel address \"{cidr}\": {e}")))?;
		Ok(Ipv4Net::new(addr, 32).expect("/32 prefix is always valid"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const ROUTE_GET_OUTPUT: &str = "   route to: default
destination: default
       mask: default
    gateway: 192.168.1.1
  interface: en0
      flags: <UP,GATEWAY,DONE,STATIC,PRCLONING>
";

	const SERVICE_ORDER_OUTPUT: &str = "An asterisk (*) denotes that a network service is disabled.
(1) USB 10/100/1000 LAN
(Hardware Port: USB 10/100/1000 LAN, Device: en7)

(2) Wi-Fi
(Hardware Port: Wi-Fi, Device: en0)

(3) Thunderbolt Bridge
(Hardware Port: Thunderbolt Bridge, Device: bridge0)
";

	#[test]
	fn parses_route_get_fields() {
		assert_eq!(
			route_get_field(ROUTE_GET_OUTPUT, "gateway").unwrap(),
			"192.168.1.1"
		);
		assert_eq!(route_get_field(ROUTE_GET_OUTPUT, "interface").unwrap(), "en0");
		assert!(route_get_field(ROUTE_GET_OUTPUT, "missing").is_none());
	}

	#[test]
	fn parses_ip_route_default() {
		assert_eq!(
			ip_route_default_gateway("default via 10.0.0.1 dev eth0 proto dhcp metric 100")
				.unwrap(),
			"10.0.0.1"
		);
		assert!(ip_route_default_gateway("").is_none());
	}

	#[test]
	fn finds_service_owning_device() {
		assert_eq!(
			service_for_device(SERVICE_ORDER_OUTPUT, "en0").unwrap(),
			"Wi-Fi"
		);
		assert_eq!(
			service_for_device(SERVICE_ORDER_OUTPUT, "en7").unwrap(),
			"USB 10/100/1000 LAN"
		);
		assert!(service_for_device(SERVICE_ORDER_OUTPUT, "en9").is_none());
	}

	#[test]
	fn picks_first_free_interface_name() {
		let existing = vec![
			"utun0".to_string(),
			"utun1".to_string(),
			"utun3".to_string(),
		];
		assert_eq!(next_available_interface("utun", &existing), "utun2");
		assert_eq!(next_available_interface("wg", &existing), "wg0");
	}

	#[test]
	fn tunnel_gateway_is_first_host() {
		assert_eq!(
			tunnel_gateway("192.168.111.0/24").unwrap(),
			"192.168.111.1".parse::<Ipv4Addr>().unwrap()
		);
		assert_eq!(
			tunnel_gateway("10.0.5.7/16").unwrap(),
			"10.0.0.1".parse::<Ipv4Addr>().unwrap()
		);
	}

	#[test]
	fn tunnel_gateway_of_point_to_point_is_itself() {
		assert_eq!(
			tunnel_gateway("192.168.111.2/32").unwrap(),
			"192.168.111.2".parse::<Ipv4Addr>().unwrap()
		);
		assert_eq!(
			tunnel_gateway("192.168.111.2").unwrap(),
			"192.168.111.2".parse::<Ipv4Addr>().unwrap()
		);
	}

	#[test]
	fn rejects_invalid_tunnel_address() {
		assert!(tunnel_gateway("not-an-address").is_err());
		assert!(tunnel_gateway("10.0.0.1/40").is_err());
	}
}
