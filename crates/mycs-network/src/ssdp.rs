// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SSDP discovery: multicast M-SEARCH and response header parsing.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::error::Result;

const SSDP_MULTICAST_ADDR: (&str, u16) = ("239.255.255.250", 1900);

#[derive(Debug, Clone)]
pub struct SsdpResponse {
	pub location: String,
}

/// Sends an M-SEARCH for `service_type` and collects responses until
/// `timeout` elapses. Responses are deduplicated by device description
/// location.
pub async fn search(service_type: &str, timeout: Duration) -> Result<Vec<SsdpResponse>> {
	let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;

	let msearch = format!(
		"M-SEARCH * HTTP/1.1\r\n\
		 HOST: 239.255.255.250:1900\r\n\
		 MAN: \"ssdp:discover\"\r\n\
		 MX: 2\r\n\
		 ST: {service_type}\r\n\
		 \r\n"
	);
	socket.send_to(msearch.as_bytes(), SSDP_MULTICAST_ADDR).await?;

	let deadline = Instant::now() + timeout;
	let mut buf = [0u8; 2048];
	let mut seen: HashSet<String> = HashSet::new();
	let mut responses = Vec::new();

	loop {
		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			break;
		}

		match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
			Err(_) => break,
			Ok(Err(e)) => {
				warn!(error = %e, "SSDP receive failed");
				break;
			}
			Ok(Ok((len, from))) => {
				let response = String::from_utf8_lossy(&buf[..len]);
				let Some(location) = header_value(&response, "LOCATION") else {
					continue;
				};
				trace!(%from, location, "SSDP response");
				if seen.insert(location.clone()) {
					responses.push(SsdpResponse { location });
				}
			}
		}
	}
	Ok(responses)
}

/// The local address this host uses to reach `target`, discovered by
/// connecting a throwaway UDP socket.
pub async fn local_addr_to(target: IpAddr) -> Result<IpAddr> {
	let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
	socket.connect((target, SSDP_MULTICAST_ADDR.1)).await?;
	Ok(socket.local_addr()?.ip())
}

/// Case-insensitive header lookup in an SSDP/HTTP-style response.
pub fn header_value(response: &str, header: &str) -> Option<String> {
	response.lines().find_map(|line| {
		let (name, value) = line.split_once(':')?;
		name.trim()
			.eq_ignore_ascii_case(header)
			.then(|| value.trim().to_string())
	})
}
