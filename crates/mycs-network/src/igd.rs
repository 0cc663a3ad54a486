// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SOAP client for a discovered Internet Gateway Device.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};
use url::Url;

use crate::client::UpnpClient;
use crate::error::{Result, UpnpError};
use crate::ssdp;

pub const WAN_IP_CONNECTION_1: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";
pub const WAN_IP_CONNECTION_2: &str = "urn:schemas-upnp-org:service:WANIPConnection:2";
pub const WAN_PPP_CONNECTION_1: &str = "urn:schemas-upnp-org:service:WANPPPConnection:1";

const DESCRIPTION_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IgdClient {
	service_type: String,
	control_url: Url,
	http: reqwest::Client,
	local_addr: IpAddr,
}

impl IgdClient {
	/// Discovers all gateways in the network offering `service_type`.
	pub async fn discover(service_type: &str, timeout: Duration) -> Result<Vec<IgdClient>> {
		let responses = ssdp::search(service_type, timeout).await?;

		let mut clients = Vec::with_capacity(responses.len());
		for response in responses {
			match Self::from_location(service_type, &response.location).await {
				Ok(client) => clients.push(client),
				Err(e) => {
					warn!(
						location = %response.location,
						error = %e,
						"ignoring gateway with unusable description"
					);
				}
			}
		}
		Ok(clients)
	}

	async fn from_location(service_type: &str, location: &str) -> Result<Self> {
		let location: Url = location.parse()?;
		let http = reqwest::Client::builder()
			.timeout(DESCRIPTION_TIMEOUT)
			.build()?;

		let description = http.get(location.clone()).send().await?.text().await?;
		let control_path = find_control_url(&description, service_type).ok_or_else(|| {
			UpnpError::BadResponse(format!(
				"device description has no control URL for {service_type}"
			))
		})?;
		let control_url = location.join(&control_path)?;

		let gateway_ip: IpAddr = location
			.host_str()
			.and_then(|h| h.parse().ok())
			.ok_or_else(|| {
				UpnpError::BadResponse("device description location has no host address".to_string())
			})?;
		let local_addr = ssdp::local_addr_to(gateway_ip).await?;

		debug!(%control_url, %local_addr, "discovered IGD control endpoint");
		Ok(Self {
			service_type: service_type.to_string(),
			control_url,
			http,
			local_addr,
		})
	}

	async fn soap_request(&self, action: &str, arguments: &str) -> Result<String> {
		let envelope = format!(
			r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service}">{arguments}</u:{action}></s:Body></s:Envelope>"#,
			action = action,
			service = self.service_type,
			arguments = arguments,
		);

		let response = self
			.http
			.post(self.control_url.clone())
			.header(
				"SOAPAction",
				format!("\"{}#{}\"", self.service_type, action),
			)
			.header(CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
			.body(envelope)
			.send()
			.await?;

		let status = response.status();
		let body = response.text().await?;
		if !status.is_success() {
			let fault = element_text(&body, "errorDescription")
				.or_else(|| element_text(&body, "faultstring"))
				.unwrap_or_else(|| status.to_string());
			return Err(UpnpError::SoapFault(fault));
		}
		Ok(body)
	}
}

#[async_trait]
impl UpnpClient for IgdClient {
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
	) -> Result<()> {
		let arguments = format!(
			"<NewRemoteHost>{remote_host}</NewRemoteHost>\
			 <NewExternalPort>{external_port}</NewExternalPort>\
			 <NewProtocol>{protocol}</NewProtocol>\
			 <NewInternalPort>{internal_port}</NewInternalPort>\
			 <NewInternalClient>{internal_client}</NewInternalClient>\
			 <NewEnabled>{}</NewEnabled>\
			 <NewPortMappingDescription>{description}</NewPortMappingDescription>\
			 <NewLeaseDuration>{lease_duration_secs}</NewLeaseDuration>",
			if enabled { 1 } else { 0 },
		);
		self.soap_request("AddPortMapping", &arguments).await?;
		Ok(())
	}

	async fn external_ip(&self) -> Result<IpAddr> {
		let body = self.soap_request("GetExternalIPAddress", "").await?;
		let address = element_text(&body, "NewExternalIPAddress").ok_or_else(|| {
			UpnpError::BadResponse("response carries no NewExternalIPAddress".to_string())
		})?;
		address
			.parse()
			.map_err(|_| UpnpError::BadResponse(format!("invalid external address \"{address}\"")))
	}

	fn local_addr(&self) -> IpAddr {
		self.local_addr
	}
}

/// Finds the `controlURL` of the service matching `service_type` in a
/// device description document.
pub(crate) fn find_control_url(xml: &str, service_type: &str) -> Option<String> {
	let mut reader = Reader::from_str(xml);
	reader.config_mut().trim_text(true);

	let mut current_element = String::new();
	let mut in_matching_service = false;

	loop {
		match reader.read_event() {
			Ok(Event::Start(start)) => {
				current_element = String::from_utf8_lossy(start.name().as_ref()).into_owned();
			}
			Ok(Event::Text(text)) => {
				let value = text.unescape().ok()?.into_owned();
				if current_element == "serviceType" {
					in_matching_service = value == service_type;
				} else if current_element == "controlURL" && in_matching_service {
					return Some(value);
				}
			}
			Ok(Event::Eof) => return None,
			Err(_) => return None,
			_ => {}
		}
	}
}

/// Text content of the first `element` in an XML document.
pub(crate) fn element_text(xml: &str, element: &str) -> Option<String> {
	let mut reader = Reader::from_str(xml);
	reader.config_mut().trim_text(true);

	let mut current_element = String::new();
	loop {
		match reader.read_event() {
			Ok(Event::Start(start)) => {
				current_element = String::from_utf8_lossy(start.name().as_ref()).into_owned();
			}
			Ok(Event::Text(text)) => {
				if current_element == element {
					return text.unescape().ok().map(|v| v.into_owned());
				}
			}
			Ok(Event::Eof) => return None,
			Err(_) => return None,
			_ => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const DEVICE_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
        <controlURL>/ctl/L3F</controlURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
        <controlURL>/ctl/IPConn</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

	#[test]
	fn finds_control_url_of_requested_service() {
		assert_eq!(
			find_control_url(DEVICE_DESCRIPTION, WAN_IP_CONNECTION_1).unwrap(),
			"/ctl/IPConn"
		);
		assert!(find_control_url(DEVICE_DESCRIPTION, WAN_PPP_CONNECTION_1).is_none());
	}

	#[test]
	fn extracts_soap_response_values() {
		let response = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetExternalIPAddressResponse xmlns:u="urn:schemas-upnp-org:service:WANIPConnection:1">
      <NewExternalIPAddress>203.0.113.7</NewExternalIPAddress>
    </u:GetExternalIPAddressResponse>
  </s:Body>
</s:Envelope>"#;

		assert_eq!(
			element_text(response, "NewExternalIPAddress").unwrap(),
			"203.0.113.7"
		);
		assert!(element_text(response, "NewInternalClient").is_none());
	}
}
