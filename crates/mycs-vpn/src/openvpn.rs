// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OpenVPN is a recognized space VPN type but this client cannot drive
//! it; configs parse and save, client construction fails.

use std::path::Path;

use crate::error::{Result, VpnError};
use crate::vpn_config::VpnClient;

pub struct OpenVpnConfig {
	config_file_name: String,
	config_data: Vec<u8>,
}

impl OpenVpnConfig {
	pub fn new(name: &str, data: &[u8]) -> Self {
		Self {
			config_file_name: format!("{name}.ovpn"),
			config_data: data.to_vec(),
		}
	}

	pub fn config_text(&self) -> String {
		String::from_utf8_lossy(&self.config_data).into_owned()
	}

	pub fn save(&self, path: &Path) -> Result<String> {
		let file_path = path.join(&self.config_file_name);
		std::fs::write(&file_path, &self.config_data)?;
		Ok(format!(
			"The VPN configuration has been downloaded to:\n\n{}",
			file_path.display()
		))
	}

	pub fn new_client(&self) -> Result<Box<dyn VpnClient>> {
		Err(VpnError::UnsupportedVpn("openvpn".to_string()))
	}
}
