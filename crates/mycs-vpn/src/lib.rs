// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! VPN configuration acquisition and the tunnel lifecycle.
//!
//! A [`VpnService`] yields either a structured wireguard config block or,
//! for spaces that only publish a static config, the coordinates to fetch
//! the rendered INI from the bastion. Either way the result is a
//! [`VpnConfig`] that can bring up a userspace wireguard tunnel, program
//! host routes and DNS reversibly, and feed tunnel byte counters into the
//! metrics pipeline.

pub mod config_data;
pub mod error;
pub mod netctx;
pub mod openvpn;
pub mod service;
pub mod vpn_config;
pub mod wireguard;

pub use config_data::{new_vpn_config_data, ConfigData, StaticConfigData, WireguardConfigData};
pub use error::{Result, VpnError};
pub use netctx::{CommandRunner, NetworkContext, Platform, SystemRunner};
pub use service::{
	InstanceState, ManagedInstance, ServiceConfig, SpaceTarget, TargetStatus, VpnService, VpnType,
};
pub use vpn_config::{VpnClient, VpnConfig};
