// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The userspace wireguard tunnel: config parsing, the packet engine, the
//! IPC control listener and the connect/disconnect lifecycle.

pub mod client;
pub mod config;
pub mod engine;
pub mod keys;
pub mod uapi;

pub use client::WireguardClient;
pub use config::{WgDeviceConfig, WgPeerConfig, WireguardConfig};
pub use engine::WgTunnelEngine;
pub use keys::WgKey;
pub use uapi::{DeviceSnapshot, PeerSnapshot, WgCtrlService};
