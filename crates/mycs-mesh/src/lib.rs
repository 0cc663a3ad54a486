// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The embedded mesh overlay daemon, seen from the client runtime.
//!
//! The daemon itself is an opaque engine behind the [`MeshEngine`]
//! capability: peer status, disco pings, and the wireguard device dump of
//! its tunnel. This crate adds the periodic peer reachability prober and a
//! typed view over the device dump.

pub mod device;
pub mod engine;
pub mod error;
pub mod prober;

pub use device::{parse_wireguard_device, status_text, WireguardDevice, WireguardPeer};
pub use engine::{MeshEngine, MeshPeer, PingReport};
pub use error::{MeshError, Result};
pub use prober::MeshStatusProber;
