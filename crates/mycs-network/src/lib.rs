// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! UPnP port mapping against the network's Internet Gateway Device.
//!
//! Discovery queries the three IGD connection variants in parallel and
//! demands a single consistent external address before any mapping is
//! made. Persistent mappings are leased slightly longer than the refresh
//! interval and re-issued on a timer, so a mapping outlives the gateway's
//! lease table only while the client is alive to renew it.

pub mod client;
pub mod error;
pub mod igd;
pub mod port_mapper;
pub mod ssdp;

pub use client::UpnpClient;
pub use error::{Result, UpnpError};
pub use igd::IgdClient;
pub use port_mapper::{PortMapper, Protocol};
