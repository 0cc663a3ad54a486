// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side session management for a MyCS space node.
//!
//! The [`ApiClient`] keeps a bounded-lifetime symmetric session alive
//! against the node: an ephemeral X25519 exchange wrapped in RSA yields the
//! session cipher, a background timer re-authenticates just before expiry,
//! and outbound API requests are stamped with the session's identity key
//! and an encrypted token binding the request fields.

pub mod api_client;
pub mod auth;
pub mod error;
pub mod events_api;
pub mod node;

pub use api_client::ApiClient;
pub use auth::{AuthReqKey, AuthRequest, AuthRespKey, AuthResponse, ErrorResponse};
pub use error::{NodeError, Result};
pub use events_api::MeasurementEventSender;
pub use node::{NodeStatus, SpaceNode};
