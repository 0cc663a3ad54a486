// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types of the node authentication handshake.

use serde::{Deserialize, Serialize};

/// The auth POST body. `auth_req_key` is an [`AuthReqKey`] JSON blob
/// wrapped with the node's RSA public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
	#[serde(rename = "authReqIDKey")]
	pub auth_req_id_key: String,
	#[serde(rename = "authReqKey")]
	pub auth_req_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthReqKey {
	#[serde(rename = "refID")]
	pub ref_id: String,
	#[serde(rename = "ecdhKey")]
	pub ecdh_key: String,
	pub nonce: i64,
}

/// The auth response body. `auth_resp_key` is an [`AuthRespKey`] JSON blob
/// wrapped with the client's RSA public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
	#[serde(rename = "authRespIDKey")]
	pub auth_resp_id_key: String,
	#[serde(rename = "authRespKey")]
	pub auth_resp_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRespKey {
	#[serde(rename = "nodeECDHKey")]
	pub node_ecdh_key: String,
	pub nonce: i64,
	#[serde(rename = "timeoutAt")]
	pub timeout_at: i64,
	#[serde(rename = "refName")]
	pub ref_name: String,
}

/// Error body returned by the node on a failed auth request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
	#[serde(rename = "errorCode", default)]
	pub error_code: i32,
	#[serde(rename = "errorMessage", default)]
	pub error_message: String,
}
