// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mycs_common_crypto::{Crypt, EcdhKey, RsaKey, RsaPublicKey};
use mycs_common_exec::ExecTimer;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::auth::{AuthReqKey, AuthRequest, AuthRespKey, AuthResponse, ErrorResponse};
use crate::error::{NodeError, Result};
use crate::node::{NodeStatus, SpaceNode};

const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_AUTH_RETRY_TIME: Duration = Duration::from_secs(2);

// Refresh this long before the session would expire.
const KEY_REFRESH_GUARD_MS: i64 = 50;

const AUTH_KEY_HEADER: &str = "X-Auth-Key";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// An authenticated session client for a space node.
///
/// Cheap to clone; all clones share the same session state.
#[derive(Clone)]
pub struct ApiClient {
	inner: Arc<ClientInner>,
}

struct ClientInner {
	// auth reference name, validated against the node's response
	ref_name: String,
	// auth reference id carried inside the wrapped request key
	ref_id: String,
	// opaque client identity blob sent as authReqIDKey
	client_id_key: String,

	client_rsa_key: RsaKey,
	node_public_key: RsaPublicKey,

	node: Arc<dyn SpaceNode>,
	auth_path: String,
	http: reqwest::Client,

	// serializes session refresh against session readers
	session: tokio::sync::Mutex<Option<Session>>,

	auth_timeout: Duration,
	auth_retry_time: Duration,

	timer: tokio::sync::Mutex<Option<ExecTimer>>,
}

struct Session {
	crypt: Crypt,
	auth_id_key: String,
	timeout_at: i64,
}

impl Session {
	fn is_valid(&self) -> bool {
		now_ms() < self.timeout_at
	}
}

/// Token bound to declared request fields, encrypted with the session
/// cipher into the `X-Auth-Token` header.
#[derive(Debug, Serialize, Deserialize)]
struct RequestAuthToken {
	token: String,
	timestamp: i64,
	fields: BTreeMap<String, String>,
}

fn now_ms() -> i64 {
	Utc::now().timestamp_millis()
}

fn env_duration_ms(var: &str) -> Option<Duration> {
	std::env::var(var)
		.ok()
		.and_then(|v| v.parse::<u64>().ok())
		.map(Duration::from_millis)
}

impl ApiClient {
	/// Creates a client for `node`. The auth timeout and retry backoff can
	/// be overridden with the `CBS_NODE_AUTH_TIMEOUT` and
	/// `CBS_NODE_AUTH_RETRY_TIMEOUT` environment variables (milliseconds),
	/// read once here.
	pub fn new(
		ref_name: &str,
		ref_id: &str,
		client_id_key: &str,
		client_rsa_key_pem: &str,
		node: Arc<dyn SpaceNode>,
		auth_path: &str,
	) -> Result<Self> {
		let node_public_key = RsaPublicKey::from_pem(node.public_key_pem())?;
		let client_rsa_key = RsaKey::from_pem(client_rsa_key_pem)?;
		let http = node.http_client();

		Ok(Self {
			inner: Arc::new(ClientInner {
				ref_name: ref_name.to_string(),
				ref_id: ref_id.to_string(),
				client_id_key: client_id_key.to_string(),
				client_rsa_key,
				node_public_key,
				node,
				auth_path: auth_path.to_string(),
				http,
				session: tokio::sync::Mutex::new(None),
				auth_timeout: env_duration_ms("CBS_NODE_AUTH_TIMEOUT")
					.unwrap_or(DEFAULT_AUTH_TIMEOUT),
				auth_retry_time: env_duration_ms("CBS_NODE_AUTH_RETRY_TIMEOUT")
					.unwrap_or(DEFAULT_AUTH_RETRY_TIME),
				timer: tokio::sync::Mutex::new(None),
			}),
		})
	}

	pub fn is_running(&self) -> bool {
		self.inner.node.status() == NodeStatus::Running
	}

	pub fn node(&self) -> &Arc<dyn SpaceNode> {
		&self.inner.node
	}

	/// Ensures a valid session with the node, performing the key exchange
	/// if the current one is missing or expired. Holds the session lock
	/// for the whole operation.
	pub async fn authenticate(&self) -> Result<()> {
		let mut session = self.inner.session.lock().await;
		if session.as_ref().is_some_and(Session::is_valid) {
			return Ok(());
		}
		*session = None;

		let ecdh_key = EcdhKey::generate();
		let nonce = now_ms();
		let auth_req_key = AuthReqKey {
			ref_id: self.inner.ref_id.clone(),
			ecdh_key: ecdh_key.public_key(),
			nonce,
		};
		debug!(nonce, "created auth request key");

		let auth_req_key_json = serde_json::to_vec(&auth_req_key)?;
		let request = AuthRequest {
			auth_req_id_key: self.inner.client_id_key.clone(),
			auth_req_key: self.inner.node_public_key.encrypt_base64(&auth_req_key_json)?,
		};

		let url = self.inner.node.api_url().join(&self.inner.auth_path)?;
		let response = self.inner.http.post(url).json(&request).send().await?;

		if !response.status().is_success() {
			let status = response.status().as_u16();
			let body = response.text().await.unwrap_or_default();
			let message = serde_json::from_str::<ErrorResponse>(&body)
				.ok()
				.filter(|e| !e.error_message.is_empty())
				.map(|e| e.error_message)
				.unwrap_or(body);
			return Err(NodeError::AuthHttp { status, message });
		}

		let auth_response: AuthResponse = response.json().await?;
		let auth_resp_key_json = self
			.inner
			.client_rsa_key
			.decrypt_base64(&auth_response.auth_resp_key)?;
		let auth_resp_key: AuthRespKey = serde_json::from_slice(&auth_resp_key_json)?;
		debug!(nonce = auth_resp_key.nonce, "received auth response key");

		if auth_resp_key.ref_name != self.inner.ref_name || auth_resp_key.nonce != nonce {
			return Err(NodeError::AuthMismatch);
		}

		let shared_secret = ecdh_key.shared_secret(&auth_resp_key.node_ecdh_key)?;
		*session = Some(Session {
			crypt: Crypt::new(shared_secret.as_slice())?,
			auth_id_key: auth_response.auth_resp_id_key,
			timeout_at: auth_resp_key.timeout_at,
		});
		Ok(())
	}

	/// Starts the background refresh loop: re-authenticates just before
	/// each session expires, backing off on failures.
	pub async fn start(&self) {
		let client = self.clone();
		let retry_time = self.inner.auth_retry_time;

		let timer = ExecTimer::start(Duration::ZERO, move |_| {
			let client = client.clone();
			async move {
				match client.authenticate().await {
					Ok(()) => {
						let timeout_at = client
							.inner
							.session
							.lock()
							.await
							.as_ref()
							.map(|s| s.timeout_at)
							.unwrap_or(0);
						let delay_ms = (timeout_at - now_ms() - KEY_REFRESH_GUARD_MS).max(0);
						Ok(Some(Duration::from_millis(delay_ms as u64)))
					}
					Err(e) => {
						debug!(error = %e, "authentication failed");
						Ok(Some(retry_time))
					}
				}
			}
		});
		*self.inner.timer.lock().await = Some(timer);
	}

	pub async fn stop(&self) {
		if let Some(timer) = self.inner.timer.lock().await.take() {
			if let Some(e) = timer.stop().await {
				debug!(error = %e, "auth refresh timer stopped with error");
			}
		}
	}

	pub async fn is_authenticated(&self) -> bool {
		self.inner
			.session
			.lock()
			.await
			.as_ref()
			.is_some_and(Session::is_valid)
	}

	/// The opaque session identity key sent in the `X-Auth-Key` header,
	/// while a session is live.
	pub async fn auth_id_key(&self) -> Option<String> {
		self.inner
			.session
			.lock()
			.await
			.as_ref()
			.filter(|s| s.is_valid())
			.map(|s| s.auth_id_key.clone())
	}

	/// Stamps `request` with the session identity key and an encrypted
	/// token binding the request URL and identity key. Fails when no live
	/// session exists.
	pub async fn set_authorized(&self, request: &mut reqwest::Request) -> Result<()> {
		let session = self.inner.session.lock().await;
		let session = session
			.as_ref()
			.filter(|s| s.is_valid())
			.ok_or(NodeError::NotAuthenticated)?;

		request
			.headers_mut()
			.insert(AUTH_KEY_HEADER, HeaderValue::from_str(&session.auth_id_key)?);

		let mut fields = BTreeMap::new();
		fields.insert("url".to_string(), request.url().to_string());
		fields.insert(AUTH_KEY_HEADER.to_string(), session.auth_id_key.clone());
		let token = RequestAuthToken {
			token: Uuid::new_v4().to_string(),
			timestamp: now_ms(),
			fields,
		};

		let encrypted_token = session.crypt.encrypt_b64(&serde_json::to_string(&token)?)?;
		request
			.headers_mut()
			.insert(AUTH_TOKEN_HEADER, HeaderValue::from_str(&encrypted_token)?);
		Ok(())
	}

	/// Polls for a live session until it appears, the process is
	/// interrupted, or the auth timeout elapses.
	pub async fn wait_for_auth(&self) -> bool {
		if self.is_authenticated().await {
			return true;
		}

		let deadline = Instant::now() + self.inner.auth_timeout;
		let mut ticker = tokio::time::interval(Duration::from_millis(10));

		loop {
			tokio::select! {
				_ = tokio::signal::ctrl_c() => {
					return false;
				}
				_ = ticker.tick() => {
					if self.is_authenticated().await {
						return true;
					}
					if Instant::now() >= deadline {
						trace!("timed out waiting for successful authentication with the node");
						return false;
					}
				}
			}
		}
	}
}
