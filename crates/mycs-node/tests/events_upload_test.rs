// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end test of the measurement-event uploader against a mock node:
//! session establishment, signed upload, per-event rejection mapping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use mycs_common_crypto::{EcdhKey, RsaKey, RsaPublicKey};
use mycs_events::{decode_publish_data_input, CloudEvent, PublishDataInput, PublishEventResult};
use mycs_monitors::Sender;
use mycs_node::{
	ApiClient, AuthReqKey, AuthRequest, AuthRespKey, AuthResponse, MeasurementEventSender,
	NodeStatus, SpaceNode,
};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use url::Url;

const REF_NAME: &str = "Test Device";
const REF_ID: &str = "7a4ae0c0-a25f-4376-9816-b45df8da5e88";
const CLIENT_ID_KEY: &str = "b1f187f2-1019-4848-ae7c-4db0cec1f256";
const DEVICE_ID: &str = "676741a9-0608-4633-b293-05e49bea6504";

struct TestKeys {
	node_private_pem: String,
	node_public_pem: String,
	client_private_pem: String,
	client_public_pem: String,
}

fn test_keys() -> &'static TestKeys {
	static KEYS: OnceLock<TestKeys> = OnceLock::new();
	KEYS.get_or_init(|| {
		let mut rng = rand::thread_rng();
		let node = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
		let client = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
		TestKeys {
			node_private_pem: node.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
			node_public_pem: node
				.to_public_key()
				.to_public_key_pem(LineEnding::LF)
				.unwrap(),
			client_private_pem: client.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
			client_public_pem: client
				.to_public_key()
				.to_public_key_pem(LineEnding::LF)
				.unwrap(),
		}
	})
}

struct MockNodeState {
	node_key: RsaKey,
	client_public_key: RsaPublicKey,
	received_events: Mutex<Vec<CloudEvent>>,
	upload_count: AtomicUsize,
}

async fn handle_auth(
	State(state): State<Arc<MockNodeState>>,
	Json(request): Json<AuthRequest>,
) -> Json<AuthResponse> {
	let auth_req_key_json = state.node_key.decrypt_base64(&request.auth_req_key).unwrap();
	let auth_req_key: AuthReqKey = serde_json::from_slice(&auth_req_key_json).unwrap();

	let node_ecdh = EcdhKey::generate();
	let _shared_secret = node_ecdh.shared_secret(&auth_req_key.ecdh_key).unwrap();

	let auth_resp_key = AuthRespKey {
		node_ecdh_key: node_ecdh.public_key(),
		nonce: auth_req_key.nonce,
		timeout_at: auth_req_key.nonce + 60_000,
		ref_name: REF_NAME.to_string(),
	};
	let auth_resp_key_json = serde_json::to_vec(&auth_resp_key).unwrap();

	Json(AuthResponse {
		auth_resp_id_key: "mock-auth-id-key".to_string(),
		auth_resp_key: state
			.client_public_key
			.encrypt_base64(&auth_resp_key_json)
			.unwrap(),
	})
}

async fn handle_events(
	State(state): State<Arc<MockNodeState>>,
	headers: HeaderMap,
	Json(payloads): Json<Vec<PublishDataInput>>,
) -> (StatusCode, Json<Vec<PublishEventResult>>) {
	// uploads must carry the session identity and signed token
	assert_eq!(headers.get("X-Auth-Key").unwrap(), "mock-auth-id-key");
	assert!(headers.contains_key("X-Auth-Token"));

	let upload = state.upload_count.fetch_add(1, Ordering::SeqCst);

	let mut results = Vec::with_capacity(payloads.len());
	for (i, payload) in payloads.iter().enumerate() {
		assert_eq!(payload.data_type, "event");
		assert!(payload.compressed);

		let event = decode_publish_data_input(payload).unwrap();
		if upload == 0 && i == 1 {
			results.push(PublishEventResult {
				success: false,
				error: format!("{} failed to post", event.id),
			});
			continue;
		}
		state.received_events.lock().unwrap().push(event);
		results.push(PublishEventResult {
			success: true,
			error: String::new(),
		});
	}
	(StatusCode::OK, Json(results))
}

struct MockSpaceNode {
	api_url: Url,
	public_key_pem: String,
}

impl SpaceNode for MockSpaceNode {
	fn name(&self) -> &str {
		"mock-node"
	}

	fn status(&self) -> NodeStatus {
		NodeStatus::Running
	}

	fn public_key_pem(&self) -> &str {
		&self.public_key_pem
	}

	fn api_url(&self) -> &Url {
		&self.api_url
	}

	fn http_client(&self) -> reqwest::Client {
		reqwest::Client::new()
	}
}

async fn start_mock_node() -> (ApiClient, Arc<MockNodeState>) {
	let keys = test_keys();

	let state = Arc::new(MockNodeState {
		node_key: RsaKey::from_pem(&keys.node_private_pem).unwrap(),
		client_public_key: RsaPublicKey::from_pem(&keys.client_public_pem).unwrap(),
		received_events: Mutex::new(Vec::new()),
		upload_count: AtomicUsize::new(0),
	});

	let app = Router::new()
		.route("/auth", post(handle_auth))
		.route("/events", post(handle_events))
		.with_state(Arc::clone(&state));
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});

	let node = Arc::new(MockSpaceNode {
		api_url: format!("http://{addr}").parse().unwrap(),
		public_key_pem: keys.node_public_pem.clone(),
	});
	let client = ApiClient::new(
		REF_NAME,
		REF_ID,
		CLIENT_ID_KEY,
		&keys.client_private_pem,
		node,
		"/auth",
	)
	.unwrap();
	(client, state)
}

fn metric_event(value: i64) -> CloudEvent {
	CloudEvent::new_network_metric(
		"urn:mycs",
		serde_json::json!({
			"monitors": [{
				"name": "space-vpn",
				"counters": [{"name": "recd", "timestamp": 1640648486858i64, "value": value}],
			}]
		}),
	)
}

#[tokio::test]
async fn uploads_signed_event_batches_and_reports_rejections() {
	let (client, state) = start_mock_node().await;
	client.authenticate().await.unwrap();

	let sender = MeasurementEventSender::new(client, DEVICE_ID);

	let events = vec![metric_event(32), metric_event(42), metric_event(52)];
	let rejected_value = 42;

	let errors = sender
		.post_measurement_events(events.clone())
		.await
		.unwrap();

	// index 1 was rejected on the first upload and surfaced by value
	assert_eq!(errors.len(), 1);
	assert!(errors[0].error.contains("failed to post"));
	assert_eq!(
		errors[0].event.data["monitors"][0]["counters"][0]["value"],
		serde_json::json!(rejected_value)
	);
	// the uploader stamps the device URN as the event source
	assert_eq!(errors[0].event.source, format!("urn:mycs:device:{DEVICE_ID}"));

	// the accepted events arrived decoded and source-stamped
	let received = state.received_events.lock().unwrap();
	assert_eq!(received.len(), 2);
	for event in received.iter() {
		assert_eq!(event.source, format!("urn:mycs:device:{DEVICE_ID}"));
		assert_eq!(event.event_type, "io.appbricks.mycs.network.metric");
	}
}

#[tokio::test]
async fn upload_without_session_fails() {
	let (client, _) = start_mock_node().await;
	let sender = MeasurementEventSender::new(client, DEVICE_ID);

	let result = sender.post_measurement_events(vec![metric_event(1)]).await;
	assert!(result.is_err());
}
