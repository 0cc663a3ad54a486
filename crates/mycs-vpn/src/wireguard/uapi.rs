// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The cross-platform userspace IPC surface of the tunnel device.
//!
//! The control listener serves the standard `get=1` operation on a unix
//! socket named after the interface, answering with the key=value device
//! dump other wireguard tooling understands.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ipnet::IpNet;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::wireguard::engine::WgTunnelEngine;

#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
	pub private_key_hex: String,
	pub listen_port: u16,
	pub peers: Vec<PeerSnapshot>,
}

#[derive(Debug, Clone)]
pub struct PeerSnapshot {
	pub public_key_hex: String,
	pub endpoint: SocketAddr,
	pub allowed_ips: Vec<IpNet>,
	// (seconds, nanoseconds) since epoch; None before the first handshake
	pub last_handshake: Option<(i64, i64)>,
	pub rx_bytes: i64,
	pub tx_bytes: i64,
	pub persistent_keepalive: Option<u16>,
}

/// Renders the `get=1` response for a device snapshot.
pub fn render_uapi_device(snapshot: &DeviceSnapshot) -> String {
	let mut out = String::new();
	let _ = writeln!(out, "private_key={}", snapshot.private_key_hex);
	let _ = writeln!(out, "listen_port={}", snapshot.listen_port);

	for peer in &snapshot.peers {
		let _ = writeln!(out, "public_key={}", peer.public_key_hex);
		let _ = writeln!(out, "endpoint={}", peer.endpoint);
		let (secs, nanos) = peer.last_handshake.unwrap_or((0, 0));
		let _ = writeln!(out, "last_handshake_time_sec={secs}");
		let _ = writeln!(out, "last_handshake_time_nsec={nanos}");
		let _ = writeln!(out, "tx_bytes={}", peer.tx_bytes);
		let _ = writeln!(out, "rx_bytes={}", peer.rx_bytes);
		if let Some(keepalive) = peer.persistent_keepalive {
			let _ = writeln!(out, "persistent_keepalive_interval={keepalive}");
		}
		for net in &peer.allowed_ips {
			let _ = writeln!(out, "allowed_ip={net}");
		}
		let _ = writeln!(out, "protocol_version=1");
	}

	let _ = writeln!(out, "errno=0");
	let _ = writeln!(out);
	out
}

/// The IPC control listener for a running tunnel device.
pub struct WgCtrlService {
	socket_path: PathBuf,
	shutdown_tx: watch::Sender<bool>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl WgCtrlService {
	/// Conventional socket path for an interface name.
	pub fn socket_path(iface: &str) -> PathBuf {
		Path::new("/var/run/wireguard").join(format!("{iface}.sock"))
	}

	pub async fn start(engine: Arc<WgTunnelEngine>, socket_path: PathBuf) -> Result<Self> {
		if let Some(parent) = socket_path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		// remove a stale socket from an earlier run
		let _ = tokio::fs::remove_file(&socket_path).await;

		let listener = UnixListener::bind(&socket_path)?;
		debug!(path = %socket_path.display(), "wireguard control listener started");

		let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					biased;

					_ = shutdown_rx.changed() => {
						if *shutdown_rx.borrow() {
							break;
						}
					}

					result = listener.accept() => {
						match result {
							Ok((stream, _)) => {
								let engine = Arc::clone(&engine);
								tokio::spawn(async move {
									handle_connection(stream, engine).await;
								});
							}
							Err(e) => {
								warn!(error = %e, "control listener accept failed");
							}
						}
					}
				}
			}
		});

		Ok(Self {
			socket_path,
			shutdown_tx,
			task: Mutex::new(Some(task)),
		})
	}

	pub async fn stop(&self) {
		let _ = self.shutdown_tx.send(true);
		let task = self
			.task
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.take();
		if let Some(task) = task {
			let _ = task.await;
		}
		let _ = tokio::fs::remove_file(&self.socket_path).await;
	}
}

async fn handle_connection(stream: UnixStream, engine: Arc<WgTunnelEngine>) {
	let (read_half, mut write_half) = stream.into_split();
	let mut lines = BufReader::new(read_half).lines();

	let mut operation: Option<String> = None;
	while let Ok(Some(line)) = lines.next_line().await {
		if line.is_empty() {
			break;
		}
		operation.get_or_insert(line);
	}

	let response = match operation.as_deref() {
		Some("get=1") => render_uapi_device(&engine.snapshot()),
		_ => "errno=1\n\n".to_string(),
	};
	if let Err(e) = write_half.write_all(response.as_bytes()).await {
		debug!(error = %e, "failed to write control response");
	}
}
