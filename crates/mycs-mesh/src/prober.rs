// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use mycs_common_exec::ExecTimer;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::{MeshEngine, MeshPeer};

const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Periodically probes reachability of online mesh peers.
///
/// Every tick the prober asks the engine for peer status and, for each
/// peer reporting online, resolves the peer's mesh DNS name and sends a
/// disco ping with a bounded deadline. Outcomes are logged; no state is
/// kept across ticks. Failures, including panics inside the engine, never
/// stop the loop.
pub struct MeshStatusProber {
	engine: Arc<dyn MeshEngine>,
	probe_interval: Duration,
	ping_timeout: Duration,
	timer: tokio::sync::Mutex<Option<ExecTimer>>,
}

impl MeshStatusProber {
	pub fn new(engine: Arc<dyn MeshEngine>) -> Self {
		Self::with_intervals(engine, PROBE_INTERVAL, PING_TIMEOUT)
	}

	pub fn with_intervals(
		engine: Arc<dyn MeshEngine>,
		probe_interval: Duration,
		ping_timeout: Duration,
	) -> Self {
		Self {
			engine,
			probe_interval,
			ping_timeout,
			timer: tokio::sync::Mutex::new(None),
		}
	}

	pub async fn start(&self) {
		let engine = Arc::clone(&self.engine);
		let probe_interval = self.probe_interval;
		let ping_timeout = self.ping_timeout;

		let timer = ExecTimer::start(Duration::ZERO, move |_| {
			let engine = Arc::clone(&engine);
			async move {
				probe_tick(engine, ping_timeout).await;
				Ok(Some(probe_interval))
			}
		});
		*self.timer.lock().await = Some(timer);
	}

	pub async fn stop(&self) {
		if let Some(timer) = self.timer.lock().await.take() {
			if let Some(e) = timer.stop().await {
				debug!(error = %e, "mesh status prober stopped with error");
			}
		}
	}
}

async fn probe_tick(engine: Arc<dyn MeshEngine>, ping_timeout: Duration) {
	let peers = match engine.peer_status().await {
		Ok(peers) => peers,
		Err(e) => {
			warn!(error = %e, "unable to query mesh peer status");
			return;
		}
	};

	let mut probes = JoinSet::new();
	for peer in peers.into_iter().filter(|p| p.online) {
		let engine = Arc::clone(&engine);
		probes.spawn(async move {
			probe_peer(engine, peer, ping_timeout).await;
		});
	}

	while let Some(result) = probes.join_next().await {
		if let Err(e) = result {
			if e.is_panic() {
				error!("recovered from panic while probing a mesh peer");
			}
		}
	}
}

async fn probe_peer(engine: Arc<dyn MeshEngine>, peer: MeshPeer, ping_timeout: Duration) {
	let host = peer.dns_name.trim_end_matches('.');
	let addrs = match tokio::net::lookup_host((host, 0)).await {
		Ok(addrs) => addrs,
		Err(e) => {
			warn!(peer = %peer.name, host, error = %e, "unable to resolve mesh peer");
			return;
		}
	};

	// first A record
	let Some(addr) = first_ipv4(addrs.map(|a| a.ip())) else {
		warn!(peer = %peer.name, host, "mesh peer name resolved to no usable address");
		return;
	};

	match tokio::time::timeout(ping_timeout, engine.disco_ping(addr)).await {
		Ok(Ok(report)) => {
			info!(
				peer = %peer.name,
				%addr,
				endpoint = %report.endpoint,
				latency_ms = report.latency.as_millis() as u64,
				"mesh peer responded to disco ping"
			);
		}
		Ok(Err(e)) => {
			warn!(peer = %peer.name, %addr, error = %e, "mesh peer ping failed");
		}
		// an unreachable peer is a normal outcome, not an error
		Err(_) => {
			debug!(peer = %peer.name, %addr, "mesh peer ping timed out");
		}
	}
}

fn first_ipv4(addrs: impl Iterator<Item = IpAddr>) -> Option<IpAddr> {
	let mut first = None;
	for addr in addrs {
		if addr.is_ipv4() {
			return Some(addr);
		}
		first.get_or_insert(addr);
	}
	first
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::PingReport;
	use crate::error::{MeshError, Result};
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;

	struct MockEngine {
		peers: Vec<MeshPeer>,
		status_calls: AtomicUsize,
		pings: Mutex<Vec<IpAddr>>,
		panic_on_ping: bool,
	}

	impl MockEngine {
		fn new(peers: Vec<MeshPeer>, panic_on_ping: bool) -> Arc<Self> {
			Arc::new(Self {
				peers,
				status_calls: AtomicUsize::new(0),
				pings: Mutex::new(Vec::new()),
				panic_on_ping,
			})
		}
	}

	#[async_trait]
	impl MeshEngine for MockEngine {
		async fn peer_status(&self) -> Result<Vec<MeshPeer>> {
			self.status_calls.fetch_add(1, Ordering::SeqCst);
			Ok(self.peers.clone())
		}

		async fn disco_ping(&self, addr: IpAddr) -> Result<PingReport> {
			if self.panic_on_ping {
				panic!("engine blew up");
			}
			self.pings.lock().unwrap().push(addr);
			Ok(PingReport {
				latency: Duration::from_millis(12),
				endpoint: format!("{addr}:41641"),
			})
		}

		async fn wireguard_device_info(&self) -> Result<String> {
			Err(MeshError::NoDevice)
		}
	}

	fn peer(name: &str, online: bool) -> MeshPeer {
		MeshPeer {
			name: name.to_string(),
			dns_name: "localhost.".to_string(),
			online,
		}
	}

	#[tokio::test]
	async fn pings_only_online_peers() {
		let engine = MockEngine::new(vec![peer("alpha", true), peer("beta", false)], false);
		let prober = MeshStatusProber::with_intervals(
			Arc::clone(&engine) as Arc<dyn MeshEngine>,
			Duration::from_secs(5),
			Duration::from_secs(1),
		);

		prober.start().await;
		tokio::time::sleep(Duration::from_millis(200)).await;
		prober.stop().await;

		let pings = engine.pings.lock().unwrap();
		assert_eq!(pings.len(), 1);
		assert!(pings[0].is_ipv4());
	}

	#[tokio::test]
	async fn engine_panics_do_not_stop_the_prober() {
		let engine = MockEngine::new(vec![peer("alpha", true)], true);
		let prober = MeshStatusProber::with_intervals(
			Arc::clone(&engine) as Arc<dyn MeshEngine>,
			Duration::from_millis(50),
			Duration::from_secs(1),
		);

		prober.start().await;
		tokio::time::sleep(Duration::from_millis(250)).await;
		prober.stop().await;

		// the loop survived several panicking ticks
		assert!(engine.status_calls.load(Ordering::SeqCst) >= 2);
	}

	#[tokio::test]
	async fn status_errors_are_tolerated() {
		struct FailingEngine;

		#[async_trait]
		impl MeshEngine for FailingEngine {
			async fn peer_status(&self) -> Result<Vec<MeshPeer>> {
				Err(MeshError::Engine("not ready".to_string()))
			}

			async fn disco_ping(&self, _addr: IpAddr) -> Result<PingReport> {
				unreachable!("no peers to ping")
			}

			async fn wireguard_device_info(&self) -> Result<String> {
				Err(MeshError::NoDevice)
			}
		}

		let prober = MeshStatusProber::with_intervals(
			Arc::new(FailingEngine),
			Duration::from_millis(50),
			Duration::from_secs(1),
		);

		prober.start().await;
		tokio::time::sleep(Duration::from_millis(200)).await;
		prober.stop().await;
	}
}
