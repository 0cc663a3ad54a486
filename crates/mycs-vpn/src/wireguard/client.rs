// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mycs_common_exec::ExecTimer;
use mycs_monitors::{Counter, MonitorService};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{Result, VpnError};
use crate::netctx::parse::next_available_interface;
use crate::netctx::NetworkContext;
use crate::vpn_config::VpnClient;
use crate::wireguard::config::WireguardConfig;
use crate::wireguard::engine::WgTunnelEngine;
use crate::wireguard::uapi::WgCtrlService;

const DEFAULT_MTU: i32 = 1420;
const METRICS_INTERVAL: Duration = Duration::from_millis(500);
const DISCONNECT_DEADLINE: Duration = Duration::from_millis(500);

/// The wireguard tunnel lifecycle.
///
/// `connect` walks the setup ladder in order (interface, engine, control
/// listener, host routes, DNS, metrics sampler) and rolls everything back
/// on any failure; `disconnect` is the precise inverse with a bounded wait
/// on the engine acknowledging shutdown.
pub struct WireguardClient {
	cfg: WireguardConfig,
	nc: NetworkContext,

	iface_name: Option<String>,
	engine: Option<Arc<WgTunnelEngine>>,

	close_tx: Option<oneshot::Sender<()>>,
	disconnected_rx: Option<oneshot::Receiver<()>>,

	// bytes sent and received through the tunnel
	sent: Counter,
	recd: Counter,

	metrics_timer: Option<ExecTimer>,
	metrics_error: Arc<Mutex<Option<String>>>,
}

impl WireguardClient {
	pub fn new(cfg: WireguardConfig, monitor_service: Option<&MonitorService>) -> Self {
		Self::with_network_context(cfg, monitor_service, NetworkContext::host())
	}

	pub fn with_network_context(
		cfg: WireguardConfig,
		monitor_service: Option<&MonitorService>,
		nc: NetworkContext,
	) -> Self {
		let sent = Counter::new("sent", true, true);
		let recd = Counter::new("recd", true, true);

		if let Some(monitor_service) = monitor_service {
			let monitor = monitor_service.new_monitor("space-vpn");
			monitor.add_counter(&sent);
			monitor.add_counter(&recd);
		}

		Self {
			cfg,
			nc,
			iface_name: None,
			engine: None,
			close_tx: None,
			disconnected_rx: None,
			sent,
			recd,
			metrics_timer: None,
			metrics_error: Arc::new(Mutex::new(None)),
		}
	}

	pub fn interface_name(&self) -> Option<&str> {
		self.iface_name.as_deref()
	}

	pub async fn connect(&mut self) -> Result<()> {
		let base = if cfg!(target_os = "macos") {
			"utun"
		} else {
			"wg"
		};
		let existing = self.nc.list_interfaces().await?;
		let iface = next_available_interface(base, &existing);

		let mut device_config = tun::Configuration::default();
		device_config.name(iface.as_str()).mtu(DEFAULT_MTU).up();
		#[cfg(target_os = "linux")]
		device_config.platform(|platform| {
			platform.packet_information(false);
		});
		let device = tun::create_as_async(&device_config)
			.map_err(|e| VpnError::TunnelIo(format!("failed to create TUN device: {e}")))?;

		info!(iface, "starting wireguard tunnel");

		let engine = Arc::new(WgTunnelEngine::new(&iface, device, &self.cfg.device_config).await?);
		engine.start()?;

		let ctrl =
			match WgCtrlService::start(Arc::clone(&engine), WgCtrlService::socket_path(&iface))
				.await
			{
				Ok(ctrl) => ctrl,
				Err(e) => {
					engine.shutdown().await;
					return Err(e);
				}
			};

		if let Err(e) = self.configure_host(&iface).await {
			ctrl.stop().await;
			engine.shutdown().await;
			self.nc.clear().await;
			return Err(e);
		}

		// teardown runs on one path: the watcher fires on the close signal,
		// unwinds everything connect installed, then acknowledges
		let (close_tx, close_rx) = oneshot::channel::<()>();
		let (disconnected_tx, disconnected_rx) = oneshot::channel::<()>();
		let watcher_engine = Arc::clone(&engine);
		let watcher_nc = self.nc.clone();
		tokio::spawn(async move {
			let _ = close_rx.await;
			debug!("shutting down wireguard tunnel");
			ctrl.stop().await;
			watcher_engine.shutdown().await;
			watcher_nc.clear().await;
			let _ = disconnected_tx.send(());
		});

		self.start_metrics_sampler(Arc::clone(&engine));

		self.iface_name = Some(iface);
		self.engine = Some(engine);
		self.close_tx = Some(close_tx);
		self.disconnected_rx = Some(disconnected_rx);
		Ok(())
	}

	async fn configure_host(&self, iface: &str) -> Result<()> {
		self.nc.disable_ipv6().await?;
		self.nc
			.add_external_routes(&self.cfg.peer_addresses)
			.await?;

		let tun_gateway = self
			.nc
			.configure_interface(iface, &self.cfg.tun_address)
			.await?;
		if self.cfg.is_default_route {
			self.nc.make_default_route(iface, tun_gateway).await?;
		}

		if !self.cfg.tun_dns.is_empty() {
			self.nc.add_dns_server(iface, &self.cfg.tun_dns).await?;
		}
		Ok(())
	}

	fn start_metrics_sampler(&mut self, engine: Arc<WgTunnelEngine>) {
		let sent = self.sent.clone();
		let recd = self.recd.clone();
		let metrics_error = Arc::clone(&self.metrics_error);

		self.metrics_timer = Some(ExecTimer::start(METRICS_INTERVAL, move |_| {
			let engine = Arc::clone(&engine);
			let sent = sent.clone();
			let recd = recd.clone();
			let metrics_error = Arc::clone(&metrics_error);
			async move {
				match engine.bytes_transmitted() {
					Ok((received, sent_bytes)) => {
						if received > 0 {
							recd.set(received);
						}
						if sent_bytes > 0 {
							sent.set(sent_bytes);
						}
					}
					Err(e) => {
						error!(error = %e, "failed to retrieve wireguard device counters");
						*metrics_error
							.lock()
							.unwrap_or_else(|poisoned| poisoned.into_inner()) =
							Some(e.to_string());
					}
				}
				Ok(Some(METRICS_INTERVAL))
			}
		}));
	}

	pub async fn disconnect(&mut self) -> Result<()> {
		if let Some(timer) = self.metrics_timer.take() {
			timer.stop().await;
		}

		let Some(close_tx) = self.close_tx.take() else {
			// never connected; make sure nothing half-installed lingers
			self.nc.clear().await;
			return Ok(());
		};
		let _ = close_tx.send(());

		if let Some(disconnected_rx) = self.disconnected_rx.take() {
			match tokio::time::timeout(DISCONNECT_DEADLINE, disconnected_rx).await {
				Ok(_) => {}
				Err(_) => {
					warn!(
						"timed out waiting for vpn disconnect signal; connection was most likely never established"
					);
					self.nc.clear().await;
				}
			}
		}

		self.engine = None;
		self.iface_name = None;
		Ok(())
	}
}

#[async_trait]
impl VpnClient for WireguardClient {
	async fn connect(&mut self) -> Result<()> {
		WireguardClient::connect(self).await
	}

	async fn disconnect(&mut self) -> Result<()> {
		WireguardClient::disconnect(self).await
	}

	/// Bytes received and sent through the tunnel, plus the last sampling
	/// error if the 500ms sampler has been failing.
	fn bytes_transmitted(&self) -> (i64, i64, Option<String>) {
		let last_error = self
			.metrics_error
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone();
		(self.recd.get(), self.sent.get(), last_error)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mycs_monitors::{SendError, Sender};
	use mycs_events::{CloudEvent, CloudEventError};

	struct NullSender;

	#[async_trait]
	impl Sender for NullSender {
		async fn post_measurement_events(
			&self,
			_events: Vec<CloudEvent>,
		) -> std::result::Result<Vec<CloudEventError>, SendError> {
			Ok(Vec::new())
		}
	}

	async fn test_config() -> WireguardConfig {
		let text = "[Interface]
PrivateKey = WOhR2vqBGm+lh7homg6GU1DvNL1S1OJxvK3n0aO0U2Y=
Address = 192.168.111.2/32
DNS = 10.12.16.253

[Peer]
PublicKey = EnfqV5vxXCSjawoOSGBH3a5h1N7ca9QaAuJZEOMRkzI=
Endpoint = 127.0.0.1:3399
PersistentKeepalive = 25
AllowedIPs = 0.0.0.0/0
";
		WireguardConfig::parse("mycs-test", text.as_bytes())
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn registers_tunnel_counters_with_monitor_service() {
		let service = MonitorService::new(Arc::new(NullSender), 5, 1000).unwrap();
		let client = WireguardClient::new(test_config().await, Some(&service));

		// cumulative counters report absolute readings as running totals
		client.recd.set(100);
		client.sent.set(40);
		client.recd.set(150);

		let (received, sent, err) = client.bytes_transmitted();
		assert_eq!(received, 150);
		assert_eq!(sent, 40);
		assert!(err.is_none());
	}

	#[tokio::test]
	async fn disconnect_without_connect_is_clean() {
		let mut client = WireguardClient::new(test_config().await, None);
		client.disconnect().await.unwrap();
		assert!(client.interface_name().is_none());
	}
}
