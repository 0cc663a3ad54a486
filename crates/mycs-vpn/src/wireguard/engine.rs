// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use defguard_boringtun::noise::{Tunn, TunnResult};
use defguard_boringtun::x25519::{PublicKey, StaticSecret};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use tun::AsyncDevice;

use crate::error::{Result, VpnError};
use crate::wireguard::config::WgDeviceConfig;
use crate::wireguard::keys::WgKey;
use crate::wireguard::uapi::{DeviceSnapshot, PeerSnapshot};

const TIMER_TICK_MS: u64 = 250;

struct PeerState {
	public_key: WgKey,
	endpoint: SocketAddr,
	allowed_ips: Vec<ipnet::IpNet>,
	persistent_keepalive: Option<u16>,
	tunn: tokio::sync::Mutex<Tunn>,
	rx_bytes: AtomicI64,
	tx_bytes: AtomicI64,
	last_handshake_ms: AtomicI64,
}

impl PeerState {
	fn mark_handshake(&self) {
		self.last_handshake_ms
			.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
	}
}

/// The userspace wireguard packet engine.
///
/// Owns the TUN device and a UDP transport socket, and pumps packets
/// between them through per-peer Noise sessions: decrypted transport
/// payloads go into the device, device traffic is routed to the peer whose
/// allowed IPs cover the destination and encrypted out the socket.
pub struct WgTunnelEngine {
	iface_name: String,
	private_key: WgKey,
	listen_port: u16,
	udp: Arc<UdpSocket>,
	peers: Vec<Arc<PeerState>>,
	device_halves: Mutex<Option<(ReadHalf<AsyncDevice>, WriteHalf<AsyncDevice>)>>,
	shutdown_tx: watch::Sender<bool>,
	shutdown_rx: watch::Receiver<bool>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	running: AtomicBool,
}

impl WgTunnelEngine {
	pub async fn new(
		iface_name: &str,
		device: AsyncDevice,
		config: &WgDeviceConfig,
	) -> Result<Self> {
		let udp = UdpSocket::bind("0.0.0.0:0").await?;
		let listen_port = udp.local_addr()?.port();
		debug!(listen_port, "bound wireguard transport socket");

		let mut peers = Vec::with_capacity(config.peers.len());
		for (index, peer) in config.peers.iter().enumerate() {
			let tunn = Tunn::new(
				StaticSecret::from(*config.private_key.as_bytes()),
				PublicKey::from(*peer.public_key.as_bytes()),
				None,
				peer.persistent_keepalive,
				index as u32,
				None,
			);
			peers.push(Arc::new(PeerState {
				public_key: peer.public_key,
				endpoint: peer.endpoint,
				allowed_ips: peer.allowed_ips.clone(),
				persistent_keepalive: peer.persistent_keepalive,
				tunn: tokio::sync::Mutex::new(tunn),
				rx_bytes: AtomicI64::new(0),
				tx_bytes: AtomicI64::new(0),
				last_handshake_ms: AtomicI64::new(0),
			}));
		}

		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		Ok(Self {
			iface_name: iface_name.to_string(),
			private_key: config.private_key,
			listen_port,
			udp: Arc::new(udp),
			peers,
			device_halves: Mutex::new(Some(tokio::io::split(device))),
			shutdown_tx,
			shutdown_rx,
			tasks: Mutex::new(Vec::new()),
			running: AtomicBool::new(false),
		})
	}

	/// Starts the receive, send and timer loops.
	pub fn start(self: &Arc<Self>) -> Result<()> {
		let halves = self
			.device_halves
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.take();
		let Some((reader, writer)) = halves else {
			return Err(VpnError::TunnelIo(
				"wireguard engine is already started".to_string(),
			));
		};

		let handles = vec![
			Arc::clone(self).spawn_recv_loop(writer),
			Arc::clone(self).spawn_send_loop(reader),
			Arc::clone(self).spawn_timer_loop(),
		];
		*self
			.tasks
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = handles;

		self.running.store(true, Ordering::SeqCst);
		info!(iface = %self.iface_name, "wireguard engine started");
		Ok(())
	}

	fn spawn_recv_loop(self: Arc<Self>, mut writer: WriteHalf<AsyncDevice>) -> JoinHandle<()> {
		let mut shutdown_rx = self.shutdown_rx.clone();

		tokio::spawn(async move {
			let mut buf = vec![0u8; 65536];
			let mut dst_buf = vec![0u8; 65536];

			loop {
				tokio::select! {
					biased;

					_ = shutdown_rx.changed() => {
						if *shutdown_rx.borrow() {
							debug!("recv loop shutting down");
							break;
						}
					}

					result = self.udp.recv_from(&mut buf) => {
						let (len, from) = match result {
							Ok(received) => received,
							Err(e) => {
								warn!(error = %e, "transport recv error");
								continue;
							}
						};

						let Some(peer) = self.peer_for_endpoint(from) else {
							trace!(%from, "dropping packet from unknown endpoint");
							continue;
						};
						peer.rx_bytes.fetch_add(len as i64, Ordering::SeqCst);

						let mut tunn = peer.tunn.lock().await;
						let result = tunn.decapsulate(None, &buf[..len], &mut dst_buf);
						drop(tunn);

						match result {
							TunnResult::Done => {}
							TunnResult::WriteToNetwork(data) => {
								peer.mark_handshake();
								match self.udp.send_to(data, peer.endpoint).await {
									Ok(sent) => {
										peer.tx_bytes.fetch_add(sent as i64, Ordering::SeqCst);
									}
									Err(e) => {
										warn!(error = %e, "failed to send handshake response");
									}
								}
							}
							TunnResult::WriteToTunnelV4(data, _) | TunnResult::WriteToTunnelV6(data, _) => {
								peer.mark_handshake();
								if let Err(e) = writer.write_all(data).await {
									warn!(error = %e, "failed to write packet into tunnel device");
								}
							}
							TunnResult::Err(e) => {
								debug!(?e, "tunnel decapsulate error");
							}
						}
					}
				}
			}
		})
	}

	fn spawn_send_loop(self: Arc<Self>, mut reader: ReadHalf<AsyncDevice>) -> JoinHandle<()> {
		let mut shutdown_rx = self.shutdown_rx.clone();

		tokio::spawn(async move {
			let mut buf = vec![0u8; 65536];
			let mut dst_buf = vec![0u8; 65536];

			loop {
				tokio::select! {
					biased;

					_ = shutdown_rx.changed() => {
						if *shutdown_rx.borrow() {
							debug!("send loop shutting down");
							break;
						}
					}

					result = reader.read(&mut buf) => {
						let len = match result {
							Ok(0) => {
								debug!("tunnel device closed");
								break;
							}
							Ok(len) => len,
							Err(e) => {
								warn!(error = %e, "tunnel device read error");
								break;
							}
						};

						let Some(dst_ip) = extract_ip_dst(&buf[..len]) else {
							continue;
						};
						let Some(peer) = self
							.peers
							.iter()
							.find(|p| p.allowed_ips.iter().any(|net| net.contains(&dst_ip)))
						else {
							trace!(%dst_ip, "no peer routes destination");
							continue;
						};

						let mut tunn = peer.tunn.lock().await;
						let result = tunn.encapsulate(&buf[..len], &mut dst_buf);
						drop(tunn);

						match result {
							TunnResult::WriteToNetwork(data) => {
								match self.udp.send_to(data, peer.endpoint).await {
									Ok(sent) => {
										peer.tx_bytes.fetch_add(sent as i64, Ordering::SeqCst);
									}
									Err(e) => {
										warn!(error = %e, "failed to send encrypted packet");
									}
								}
							}
							TunnResult::Done => {}
							TunnResult::Err(e) => {
								debug!(?e, "tunnel encapsulate error");
							}
							_ => {}
						}
					}
				}
			}
		})
	}

	fn spawn_timer_loop(self: Arc<Self>) -> JoinHandle<()> {
		let mut shutdown_rx = self.shutdown_rx.clone();

		tokio::spawn(async move {
			let mut dst_buf = vec![0u8; 65536];

			loop {
				tokio::select! {
					biased;

					_ = shutdown_rx.changed() => {
						if *shutdown_rx.borrow() {
							debug!("timer loop shutting down");
							break;
						}
					}

					_ = tokio::time::sleep(std::time::Duration::from_millis(TIMER_TICK_MS)) => {
						for peer in &self.peers {
							let mut tunn = peer.tunn.lock().await;
							let result = tunn.update_timers(&mut dst_buf);
							drop(tunn);

							match result {
								TunnResult::WriteToNetwork(data) => {
									match self.udp.send_to(data, peer.endpoint).await {
										Ok(sent) => {
											peer.tx_bytes.fetch_add(sent as i64, Ordering::SeqCst);
										}
										Err(e) => {
											warn!(error = %e, "failed to send timer packet");
										}
									}
								}
								TunnResult::Done => {}
								TunnResult::Err(e) => {
									debug!(?e, "timer update error");
								}
								_ => {}
							}
						}
					}
				}
			}
		})
	}

	fn peer_for_endpoint(&self, from: SocketAddr) -> Option<&Arc<PeerState>> {
		self.peers
			.iter()
			.find(|p| p.endpoint == from)
			.or_else(|| self.peers.iter().find(|p| p.endpoint.ip() == from.ip()))
			.or_else(|| {
				if self.peers.len() == 1 {
					self.peers.first()
				} else {
					None
				}
			})
	}

	/// Total bytes received and sent over the transport since start.
	pub fn bytes_transmitted(&self) -> Result<(i64, i64)> {
		if !self.running.load(Ordering::SeqCst) {
			return Err(VpnError::TunnelIo(
				"wireguard device is not running".to_string(),
			));
		}
		let received = self
			.peers
			.iter()
			.map(|p| p.rx_bytes.load(Ordering::SeqCst))
			.sum();
		let sent = self
			.peers
			.iter()
			.map(|p| p.tx_bytes.load(Ordering::SeqCst))
			.sum();
		Ok((received, sent))
	}

	pub fn iface_name(&self) -> &str {
		&self.iface_name
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// The device state as served over the IPC control socket.
	pub fn snapshot(&self) -> DeviceSnapshot {
		DeviceSnapshot {
			private_key_hex: self.private_key.to_hex(),
			listen_port: self.listen_port,
			peers: self
				.peers
				.iter()
				.map(|peer| {
					let handshake_ms = peer.last_handshake_ms.load(Ordering::SeqCst);
					PeerSnapshot {
						public_key_hex: peer.public_key.to_hex(),
						endpoint: peer.endpoint,
						allowed_ips: peer.allowed_ips.clone(),
						last_handshake: (handshake_ms > 0).then(|| {
							(handshake_ms / 1000, (handshake_ms % 1000) * 1_000_000)
						}),
						rx_bytes: peer.rx_bytes.load(Ordering::SeqCst),
						tx_bytes: peer.tx_bytes.load(Ordering::SeqCst),
						persistent_keepalive: peer.persistent_keepalive,
					}
				})
				.collect(),
		}
	}

	/// Stops the loops and releases the device. The TUN interface
	/// disappears once both device halves are dropped with their loops.
	pub async fn shutdown(&self) {
		info!(iface = %self.iface_name, "shutting down wireguard engine");
		let _ = self.shutdown_tx.send(true);
		self.running.store(false, Ordering::SeqCst);

		let handles: Vec<_> = self
			.tasks
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.drain(..)
			.collect();
		for handle in handles {
			let _ = handle.await;
		}
	}
}

fn extract_ip_dst(packet: &[u8]) -> Option<IpAddr> {
	if packet.is_empty() {
		return None;
	}
	match packet[0] >> 4 {
		4 if packet.len() >= 20 => {
			let mut dst = [0u8; 4];
			dst.copy_from_slice(&packet[16..20]);
			Some(IpAddr::V4(Ipv4Addr::from(dst)))
		}
		6 if packet.len() >= 40 => {
			let mut dst = [0u8; 16];
			dst.copy_from_slice(&packet[24..40]);
			Some(IpAddr::V6(Ipv6Addr::from(dst)))
		}
		_ => None,
	}
}
