// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reversible host network mutations.
//!
//! Everything the tunnel installs on the host (peer host routes, the
//! tunnel address, default-route promotion, DNS, the IPv6 kill switch)
//! goes through a [`NetworkContext`], which records the inverse action for
//! each mutation. [`NetworkContext::clear`] replays the inverses in
//! reverse order and is idempotent, so it is safe on every failure path.

pub mod parse;
pub mod runner;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use runner::{CommandRunner, SystemRunner};

use crate::error::{Result, VpnError};
use parse::{
	ip_route_default_gateway, parse_tunnel_cidr, route_get_field, service_for_device,
	tunnel_gateway,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
	Darwin,
	Linux,
}

impl Platform {
	pub fn detect() -> Self {
		if cfg!(target_os = "macos") {
			Platform::Darwin
		} else {
			Platform::Linux
		}
	}
}

#[derive(Clone)]
pub struct NetworkContext {
	inner: Arc<ContextInner>,
}

struct ContextInner {
	platform: Platform,
	runner: Arc<dyn CommandRunner>,
	state: Mutex<ContextState>,
}

#[derive(Default)]
struct ContextState {
	// darwin network service owning the pre-tunnel default interface
	primary_service: Option<String>,
	undo: Vec<UndoAction>,
}

enum UndoAction {
	DeleteHostRoute { dest: IpAddr, gateway: String },
	RemoveSplitDefaultRoutes { gateway: Ipv4Addr },
	RestoreDefaultRoute { gateway: String },
	RemoveInterfaceAddress { iface: String, cidr: String },
	RestoreDnsServers { service: String, servers: String },
	RevertDnsInterface { iface: String },
	EnableIpv6 { service: Option<String> },
}

impl NetworkContext {
	pub fn new(platform: Platform, runner: Arc<dyn CommandRunner>) -> Self {
		Self {
			inner: Arc::new(ContextInner {
				platform,
				runner,
				state: Mutex::new(ContextState::default()),
			}),
		}
	}

	/// A context for the host this process runs on.
	pub fn host() -> Self {
		Self::new(Platform::detect(), Arc::new(SystemRunner))
	}

	pub fn platform(&self) -> Platform {
		self.inner.platform
	}

	/// Names of the host's current network interfaces.
	pub async fn list_interfaces(&self) -> Result<Vec<String>> {
		let run = &self.inner.runner;
		match self.inner.platform {
			Platform::Darwin => {
				let out = run.run("ifconfig", &["-l"]).await?;
				Ok(out.split_whitespace().map(str::to_string).collect())
			}
			Platform::Linux => {
				let out = run.run("ip", &["-o", "link", "show"]).await?;
				Ok(out
					.lines()
					.filter_map(|line| {
						let name = line.split_whitespace().nth(1)?;
						let name = name.trim_end_matches(':');
						Some(name.split('@').next().unwrap_or(name).to_string())
					})
					.collect())
			}
		}
	}

	/// The host's current default gateway address.
	pub async fn default_gateway(&self) -> Result<String> {
		let run = &self.inner.runner;
		match self.inner.platform {
			Platform::Darwin => {
				let out = run.run("route", &["-n", "get", "default"]).await?;
				route_get_field(&out, "gateway")
					.ok_or_else(|| VpnError::TunnelIo("no default gateway found".to_string()))
			}
			Platform::Linux => {
				let out = run.run("ip", &["route", "show", "default"]).await?;
				ip_route_default_gateway(&out)
					.ok_or_else(|| VpnError::TunnelIo("no default gateway found".to_string()))
			}
		}
	}

	/// Disables IPv6 on the host network so tunnel-bypassing v6 routes
	/// cannot leak traffic.
	pub async fn disable_ipv6(&self) -> Result<()> {
		let run = &self.inner.runner;
		match self.inner.platform {
			Platform::Darwin => {
				let service = self.primary_service().await?;
				run.run("networksetup", &["-setv6off", &service]).await?;
				self.push_undo(UndoAction::EnableIpv6 {
					service: Some(service),
				})
				.await;
			}
			Platform::Linux => {
				run.run("sysctl", &["-w", "net.ipv6.conf.all.disable_ipv6=1"])
					.await?;
				self.push_undo(UndoAction::EnableIpv6 { service: None }).await;
			}
		}
		Ok(())
	}

	/// Installs a host route to each address via the current default
	/// gateway, so the tunnel's own transport packets never enter the
	/// tunnel.
	pub async fn add_external_routes(&self, addrs: &[IpAddr]) -> Result<()> {
		let gateway = self.default_gateway().await?;
		let run = &self.inner.runner;

		for addr in addrs {
			let dest = addr.to_string();
			match self.inner.platform {
				Platform::Darwin => {
					run.run("route", &["-n", "add", "-host", &dest, &gateway])
						.await?;
				}
				Platform::Linux => {
					let prefixed = format!("{dest}/32");
					run.run("ip", &["route", "add", &prefixed, "via", &gateway])
						.await?;
				}
			}
			debug!(%addr, %gateway, "added host route to tunnel peer");
			self.push_undo(UndoAction::DeleteHostRoute {
				dest: *addr,
				gateway: gateway.clone(),
			})
			.await;
		}
		Ok(())
	}

	/// Assigns the tunnel address to the interface and returns the tunnel
	/// gateway address derived from the CIDR.
	pub async fn configure_interface(&self, iface: &str, tun_cidr: &str) -> Result<Ipv4Addr> {
		let net = parse_tunnel_cidr(tun_cidr)?;
		let gateway = tunnel_gateway(tun_cidr)?;
		let run = &self.inner.runner;

		match self.inner.platform {
			Platform::Darwin => {
				let addr = net.addr().to_string();
				let cidr = net.to_string();
				run.run("ifconfig", &[iface, "inet", &cidr, &addr, "alias"])
					.await?;
			}
			Platform::Linux => {
				let cidr = net.to_string();
				run.run("ip", &["addr", "add", &cidr, "dev", iface]).await?;
				run.run("ip", &["link", "set", iface, "up"]).await?;
				self.push_undo(UndoAction::RemoveInterfaceAddress {
					iface: iface.to_string(),
					cidr,
				})
				.await;
			}
		}
		Ok(gateway)
	}

	/// Promotes the tunnel to default route. On Darwin the two half-space
	/// routes are installed instead of touching `0.0.0.0/0`; elsewhere the
	/// default route is replaced and restored on teardown.
	pub async fn make_default_route(&self, iface: &str, tun_gateway: Ipv4Addr) -> Result<()> {
		let run = &self.inner.runner;
		match self.inner.platform {
			Platform::Darwin => {
				let gateway = tun_gateway.to_string();
				run.run("route", &["-n", "add", "-net", "0.0.0.0/1", &gateway])
					.await?;
				run.run("route", &["-n", "add", "-net", "128.0.0.0/1", &gateway])
					.await?;
				self.push_undo(UndoAction::RemoveSplitDefaultRoutes {
					gateway: tun_gateway,
				})
				.await;
			}
			Platform::Linux => {
				let previous = self.default_gateway().await?;
				let gateway = tun_gateway.to_string();
				run.run(
					"ip",
					&["route", "replace", "default", "via", &gateway, "dev", iface],
				)
				.await?;
				self.push_undo(UndoAction::RestoreDefaultRoute { gateway: previous })
					.await;
			}
		}
		Ok(())
	}

	/// Points host DNS at the tunnel resolver with an empty search list.
	/// On Darwin the resolver cache is flushed as well.
	pub async fn add_dns_server(&self, iface: &str, server: &str) -> Result<()> {
		let run = &self.inner.runner;
		match self.inner.platform {
			Platform::Darwin => {
				let service = self.primary_service().await?;
				let previous = run.run("networksetup", &["-getdnsservers", &service]).await?;
				// anything other than a list of addresses means no manual
				// servers were configured
				let servers: Vec<&str> = previous.split_whitespace().collect();
				let previous = if servers
					.first()
					.is_some_and(|s| s.parse::<IpAddr>().is_ok())
				{
					servers.join(" ")
				} else {
					"Empty".to_string()
				};

				run.run("networksetup", &["-setdnsservers", &service, server])
					.await?;
				run.run("networksetup", &["-setsearchdomains", &service, "Empty"])
					.await?;
				run.run("dscacheutil", &["-flushcache"]).await?;
				run.run("killall", &["-HUP", "mDNSResponder"]).await?;

				self.push_undo(UndoAction::RestoreDnsServers {
					service,
					servers: previous,
				})
				.await;
			}
			Platform::Linux => {
				run.run("resolvectl", &["dns", iface, server]).await?;
				run.run("resolvectl", &["domain", iface, "~."]).await?;
				self.push_undo(UndoAction::RevertDnsInterface {
					iface: iface.to_string(),
				})
				.await;
			}
		}
		Ok(())
	}

	/// Undoes every mutation this context installed, most recent first.
	/// Failures are logged and skipped; calling clear again is a no-op
	/// until new mutations are recorded.
	pub async fn clear(&self) {
		let undo: Vec<UndoAction> = {
			let mut state = self.inner.state.lock().await;
			state.undo.drain(..).rev().collect()
		};

		for action in undo {
			if let Err(e) = self.apply_undo(&action).await {
				warn!(error = %e, "network cleanup step failed");
			}
		}
	}

	async fn apply_undo(&self, action: &UndoAction) -> Result<()> {
		let run = &self.inner.runner;
		match action {
			UndoAction::DeleteHostRoute { dest, gateway } => {
				let dest = dest.to_string();
				match self.inner.platform {
					Platform::Darwin => {
						run.run("route", &["-n", "delete", "-host", &dest, gateway])
							.await?;
					}
					Platform::Linux => {
						let prefixed = format!("{dest}/32");
						run.run("ip", &["route", "del", &prefixed, "via", gateway])
							.await?;
					}
				}
			}
			UndoAction::RemoveSplitDefaultRoutes { gateway } => {
				let gateway = gateway.to_string();
				run.run("route", &["-n", "delete", "-net", "0.0.0.0/1", &gateway])
					.await?;
				run.run("route", &["-n", "delete", "-net", "128.0.0.0/1", &gateway])
					.await?;
			}
			UndoAction::RestoreDefaultRoute { gateway } => {
				run.run("ip", &["route", "replace", "default", "via", gateway])
					.await?;
			}
			UndoAction::RemoveInterfaceAddress { iface, cidr } => {
				run.run("ip", &["addr", "del", cidr, "dev", iface]).await?;
			}
			UndoAction::RestoreDnsServers { service, servers } => {
				run.run("networksetup", &["-setdnsservers", service, servers])
					.await?;
				run.run("networksetup", &["-setsearchdomains", service, "Empty"])
					.await?;
				run.run("dscacheutil", &["-flushcache"]).await?;
			}
			UndoAction::RevertDnsInterface { iface } => {
				run.run("resolvectl", &["revert", iface]).await?;
			}
			UndoAction::EnableIpv6 { service } => match service {
				Some(service) => {
					run.run("networksetup", &["-setv6automatic", service]).await?;
				}
				None => {
					run.run("sysctl", &["-w", "net.ipv6.conf.all.disable_ipv6=0"])
						.await?;
				}
			},
		}
		Ok(())
	}

	async fn primary_service(&self) -> Result<String> {
		{
			let state = self.inner.state.lock().await;
			if let Some(service) = &state.primary_service {
				return Ok(service.clone());
			}
		}

		let run = &self.inner.runner;
		let route_out = run.run("route", &["-n", "get", "default"]).await?;
		let device = route_get_field(&route_out, "interface")
			.ok_or_else(|| VpnError::TunnelIo("no default route interface found".to_string()))?;

		let services = run
			.run("networksetup", &["-listnetworkserviceorder"])
			.await?;
		let service = service_for_device(&services, &device).ok_or_else(|| {
			VpnError::TunnelIo(format!("no network service found for device {device}"))
		})?;

		let mut state = self.inner.state.lock().await;
		state.primary_service = Some(service.clone());
		Ok(service)
	}

	async fn push_undo(&self, action: UndoAction) {
		self.inner.state.lock().await.undo.push(action);
	}
}
