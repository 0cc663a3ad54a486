// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::error::{Result, VpnError};

/// Seam for the platform network tools (`ip`, `route`, `networksetup`,
/// ...). The production runner shells out; tests substitute a recorder.
#[async_trait]
pub trait CommandRunner: Send + Sync {
	/// Runs a command, returning stdout. A non-zero exit is an error
	/// carrying the command line and stderr.
	async fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
	async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
		trace!(program, ?args, "running network command");

		let output = Command::new(program).args(args).output().await?;
		if !output.status.success() {
			return Err(VpnError::TunnelIo(format!(
				"'{} {}' failed: {}",
				program,
				args.join(" "),
				String::from_utf8_lossy(&output.stderr).trim()
			)));
		}
		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}
