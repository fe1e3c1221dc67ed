//! WiFi radio access.
//!
//! On a Linux host association is delegated to NetworkManager (`nmcli`) and
//! the raw link status comes from sysfs. `nmcli` runs as a child process that
//! is never waited on inline; finished children are reaped on later calls.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Radio + association + raw link status. Implementations must not block:
/// the calls are made from the async connectivity task.
pub trait NetworkLink: Send {
    /// Ask for the radio to be powered up.
    fn activate(&mut self) -> Result<()>;
    /// Start associating with `ssid`. Returns once the request is issued;
    /// callers poll `is_connected` for the outcome.
    fn associate(&mut self, ssid: &str, password: &str) -> Result<()>;
    /// Current raw link status.
    fn is_connected(&mut self) -> bool;
}

pub struct HostLink {
    iface: String,
    operstate: PathBuf,
    /// Program and leading arguments used in place of a bare `nmcli`.
    tool: (String, Vec<String>),
    radio: Option<Child>,
    pending: Option<Child>,
}

impl HostLink {
    pub fn new(iface: &str) -> Self {
        Self::with_tool(iface, "nmcli", &[])
    }

    fn with_tool(iface: &str, program: &str, args: &[&str]) -> Self {
        Self {
            iface: iface.to_string(),
            operstate: PathBuf::from(format!("/sys/class/net/{iface}/operstate")),
            tool: (
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            ),
            radio: None,
            pending: None,
        }
    }

    fn nmcli(&self) -> Command {
        let mut cmd = Command::new(&self.tool.0);
        cmd.args(&self.tool.1).stdout(Stdio::null()).stderr(Stdio::null());
        cmd
    }

    /// Collect finished `nmcli` children so they do not linger as zombies.
    fn reap(&mut self) {
        reap_child(&mut self.radio, &self.iface, "nmcli radio wifi on");
        reap_child(&mut self.pending, &self.iface, "nmcli association");
    }
}

fn reap_child(slot: &mut Option<Child>, iface: &str, what: &str) {
    let Some(child) = slot.as_mut() else {
        return;
    };
    match child.try_wait() {
        Ok(Some(status)) => {
            if !status.success() {
                tracing::warn!(%iface, %status, "{what} failed");
            }
            *slot = None;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(%iface, "{what}: wait failed: {e}");
            *slot = None;
        }
    }
}

fn kill_child(slot: &mut Option<Child>) {
    if let Some(mut stale) = slot.take() {
        let _ = stale.kill();
        let _ = stale.wait();
    }
}

impl NetworkLink for HostLink {
    fn activate(&mut self) -> Result<()> {
        self.reap();
        kill_child(&mut self.radio);

        let child = self
            .nmcli()
            .args(["radio", "wifi", "on"])
            .spawn()
            .context("failed to spawn nmcli")?;
        self.radio = Some(child);
        Ok(())
    }

    fn associate(&mut self, ssid: &str, password: &str) -> Result<()> {
        self.reap();
        kill_child(&mut self.pending);

        let mut cmd = self.nmcli();
        cmd.args(["device", "wifi", "connect", ssid]);
        if !password.is_empty() {
            cmd.args(["password", password]);
        }
        cmd.args(["ifname", self.iface.as_str()]);

        self.pending = Some(cmd.spawn().context("failed to spawn nmcli")?);
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.reap();
        match std::fs::read_to_string(&self.operstate) {
            Ok(state) => is_operstate_up(&state),
            Err(e) => {
                tracing::debug!(path = %self.operstate.display(), "operstate unreadable: {e}");
                false
            }
        }
    }
}

impl Drop for HostLink {
    fn drop(&mut self) {
        kill_child(&mut self.radio);
        kill_child(&mut self.pending);
    }
}

/// Interpret the contents of `/sys/class/net/<iface>/operstate`.
fn is_operstate_up(contents: &str) -> bool {
    contents.trim() == "up"
}
