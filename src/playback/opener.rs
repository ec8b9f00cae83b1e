use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use super::PlayingDescriptor;
use super::interrupt::restore_default_signals;
use super::surface::{CapabilityResult, PlaybackSurface, SurfaceEvent};

const OPAQUE: &str = "embedded players are controlled by the browser";

/// Hands an embed URL to the desktop opener. Nothing can be observed once
/// the browser has it, so the surface closes right after loading.
pub(crate) struct OpenerSurface {
    opener_bin: PathBuf,
}

impl OpenerSurface {
    pub(crate) fn new(opener_bin: impl Into<PathBuf>) -> Self {
        Self {
            opener_bin: opener_bin.into(),
        }
    }
}

impl PlaybackSurface for OpenerSurface {
    fn load(&mut self, descriptor: &PlayingDescriptor) -> Result<()> {
        let mut cmd = Command::new(&self.opener_bin);
        cmd.arg(&descriptor.resolved_url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        restore_default_signals(&mut cmd);

        let status = cmd
            .status()
            .with_context(|| format!("failed to launch {}", self.opener_bin.display()))?;
        if !status.success() {
            bail!("{} exited with {status}", self.opener_bin.display());
        }
        Ok(())
    }

    fn request_fullscreen(&mut self) -> CapabilityResult {
        CapabilityResult::denied(OPAQUE)
    }

    fn exit_fullscreen(&mut self) -> CapabilityResult {
        CapabilityResult::denied(OPAQUE)
    }

    fn lock_landscape(&mut self) -> CapabilityResult {
        CapabilityResult::denied(OPAQUE)
    }

    fn unlock_orientation(&mut self) -> CapabilityResult {
        CapabilityResult::denied(OPAQUE)
    }

    fn force_play(&mut self) -> CapabilityResult {
        CapabilityResult::denied(OPAQUE)
    }

    fn next_event(&mut self, _wait: Duration) -> SurfaceEvent {
        SurfaceEvent::Closed
    }
}
