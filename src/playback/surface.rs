use std::time::Duration;

use anyhow::Result;

use super::PlayingDescriptor;

/// Outcome of a fullscreen or orientation request. Callers are free to
/// discard it; a denied request never aborts playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CapabilityResult {
    Granted,
    Denied(String),
}

impl CapabilityResult {
    pub(crate) fn denied(reason: impl Into<String>) -> Self {
        Self::Denied(reason.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SurfaceEvent {
    /// The play head moved to this position, in seconds.
    PlayHead(f64),
    /// Nothing happened within the wait window.
    Idle,
    /// The player is gone.
    Closed,
}

/// Something that can show a resolved source and, for direct files, report
/// where the play head is.
pub(crate) trait PlaybackSurface {
    fn load(&mut self, descriptor: &PlayingDescriptor) -> Result<()>;
    fn request_fullscreen(&mut self) -> CapabilityResult;
    fn exit_fullscreen(&mut self) -> CapabilityResult;
    fn lock_landscape(&mut self) -> CapabilityResult;
    fn unlock_orientation(&mut self) -> CapabilityResult;
    fn force_play(&mut self) -> CapabilityResult;
    /// Blocks for at most `wait` and reports what the player did meanwhile.
    fn next_event(&mut self, wait: Duration) -> SurfaceEvent;
}
