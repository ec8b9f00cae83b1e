//! Playback sessions: where to start, which surface shows the source, and
//! when the play head gets persisted.

mod debounce;
mod interrupt;
mod mpv;
mod opener;
mod surface;

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info};

use crate::model::{Content, Episode, ProgressMap};
use crate::resolver::{self, PlaybackMode};
use crate::store::ProgressSink;

use debounce::DebounceTimer;
pub(crate) use interrupt::with_interrupts_ignored;
pub(crate) use mpv::MpvSurface;
pub(crate) use opener::OpenerSurface;
pub(crate) use surface::{CapabilityResult, PlaybackSurface, SurfaceEvent};

pub(crate) const SAVE_DEBOUNCE: Duration = Duration::from_secs(2);
/// Positions at or below this are never written.
pub(crate) const MIN_SAVED_POSITION_SECS: f64 = 5.0;
const MAX_EVENT_WAIT: Duration = Duration::from_millis(250);

/// Everything a surface needs to show one movie or episode.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlayingDescriptor {
    pub(crate) content_id: String,
    pub(crate) episode_id: Option<String>,
    pub(crate) title: String,
    pub(crate) subtitle: Option<String>,
    pub(crate) resolved_url: String,
    pub(crate) start_offset_secs: f64,
    pub(crate) mode: PlaybackMode,
}

impl PlayingDescriptor {
    /// Describes playback of `episode`, or of the content itself when no
    /// episode is given.
    pub(crate) fn start(content: &Content, episode: Option<&Episode>, progress: &ProgressMap) -> Self {
        let raw_url = match episode {
            Some(episode) => Some(episode.video_url.as_str()),
            None => content.video_url.as_deref(),
        };
        let source = resolver::resolve(raw_url);

        let (title, subtitle) = match episode {
            Some(episode) => (episode.title.clone(), Some(content.title.clone())),
            None => (content.title.clone(), None),
        };

        Self {
            content_id: content.id.clone(),
            episode_id: episode.map(|episode| episode.id.clone()),
            title,
            subtitle,
            resolved_url: source.playable_url,
            start_offset_secs: start_offset(&content.id, episode, progress),
            mode: source.mode,
        }
    }
}

/// Stored position for a content, or for an episode when the stored record
/// belongs to that same episode. Anything else starts from zero.
pub(crate) fn start_offset(content_id: &str, episode: Option<&Episode>, progress: &ProgressMap) -> f64 {
    let Some(record) = progress.get(content_id) else {
        return 0.0;
    };
    match episode {
        None => record.position_secs,
        Some(episode) if record.episode_id.as_deref() == Some(episode.id.as_str()) => {
            record.position_secs
        }
        Some(_) => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SessionEnd {
    pub(crate) last_position_secs: Option<f64>,
    pub(crate) saves: usize,
}

/// One running playback. Direct sources re-arm a debounce timer on every
/// play-head observation and persist the position once it settles. Embedded
/// sources are shown and never persisted.
pub(crate) struct PlaybackSession<'a, S: PlaybackSurface> {
    surface: S,
    descriptor: PlayingDescriptor,
    sink: &'a dyn ProgressSink,
    pending_save: DebounceTimer<f64>,
    last_position: Option<f64>,
    saves: usize,
    closed: bool,
}

impl<'a, S: PlaybackSurface> PlaybackSession<'a, S> {
    pub(crate) fn open(
        mut surface: S,
        descriptor: PlayingDescriptor,
        sink: &'a dyn ProgressSink,
    ) -> Result<Self> {
        surface.load(&descriptor)?;
        info!(
            content_id = %descriptor.content_id,
            episode_id = descriptor.episode_id.as_deref().unwrap_or("-"),
            mode = %descriptor.mode,
            start = descriptor.start_offset_secs,
            "playback started"
        );

        log_capability("fullscreen", surface.request_fullscreen());
        if descriptor.mode == PlaybackMode::Direct {
            log_capability("landscape lock", surface.lock_landscape());
            log_capability("autoplay", surface.force_play());
        }

        Ok(Self {
            surface,
            descriptor,
            sink,
            pending_save: DebounceTimer::new(SAVE_DEBOUNCE),
            last_position: None,
            saves: 0,
            closed: false,
        })
    }

    pub(crate) fn on_play_head(&mut self, position_secs: f64, now: Instant) {
        if self.descriptor.mode != PlaybackMode::Direct || !position_secs.is_finite() {
            return;
        }
        self.last_position = Some(position_secs);
        self.pending_save.arm(now, position_secs);
    }

    /// Persists the pending position if its quiet window has passed.
    /// Returns the saved position.
    pub(crate) fn poll(&mut self, now: Instant) -> Option<f64> {
        let position = self.pending_save.fire_due(now)?;
        if position <= MIN_SAVED_POSITION_SECS {
            return None;
        }
        self.sink.save_progress(
            &self.descriptor.content_id,
            position,
            self.descriptor.episode_id.as_deref(),
        );
        self.saves += 1;
        debug!(content_id = %self.descriptor.content_id, position, "progress saved");
        Some(position)
    }

    /// Pumps surface events until the player goes away.
    pub(crate) fn run(mut self) -> SessionEnd {
        loop {
            let wait = self
                .pending_save
                .deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .map_or(MAX_EVENT_WAIT, |left| left.min(MAX_EVENT_WAIT));

            match self.surface.next_event(wait) {
                SurfaceEvent::PlayHead(position) => self.on_play_head(position, Instant::now()),
                SurfaceEvent::Idle => {}
                SurfaceEvent::Closed => break,
            }
            self.poll(Instant::now());
        }
        self.close()
    }

    pub(crate) fn close(mut self) -> SessionEnd {
        self.teardown();
        SessionEnd {
            last_position_secs: self.last_position,
            saves: self.saves,
        }
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(position) = self.pending_save.disarm() {
            debug!(position, "discarding unsaved play head on close");
        }
        log_capability("exit fullscreen", self.surface.exit_fullscreen());
        log_capability("orientation unlock", self.surface.unlock_orientation());
        info!(content_id = %self.descriptor.content_id, saves = self.saves, "playback ended");
    }
}

impl<S: PlaybackSurface> Drop for PlaybackSession<'_, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn log_capability(what: &str, result: CapabilityResult) {
    if let CapabilityResult::Denied(reason) = result {
        debug!("{what} unavailable: {reason}");
    }
}
