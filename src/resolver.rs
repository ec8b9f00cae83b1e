//! Turns user-supplied video links into something a player can open.
//!
//! Resolution is best effort: a link that matches nothing is handed back
//! unchanged and played through the generic embed surface.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

const YOUTUBE_EMBED_FLAGS: &str = "autoplay=1&modestbranding=1&rel=0&playsinline=1&controls=1";
const DRIVE_HOST: &str = "drive.google.com";
const DROPBOX_HOST: &str = "dropbox.com";
const DROPBOX_DIRECT_HOST: &str = "dl.dropboxusercontent.com";
const DIRECT_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".ogg"];

static YOUTUBE_ID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtu\.be/|youtube\.com/(?:embed/|v/|watch\?v=|shorts/|watch\?.+&v=))([A-Za-z0-9_-]{11})",
    )
    .ok()
});
static DRIVE_FILE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:file/d/|id=)([A-Za-z0-9_-]+)").ok());
static DROPBOX_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"https://(?:www\.)?dropbox\.com").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaybackMode {
    /// Opaque third-party page; the play head cannot be observed.
    Embed,
    /// Raw media file played natively; position is observable.
    Direct,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embed => f.write_str("embed"),
            Self::Direct => f.write_str("direct"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedSource {
    pub(crate) playable_url: String,
    pub(crate) mode: PlaybackMode,
}

impl ResolvedSource {
    pub(crate) fn is_playable(&self) -> bool {
        !self.playable_url.is_empty()
    }
}

pub(crate) fn resolve(raw: Option<&str>) -> ResolvedSource {
    let playable_url = normalize_video_url(raw);
    let mode = playback_mode(&playable_url);
    ResolvedSource { playable_url, mode }
}

pub(crate) fn normalize_video_url(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let clean = raw.trim();
    if clean.is_empty() {
        return String::new();
    }

    if let Some(id) = youtube_video_id(clean) {
        return format!("https://www.youtube.com/embed/{id}?{YOUTUBE_EMBED_FLAGS}");
    }

    if clean.contains(DRIVE_HOST) {
        if clean.contains("/preview") {
            return clean.to_string();
        }
        if let Some(id) = capture_first(&DRIVE_FILE_ID, clean) {
            return format!("https://{DRIVE_HOST}/file/d/{id}/preview");
        }
    }

    if clean.contains(DROPBOX_HOST)
        && let Some(re) = DROPBOX_PREFIX.as_ref()
    {
        return re
            .replacen(clean, 1, format!("https://{DROPBOX_DIRECT_HOST}"))
            .into_owned();
    }

    clean.to_string()
}

pub(crate) fn youtube_video_id(url: &str) -> Option<&str> {
    capture_first(&YOUTUBE_ID, url)
}

/// Sharing sites always play embedded; anything else is direct only when it
/// is a raw file or lives on the direct-content host.
pub(crate) fn playback_mode(url: &str) -> PlaybackMode {
    let is_video_site = url.contains("youtube.com") || url.contains("youtu.be");
    if is_video_site || url.contains(DRIVE_HOST) {
        return PlaybackMode::Embed;
    }

    let lower = url.to_lowercase();
    let is_raw_file = DIRECT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
    if is_raw_file || url.contains(DROPBOX_DIRECT_HOST) {
        PlaybackMode::Direct
    } else {
        PlaybackMode::Embed
    }
}

fn capture_first<'a>(re: &LazyLock<Option<Regex>>, haystack: &'a str) -> Option<&'a str> {
    let re = re.as_ref()?;
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMBED: &str = "https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1&modestbranding=1&rel=0&playsinline=1&controls=1";

    #[test]
    fn youtube_shapes_resolve_to_the_same_embed_url() {
        let shapes = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=10",
            "  https://m.youtube.com/watch?v=dQw4w9WgXcQ  ",
        ];
        for shape in shapes {
            let resolved = resolve(Some(shape));
            assert_eq!(resolved.playable_url, EMBED, "shape {shape}");
            assert_eq!(resolved.mode, PlaybackMode::Embed, "shape {shape}");
        }
    }

    #[test]
    fn short_link_extracts_identifier() {
        let resolved = resolve(Some("https://youtu.be/aaaaaaaaaaa"));
        assert_eq!(resolved.mode, PlaybackMode::Embed);
        assert_eq!(youtube_video_id(&resolved.playable_url), Some("aaaaaaaaaaa"));
        assert!(resolved.playable_url.contains("/embed/aaaaaaaaaaa?"));
    }

    #[test]
    fn empty_or_missing_input_is_not_playable() {
        for raw in [None, Some(""), Some("   ")] {
            let resolved = resolve(raw);
            assert_eq!(resolved.playable_url, "");
            assert!(!resolved.is_playable());
        }
    }

    #[test]
    fn drive_links_become_preview_embeds() {
        let from_path = resolve(Some(
            "https://drive.google.com/file/d/1AbC_d-9xyz/view?usp=sharing",
        ));
        assert_eq!(
            from_path.playable_url,
            "https://drive.google.com/file/d/1AbC_d-9xyz/preview"
        );
        assert_eq!(from_path.mode, PlaybackMode::Embed);

        let from_query = resolve(Some("https://drive.google.com/open?id=1AbC_d-9xyz"));
        assert_eq!(
            from_query.playable_url,
            "https://drive.google.com/file/d/1AbC_d-9xyz/preview"
        );
    }

    #[test]
    fn drive_preview_links_pass_through() {
        let url = "https://drive.google.com/file/d/XYZ/preview";
        assert_eq!(resolve(Some(url)).playable_url, url);
    }

    #[test]
    fn drive_link_without_identifier_falls_through_unchanged() {
        let url = "https://drive.google.com/drive/folders";
        let resolved = resolve(Some(url));
        assert_eq!(resolved.playable_url, url);
        assert_eq!(resolved.mode, PlaybackMode::Embed);
    }

    #[test]
    fn dropbox_share_links_are_rewritten_to_direct_host() {
        for raw in [
            "https://www.dropbox.com/s/abc123/movie.mp4?dl=0",
            "https://dropbox.com/s/abc123/movie.mp4?dl=0",
        ] {
            let resolved = resolve(Some(raw));
            assert_eq!(
                resolved.playable_url,
                "https://dl.dropboxusercontent.com/s/abc123/movie.mp4?dl=0"
            );
            assert_eq!(resolved.mode, PlaybackMode::Direct);
        }
    }

    #[test]
    fn direct_host_urls_are_direct() {
        let resolved = resolve(Some(
            "https://dl.dropboxusercontent.com/s/abc123/movie.mp4",
        ));
        assert_eq!(resolved.mode, PlaybackMode::Direct);
        assert_eq!(
            resolved.playable_url,
            "https://dl.dropboxusercontent.com/s/abc123/movie.mp4"
        );
    }

    #[test]
    fn raw_file_extensions_are_direct_case_insensitively() {
        for raw in [
            "https://cdn.example.test/a.mp4",
            "https://cdn.example.test/a.WEBM",
            "https://cdn.example.test/a.ogg",
        ] {
            assert_eq!(resolve(Some(raw)).mode, PlaybackMode::Direct, "{raw}");
        }
    }

    #[test]
    fn unknown_links_pass_through_as_embed() {
        let url = "https://player.example.test/watch/123";
        let resolved = resolve(Some(url));
        assert_eq!(resolved.playable_url, url);
        assert_eq!(resolved.mode, PlaybackMode::Embed);

        let garbage = resolve(Some("not a url at all"));
        assert_eq!(garbage.playable_url, "not a url at all");
        assert_eq!(garbage.mode, PlaybackMode::Embed);
    }

    #[test]
    fn youtube_link_without_identifier_stays_embedded() {
        let resolved = resolve(Some("https://www.youtube.com/watch?v=short.mp4"));
        assert_eq!(resolved.mode, PlaybackMode::Embed);
    }
}
