use std::collections::BTreeSet;

use crate::model::{
    Category, Content, Episode, OverridePatch, PLACEHOLDER_EPISODE_THUMB,
};

const NEW_EPISODE_DESCRIPTION: &str = "Episode synopsis...";

/// Layers `patch` over `existing` one field at a time. Text fields, genres,
/// category and episodes take any present value, empty included; relevance
/// and year only take non-zero values. Episodes are replaced wholesale.
pub(crate) fn apply_edit(
    existing: Option<&Content>,
    id: &str,
    patch: &OverridePatch,
    current_year: i32,
) -> Content {
    let base = existing
        .cloned()
        .unwrap_or_else(|| Content::placeholder(id, current_year));

    Content {
        id: base.id,
        title: patch.title.clone().unwrap_or(base.title),
        description: patch.description.clone().unwrap_or(base.description),
        poster_url: patch.poster_url.clone().unwrap_or(base.poster_url),
        banner_url: patch.banner_url.clone().unwrap_or(base.banner_url),
        category: patch.category.unwrap_or(base.category),
        relevance: patch
            .relevance
            .filter(|relevance| *relevance != 0)
            .unwrap_or(base.relevance),
        year: patch.year.filter(|year| *year != 0).unwrap_or(base.year),
        age_rating: patch.age_rating.clone().unwrap_or(base.age_rating),
        genres: patch.genres.clone().unwrap_or(base.genres),
        video_url: patch.video_url.clone().or(base.video_url),
        episodes: patch.episodes.clone().unwrap_or(base.episodes),
    }
}

pub(crate) fn new_content_id(now_ms: i64) -> String {
    format!("custom-{now_ms}")
}

/// Appends a fresh episode. Episodes and the movie category exclude each
/// other, so a movie becomes a soap-opera here.
pub(crate) fn add_episode(content: &Content, now_ms: i64) -> Content {
    let mut updated = content.clone();
    if updated.category.is_movie() {
        updated.category = Category::SoapOpera;
    }

    let thumbnail_url = [&content.poster_url, &content.banner_url]
        .into_iter()
        .find(|url| !url.is_empty())
        .cloned()
        .unwrap_or_else(|| PLACEHOLDER_EPISODE_THUMB.to_string());

    updated.episodes.push(Episode {
        id: unique_episode_id(&content.episodes, now_ms),
        title: format!("Episode {}", content.episodes.len() + 1),
        description: NEW_EPISODE_DESCRIPTION.to_string(),
        video_url: String::new(),
        thumbnail_url,
        duration_secs: 0,
    });
    updated
}

/// Returns `None` when no episode has `episode_id`.
pub(crate) fn remove_episode(content: &Content, episode_id: &str) -> Option<Content> {
    let index = content
        .episodes
        .iter()
        .position(|episode| episode.id == episode_id)?;
    let mut updated = content.clone();
    updated.episodes.remove(index);
    Some(updated)
}

fn unique_episode_id(existing: &[Episode], now_ms: i64) -> String {
    let mut stamp = now_ms;
    loop {
        let candidate = format!("custom-ep-{stamp}");
        if existing.iter().all(|episode| episode.id != candidate) {
            return candidate;
        }
        stamp += 1;
    }
}

/// Field values as entered in an edit form, before they become a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EditDraft {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) poster_url: String,
    pub(crate) banner_url: String,
    pub(crate) video_url: String,
    pub(crate) category: Category,
    pub(crate) relevance: u32,
    pub(crate) year: i32,
    pub(crate) age_rating: String,
    pub(crate) genres: String,
    pub(crate) episodes: Vec<Episode>,
}

impl EditDraft {
    pub(crate) fn from_content(content: &Content) -> Self {
        Self {
            title: content.title.clone(),
            description: content.description.clone(),
            poster_url: content.poster_url.clone(),
            banner_url: content.banner_url.clone(),
            video_url: content.video_url.clone().unwrap_or_default(),
            category: content.category,
            relevance: content.relevance,
            year: content.year,
            age_rating: content.age_rating.clone(),
            genres: content
                .genres
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            episodes: content.episodes.clone(),
        }
    }

    /// Blank text inputs are left out so they never wipe stored values; the
    /// video URL is only kept for movies and the episode list only when it
    /// has entries or the content is not a movie.
    pub(crate) fn into_patch(self) -> OverridePatch {
        let non_empty = |value: String| (!value.is_empty()).then_some(value);
        let is_movie = self.category.is_movie();

        OverridePatch {
            title: non_empty(self.title),
            description: non_empty(self.description),
            poster_url: non_empty(self.poster_url),
            banner_url: non_empty(self.banner_url),
            category: Some(self.category),
            relevance: Some(self.relevance),
            year: Some(self.year),
            age_rating: Some(self.age_rating),
            genres: Some(parse_genres(&self.genres)),
            video_url: (is_movie && !self.video_url.is_empty()).then_some(self.video_url),
            episodes: (!self.episodes.is_empty() || !is_movie).then_some(self.episodes),
        }
    }
}

pub(crate) fn parse_genres(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|genre| !genre.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie() -> Content {
        let mut content = Content::placeholder("custom-1", 2026);
        content.title = "Dune".to_string();
        content.video_url = Some("https://cdn.example.test/dune.mp4".to_string());
        content
    }

    #[test]
    fn parse_genres_trims_and_drops_blanks() {
        let genres = parse_genres(" Drama, ,Sci-Fi ,Drama");
        assert_eq!(
            genres.into_iter().collect::<Vec<_>>(),
            vec!["Drama".to_string(), "Sci-Fi".to_string()]
        );
    }

    #[test]
    fn draft_for_movie_keeps_video_and_skips_empty_episode_list() {
        let mut draft = EditDraft::from_content(&movie());
        draft.description.clear();

        let patch = draft.into_patch();
        assert_eq!(
            patch.video_url.as_deref(),
            Some("https://cdn.example.test/dune.mp4")
        );
        assert_eq!(patch.episodes, None);
        assert_eq!(patch.description, None);
        assert_eq!(patch.category, Some(Category::Movie));
    }

    #[test]
    fn draft_for_series_drops_video_and_always_sends_episodes() {
        let mut draft = EditDraft::from_content(&movie());
        draft.category = Category::Series;

        let patch = draft.into_patch();
        assert_eq!(patch.video_url, None);
        assert_eq!(patch.episodes, Some(Vec::new()));
    }

    #[test]
    fn remove_episode_reports_unknown_ids() {
        let with_episode = add_episode(&movie(), 10);
        let episode_id = with_episode.episodes[0].id.clone();
        assert!(remove_episode(&with_episode, "nope").is_none());
        let removed = remove_episode(&with_episode, &episode_id).expect("episode exists");
        assert!(removed.episodes.is_empty());
        assert_eq!(removed.category, Category::SoapOpera);
    }

    #[test]
    fn episode_ids_stay_unique_within_a_burst() {
        let first = add_episode(&movie(), 500);
        let second = add_episode(&first, 500);
        assert_eq!(second.episodes.len(), 2);
        assert_ne!(second.episodes[0].id, second.episodes[1].id);
        assert_eq!(second.episodes[1].title, "Episode 2");
    }

    #[test]
    fn new_episode_thumbnail_falls_back_through_images() {
        let mut content = movie();
        content.poster_url.clear();
        let updated = add_episode(&content, 1);
        assert_eq!(updated.episodes[0].thumbnail_url, content.banner_url);

        content.banner_url.clear();
        let updated = add_episode(&content, 1);
        assert_eq!(updated.episodes[0].thumbnail_url, PLACEHOLDER_EPISODE_THUMB);
    }
}
