//! In-memory catalog rebuilt from override records, plus the views derived
//! from it. Views are recomputed on demand and never stored.

mod edit;

use chrono::{Datelike, Local};

use crate::model::{Category, Content, FavoriteSet, OverrideMap, OverridePatch, ProgressMap};

pub(crate) use edit::{EditDraft, add_episode, apply_edit, new_content_id, remove_episode};

const CONTINUE_WATCHING_MIN_SECS: f64 = 10.0;
const UNKNOWN_DURATION_MIN_SECS: f64 = 60.0;
/// Shown when progress exists but the episode length is unknown.
const UNKNOWN_DURATION_PERCENT: u8 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum View {
    Home,
    Favorites,
    Category(Category),
}

pub(crate) fn current_year() -> i32 {
    Local::now().year()
}

/// One content entry per override record, in persisted order, with defaults
/// for every absent field.
pub(crate) fn reconcile(overrides: &OverrideMap, current_year: i32) -> Vec<Content> {
    overrides
        .iter()
        .map(|(id, patch)| {
            let base = Content::placeholder(id, current_year);
            Content {
                id: id.to_string(),
                title: patch.title.clone().unwrap_or(base.title),
                description: patch.description.clone().unwrap_or(base.description),
                poster_url: patch.poster_url.clone().unwrap_or(base.poster_url),
                banner_url: patch.banner_url.clone().unwrap_or(base.banner_url),
                category: patch.category.unwrap_or(base.category),
                relevance: patch.relevance.unwrap_or(base.relevance),
                year: patch.year.filter(|year| *year != 0).unwrap_or(base.year),
                age_rating: patch.age_rating.clone().unwrap_or(base.age_rating),
                genres: patch.genres.clone().unwrap_or(base.genres),
                video_url: patch.video_url.clone(),
                episodes: patch.episodes.clone().unwrap_or(base.episodes),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Catalog {
    contents: Vec<Content>,
    favorites: FavoriteSet,
    progress: ProgressMap,
    current_year: i32,
}

impl Catalog {
    pub(crate) fn from_parts(
        overrides: &OverrideMap,
        favorites: FavoriteSet,
        progress: ProgressMap,
        current_year: i32,
    ) -> Self {
        Self {
            contents: reconcile(overrides, current_year),
            favorites,
            progress,
            current_year,
        }
    }

    #[cfg(test)]
    pub(crate) fn contents(&self) -> &[Content] {
        &self.contents
    }

    pub(crate) fn favorites(&self) -> &FavoriteSet {
        &self.favorites
    }

    pub(crate) fn progress(&self) -> &ProgressMap {
        &self.progress
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Content> {
        self.contents.iter().find(|content| content.id == id)
    }

    pub(crate) fn is_favorite(&self, id: &str) -> bool {
        self.favorites.contains(id)
    }

    pub(crate) fn set_favorites(&mut self, favorites: FavoriteSet) {
        self.favorites = favorites;
    }

    pub(crate) fn set_progress(&mut self, progress: ProgressMap) {
        self.progress = progress;
    }

    /// Applies an edit to the entry with `id`, creating it at the front of
    /// the list when it does not exist yet.
    pub(crate) fn upsert(&mut self, id: &str, patch: &OverridePatch) -> &Content {
        match self.contents.iter().position(|content| content.id == id) {
            Some(index) => {
                let updated = apply_edit(Some(&self.contents[index]), id, patch, self.current_year);
                self.contents[index] = updated;
                &self.contents[index]
            }
            None => {
                let created = apply_edit(None, id, patch, self.current_year);
                self.contents.insert(0, created);
                &self.contents[0]
            }
        }
    }

    pub(crate) fn view(&self, view: View) -> Vec<&Content> {
        self.contents
            .iter()
            .filter(|content| match view {
                View::Home => true,
                View::Favorites => self.favorites.contains(&content.id),
                View::Category(category) => content.category == category,
            })
            .collect()
    }

    /// Entries watched past the first few seconds, most recent first.
    pub(crate) fn continue_watching(&self) -> Vec<&Content> {
        let mut watched: Vec<&Content> = self
            .contents
            .iter()
            .filter(|content| {
                self.progress
                    .get(&content.id)
                    .is_some_and(|record| record.position_secs > CONTINUE_WATCHING_MIN_SECS)
            })
            .collect();
        watched.sort_by_key(|content| {
            std::cmp::Reverse(
                self.progress
                    .get(&content.id)
                    .map_or(0, |record| record.last_updated_ms),
            )
        });
        watched
    }

    /// Display-only percentage for a card's progress bar.
    pub(crate) fn card_progress(&self, content: &Content) -> u8 {
        let Some(record) = self.progress.get(&content.id) else {
            return 0;
        };

        if !content.category.is_movie()
            && let Some(episode_id) = record.episode_id.as_deref()
            && let Some(episode) = content.episode(episode_id)
            && episode.duration_secs > 0
        {
            let percent = record.position_secs / f64::from(episode.duration_secs) * 100.0;
            return percent.min(100.0).round().max(0.0) as u8;
        }

        if record.position_secs > UNKNOWN_DURATION_MIN_SECS {
            UNKNOWN_DURATION_PERCENT
        } else {
            0
        }
    }
}
