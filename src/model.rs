use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub(crate) const DEFAULT_TITLE: &str = "New Content";
pub(crate) const DEFAULT_AGE_RATING: &str = "L";
pub(crate) const PLACEHOLDER_POSTER: &str = "https://via.placeholder.com/300x450?text=Poster";
pub(crate) const PLACEHOLDER_BANNER: &str = "https://via.placeholder.com/1200x600?text=Banner";
pub(crate) const PLACEHOLDER_EPISODE_THUMB: &str = "https://via.placeholder.com/300x170";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum Category {
    #[default]
    #[serde(alias = "filmes")]
    Movie,
    #[serde(alias = "novelas")]
    SoapOpera,
    Series,
}

impl Category {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::SoapOpera => "soap-opera",
            Self::Series => "series",
        }
    }

    pub(crate) fn is_movie(self) -> bool {
        matches!(self, Self::Movie)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Episode {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) video_url: String,
    #[serde(default, rename = "thumbnail")]
    pub(crate) thumbnail_url: String,
    /// Zero means the duration is not known.
    #[serde(default, rename = "duration")]
    pub(crate) duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Content {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) poster_url: String,
    pub(crate) banner_url: String,
    pub(crate) category: Category,
    pub(crate) relevance: u32,
    pub(crate) year: i32,
    pub(crate) age_rating: String,
    pub(crate) genres: BTreeSet<String>,
    pub(crate) video_url: Option<String>,
    pub(crate) episodes: Vec<Episode>,
}

impl Content {
    /// Entry built purely from defaults, the base every override is layered on.
    pub(crate) fn placeholder(id: &str, current_year: i32) -> Self {
        Self {
            id: id.to_string(),
            title: DEFAULT_TITLE.to_string(),
            description: String::new(),
            poster_url: PLACEHOLDER_POSTER.to_string(),
            banner_url: PLACEHOLDER_BANNER.to_string(),
            category: Category::Movie,
            relevance: 0,
            year: current_year,
            age_rating: DEFAULT_AGE_RATING.to_string(),
            genres: BTreeSet::new(),
            video_url: None,
            episodes: Vec::new(),
        }
    }

    pub(crate) fn episode(&self, episode_id: &str) -> Option<&Episode> {
        self.episodes.iter().find(|episode| episode.id == episode_id)
    }
}

/// Form inputs stored by older clients may hold fractions or numeric
/// strings. Those are rounded; anything else reads as unset.
fn lenient_number(value: &Value) -> Option<i64> {
    let float = match value {
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                return Some(int);
            }
            number.as_f64()?
        }
        Value::String(raw) => raw.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    float.is_finite().then(|| float.round() as i64)
}

pub(crate) fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(&value).and_then(|number| u32::try_from(number).ok()))
}

pub(crate) fn lenient_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(&value).and_then(|number| i32::try_from(number).ok()))
}

/// Sparse patch over every field of [`Content`].
///
/// Serialized with the field names the catalog has always been stored under,
/// so local fallback data written by older builds keeps loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct OverridePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    #[serde(rename = "thumbnailUrl", skip_serializing_if = "Option::is_none")]
    pub(crate) poster_url: Option<String>,
    #[serde(rename = "coverUrl", skip_serializing_if = "Option::is_none")]
    pub(crate) banner_url: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) category: Option<Category>,
    #[serde(
        rename = "match",
        deserialize_with = "lenient_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) relevance: Option<u32>,
    #[serde(deserialize_with = "lenient_i32", skip_serializing_if = "Option::is_none")]
    pub(crate) year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) age_rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) genres: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) video_url: Option<String>,
    #[serde(rename = "customEpisodes", skip_serializing_if = "Option::is_none")]
    pub(crate) episodes: Option<Vec<Episode>>,
}

impl OverridePatch {
    /// Layers `newer` over `self`; every field present in `newer` wins.
    pub(crate) fn merged_with(self, newer: OverridePatch) -> OverridePatch {
        OverridePatch {
            title: newer.title.or(self.title),
            description: newer.description.or(self.description),
            poster_url: newer.poster_url.or(self.poster_url),
            banner_url: newer.banner_url.or(self.banner_url),
            category: newer.category.or(self.category),
            relevance: newer.relevance.or(self.relevance),
            year: newer.year.or(self.year),
            age_rating: newer.age_rating.or(self.age_rating),
            genres: newer.genres.or(self.genres),
            video_url: newer.video_url.or(self.video_url),
            episodes: newer.episodes.or(self.episodes),
        }
    }

    /// Every field of `content` as present values.
    #[cfg(test)]
    pub(crate) fn snapshot(content: &Content) -> OverridePatch {
        OverridePatch {
            title: Some(content.title.clone()),
            description: Some(content.description.clone()),
            poster_url: Some(content.poster_url.clone()),
            banner_url: Some(content.banner_url.clone()),
            category: Some(content.category),
            relevance: Some(content.relevance),
            year: Some(content.year),
            age_rating: Some(content.age_rating.clone()),
            genres: Some(content.genres.clone()),
            video_url: content.video_url.clone(),
            episodes: Some(content.episodes.clone()),
        }
    }
}

/// Override records keyed by content id, in the order they were persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct OverrideMap {
    entries: Vec<(String, OverridePatch)>,
}

impl OverrideMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&OverridePatch> {
        self.entries
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, patch)| patch)
    }

    /// Replaces the patch for an existing id in place, or appends a new entry.
    pub(crate) fn insert(&mut self, id: String, patch: OverridePatch) {
        match self.entries.iter_mut().find(|(entry_id, _)| *entry_id == id) {
            Some((_, existing)) => *existing = patch,
            None => self.entries.push((id, patch)),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &OverridePatch)> {
        self.entries
            .iter()
            .map(|(id, patch)| (id.as_str(), patch))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, OverridePatch)> for OverrideMap {
    fn from_iter<I: IntoIterator<Item = (String, OverridePatch)>>(iter: I) -> Self {
        let mut map = OverrideMap::new();
        for (id, patch) in iter {
            map.insert(id, patch);
        }
        map
    }
}

impl Serialize for OverrideMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, patch) in &self.entries {
            map.serialize_entry(id, patch)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OverrideMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OverrideMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of content ids to override patches")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = OverrideMap::new();
                while let Some((id, patch)) = access.next_entry::<String, OverridePatch>()? {
                    map.insert(id, patch);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressRecord {
    #[serde(rename = "timestamp")]
    pub(crate) position_secs: f64,
    /// Epoch milliseconds of the last write.
    #[serde(default, rename = "lastUpdated")]
    pub(crate) last_updated_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) episode_id: Option<String>,
}

pub(crate) type ProgressMap = HashMap<String, ProgressRecord>;
pub(crate) type FavoriteSet = BTreeSet<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_numbers_are_rounded_or_dropped() {
        let raw = r#"{"match":97.5,"year":"2021"}"#;
        let patch: OverridePatch = serde_json::from_str(raw).expect("patch should parse");
        assert_eq!(patch.relevance, Some(98));
        assert_eq!(patch.year, Some(2021));

        let raw = r#"{"match":-4,"year":"soon","title":"Kept"}"#;
        let patch: OverridePatch = serde_json::from_str(raw).expect("patch should parse");
        assert_eq!(patch.relevance, None);
        assert_eq!(patch.year, None);
        assert_eq!(patch.title.as_deref(), Some("Kept"));
    }

    #[test]
    fn category_accepts_legacy_tokens() {
        let parsed: Vec<Category> =
            serde_json::from_str(r#"["filmes","novelas","series","soap-opera","movie"]"#)
                .expect("categories should parse");
        assert_eq!(
            parsed,
            vec![
                Category::Movie,
                Category::SoapOpera,
                Category::Series,
                Category::SoapOpera,
                Category::Movie
            ]
        );
        assert_eq!(
            serde_json::to_string(&Category::SoapOpera).expect("serialize"),
            "\"soap-opera\""
        );
    }

    #[test]
    fn override_patch_uses_stored_field_names() {
        let raw = r#"{"title":"Dune","thumbnailUrl":"p.jpg","type":"filmes","match":97,"customEpisodes":[]}"#;
        let patch: OverridePatch = serde_json::from_str(raw).expect("patch should parse");
        assert_eq!(patch.title.as_deref(), Some("Dune"));
        assert_eq!(patch.poster_url.as_deref(), Some("p.jpg"));
        assert_eq!(patch.category, Some(Category::Movie));
        assert_eq!(patch.relevance, Some(97));
        assert_eq!(patch.episodes, Some(Vec::new()));
        assert_eq!(patch.description, None);

        let written = serde_json::to_string(&patch).expect("serialize");
        assert!(!written.contains("description"), "absent fields are omitted: {written}");
    }

    #[test]
    fn merged_with_prefers_present_fields_of_newer_patch() {
        let stored = OverridePatch {
            title: Some("Old".to_string()),
            year: Some(1999),
            ..OverridePatch::default()
        };
        let newer = OverridePatch {
            title: Some("New".to_string()),
            age_rating: Some("14".to_string()),
            ..OverridePatch::default()
        };
        let merged = stored.merged_with(newer);
        assert_eq!(merged.title.as_deref(), Some("New"));
        assert_eq!(merged.year, Some(1999));
        assert_eq!(merged.age_rating.as_deref(), Some("14"));
    }

    #[test]
    fn override_map_keeps_document_order() {
        let raw = r#"{"zeta":{"title":"Z"},"alpha":{"title":"A"},"mid":{}}"#;
        let map: OverrideMap = serde_json::from_str(raw).expect("map should parse");
        let ids: Vec<&str> = map.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);

        let round = serde_json::to_string(&map).expect("serialize");
        assert!(round.find("zeta") < round.find("alpha"));
    }

    #[test]
    fn override_map_insert_replaces_in_place() {
        let mut map = OverrideMap::new();
        map.insert("a".to_string(), OverridePatch::default());
        map.insert("b".to_string(), OverridePatch::default());
        map.insert(
            "a".to_string(),
            OverridePatch {
                title: Some("A".to_string()),
                ..OverridePatch::default()
            },
        );
        let ids: Vec<&str> = map.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(map.get("a").and_then(|p| p.title.as_deref()), Some("A"));
    }

    #[test]
    fn progress_record_reads_stored_payload() {
        let raw = r#"{"timestamp":42.5,"lastUpdated":1700000000000,"episodeId":"ep-1"}"#;
        let record: ProgressRecord = serde_json::from_str(raw).expect("record should parse");
        assert_eq!(record.position_secs, 42.5);
        assert_eq!(record.last_updated_ms, 1_700_000_000_000);
        assert_eq!(record.episode_id.as_deref(), Some("ep-1"));
    }
}
