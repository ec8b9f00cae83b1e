use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{DataKind, RemoteBackend, RemoteError};
use crate::http::{HttpError, Payload, build_agent, send_text};
use crate::model::{Category, Episode, OverridePatch, lenient_i32, lenient_u32};

const OVERRIDES_TABLE: &str = "content_overrides";
const USER_DATA_TABLE: &str = "user_data";
const USER_DATA_CONFLICT_KEY: &str = "user_id,content_id,data_type";
const MISSING_TABLE_CODE: &str = "PGRST205";
/// `custom-<epoch-ms>` ids sort in creation order.
const OVERRIDES_ORDER: &str = "content_id.asc";

/// Row of the `content_overrides` table. Title, poster and video live in
/// columns; everything else rides in the `episodes_config` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct OverrideRow {
    pub(crate) content_id: String,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) thumbnail_url: Option<String>,
    #[serde(default)]
    pub(crate) video_url: Option<String>,
    #[serde(default)]
    pub(crate) episodes_config: Option<EpisodesConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct EpisodesConfig {
    #[serde(default)]
    pub(crate) full_list: Option<Vec<Episode>>,
    #[serde(default)]
    pub(crate) metadata: OverrideMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct OverrideMetadata {
    pub(crate) description: Option<String>,
    pub(crate) cover_url: Option<String>,
    #[serde(deserialize_with = "lenient_i32")]
    pub(crate) year: Option<i32>,
    pub(crate) age_rating: Option<String>,
    #[serde(rename = "match", deserialize_with = "lenient_u32")]
    pub(crate) relevance: Option<u32>,
    pub(crate) genres: Option<BTreeSet<String>>,
    #[serde(rename = "type")]
    pub(crate) category: Option<Category>,
}

impl OverrideRow {
    pub(crate) fn from_patch(content_id: &str, patch: &OverridePatch, updated_at: String) -> Self {
        Self {
            content_id: content_id.to_string(),
            title: patch.title.clone(),
            thumbnail_url: patch.poster_url.clone(),
            video_url: patch.video_url.clone(),
            episodes_config: Some(EpisodesConfig {
                full_list: patch.episodes.clone(),
                metadata: OverrideMetadata {
                    description: patch.description.clone(),
                    cover_url: patch.banner_url.clone(),
                    year: patch.year,
                    age_rating: patch.age_rating.clone(),
                    relevance: patch.relevance,
                    genres: patch.genres.clone(),
                    category: patch.category,
                },
            }),
            updated_at: Some(updated_at),
        }
    }

    pub(crate) fn into_patch(self) -> (String, OverridePatch) {
        let config = self.episodes_config.unwrap_or_default();
        let meta = config.metadata;
        let patch = OverridePatch {
            title: self.title,
            description: meta.description,
            poster_url: self.thumbnail_url,
            banner_url: meta.cover_url,
            category: meta.category,
            relevance: meta.relevance,
            year: meta.year,
            age_rating: meta.age_rating,
            genres: meta.genres,
            video_url: self.video_url,
            episodes: config.full_list,
        };
        (self.content_id, patch)
    }
}

/// Row of the per-device `user_data` table, keyed by
/// (user_id, content_id, data_type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct UserDataRow {
    pub(crate) user_id: String,
    pub(crate) content_id: String,
    pub(crate) data_type: DataKind,
    #[serde(default)]
    pub(crate) payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) updated_at: Option<String>,
}

/// PostgREST tables plus an object-storage bucket behind one base URL.
pub(crate) struct PostgrestBackend {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl PostgrestBackend {
    pub(crate) fn new(
        base_url: &str,
        api_key: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            agent: build_agent(connect_timeout, read_timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authorized(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
    }

    /// Decodes a row array one row at a time; rows that do not fit `T` are
    /// logged and skipped so one bad record never hides the rest.
    fn fetch_rows<T: for<'de> Deserialize<'de>>(
        &self,
        request: ureq::Request,
    ) -> Result<Vec<T>, RemoteError> {
        let body = send_text(self.authorized(request), Payload::Empty).map_err(map_http_error)?;
        decode_rows(&body)
    }

    fn write(&self, request: ureq::Request, payload: Payload<'_>) -> Result<(), RemoteError> {
        send_text(self.authorized(request), payload)
            .map(|_| ())
            .map_err(map_http_error)
    }

    fn public_object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}

impl RemoteBackend for PostgrestBackend {
    fn select_overrides(&self) -> Result<Vec<OverrideRow>, RemoteError> {
        let request = self
            .agent
            .get(&self.table_url(OVERRIDES_TABLE))
            .query("select", "*")
            .query("order", OVERRIDES_ORDER);
        self.fetch_rows(request)
    }

    fn select_override(&self, content_id: &str) -> Result<Option<OverrideRow>, RemoteError> {
        let request = self
            .agent
            .get(&self.table_url(OVERRIDES_TABLE))
            .query("select", "*")
            .query("content_id", &format!("eq.{content_id}"))
            .query("limit", "1");
        let rows: Vec<OverrideRow> = self.fetch_rows(request)?;
        Ok(rows.into_iter().next())
    }

    fn upsert_override(&self, row: &OverrideRow) -> Result<(), RemoteError> {
        let value = serde_json::to_value(row).map_err(|err| RemoteError::Decode(err.to_string()))?;
        let request = self
            .agent
            .post(&self.table_url(OVERRIDES_TABLE))
            .set("Prefer", "resolution=merge-duplicates,return=minimal");
        self.write(request, Payload::Json(&value))
    }

    fn select_user_data(
        &self,
        user_id: &str,
        kind: DataKind,
    ) -> Result<Vec<UserDataRow>, RemoteError> {
        let request = self
            .agent
            .get(&self.table_url(USER_DATA_TABLE))
            .query("select", "*")
            .query("user_id", &format!("eq.{user_id}"))
            .query("data_type", &format!("eq.{}", kind.as_str()));
        self.fetch_rows(request)
    }

    fn upsert_user_data(&self, row: &UserDataRow) -> Result<(), RemoteError> {
        let value = serde_json::to_value(row).map_err(|err| RemoteError::Decode(err.to_string()))?;
        let request = self
            .agent
            .post(&self.table_url(USER_DATA_TABLE))
            .query("on_conflict", USER_DATA_CONFLICT_KEY)
            .set("Prefer", "resolution=merge-duplicates,return=minimal");
        self.write(request, Payload::Json(&value))
    }

    fn insert_user_data(&self, row: &UserDataRow) -> Result<(), RemoteError> {
        let value = serde_json::to_value(row).map_err(|err| RemoteError::Decode(err.to_string()))?;
        let request = self
            .agent
            .post(&self.table_url(USER_DATA_TABLE))
            .set("Prefer", "return=minimal");
        self.write(request, Payload::Json(&value))
    }

    fn delete_user_data(
        &self,
        user_id: &str,
        content_id: &str,
        kind: DataKind,
    ) -> Result<(), RemoteError> {
        let request = self
            .agent
            .delete(&self.table_url(USER_DATA_TABLE))
            .query("user_id", &format!("eq.{user_id}"))
            .query("content_id", &format!("eq.{content_id}"))
            .query("data_type", &format!("eq.{}", kind.as_str()));
        self.write(request, Payload::Empty)
    }

    fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, RemoteError> {
        let url = format!("{}/storage/v1/object/{bucket}/{path}", self.base_url);
        let request = self.agent.post(&url).set("Content-Type", content_type);
        self.write(request, Payload::Bytes(bytes))?;
        Ok(self.public_object_url(bucket, path))
    }
}

/// Stand-in used when no remote store is configured; every call asks for the
/// local fallback.
pub(crate) struct Unconfigured;

impl RemoteBackend for Unconfigured {
    fn select_overrides(&self) -> Result<Vec<OverrideRow>, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn select_override(&self, _content_id: &str) -> Result<Option<OverrideRow>, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn upsert_override(&self, _row: &OverrideRow) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn select_user_data(
        &self,
        _user_id: &str,
        _kind: DataKind,
    ) -> Result<Vec<UserDataRow>, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn upsert_user_data(&self, _row: &UserDataRow) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn insert_user_data(&self, _row: &UserDataRow) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn delete_user_data(
        &self,
        _user_id: &str,
        _content_id: &str,
        _kind: DataKind,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    fn upload_object(
        &self,
        _bucket: &str,
        _path: &str,
        _bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, RemoteError> {
        Err(RemoteError::NotConfigured)
    }
}

pub(crate) fn decode_rows<T: for<'de> Deserialize<'de>>(body: &str) -> Result<Vec<T>, RemoteError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<Value> =
        serde_json::from_str(body).map_err(|err| RemoteError::Decode(err.to_string()))?;
    Ok(rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(index, error = %err, "skipping unreadable remote row");
                None
            }
        })
        .collect())
}

fn map_http_error(err: HttpError) -> RemoteError {
    match err {
        HttpError::Status { status, body } => {
            if is_missing_table_body(&body) {
                RemoteError::MissingTable(body)
            } else {
                RemoteError::Status { status, body }
            }
        }
        HttpError::Transport(message) => RemoteError::Transport(message),
        HttpError::Decode(message) => RemoteError::Decode(message),
    }
}

pub(crate) fn is_missing_table_body(body: &str) -> bool {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.contains("does not exist");
    };
    let code_matches = parsed.get("code").and_then(Value::as_str) == Some(MISSING_TABLE_CODE);
    let message_matches = parsed
        .get("message")
        .and_then(Value::as_str)
        .is_some_and(|message| message.contains("does not exist"));
    code_matches || message_matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server::{Behavior, TestServer};

    fn backend(server: &TestServer) -> PostgrestBackend {
        PostgrestBackend::new(
            &format!("{}/", server.base_url),
            "anon-key",
            Duration::from_millis(300),
            Duration::from_millis(300),
        )
    }

    #[test]
    fn detects_missing_table_bodies() {
        assert!(is_missing_table_body(
            r#"{"code":"PGRST205","message":"Could not find the table 'public.user_data'"}"#
        ));
        assert!(is_missing_table_body(
            r#"{"code":"42P01","message":"relation \"user_data\" does not exist"}"#
        ));
        assert!(is_missing_table_body("relation does not exist"));
        assert!(!is_missing_table_body(r#"{"code":"42501","message":"permission denied"}"#));
    }

    #[test]
    fn override_row_round_trips_through_patch_layout() {
        let patch = OverridePatch {
            title: Some("Dune".to_string()),
            poster_url: Some("poster.jpg".to_string()),
            banner_url: Some("banner.jpg".to_string()),
            category: Some(Category::Series),
            relevance: Some(88),
            episodes: Some(Vec::new()),
            ..OverridePatch::default()
        };
        let row = OverrideRow::from_patch("custom-1", &patch, "2026-01-01T00:00:00Z".to_string());
        let value = serde_json::to_value(&row).expect("serialize row");
        assert_eq!(value["thumbnail_url"], "poster.jpg");
        assert_eq!(value["episodes_config"]["metadata"]["coverUrl"], "banner.jpg");
        assert_eq!(value["episodes_config"]["metadata"]["type"], "series");
        assert_eq!(value["episodes_config"]["metadata"]["match"], 88);

        let (id, back) = row.into_patch();
        assert_eq!(id, "custom-1");
        assert_eq!(back, patch);
    }

    #[test]
    fn select_overrides_parses_rows_and_sends_credentials() {
        let body = r#"[{"content_id":"custom-1","title":"Dune","thumbnail_url":null,"video_url":"https://x.test/a.mp4","episodes_config":{"full_list":null,"metadata":{"type":"filmes","year":2021}},"updated_at":"2026-01-01T00:00:00Z"}]"#;
        let server = TestServer::spawn(vec![Behavior::Respond(200, body.to_string())]);

        let rows = backend(&server).select_overrides().expect("select should succeed");
        assert_eq!(rows.len(), 1);
        let (id, patch) = rows.into_iter().next().expect("row").into_patch();
        assert_eq!(id, "custom-1");
        assert_eq!(patch.title.as_deref(), Some("Dune"));
        assert_eq!(patch.category, Some(Category::Movie));
        assert_eq!(patch.year, Some(2021));
        assert_eq!(patch.episodes, None);

        let requests = server.requests();
        assert!(
            requests[0]
                .request_line()
                .starts_with("GET /rest/v1/content_overrides?select=")
        );
        assert_eq!(requests[0].header("apikey"), Some("anon-key"));
        assert_eq!(requests[0].header("authorization"), Some("Bearer anon-key"));
    }

    #[test]
    fn select_overrides_orders_by_id_and_skips_unreadable_rows() {
        let body = r#"[
            {"content_id":"custom-1","title":"Dune","episodes_config":{"metadata":{"type":"documentary"}}},
            {"content_id":"custom-2","title":"Alien"},
            "not a row"
        ]"#;
        let server = TestServer::spawn(vec![Behavior::Respond(200, body.to_string())]);

        let rows = backend(&server).select_overrides().expect("select should succeed");
        let ids: Vec<&str> = rows.iter().map(|row| row.content_id.as_str()).collect();
        assert_eq!(ids, vec!["custom-2"]);

        let line = server.requests()[0].request_line().to_string();
        assert!(line.contains("order=content_id.asc"), "{line}");
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = decode_rows::<OverrideRow>("{ nope").expect_err("should fail");
        assert!(matches!(err, RemoteError::Decode(_)));
        assert!(decode_rows::<OverrideRow>("  ").expect("empty body").is_empty());
    }

    #[test]
    fn missing_table_status_maps_to_missing_table_error() {
        let server = TestServer::spawn(vec![Behavior::Respond(
            404,
            r#"{"code":"PGRST205","message":"Could not find the table"}"#.to_string(),
        )]);

        let err = backend(&server)
            .select_user_data("device-1", DataKind::Favorite)
            .expect_err("missing table should fail");
        assert!(err.is_missing_table(), "unexpected: {err:?}");
    }

    #[test]
    fn other_statuses_are_plain_failures() {
        let server = TestServer::spawn(vec![Behavior::Respond(
            401,
            r#"{"message":"Invalid API key"}"#.to_string(),
        )]);

        let err = backend(&server)
            .select_overrides()
            .expect_err("unauthorized should fail");
        assert!(!err.is_missing_table());
        assert!(matches!(err, RemoteError::Status { status: 401, .. }));
    }

    #[test]
    fn upsert_user_data_targets_conflict_key() {
        let server = TestServer::spawn(vec![Behavior::Respond(201, String::new())]);
        let row = UserDataRow {
            user_id: "device-1".to_string(),
            content_id: "custom-1".to_string(),
            data_type: DataKind::Progress,
            payload: serde_json::json!({ "timestamp": 12.0, "lastUpdated": 1 }),
            updated_at: None,
        };

        backend(&server).upsert_user_data(&row).expect("upsert should succeed");
        let requests = server.requests();
        let line = requests[0].request_line();
        assert!(line.starts_with("POST /rest/v1/user_data?on_conflict="), "{line}");
        assert_eq!(
            requests[0].header("prefer"),
            Some("resolution=merge-duplicates,return=minimal")
        );
        let sent = requests[0].body_json();
        assert_eq!(sent["data_type"], "progress");
        assert_eq!(sent["payload"]["timestamp"], 12.0);
    }

    #[test]
    fn delete_user_data_filters_by_full_key() {
        let server = TestServer::spawn(vec![Behavior::Respond(204, String::new())]);

        backend(&server)
            .delete_user_data("device-1", "custom-1", DataKind::Favorite)
            .expect("delete should succeed");
        let line = server.requests()[0].request_line().to_string();
        assert!(line.starts_with("DELETE /rest/v1/user_data?"), "{line}");
        assert!(line.contains("user_id=eq.device-1"), "{line}");
        assert!(line.contains("content_id=eq.custom-1"), "{line}");
        assert!(line.contains("data_type=eq.favorite"), "{line}");
    }

    #[test]
    fn upload_returns_public_url() {
        let server = TestServer::spawn(vec![Behavior::Respond(
            200,
            r#"{"Key":"images/public/1_poster.png"}"#.to_string(),
        )]);

        let url = backend(&server)
            .upload_object("images", "public/1_poster.png", b"png-bytes", "image/png")
            .expect("upload should succeed");
        assert_eq!(
            url,
            format!(
                "{}/storage/v1/object/public/images/public/1_poster.png",
                server.base_url
            )
        );
        let requests = server.requests();
        assert!(
            requests[0]
                .request_line()
                .starts_with("POST /storage/v1/object/images/public/1_poster.png")
        );
        assert_eq!(requests[0].body, b"png-bytes");
    }

    #[test]
    fn unconfigured_backend_always_requests_fallback() {
        let err = Unconfigured.select_overrides().expect_err("no remote");
        assert!(err.is_missing_table());
    }
}
