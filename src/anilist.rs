use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Config;
use crate::model::{MediaListStatus, TrackerEntry};

pub const AUTHORIZE_URL: &str =
    "https://anilist.co/api/v2/oauth/authorize?client_id=21288&response_type=token";

const MEDIA_LIST_ENTRY_QUERY: &str = "\
query ($id: Int) {
  Media(id: $id, type: MANGA) {
    id
    volumes
    chapters
    mediaListEntry {
      status
      progress
      progressVolumes
    }
  }
}";

const SAVE_VOLUMES_MUTATION: &str = "\
mutation ($mediaId: Int, $status: MediaListStatus, $progressVolumes: Int) {
  SaveMediaListEntry(mediaId: $mediaId, status: $status, progressVolumes: $progressVolumes) {
    id
    status
    progressVolumes
  }
}";

const SAVE_CHAPTERS_MUTATION: &str = "\
mutation ($mediaId: Int, $status: MediaListStatus, $progress: Int) {
  SaveMediaListEntry(mediaId: $mediaId, status: $status, progress: $progress) {
    id
    status
    progress
  }
}";

/// Remote progress tracker.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn fetch_entry(&self, tracker_id: i64) -> anyhow::Result<TrackerEntry>;
    async fn write_volume_progress(
        &self,
        media_id: i64,
        volume: u32,
        status: MediaListStatus,
    ) -> anyhow::Result<()>;
    async fn write_chapter_progress(
        &self,
        media_id: i64,
        chapters: u32,
        status: MediaListStatus,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct AnilistClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl AnilistClient {
    pub fn new(endpoint: &Url, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("calilist/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            token: token.to_owned(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(&config.anilist_url, &config.token, config.request_timeout)
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> anyhow::Result<T> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read AniList response body")?;
        parse_graphql_response(status, &raw)
    }
}

#[async_trait]
impl Tracker for AnilistClient {
    async fn fetch_entry(&self, tracker_id: i64) -> anyhow::Result<TrackerEntry> {
        let data: MediaData = self
            .graphql(
                MEDIA_LIST_ENTRY_QUERY,
                serde_json::json!({ "id": tracker_id }),
            )
            .await
            .with_context(|| format!("fetch AniList media {tracker_id}"))?;
        let media = data
            .media
            .ok_or_else(|| anyhow::anyhow!("AniList media not found: {tracker_id}"))?;
        Ok(media.into_entry())
    }

    async fn write_volume_progress(
        &self,
        media_id: i64,
        volume: u32,
        status: MediaListStatus,
    ) -> anyhow::Result<()> {
        let _: SaveData = self
            .graphql(
                SAVE_VOLUMES_MUTATION,
                serde_json::json!({
                    "mediaId": media_id,
                    "status": status,
                    "progressVolumes": volume,
                }),
            )
            .await
            .with_context(|| format!("save volume progress for AniList media {media_id}"))?;
        Ok(())
    }

    async fn write_chapter_progress(
        &self,
        media_id: i64,
        chapters: u32,
        status: MediaListStatus,
    ) -> anyhow::Result<()> {
        let _: SaveData = self
            .graphql(
                SAVE_CHAPTERS_MUTATION,
                serde_json::json!({
                    "mediaId": media_id,
                    "status": status,
                    "progress": chapters,
                }),
            )
            .await
            .with_context(|| format!("save chapter progress for AniList media {media_id}"))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    status: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<Media>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Media {
    id: i64,
    volumes: Option<u32>,
    chapters: Option<u32>,
    media_list_entry: Option<MediaListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaListEntry {
    status: Option<MediaListStatus>,
    progress: Option<u32>,
    progress_volumes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SaveData {
    #[serde(rename = "SaveMediaListEntry")]
    #[allow(dead_code)]
    entry: Option<serde_json::Value>,
}

impl Media {
    fn into_entry(self) -> TrackerEntry {
        let list = self.media_list_entry;
        TrackerEntry {
            media_id: self.id,
            progress_volumes: list.as_ref().and_then(|l| l.progress_volumes).unwrap_or(0),
            progress_chapters: list.as_ref().and_then(|l| l.progress).unwrap_or(0),
            max_volumes: self.volumes.unwrap_or(0),
            max_chapters: self.chapters.unwrap_or(0),
            status: list.and_then(|l| l.status),
        }
    }
}

fn parse_graphql_response<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    raw: &str,
) -> anyhow::Result<T> {
    let parsed: Option<GraphqlResponse<T>> = serde_json::from_str(raw).ok();

    if let Some(response) = &parsed
        && !response.errors.is_empty()
    {
        let messages = response
            .errors
            .iter()
            .map(|e| match e.status {
                Some(code) => format!("{} ({code})", e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!("AniList API error ({status}): {messages}");
    }

    if !status.is_success() {
        anyhow::bail!("AniList API error ({status}): {}", raw.trim());
    }

    let response = match parsed {
        Some(response) => response,
        None => serde_json::from_str::<GraphqlResponse<T>>(raw)
            .context("parse AniList response")?,
    };
    response
        .data
        .ok_or_else(|| anyhow::anyhow!("missing `data` in AniList response"))
}
