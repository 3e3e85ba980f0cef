//! Thin accessor over the YouTube Data API v3.
//!
//! [`YouTubeApi`] is the seam every other component talks through; tests swap
//! in an in-memory fake. [`HttpYouTubeApi`] is the blocking `ureq`
//! implementation used by the binaries.

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{CurationError, Result};
use crate::resources::{
    ChannelResource, Page, PlaylistItemResource, PlaylistResource, VideoResource,
};
use crate::upload::{ChunkTransport, HttpChunkTransport};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/youtube/v3";
/// Largest page the API hands out.
pub const MAX_RESULTS: usize = 50;

/// Shared handle to the authenticated session. Everything runs on one thread,
/// so a plain `Rc` is enough.
pub type Session = Rc<dyn YouTubeApi>;

pub trait YouTubeApi {
    fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<PlaylistItemResource>>;

    fn insert_playlist_item(&self, body: &Value) -> Result<PlaylistItemResource>;

    fn delete_playlist_item(&self, item_id: &str) -> Result<()>;

    fn list_my_playlists(&self, page_token: Option<&str>) -> Result<Page<PlaylistResource>>;

    fn insert_playlist(&self, part: &str, body: &Value) -> Result<PlaylistResource>;

    fn update_playlist(&self, part: &str, body: &Value) -> Result<PlaylistResource>;

    /// At most [`MAX_RESULTS`] ids per call.
    fn list_videos(&self, ids: &[String], part: &str) -> Result<Vec<VideoResource>>;

    fn update_video(&self, part: &str, body: &Value) -> Result<VideoResource>;

    fn delete_video(&self, video_id: &str) -> Result<()>;

    /// Id of the authenticated channel's "uploads" playlist.
    fn uploads_playlist_id(&self) -> Result<String>;

    /// Prepares a resumable upload of the file at `path`. The session itself
    /// is opened by the first chunk so that failures there are retried.
    fn begin_upload(
        &self,
        part: &str,
        metadata: &Value,
        path: &Path,
    ) -> Result<Box<dyn ChunkTransport>>;
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub access_token: String,
    pub api_base: String,
    pub upload_base: String,
    pub chunk_size: usize,
    pub timeout: Duration,
}

impl ApiSettings {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            chunk_size: 0,
            timeout: Duration::from_secs(300),
        }
    }
}

pub struct HttpYouTubeApi {
    agent: ureq::Agent,
    settings: ApiSettings,
}

impl HttpYouTubeApi {
    pub fn new(settings: ApiSettings) -> Self {
        let agent = build_agent(settings.timeout);
        Self { agent, settings }
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.settings.api_base.trim_end_matches('/'), resource)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.settings.access_token)
    }

    fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        kind: &'static str,
        id: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut request = self
            .agent
            .get(&self.url(resource))
            .set("Authorization", &self.bearer());
        for (key, value) in query {
            request = request.query(key, value);
        }
        debug!(resource, ?query, "GET");
        decode(request.call().map_err(|err| map_error(err, kind, id))?)
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        resource: &str,
        part: &str,
        body: &Value,
    ) -> Result<T> {
        let request = self
            .agent
            .request(method, &self.url(resource))
            .set("Authorization", &self.bearer())
            .query("part", part);
        debug!(method, resource, part, "sending request body");
        let id = body.get("id").and_then(Value::as_str).unwrap_or_default();
        decode(
            request
                .send_json(body)
                .map_err(|err| map_error(err, "resource", id))?,
        )
    }

    fn delete(&self, resource: &str, kind: &'static str, id: &str) -> Result<()> {
        debug!(resource, id, "DELETE");
        self.agent
            .delete(&self.url(resource))
            .set("Authorization", &self.bearer())
            .query("id", id)
            .call()
            .map_err(|err| map_error(err, kind, id))?;
        Ok(())
    }
}

impl YouTubeApi for HttpYouTubeApi {
    fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<PlaylistItemResource>> {
        let max_results = MAX_RESULTS.to_string();
        let mut query = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.get("playlistItems", "playlist", playlist_id, &query)
    }

    fn insert_playlist_item(&self, body: &Value) -> Result<PlaylistItemResource> {
        self.send("POST", "playlistItems", "snippet", body)
    }

    fn delete_playlist_item(&self, item_id: &str) -> Result<()> {
        self.delete("playlistItems", "playlist item", item_id)
    }

    fn list_my_playlists(&self, page_token: Option<&str>) -> Result<Page<PlaylistResource>> {
        let max_results = MAX_RESULTS.to_string();
        let mut query = vec![
            ("part", "snippet,status"),
            ("mine", "true"),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.get("playlists", "channel", "mine", &query)
    }

    fn insert_playlist(&self, part: &str, body: &Value) -> Result<PlaylistResource> {
        self.send("POST", "playlists", part, body)
    }

    fn update_playlist(&self, part: &str, body: &Value) -> Result<PlaylistResource> {
        self.send("PUT", "playlists", part, body)
    }

    fn list_videos(&self, ids: &[String], part: &str) -> Result<Vec<VideoResource>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join(",");
        let page: Page<VideoResource> =
            self.get("videos", "video", &joined, &[("part", part), ("id", &joined)])?;
        Ok(page.items)
    }

    fn update_video(&self, part: &str, body: &Value) -> Result<VideoResource> {
        self.send("PUT", "videos", part, body)
    }

    fn delete_video(&self, video_id: &str) -> Result<()> {
        self.delete("videos", "video", video_id)
    }

    fn uploads_playlist_id(&self) -> Result<String> {
        let page: Page<ChannelResource> = self.get(
            "channels",
            "channel",
            "mine",
            &[("part", "contentDetails"), ("mine", "true")],
        )?;
        page.items
            .iter()
            .find_map(|channel| channel.uploads_playlist_id().map(str::to_string))
            .ok_or_else(|| CurationError::NotFound {
                kind: "uploads playlist",
                id: "mine".to_string(),
            })
    }

    fn begin_upload(
        &self,
        part: &str,
        metadata: &Value,
        path: &Path,
    ) -> Result<Box<dyn ChunkTransport>> {
        let transport = HttpChunkTransport::new(
            self.agent.clone(),
            &self.settings.upload_base,
            &self.settings.access_token,
            part,
            metadata,
            path,
            self.settings.chunk_size,
        )?;
        Ok(Box::new(transport))
    }
}

/// Resumable uploads answer 308 without a Location; never follow it.
pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .redirects(0)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

fn map_error(err: ureq::Error, kind: &'static str, id: &str) -> CurationError {
    match err {
        ureq::Error::Status(404, _) => CurationError::NotFound {
            kind,
            id: id.to_string(),
        },
        other => other.into(),
    }
}

fn decode<T: DeserializeOwned>(response: ureq::Response) -> Result<T> {
    let url = response.get_url().to_string();
    response
        .into_json::<T>()
        .map_err(|err| CurationError::protocol(format!("could not decode {url}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_public_endpoints() {
        let settings = ApiSettings::new("token");
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.upload_base, DEFAULT_UPLOAD_BASE);
        assert_eq!(settings.chunk_size, 0);
    }

    #[test]
    fn urls_tolerate_trailing_slash() {
        let mut settings = ApiSettings::new("token");
        settings.api_base = "http://localhost:9000/youtube/v3/".into();
        let api = HttpYouTubeApi::new(settings);
        assert_eq!(
            api.url("playlistItems"),
            "http://localhost:9000/youtube/v3/playlistItems"
        );
        assert_eq!(api.bearer(), "Bearer token");
    }

    #[test]
    fn listing_an_unreachable_host_is_a_transport_error() {
        let mut settings = ApiSettings::new("token");
        settings.api_base = "http://127.0.0.1:1/youtube/v3".into();
        settings.timeout = Duration::from_secs(2);
        let api = HttpYouTubeApi::new(settings);
        let err = api.list_playlist_items("PL1", None).unwrap_err();
        assert!(matches!(err, CurationError::Transport(_)));
        assert!(err.is_retriable());
    }
}
