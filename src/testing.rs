//! In-memory stand-in for the YouTube API used by the unit tests.
//!
//! Playlists keep their items in order, ids are handed out from a counter,
//! listings paginate with a configurable page size, and every call is
//! recorded so tests can count remote mutations.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use serde_json::Value;

use crate::api::YouTubeApi;
use crate::error::{CurationError, Result};
use crate::resources::{
    Page, PlaylistItemResource, PlaylistItemSnippet, PlaylistResource, ResourceId, Snippet,
    Status, VideoResource,
};
use crate::upload::{ChunkProgress, ChunkTransport};

pub const UPLOADS_PLAYLIST_ID: &str = "UUfake";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListPlaylistItems {
        playlist_id: String,
        page_token: Option<String>,
    },
    InsertPlaylistItem {
        playlist_id: String,
        video_id: String,
        position: Option<u64>,
    },
    DeletePlaylistItem {
        item_id: String,
    },
    ListMyPlaylists,
    InsertPlaylist {
        body: Value,
    },
    UpdatePlaylist {
        part: String,
        body: Value,
    },
    ListVideos {
        ids: Vec<String>,
    },
    UpdateVideo {
        part: String,
        body: Value,
    },
    DeleteVideo {
        video_id: String,
    },
    BeginUpload {
        body: Value,
    },
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::InsertPlaylistItem { .. }
                | Call::DeletePlaylistItem { .. }
                | Call::InsertPlaylist { .. }
                | Call::UpdatePlaylist { .. }
                | Call::UpdateVideo { .. }
                | Call::DeleteVideo { .. }
                | Call::BeginUpload { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ListItems,
    InsertItem,
    DeleteItem,
}

#[derive(Debug, Clone)]
struct FakeItem {
    id: String,
    video_id: String,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    page_size: usize,
    playlists: BTreeMap<String, PlaylistResource>,
    playlist_order: Vec<String>,
    items: HashMap<String, Vec<FakeItem>>,
    videos: BTreeMap<String, VideoResource>,
    calls: Vec<Call>,
    failures: HashMap<FailPoint, VecDeque<CurationError>>,
    failing_chunks: u32,
}

impl FakeState {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn take_failure(&mut self, point: FailPoint) -> Result<()> {
        match self.failures.get_mut(&point).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn video_title(&self, video_id: &str) -> String {
        self.videos
            .get(video_id)
            .and_then(|video| video.snippet.as_ref())
            .and_then(|snippet| snippet.title.clone())
            .unwrap_or_default()
    }

    fn item_resource(
        &self,
        playlist_id: &str,
        position: usize,
        item: &FakeItem,
    ) -> PlaylistItemResource {
        PlaylistItemResource {
            id: Some(item.id.clone()),
            snippet: Some(PlaylistItemSnippet {
                playlist_id: Some(playlist_id.to_string()),
                position: Some(position as u64),
                title: Some(self.video_title(&item.video_id)),
                resource_id: Some(ResourceId {
                    kind: Some("youtube#video".into()),
                    video_id: Some(item.video_id.clone()),
                }),
            }),
        }
    }
}

pub struct FakeYouTube {
    state: Rc<RefCell<FakeState>>,
}

impl Default for FakeYouTube {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeYouTube {
    pub fn new() -> Self {
        let mut state = FakeState {
            page_size: 50,
            ..FakeState::default()
        };
        state.items.insert(UPLOADS_PLAYLIST_ID.to_string(), Vec::new());
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.borrow_mut().page_size = page_size.max(1);
        self
    }

    pub fn add_video(&self, id: &str, title: &str, upload_status: &str, privacy: &str) {
        let resource = VideoResource {
            id: Some(id.to_string()),
            snippet: Some(Snippet {
                title: Some(title.to_string()),
                category_id: Some("1".into()),
                ..Snippet::default()
            }),
            status: Some(Status {
                privacy_status: Some(privacy.to_string()),
                upload_status: Some(upload_status.to_string()),
            }),
        };
        self.state
            .borrow_mut()
            .videos
            .insert(id.to_string(), resource);
    }

    /// Adds a video and lists it in the uploads playlist.
    pub fn add_upload(&self, id: &str, title: &str, upload_status: &str) {
        self.add_video(id, title, upload_status, "public");
        let mut state = self.state.borrow_mut();
        let item_id = state.fresh_id("UUitem");
        state
            .items
            .entry(UPLOADS_PLAYLIST_ID.to_string())
            .or_default()
            .push(FakeItem {
                id: item_id,
                video_id: id.to_string(),
            });
    }

    pub fn add_playlist(&self, title: &str) -> String {
        let mut state = self.state.borrow_mut();
        let id = state.fresh_id("PL");
        state.playlists.insert(
            id.clone(),
            PlaylistResource {
                id: Some(id.clone()),
                snippet: Some(Snippet {
                    title: Some(title.to_string()),
                    ..Snippet::default()
                }),
                status: Some(Status {
                    privacy_status: Some("public".into()),
                    upload_status: None,
                }),
            },
        );
        state.playlist_order.push(id.clone());
        state.items.insert(id.clone(), Vec::new());
        id
    }

    /// Replaces the playlist's items; every entry gets a fresh item id.
    pub fn set_items(&self, playlist_id: &str, video_ids: &[&str]) {
        let mut state = self.state.borrow_mut();
        let mut items = Vec::new();
        for video_id in video_ids {
            let id = state.fresh_id("item");
            items.push(FakeItem {
                id,
                video_id: video_id.to_string(),
            });
        }
        state.items.insert(playlist_id.to_string(), items);
    }

    pub fn video_ids(&self, playlist_id: &str) -> Vec<String> {
        self.state
            .borrow()
            .items
            .get(playlist_id)
            .map(|items| items.iter().map(|item| item.video_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn item_ids(&self, playlist_id: &str) -> Vec<String> {
        self.state
            .borrow()
            .items
            .get(playlist_id)
            .map(|items| items.iter().map(|item| item.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn video(&self, id: &str) -> Option<VideoResource> {
        self.state.borrow().videos.get(id).cloned()
    }

    pub fn playlist(&self, id: &str) -> Option<PlaylistResource> {
        self.state.borrow().playlists.get(id).cloned()
    }

    pub fn remove_playlist(&self, id: &str) {
        let mut state = self.state.borrow_mut();
        state.playlists.remove(id);
        state.items.remove(id);
        state.playlist_order.retain(|existing| existing != id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn fail_next(&self, point: FailPoint, err: CurationError) {
        self.state
            .borrow_mut()
            .failures
            .entry(point)
            .or_default()
            .push_back(err);
    }

    /// The next `count` upload chunks answer with a 503.
    pub fn fail_next_upload_chunks(&self, count: u32) {
        self.state.borrow_mut().failing_chunks = count;
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

fn paginate<T: Clone>(all: &[T], page_size: usize, page_token: Option<&str>) -> Result<Page<T>> {
    let start = match page_token {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| CurationError::Api {
                status: 400,
                message: format!("invalid page token {token}"),
            })?,
        None => 0,
    };
    let end = (start + page_size).min(all.len());
    let items = all.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    let next_page_token = (end < all.len()).then(|| end.to_string());
    Ok(Page {
        items,
        next_page_token,
    })
}

fn str_at<'a>(body: &'a Value, pointer: &str) -> Option<&'a str> {
    body.pointer(pointer).and_then(Value::as_str)
}

fn not_found(kind: &'static str, id: &str) -> CurationError {
    CurationError::NotFound {
        kind,
        id: id.to_string(),
    }
}

impl YouTubeApi for FakeYouTube {
    fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<PlaylistItemResource>> {
        self.record(Call::ListPlaylistItems {
            playlist_id: playlist_id.to_string(),
            page_token: page_token.map(str::to_string),
        });
        let mut state = self.state.borrow_mut();
        state.take_failure(FailPoint::ListItems)?;
        let items = state
            .items
            .get(playlist_id)
            .ok_or_else(|| not_found("playlist", playlist_id))?;
        let resources: Vec<PlaylistItemResource> = items
            .iter()
            .enumerate()
            .map(|(position, item)| state.item_resource(playlist_id, position, item))
            .collect();
        paginate(&resources, state.page_size, page_token)
    }

    fn insert_playlist_item(&self, body: &Value) -> Result<PlaylistItemResource> {
        let playlist_id = str_at(body, "/snippet/playlistId").unwrap_or_default().to_string();
        let video_id = str_at(body, "/snippet/resourceId/videoId")
            .unwrap_or_default()
            .to_string();
        let position = body.pointer("/snippet/position").and_then(Value::as_u64);
        self.record(Call::InsertPlaylistItem {
            playlist_id: playlist_id.clone(),
            video_id: video_id.clone(),
            position,
        });

        let mut state = self.state.borrow_mut();
        state.take_failure(FailPoint::InsertItem)?;
        if video_id.is_empty() {
            return Err(CurationError::Api {
                status: 400,
                message: "videoId required".into(),
            });
        }
        let item_id = state.fresh_id("item");
        let items = state
            .items
            .get_mut(&playlist_id)
            .ok_or_else(|| not_found("playlist", &playlist_id))?;
        let at = position
            .map(|position| (position as usize).min(items.len()))
            .unwrap_or(items.len());
        let item = FakeItem {
            id: item_id,
            video_id,
        };
        items.insert(at, item.clone());
        Ok(state.item_resource(&playlist_id, at, &item))
    }

    fn delete_playlist_item(&self, item_id: &str) -> Result<()> {
        self.record(Call::DeletePlaylistItem {
            item_id: item_id.to_string(),
        });
        let mut state = self.state.borrow_mut();
        state.take_failure(FailPoint::DeleteItem)?;
        for items in state.items.values_mut() {
            if let Some(index) = items.iter().position(|item| item.id == item_id) {
                items.remove(index);
                return Ok(());
            }
        }
        Err(not_found("playlist item", item_id))
    }

    fn list_my_playlists(&self, page_token: Option<&str>) -> Result<Page<PlaylistResource>> {
        self.record(Call::ListMyPlaylists);
        let state = self.state.borrow();
        let all: Vec<PlaylistResource> = state
            .playlist_order
            .iter()
            .filter_map(|id| state.playlists.get(id).cloned())
            .collect();
        paginate(&all, state.page_size, page_token)
    }

    fn insert_playlist(&self, _part: &str, body: &Value) -> Result<PlaylistResource> {
        self.record(Call::InsertPlaylist { body: body.clone() });
        let mut resource: PlaylistResource = serde_json::from_value(body.clone())
            .map_err(|err| CurationError::protocol(err.to_string()))?;
        let mut state = self.state.borrow_mut();
        let id = state.fresh_id("PL");
        resource.id = Some(id.clone());
        state.playlists.insert(id.clone(), resource.clone());
        state.playlist_order.push(id.clone());
        state.items.insert(id, Vec::new());
        Ok(resource)
    }

    fn update_playlist(&self, part: &str, body: &Value) -> Result<PlaylistResource> {
        self.record(Call::UpdatePlaylist {
            part: part.to_string(),
            body: body.clone(),
        });
        let id = str_at(body, "/id").unwrap_or_default().to_string();
        let update: PlaylistResource = serde_json::from_value(body.clone())
            .map_err(|err| CurationError::protocol(err.to_string()))?;
        let mut state = self.state.borrow_mut();
        let playlist = state
            .playlists
            .get_mut(&id)
            .ok_or_else(|| not_found("playlist", &id))?;
        if let Some(snippet) = update.snippet {
            playlist.snippet = Some(snippet);
        }
        Ok(playlist.clone())
    }

    fn list_videos(&self, ids: &[String], _part: &str) -> Result<Vec<VideoResource>> {
        self.record(Call::ListVideos { ids: ids.to_vec() });
        let state = self.state.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| state.videos.get(id).cloned())
            .collect())
    }

    fn update_video(&self, part: &str, body: &Value) -> Result<VideoResource> {
        self.record(Call::UpdateVideo {
            part: part.to_string(),
            body: body.clone(),
        });
        let id = str_at(body, "/id").unwrap_or_default().to_string();
        let update: VideoResource = serde_json::from_value(body.clone())
            .map_err(|err| CurationError::protocol(err.to_string()))?;
        let mut state = self.state.borrow_mut();
        let video = state
            .videos
            .get_mut(&id)
            .ok_or_else(|| not_found("video", &id))?;
        if let Some(snippet) = update.snippet {
            let current = video.snippet.get_or_insert_with(Snippet::default);
            current.title = snippet.title.or(current.title.take());
            current.description = snippet.description.or(current.description.take());
            current.tags = snippet.tags.or(current.tags.take());
            current.category_id = snippet.category_id.or(current.category_id.take());
        }
        if let Some(status) = update.status {
            let current = video.status.get_or_insert_with(Status::default);
            current.privacy_status = status.privacy_status.or(current.privacy_status.take());
        }
        Ok(video.clone())
    }

    fn delete_video(&self, video_id: &str) -> Result<()> {
        self.record(Call::DeleteVideo {
            video_id: video_id.to_string(),
        });
        let mut state = self.state.borrow_mut();
        state
            .videos
            .remove(video_id)
            .ok_or_else(|| not_found("video", video_id))?;
        for items in state.items.values_mut() {
            items.retain(|item| item.video_id != video_id);
        }
        Ok(())
    }

    fn uploads_playlist_id(&self) -> Result<String> {
        Ok(UPLOADS_PLAYLIST_ID.to_string())
    }

    fn begin_upload(
        &self,
        _part: &str,
        metadata: &Value,
        path: &Path,
    ) -> Result<Box<dyn ChunkTransport>> {
        self.record(Call::BeginUpload {
            body: metadata.clone(),
        });
        // Opening the file surfaces a missing payload the same way the real
        // transport does.
        std::fs::File::open(path)?;
        Ok(Box::new(FakeUpload {
            state: Rc::clone(&self.state),
            metadata: metadata.clone(),
        }))
    }
}

struct FakeUpload {
    state: Rc<RefCell<FakeState>>,
    metadata: Value,
}

impl ChunkTransport for FakeUpload {
    fn next_chunk(&mut self) -> Result<ChunkProgress> {
        let mut state = self.state.borrow_mut();
        if state.failing_chunks > 0 {
            state.failing_chunks -= 1;
            return Err(CurationError::Api {
                status: 503,
                message: "backendError".into(),
            });
        }
        let mut resource: VideoResource = serde_json::from_value(self.metadata.clone())
            .map_err(|err| CurationError::protocol(err.to_string()))?;
        let id = state.fresh_id("vid");
        resource.id = Some(id.clone());
        resource
            .status
            .get_or_insert_with(Status::default)
            .upload_status = Some("uploaded".into());
        state.videos.insert(id.clone(), resource.clone());
        let item_id = state.fresh_id("UUitem");
        state
            .items
            .entry(UPLOADS_PLAYLIST_ID.to_string())
            .or_default()
            .insert(0, FakeItem { id: item_id, video_id: id });
        Ok(ChunkProgress::Complete(resource))
    }
}
