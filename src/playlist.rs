//! In-memory mirror of a remote playlist and the logic that reconciles it.
//!
//! Every mutating call goes to the remote first and is then applied to the
//! local sequence, so after each successful step the local items equal the
//! remote items. Nothing spans more than one call atomically: when a batch
//! operation fails halfway the local view reflects exactly the calls that
//! completed, and callers should [`Playlist::load`] again before trusting it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use tracing::{debug, info};

use crate::api::{MAX_RESULTS, Session};
use crate::error::{CurationError, Result};
use crate::request::RequestProperties;
use crate::resources::{PlaylistItemResource, PlaylistResource};
use crate::video::{Privacy, Video};

/// One video's slot in a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    /// Assigned by the remote on insert; distinct from the video id.
    pub id: String,
    pub video_id: String,
    pub position: usize,
    /// Display only.
    pub title: String,
    pub playlist_id: String,
}

impl TryFrom<PlaylistItemResource> for PlaylistItem {
    type Error = CurationError;

    fn try_from(resource: PlaylistItemResource) -> Result<Self> {
        let id = resource
            .id
            .ok_or_else(|| CurationError::protocol("playlist item without id"))?;
        let snippet = resource
            .snippet
            .ok_or_else(|| CurationError::protocol(format!("playlist item {id} has no snippet")))?;
        let video_id = snippet
            .resource_id
            .and_then(|resource_id| resource_id.video_id)
            .ok_or_else(|| CurationError::protocol(format!("playlist item {id} has no video id")))?;
        let position = snippet
            .position
            .ok_or_else(|| CurationError::protocol(format!("playlist item {id} has no position")))?;
        Ok(Self {
            id,
            video_id,
            position: position as usize,
            title: snippet.title.unwrap_or_default(),
            playlist_id: snippet.playlist_id.unwrap_or_default(),
        })
    }
}

#[derive(Clone)]
pub struct Playlist {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub privacy: Privacy,
    items: Vec<PlaylistItem>,
    api: Session,
}

impl fmt::Debug for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{} title:{}",
            self.id.as_deref().unwrap_or("-"),
            self.title
        )
    }
}

impl Playlist {
    /// A playlist that does not exist remotely yet; see [`Playlist::create`].
    pub fn new(api: Session, title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            privacy: Privacy::Public,
            items: Vec::new(),
            api,
        }
    }

    /// Wraps an existing remote playlist. Items are not fetched until
    /// [`Playlist::load`].
    pub fn with_id(api: Session, id: impl Into<String>, title: impl Into<String>) -> Self {
        let mut playlist = Self::new(api, title);
        playlist.id = Some(id.into());
        playlist
    }

    pub fn from_resource(api: Session, resource: PlaylistResource) -> Result<Self> {
        let id = resource
            .id
            .ok_or_else(|| CurationError::protocol("playlist without id"))?;
        let snippet = resource.snippet.unwrap_or_default();
        let mut playlist = Self::with_id(api, id, snippet.title.unwrap_or_default());
        playlist.description = snippet.description.unwrap_or_default();
        playlist.tags = snippet.tags.unwrap_or_default();
        playlist.privacy = resource
            .status
            .and_then(|status| status.privacy_status)
            .map(Privacy::from)
            .unwrap_or_default();
        Ok(playlist)
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Video ids in playlist order.
    pub fn get_video_ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.video_id.clone()).collect()
    }

    fn require_id(&self) -> Result<&str> {
        self.id.as_deref().ok_or_else(|| CurationError::NotCreated {
            title: self.title.clone(),
        })
    }

    /// Replaces the local items with every remote item, all pages drained.
    pub fn load(&mut self) -> Result<()> {
        let playlist_id = self.require_id()?.to_string();
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .api
                .list_playlist_items(&playlist_id, page_token.as_deref())?;
            for resource in page.items {
                items.push(PlaylistItem::try_from(resource)?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        items.sort_by_key(|item| item.position);
        debug!(playlist_id = %playlist_id, count = items.len(), "loaded playlist items");
        self.items = items;
        Ok(())
    }

    /// Inserts `video_id` at `position` remotely, then splices it in locally.
    pub fn insert(&mut self, video_id: &str, position: usize) -> Result<PlaylistItem> {
        let playlist_id = self.require_id()?.to_string();
        let body = RequestProperties::new()
            .set("snippet.playlistId", playlist_id.as_str())
            .set("snippet.resourceId.kind", "youtube#video")
            .set("snippet.resourceId.videoId", video_id)
            .set("snippet.position", position)
            .build();
        let response = self.api.insert_playlist_item(&body)?;
        let item_id = response
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CurationError::protocol("inserted playlist item has no id"))?;
        let title = response
            .snippet
            .and_then(|snippet| snippet.title)
            .unwrap_or_default();
        info!(
            playlist_id = %playlist_id,
            video_id,
            position,
            item_id = %item_id,
            "inserted playlist item"
        );

        let at = position.min(self.items.len());
        let item = PlaylistItem {
            id: item_id,
            video_id: video_id.to_string(),
            position: at,
            title,
            playlist_id,
        };
        self.items.insert(at, item.clone());
        self.renumber_from(at + 1);
        Ok(item)
    }

    /// Deletes the item remotely, then drops it locally.
    pub fn remove(&mut self, item_id: &str) -> Result<()> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(|| CurationError::NotFound {
                kind: "playlist item",
                id: item_id.to_string(),
            })?;
        self.api.delete_playlist_item(item_id)?;
        let removed = self.items.remove(index);
        info!(
            playlist_id = ?self.id,
            video_id = %removed.video_id,
            item_id,
            position = removed.position,
            "removed playlist item"
        );
        self.renumber_from(index);
        Ok(())
    }

    fn renumber_from(&mut self, start: usize) {
        for (index, item) in self.items.iter_mut().enumerate().skip(start) {
            item.position = index;
        }
    }

    /// Removes every item whose key was already seen at a lower position.
    /// Returns how many items were removed.
    pub fn deduplicate_by<K, F>(&mut self, key: F) -> Result<usize>
    where
        K: Eq + Hash,
        F: Fn(&PlaylistItem) -> K,
    {
        let mut seen = HashSet::new();
        let duplicates: Vec<String> = self
            .items
            .iter()
            .filter(|item| !seen.insert(key(*item)))
            .map(|item| item.id.clone())
            .collect();
        for item_id in &duplicates {
            self.remove(item_id)?;
        }
        if !duplicates.is_empty() {
            info!(playlist_id = ?self.id, removed = duplicates.len(), "removed duplicate items");
        }
        Ok(duplicates.len())
    }

    /// Leaves each video in the playlist at most once.
    pub fn deduplicate(&mut self) -> Result<usize> {
        self.deduplicate_by(|item| item.video_id.clone())
    }

    /// Sorts the playlist by `key` (stable). Items out of place are deleted and
    /// re-inserted at their target index, front to back, so the already
    /// placed prefix is never disturbed. Returns how many items moved.
    pub fn reorder_by<K, F>(&mut self, key: F) -> Result<usize>
    where
        K: Ord,
        F: Fn(&PlaylistItem) -> K,
    {
        let mut target: Vec<PlaylistItem> = self.items.clone();
        target.sort_by_key(|item| key(item));
        self.apply_order(target)
    }

    /// Reorders the playlist so its video ids follow `desired`. Videos not in
    /// `desired` sink to the end in their current relative order.
    pub fn reorder_to(&mut self, desired: &[String]) -> Result<usize> {
        let mut rank: HashMap<&str, usize> = HashMap::new();
        for (index, video_id) in desired.iter().enumerate() {
            rank.entry(video_id.as_str()).or_insert(index);
        }
        let unranked = desired.len();
        let mut target: Vec<PlaylistItem> = self.items.clone();
        target.sort_by_key(|item| rank.get(item.video_id.as_str()).copied().unwrap_or(unranked));
        self.apply_order(target)
    }

    fn apply_order(&mut self, target: Vec<PlaylistItem>) -> Result<usize> {
        let mut moved = 0;
        for (index, wanted) in target.iter().enumerate() {
            if self.items.get(index).map(|item| item.id.as_str()) == Some(wanted.id.as_str()) {
                continue;
            }
            self.remove(&wanted.id)?;
            self.insert(&wanted.video_id, index)?;
            moved += 1;
        }
        if moved > 0 {
            info!(playlist_id = ?self.id, moved, "reordered playlist");
        }
        Ok(moved)
    }

    /// Makes the playlist hold exactly `desired`, in that order, when the set
    /// of videos differs. All current items are removed and `desired` is
    /// re-inserted from position 0.
    ///
    /// Only set membership is compared: a playlist with the right videos in
    /// the wrong order is left untouched. Use [`Playlist::reorder_to`] to fix
    /// order. Returns whether anything was rewritten.
    pub fn reconcile_to(&mut self, desired: &[String]) -> Result<bool> {
        let current: HashSet<&str> = self.items.iter().map(|item| item.video_id.as_str()).collect();
        let wanted: HashSet<&str> = desired.iter().map(String::as_str).collect();
        if current == wanted {
            debug!(playlist_id = ?self.id, "playlist already holds the desired videos");
            return Ok(false);
        }

        info!(
            playlist_id = ?self.id,
            current = self.items.len(),
            desired = desired.len(),
            "rewriting playlist"
        );
        let existing: Vec<String> = self.items.iter().map(|item| item.id.clone()).collect();
        for item_id in &existing {
            self.remove(item_id)?;
        }
        for (position, video_id) in desired.iter().enumerate() {
            self.insert(video_id, position)?;
        }
        Ok(true)
    }

    /// Creates the playlist remotely and records its new id.
    pub fn create(&mut self) -> Result<&str> {
        if let Some(id) = &self.id {
            return Err(CurationError::AlreadyCreated { id: id.clone() });
        }
        let properties = RequestProperties::new()
            .set("snippet.title", self.title.as_str())
            .set("snippet.description", self.description.as_str())
            .set("snippet.tags[]", self.tags.clone())
            .set("status.privacyStatus", self.privacy.as_str());
        let response = self
            .api
            .insert_playlist(&properties.parts(), &properties.build())?;
        let id = response
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CurationError::protocol("created playlist has no id"))?;
        info!(playlist_id = %id, title = %self.title, "created playlist");
        self.items.clear();
        Ok(self.id.insert(id).as_str())
    }

    /// Sends title, description and tags. Empty fields are left untouched
    /// remotely.
    pub fn push_metadata(&self) -> Result<()> {
        let id = self.require_id()?;
        let body = RequestProperties::new()
            .set("id", id)
            .set("snippet.title", self.title.as_str())
            .set("snippet.description", self.description.as_str())
            .set("snippet.tags[]", self.tags.clone())
            .build();
        self.api.update_playlist("snippet", &body)?;
        info!(playlist_id = %id, title = %self.title, "updated playlist metadata");
        Ok(())
    }

    /// Fetches the member videos, [`MAX_RESULTS`] ids per request. Videos the
    /// remote no longer knows about are skipped.
    pub fn get_videos(&self) -> Result<Vec<Video>> {
        let ids = self.get_video_ids();
        let mut videos = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_RESULTS) {
            for resource in self.api.list_videos(chunk, "snippet,status")? {
                videos.push(Video::from_resource(self.api.clone(), resource)?);
            }
        }
        Ok(videos)
    }

    /// Members in an accepted processing state.
    pub fn get_uploaded(&self) -> Result<Vec<Video>> {
        Ok(self
            .get_videos()?
            .into_iter()
            .filter(|video| video.upload_status.is_accepted())
            .collect())
    }

    /// Members that are private or not in an accepted processing state.
    pub fn get_non_uploaded_private(&self) -> Result<Vec<Video>> {
        Ok(self
            .get_videos()?
            .into_iter()
            .filter(|video| video.privacy == Privacy::Private || !video.upload_status.is_accepted())
            .collect())
    }
}
