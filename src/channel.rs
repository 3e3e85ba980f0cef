//! The authenticated account: its uploads playlist and its own playlists.

use tracing::{info, warn};

use crate::api::Session;
use crate::error::Result;
use crate::playlist::Playlist;
use crate::video::{Privacy, UploadStatus, Video};

pub const UPLOADS_TITLE: &str = "Uploads";

pub struct Channel {
    api: Session,
    uploads: Playlist,
    playlists: Vec<Playlist>,
}

impl Channel {
    /// Resolves and loads the uploads playlist.
    pub fn connect(api: Session) -> Result<Self> {
        let uploads_id = api.uploads_playlist_id()?;
        let mut uploads = Playlist::with_id(api.clone(), uploads_id, UPLOADS_TITLE);
        uploads.load()?;
        info!(
            playlist_id = ?uploads.id,
            videos = uploads.len(),
            "loaded uploads playlist"
        );
        Ok(Self {
            api,
            uploads,
            playlists: Vec::new(),
        })
    }

    pub fn api(&self) -> &Session {
        &self.api
    }

    pub fn uploads(&self) -> &Playlist {
        &self.uploads
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    /// Re-reads the uploads playlist.
    pub fn reload_uploads(&mut self) -> Result<()> {
        self.uploads.load()
    }

    /// Lists every playlist the account owns. Items are not loaded.
    pub fn load_playlists(&mut self) -> Result<&[Playlist]> {
        let mut playlists = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.api.list_my_playlists(page_token.as_deref())?;
            for resource in page.items {
                playlists.push(Playlist::from_resource(self.api.clone(), resource)?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        info!(count = playlists.len(), "listed playlists");
        self.playlists = playlists;
        Ok(&self.playlists)
    }

    pub fn find_playlist(&self, title: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|playlist| playlist.title == title)
    }

    /// Returns the playlist titled `title`, creating it remotely when the
    /// account has none. Call [`Channel::load_playlists`] first.
    pub fn ensure_playlist(
        &mut self,
        title: &str,
        description: &str,
        tags: &[String],
        privacy: Privacy,
    ) -> Result<Playlist> {
        if let Some(existing) = self.find_playlist(title) {
            return Ok(existing.clone());
        }
        let mut playlist = Playlist::new(self.api.clone(), title);
        playlist.description = description.to_string();
        playlist.tags = tags.to_vec();
        playlist.privacy = privacy;
        playlist.create()?;
        self.playlists.push(playlist.clone());
        Ok(playlist)
    }

    /// Uploaded videos in an accepted processing state.
    pub fn uploaded_videos(&self) -> Result<Vec<Video>> {
        self.uploads.get_uploaded()
    }

    /// Deletes uploads the remote rejected. With `dry_run` they are only
    /// logged. Returns the rejected videos.
    pub fn delete_rejected_videos(&mut self, dry_run: bool) -> Result<Vec<Video>> {
        let mut rejected: Vec<Video> = self
            .uploads
            .get_videos()?
            .into_iter()
            .filter(|video| video.upload_status == UploadStatus::Rejected)
            .collect();
        for video in &mut rejected {
            if dry_run {
                warn!(video = ?video, "would delete rejected video");
            } else {
                info!(video = ?video, "deleting rejected video");
                video.delete()?;
            }
        }
        if !dry_run && !rejected.is_empty() {
            self.uploads.load()?;
        }
        Ok(rejected)
    }
}
