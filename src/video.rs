//! Local mirror of a single uploaded (or about to be uploaded) video.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::api::Session;
use crate::error::{CurationError, Result};
use crate::request::RequestProperties;
use crate::resources::VideoResource;
use crate::upload::{ResumableUpload, RetryPolicy, Sleeper, ThreadSleeper};

pub const DEFAULT_CATEGORY_ID: &str = "1";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Privacy {
    #[default]
    Public,
    Private,
    Unlisted,
    Other(String),
}

impl Privacy {
    pub fn as_str(&self) -> &str {
        match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
            Privacy::Unlisted => "unlisted",
            Privacy::Other(value) => value,
        }
    }
}

impl From<String> for Privacy {
    fn from(value: String) -> Self {
        match value.as_str() {
            "public" => Privacy::Public,
            "private" => Privacy::Private,
            "unlisted" => Privacy::Unlisted,
            _ => Privacy::Other(value),
        }
    }
}

impl From<Privacy> for String {
    fn from(value: Privacy) -> Self {
        value.as_str().to_string()
    }
}

/// Remote processing state as reported in `status.uploadStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UploadStatus {
    #[default]
    Uploaded,
    Processed,
    Failed,
    Rejected,
    Deleted,
    Other(String),
}

impl UploadStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "uploaded" => UploadStatus::Uploaded,
            "processed" => UploadStatus::Processed,
            "failed" => UploadStatus::Failed,
            "rejected" => UploadStatus::Rejected,
            "deleted" => UploadStatus::Deleted,
            other => UploadStatus::Other(other.to_string()),
        }
    }

    /// `uploaded` and `processed` are the states we consider healthy.
    pub fn is_accepted(&self) -> bool {
        matches!(self, UploadStatus::Uploaded | UploadStatus::Processed)
    }
}

#[derive(Clone)]
pub struct Video {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category_id: String,
    pub privacy: Privacy,
    pub upload_status: UploadStatus,
    pub published_at: Option<DateTime<Utc>>,
    api: Session,
}

impl fmt::Debug for Video {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{} title:{}",
            self.id.as_deref().unwrap_or("-"),
            self.title
        )
    }
}

impl Video {
    /// A video that only exists locally so far.
    pub fn new(api: Session, title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: None,
            tags: None,
            category_id: DEFAULT_CATEGORY_ID.to_string(),
            privacy: Privacy::Public,
            upload_status: UploadStatus::Uploaded,
            published_at: None,
            api,
        }
    }

    pub fn from_resource(api: Session, resource: VideoResource) -> Result<Self> {
        let mut video = Self::new(api, String::new());
        video.apply_resource(resource)?;
        Ok(video)
    }

    /// Fetches the remote video with `id`.
    pub fn fetch(api: Session, id: &str) -> Result<Self> {
        let mut video = Self::new(api, String::new());
        video.id = Some(id.to_string());
        video.refresh()?;
        Ok(video)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = category_id.into();
        self
    }

    fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| CurationError::NotUploaded {
                title: self.title.clone(),
            })
    }

    fn apply_resource(&mut self, resource: VideoResource) -> Result<()> {
        let id = resource
            .id
            .ok_or_else(|| CurationError::protocol("video resource without id"))?;
        let snippet = resource
            .snippet
            .ok_or_else(|| CurationError::protocol(format!("video {id} has no snippet")))?;
        self.title = snippet
            .title
            .ok_or_else(|| CurationError::protocol(format!("video {id} has no title")))?;
        self.description = snippet.description;
        self.tags = snippet.tags;
        self.category_id = snippet
            .category_id
            .unwrap_or_else(|| DEFAULT_CATEGORY_ID.to_string());
        self.published_at = snippet.published_at;
        if let Some(status) = resource.status {
            self.privacy = status
                .privacy_status
                .map(Privacy::from)
                .unwrap_or_default();
            self.upload_status = status
                .upload_status
                .as_deref()
                .map(UploadStatus::parse)
                .unwrap_or_default();
            if !self.upload_status.is_accepted() {
                warn!(
                    video_id = %id,
                    title = %self.title,
                    status = ?self.upload_status,
                    "video is not in an accepted processing state"
                );
            }
        }
        self.id = Some(id);
        Ok(())
    }

    fn creation_body(&self) -> RequestProperties {
        RequestProperties::new()
            .set("snippet.title", self.title.as_str())
            .set("snippet.description", self.description.clone())
            .set("snippet.tags[]", self.tags.clone())
            .set("snippet.categoryId", self.category_id.as_str())
            .set("status.privacyStatus", self.privacy.as_str())
    }

    /// Uploads the file at `path` as this video with the default retry policy.
    pub fn upload(&mut self, path: &Path) -> Result<&str> {
        self.upload_with(path, RetryPolicy::default(), ThreadSleeper)
    }

    pub fn upload_with<S: Sleeper>(
        &mut self,
        path: &Path,
        policy: RetryPolicy,
        sleeper: S,
    ) -> Result<&str> {
        if let Some(id) = &self.id {
            return Err(CurationError::AlreadyUploaded { id: id.clone() });
        }
        let properties = self.creation_body();
        info!(title = %self.title, path = %path.display(), "uploading video");
        let transport = self
            .api
            .begin_upload(&properties.parts(), &properties.build(), path)?;
        let mut upload = ResumableUpload::new(transport, policy, sleeper, rand::thread_rng());
        let id = upload.run()?;
        info!(video_id = %id, title = %self.title, "uploaded video");
        Ok(self.id.insert(id).as_str())
    }

    /// Request body for [`Video::push_metadata`]. Absent fields are left out.
    pub fn metadata_body(&self) -> Result<Value> {
        let id = self.require_id()?;
        Ok(RequestProperties::new()
            .set("id", id)
            .set("snippet.title", self.title.as_str())
            .set("snippet.description", self.description.clone())
            .set("snippet.tags[]", self.tags.clone())
            .set("snippet.categoryId", self.category_id.as_str())
            .build())
    }

    /// Sends title, description, tags and category.
    pub fn push_metadata(&self) -> Result<()> {
        let body = self.metadata_body()?;
        let response = self.api.update_video("snippet", &body)?;
        info!(video_id = ?response.id, title = %self.title, "updated video metadata");
        Ok(())
    }

    pub fn push_privacy(&self) -> Result<()> {
        let id = self.require_id()?;
        let body = RequestProperties::new()
            .set("id", id)
            .set("status.privacyStatus", self.privacy.as_str())
            .build();
        self.api.update_video("status", &body)?;
        info!(video_id = %id, privacy = self.privacy.as_str(), "updated video privacy");
        Ok(())
    }

    /// Re-reads snippet and status from the remote, overwriting local fields.
    pub fn refresh(&mut self) -> Result<()> {
        let id = self.require_id()?.to_string();
        let resource = self
            .api
            .list_videos(std::slice::from_ref(&id), "snippet,status")?
            .into_iter()
            .next()
            .ok_or_else(|| CurationError::NotFound {
                kind: "video",
                id: id.clone(),
            })?;
        self.apply_resource(resource)
    }

    /// Deletes the remote video and forgets its id.
    pub fn delete(&mut self) -> Result<()> {
        let id = self.require_id()?.to_string();
        self.api.delete_video(&id)?;
        info!(video_id = %id, title = %self.title, "deleted video");
        self.id = None;
        Ok(())
    }
}
