//! The TOML file describing what the channel should look like.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::repo::DEFAULT_EXTENSIONS;
use crate::video::{DEFAULT_CATEGORY_ID, Privacy};

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

fn default_category() -> String {
    DEFAULT_CATEGORY_ID.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncPlan {
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub defaults: VideoDefaults,
    #[serde(default, rename = "group")]
    pub groups: Vec<SyncGroup>,
}

/// Metadata applied to every newly uploaded video.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoDefaults {
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default = "default_category")]
    pub category_id: String,
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self {
            description: None,
            tags: None,
            privacy: Privacy::Public,
            category_id: default_category(),
        }
    }
}

/// One playlist and the uploaded videos it should contain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncGroup {
    pub playlist: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub privacy: Privacy,
    /// Substring a title must contain. No filter matches everything.
    pub title_filter: Option<String>,
    #[serde(default)]
    pub enforce_order: bool,
}

impl SyncGroup {
    pub fn matches(&self, title: &str) -> bool {
        self.title_filter
            .as_deref()
            .is_none_or(|filter| title.contains(filter))
    }

    /// Ids of the `(id, title)` pairs this group selects, ordered by title.
    pub fn desired_ids<'a>(
        &self,
        videos: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Vec<String> {
        let mut selected: Vec<(&str, &str)> = videos
            .into_iter()
            .filter(|(_, title)| self.matches(title))
            .collect();
        selected.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        selected.into_iter().map(|(id, _)| id.to_string()).collect()
    }
}

impl SyncPlan {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Parsing {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let plan: SyncPlan = toml::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            bail!("plan names no video roots");
        }
        if self.extensions.is_empty() {
            bail!("plan names no media extensions");
        }
        for (index, group) in self.groups.iter().enumerate() {
            if group.playlist.trim().is_empty() {
                bail!("group {} has an empty playlist title", index + 1);
            }
            let duplicate = self.groups[..index]
                .iter()
                .any(|other| other.playlist == group.playlist);
            if duplicate {
                bail!("playlist {:?} appears in more than one group", group.playlist);
            }
        }
        Ok(())
    }
}
