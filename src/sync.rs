//! One pass that brings the channel in line with the local videos and the plan.
//!
//! Order of work: optionally purge rejected uploads, upload every local title
//! the channel lacks, then rebuild each group's playlist. A failure in one
//! upload or one group is logged and the pass moves on.

use std::collections::HashSet;

use tracing::{error, info, warn};

use crate::channel::Channel;
use crate::error::{CurationError, Result};
use crate::plan::{SyncGroup, SyncPlan, VideoDefaults};
use crate::playlist::Playlist;
use crate::repo::VideoRepo;
use crate::upload::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::video::Video;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Compute and report without any mutating remote call.
    pub dry_run: bool,
    pub delete_rejected: bool,
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOutcome {
    pub playlist: String,
    pub created: bool,
    pub duplicates_removed: usize,
    pub rewritten: bool,
    pub moved: usize,
}

impl GroupOutcome {
    pub fn changed(&self) -> bool {
        self.created || self.duplicates_removed > 0 || self.rewritten || self.moved > 0
    }
}

/// In a dry run every list holds what would have happened.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub dry_run: bool,
    pub rejected: Vec<String>,
    pub uploaded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub reconciled: Vec<GroupOutcome>,
    pub failed_groups: Vec<(String, String)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.failed_groups.is_empty()
    }
}

pub fn run(
    channel: &mut Channel,
    repo: &VideoRepo,
    plan: &SyncPlan,
    options: &SyncOptions,
) -> Result<SyncReport> {
    run_with(channel, repo, plan, options, ThreadSleeper)
}

/// [`run`] with an explicit sleeper for upload backoff.
pub fn run_with<S: Sleeper>(
    channel: &mut Channel,
    repo: &VideoRepo,
    plan: &SyncPlan,
    options: &SyncOptions,
    mut sleeper: S,
) -> Result<SyncReport> {
    let mut report = SyncReport {
        dry_run: options.dry_run,
        ..SyncReport::default()
    };

    if options.delete_rejected {
        report.rejected = channel
            .delete_rejected_videos(options.dry_run)?
            .into_iter()
            .map(|video| video.title)
            .collect();
    }

    let missing = missing_titles(channel, repo)?;
    info!(missing = missing.len(), local = repo.len(), "computed missing uploads");
    for title in missing {
        if options.dry_run {
            info!(title = %title, "would upload");
            report.uploaded.push(title);
            continue;
        }
        match upload_one(channel, repo, &plan.defaults, &title, options.policy, &mut sleeper) {
            Ok(()) => report.uploaded.push(title),
            Err(err) => {
                error!(title = %title, error = %err, "upload failed; skipping");
                report.failed.push((title, err.to_string()));
            }
        }
    }
    if !options.dry_run && !report.uploaded.is_empty() {
        channel.reload_uploads()?;
    }

    if plan.groups.is_empty() {
        return Ok(report);
    }
    let uploaded = channel.uploaded_videos()?;
    let pairs: Vec<(&str, &str)> = uploaded
        .iter()
        .filter_map(|video| Some((video.id.as_deref()?, video.title.as_str())))
        .collect();
    channel.load_playlists()?;

    for group in &plan.groups {
        let desired = group.desired_ids(pairs.iter().copied());
        let outcome = if options.dry_run {
            preview_group(channel, group, &desired)
        } else {
            apply_group(channel, group, &desired)
        };
        match outcome {
            Ok(outcome) => {
                info!(
                    playlist = %outcome.playlist,
                    changed = outcome.changed(),
                    duplicates = outcome.duplicates_removed,
                    rewritten = outcome.rewritten,
                    moved = outcome.moved,
                    "group reconciled"
                );
                report.reconciled.push(outcome);
            }
            Err(err) => {
                error!(playlist = %group.playlist, error = %err, "group failed; skipping");
                report
                    .failed_groups
                    .push((group.playlist.clone(), err.to_string()));
            }
        }
    }
    Ok(report)
}

/// Local titles with no accepted upload, in title order.
pub fn missing_titles(channel: &Channel, repo: &VideoRepo) -> Result<Vec<String>> {
    let uploaded = channel.uploaded_videos()?;
    let present: HashSet<&str> = uploaded.iter().map(|video| video.title.as_str()).collect();
    Ok(repo
        .titles()
        .filter(|title| !present.contains(title))
        .map(str::to_string)
        .collect())
}

fn upload_one<S: Sleeper>(
    channel: &Channel,
    repo: &VideoRepo,
    defaults: &VideoDefaults,
    title: &str,
    policy: RetryPolicy,
    sleeper: &mut S,
) -> Result<()> {
    let path = repo.path_for(title).ok_or_else(|| CurationError::NotFound {
        kind: "local file",
        id: title.to_string(),
    })?;
    let mut video = Video::new(channel.api().clone(), title)
        .with_privacy(defaults.privacy.clone())
        .with_category(defaults.category_id.as_str());
    if let Some(description) = &defaults.description {
        video = video.with_description(description.as_str());
    }
    if let Some(tags) = &defaults.tags {
        video = video.with_tags(tags.clone());
    }
    video.upload_with(path, policy, sleeper)?;
    Ok(())
}

fn apply_group(
    channel: &mut Channel,
    group: &SyncGroup,
    desired: &[String],
) -> Result<GroupOutcome> {
    let created = channel.find_playlist(&group.playlist).is_none();
    let mut playlist = channel.ensure_playlist(
        &group.playlist,
        &group.description,
        &group.tags,
        group.privacy.clone(),
    )?;
    playlist.load()?;
    let duplicates_removed = playlist.deduplicate()?;
    let rewritten = playlist.reconcile_to(desired)?;
    let moved = if group.enforce_order {
        playlist.reorder_to(desired)?
    } else {
        0
    };
    Ok(GroupOutcome {
        playlist: group.playlist.clone(),
        created,
        duplicates_removed,
        rewritten,
        moved,
    })
}

fn preview_group(
    channel: &Channel,
    group: &SyncGroup,
    desired: &[String],
) -> Result<GroupOutcome> {
    let Some(existing) = channel.find_playlist(&group.playlist) else {
        warn!(playlist = %group.playlist, "would create playlist");
        return Ok(GroupOutcome {
            playlist: group.playlist.clone(),
            created: true,
            rewritten: !desired.is_empty(),
            ..GroupOutcome::default()
        });
    };
    let mut playlist: Playlist = existing.clone();
    playlist.load()?;
    let current = playlist.get_video_ids();

    let mut seen = HashSet::new();
    let unique: Vec<&String> = current.iter().filter(|id| seen.insert(id.as_str())).collect();
    let duplicates_removed = current.len() - unique.len();

    let wanted: HashSet<&str> = desired.iter().map(String::as_str).collect();
    let rewritten = seen != wanted;
    let moved = if group.enforce_order && !rewritten {
        unique
            .iter()
            .zip(desired)
            .filter(|(have, want)| **have != *want)
            .count()
    } else {
        0
    };
    Ok(GroupOutcome {
        playlist: group.playlist.clone(),
        created: false,
        duplicates_removed,
        rewritten,
        moved,
    })
}
