//! Tiered retention rotation.
//!
//! A pass works from one directory snapshot taken up front, sorted newest
//! first, and runs four steps in order:
//!
//! 1. on the first day of a month, the newest daily artifact becomes the
//!    monthly artifact of the month that just ended;
//! 2. hourly artifacts ranked at or beyond `max_hourly` in the whole sorted
//!    snapshot are deleted;
//! 3. daily artifacts beyond `max_daily` (ranked among dailies) are deleted;
//! 4. if there is no daily artifact for today, the newest remaining hourly or
//!    daily artifact is renamed to today's daily.
//!
//! Planning is pure; `rotate` applies the plan and stops at the first
//! filesystem error.

use crate::artifact::{sort_newest_first, BackupArtifact, Tier};
use crate::config::RetentionPolicy;
use crate::listing::snapshot;
use crate::utils::errors::{BackupError, Result};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RotationAction {
    PromoteMonthly { from: String, to: String },
    PruneHourly { file: String },
    PruneDaily { file: String },
    PromoteDaily { from: String, to: String },
}

impl fmt::Display for RotationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationAction::PromoteMonthly { from, to } => {
                write!(f, "Renamed {from} to monthly backup: {to}")
            }
            RotationAction::PruneHourly { file } => write!(f, "Deleted old hourly backup: {file}"),
            RotationAction::PruneDaily { file } => write!(f, "Deleted old daily backup: {file}"),
            RotationAction::PromoteDaily { from, to } => {
                write!(f, "Renamed {from} to daily backup: {to}")
            }
        }
    }
}

/// Compute the actions of one pass over `snapshot` for the given day.
pub fn plan_rotation(
    snapshot: &[BackupArtifact],
    policy: &RetentionPolicy,
    today: NaiveDate,
) -> Vec<RotationAction> {
    let mut entries = snapshot.to_vec();
    sort_newest_first(&mut entries);
    let mut removed = vec![false; entries.len()];
    let mut actions = Vec::new();

    if today.day() == 1 {
        let last_month = today
            .pred_opt()
            .and_then(|d| BackupArtifact::monthly(d.year(), d.month()));
        if let Some(monthly) = last_month.filter(|m| !entries.contains(m)) {
            if let Some(idx) = entries.iter().position(|a| a.tier() == Tier::Daily) {
                actions.push(RotationAction::PromoteMonthly {
                    from: entries[idx].file_name(),
                    to: monthly.file_name(),
                });
                // The snapshot entry is relabelled in place, not re-listed
                entries[idx] = monthly;
            }
        }
    }

    for (rank, artifact) in entries.iter().enumerate().skip(policy.max_hourly) {
        if artifact.tier() == Tier::Hourly {
            removed[rank] = true;
            actions.push(RotationAction::PruneHourly {
                file: artifact.file_name(),
            });
        }
    }

    let todays_daily = BackupArtifact::daily(today);
    let promotion = if entries.contains(&todays_daily) {
        None
    } else {
        (0..entries.len()).find(|&i| !removed[i] && entries[i].tier() != Tier::Monthly)
    };

    // Promoting an hourly adds a daily, so leave room for it
    let reserved = promotion.map_or(0, |i| usize::from(entries[i].tier() == Tier::Hourly));
    let keep = policy.max_daily.saturating_sub(reserved);
    let dailies: Vec<usize> = (0..entries.len())
        .filter(|&i| entries[i].tier() == Tier::Daily)
        .collect();
    for &idx in dailies.iter().skip(keep) {
        removed[idx] = true;
        actions.push(RotationAction::PruneDaily {
            file: entries[idx].file_name(),
        });
    }

    if let Some(idx) = promotion.filter(|&i| !removed[i]) {
        actions.push(RotationAction::PromoteDaily {
            from: entries[idx].file_name(),
            to: todays_daily.file_name(),
        });
    }

    actions
}

/// Perform `actions` in order inside `directory`.
pub fn apply(directory: &Path, actions: &[RotationAction]) -> Result<()> {
    for action in actions {
        match action {
            RotationAction::PromoteMonthly { from, to } | RotationAction::PromoteDaily { from, to } => {
                let source = directory.join(from);
                std::fs::rename(&source, directory.join(to))
                    .map_err(|e| BackupError::filesystem(&source, e))?;
            }
            RotationAction::PruneHourly { file } | RotationAction::PruneDaily { file } => {
                let path = directory.join(file);
                std::fs::remove_file(&path).map_err(|e| BackupError::filesystem(&path, e))?;
            }
        }
        tracing::info!(directory = %directory.display(), "{}", action);
    }
    Ok(())
}

/// Run one rotation pass over `directory` for the current local date.
pub fn rotate(directory: &Path, policy: &RetentionPolicy) -> Result<Vec<RotationAction>> {
    rotate_on(directory, policy, chrono::Local::now().date_naive())
}

pub fn rotate_on(
    directory: &Path,
    policy: &RetentionPolicy,
    today: NaiveDate,
) -> Result<Vec<RotationAction>> {
    let artifacts = snapshot(directory)?;
    let actions = plan_rotation(&artifacts, policy, today);
    apply(directory, &actions)?;
    Ok(actions)
}
