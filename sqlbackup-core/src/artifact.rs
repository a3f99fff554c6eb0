//! Backup artifact naming.
//!
//! Every dump file is named `<tier>_backup_<stamp>.sql`. The stamp is zero
//! padded so that comparing stamps as strings compares them chronologically;
//! the rotator relies on that instead of parsing dates.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const HOURLY_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const DAILY_FORMAT: &str = "%Y-%m-%d";
const MONTHLY_FORMAT: &str = "%Y-%m";

const NAME_INFIX: &str = "_backup_";
const EXTENSION: &str = ".sql";

/// Retention tier encoded in an artifact's file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hourly,
    Daily,
    Monthly,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hourly => "hourly",
            Tier::Daily => "daily",
            Tier::Monthly => "monthly",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "hourly" => Some(Tier::Hourly),
            "daily" => Some(Tier::Daily),
            "monthly" => Some(Tier::Monthly),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single dump file, identified by its tier and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupArtifact {
    tier: Tier,
    stamp: String,
}

impl BackupArtifact {
    /// Artifact produced by a dump taken at `at`.
    pub fn hourly(at: NaiveDateTime) -> Self {
        Self {
            tier: Tier::Hourly,
            stamp: at.format(HOURLY_FORMAT).to_string(),
        }
    }

    pub fn daily(date: NaiveDate) -> Self {
        Self {
            tier: Tier::Daily,
            stamp: date.format(DAILY_FORMAT).to_string(),
        }
    }

    /// Monthly artifact for `year`-`month`. Returns `None` for an invalid month.
    pub fn monthly(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self {
            tier: Tier::Monthly,
            stamp: first.format(MONTHLY_FORMAT).to_string(),
        })
    }

    /// Parse a file name. Only canonical, zero-padded names are accepted;
    /// anything else is treated as a foreign file.
    pub fn parse(file_name: &str) -> Option<Self> {
        let base = file_name.strip_suffix(EXTENSION)?;
        let (prefix, stamp) = base.split_once(NAME_INFIX)?;
        let tier = Tier::from_prefix(prefix)?;

        let canonical = match tier {
            Tier::Hourly => NaiveDateTime::parse_from_str(stamp, HOURLY_FORMAT)
                .ok()?
                .format(HOURLY_FORMAT)
                .to_string(),
            Tier::Daily => NaiveDate::parse_from_str(stamp, DAILY_FORMAT)
                .ok()?
                .format(DAILY_FORMAT)
                .to_string(),
            Tier::Monthly => NaiveDate::parse_from_str(&format!("{stamp}-01"), DAILY_FORMAT)
                .ok()?
                .format(MONTHLY_FORMAT)
                .to_string(),
        };

        (canonical == stamp).then(|| Self {
            tier,
            stamp: canonical,
        })
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Sortable timestamp portion of the name.
    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl Ord for BackupArtifact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stamp
            .cmp(&other.stamp)
            .then_with(|| self.tier.cmp(&other.tier))
    }
}

impl PartialOrd for BackupArtifact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BackupArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", self.tier, NAME_INFIX, self.stamp, EXTENSION)
    }
}

/// Sort artifacts newest first.
pub fn sort_newest_first(artifacts: &mut [BackupArtifact]) {
    artifacts.sort_by(|a, b| b.cmp(a));
}
