//! Status update requests.

use crate::error::{ErrorKind, Result};
use crate::status::StatusFlag;
use exn::ResultExt;
use std::collections::BTreeMap;

/// Per-revision flag changes plus the choice of LATEST revision, applied
/// together by [`Catalog::update_status()`](crate::Catalog::update_status).
///
/// Flags that are not mentioned for a revision keep their current value.
/// Entries for the texture flag are accepted but never written.
///
/// ```
/// use addons_catalog::{StatusFlag, StatusUpdate};
///
/// let mut update = StatusUpdate::new().with_latest(2);
/// update.apply_field("alpha-1", false).unwrap();
/// update.apply_field("beta-2", true).unwrap();
/// assert_eq!(update.latest(), Some(2));
/// assert_eq!(update.change(1, StatusFlag::Alpha), Some(false));
/// assert_eq!(update.change(1, StatusFlag::Beta), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    latest: Option<u32>,
    changes: BTreeMap<u32, BTreeMap<StatusFlag, bool>>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `revision` the only LATEST revision of the add-on.
    pub fn with_latest(mut self, revision: u32) -> Self {
        self.latest = Some(revision);
        self
    }

    /// Record a change of `flag` on `revision`.
    ///
    /// Turning LATEST on selects that revision; turning it off on its own has
    /// no meaning and is ignored.
    pub fn set(&mut self, revision: u32, flag: StatusFlag, on: bool) {
        match flag {
            StatusFlag::Latest if on => self.latest = Some(revision),
            StatusFlag::Latest => {},
            _ => {
                self.changes.entry(revision).or_default().insert(flag, on);
            },
        }
    }

    /// Record a change from a `<flag>-<revision>` field name. `latest-N` with
    /// `on` selects revision N as LATEST.
    pub fn apply_field(&mut self, field: &str, on: bool) -> Result<()> {
        let (flag, revision) = parse_field(field)?;
        self.set(revision, flag, on);
        Ok(())
    }

    pub fn latest(&self) -> Option<u32> {
        self.latest
    }

    pub fn change(&self, revision: u32, flag: StatusFlag) -> Option<bool> {
        self.changes.get(&revision).and_then(|flags| flags.get(&flag)).copied()
    }

    /// The flag changes recorded for `revision`.
    pub fn flags(&self, revision: u32) -> impl Iterator<Item = (StatusFlag, bool)> + '_ {
        self.changes.get(&revision).into_iter().flat_map(|flags| flags.iter().map(|(flag, on)| (*flag, *on)))
    }

    /// Revisions with at least one flag change, ascending.
    pub fn revisions(&self) -> impl Iterator<Item = u32> + '_ {
        self.changes.keys().copied()
    }

    /// Whether the update touches any flag reserved for moderators.
    pub fn changes_moderator_only(&self) -> bool {
        self.changes.values().flat_map(|flags| flags.keys()).any(|flag| flag.is_moderator_only())
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_none() && self.changes.is_empty()
    }
}

/// Split a `<flag>-<revision>` field name such as `alpha-3` or `rc-12`.
///
/// ```
/// use addons_catalog::{StatusFlag, update::parse_field};
///
/// assert_eq!(parse_field("hq-4").unwrap(), (StatusFlag::HighQuality, 4));
/// assert!(parse_field("hq").is_err());
/// assert!(parse_field("shiny-4").is_err());
/// ```
pub fn parse_field(field: &str) -> Result<(StatusFlag, u32)> {
    let invalid = || ErrorKind::Validation(format!("malformed status field `{field}`"));
    let (flag, revision) = field.rsplit_once('-').ok_or_else(|| exn::Exn::from(invalid()))?;
    let flag = flag.parse::<StatusFlag>().or_raise(invalid)?;
    let revision = revision.parse::<u32>().or_raise(invalid)?;
    if revision == 0 {
        exn::bail!(invalid());
    }
    Ok((flag, revision))
}
