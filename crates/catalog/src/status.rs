//! Revision status flags.

use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One independent moderation or classification flag on a revision.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusFlag {
    #[display("approved")]
    Approved,
    #[display("alpha")]
    Alpha,
    #[display("beta")]
    Beta,
    #[display("rc")]
    ReleaseCandidate,
    /// The single revision of an add-on that is currently displayed.
    #[display("latest")]
    Latest,
    #[display("fanmade")]
    FanMade,
    #[display("hq")]
    HighQuality,
    #[display("dfsg")]
    DfsgCompliant,
    #[display("featured")]
    Featured,
    /// Set by the asset validator, never by moderation.
    #[display("texpower")]
    TextureNotPowerOf2,
}

impl StatusFlag {
    pub const ALL: [Self; 10] = [
        Self::Approved,
        Self::Alpha,
        Self::Beta,
        Self::ReleaseCandidate,
        Self::Latest,
        Self::FanMade,
        Self::HighQuality,
        Self::DfsgCompliant,
        Self::Featured,
        Self::TextureNotPowerOf2,
    ];

    /// Flags that only a user with manage-capability may change.
    pub fn is_moderator_only(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::FanMade | Self::HighQuality | Self::DfsgCompliant | Self::Featured
        )
    }

    /// Flags written by a status update's per-revision deltas. LATEST has its
    /// own selector and the texture flag belongs to the asset validator.
    pub fn is_moderated(self) -> bool {
        !matches!(self, Self::Latest | Self::TextureNotPowerOf2)
    }
}

impl FromStr for StatusFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|flag| flag.to_string() == s)
            .ok_or_else(|| exn::Exn::from(ErrorKind::Validation(format!("unknown status flag `{s}`"))))
    }
}

/// The set of flags carried by one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSet(BTreeSet<StatusFlag>);

impl StatusSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, flag: StatusFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn insert(&mut self, flag: StatusFlag) {
        self.0.insert(flag);
    }

    pub fn remove(&mut self, flag: StatusFlag) {
        self.0.remove(&flag);
    }

    pub fn set(&mut self, flag: StatusFlag, on: bool) {
        if on {
            self.insert(flag);
        } else {
            self.remove(flag);
        }
    }

    /// Builder-style [`insert()`](Self::insert).
    pub fn with(mut self, flag: StatusFlag) -> Self {
        self.insert(flag);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = StatusFlag> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_approved(&self) -> bool {
        self.contains(StatusFlag::Approved)
    }

    pub fn is_latest(&self) -> bool {
        self.contains(StatusFlag::Latest)
    }

    /// Whether any moderator-only flag is set.
    pub fn has_moderator_only(&self) -> bool {
        self.iter().any(StatusFlag::is_moderator_only)
    }
}

impl FromIterator<StatusFlag> for StatusSet {
    fn from_iter<I: IntoIterator<Item = StatusFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[StatusFlag; N]> for StatusSet {
    fn from(flags: [StatusFlag; N]) -> Self {
        flags.into_iter().collect()
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, flag) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{flag}")?;
        }
        Ok(())
    }
}
