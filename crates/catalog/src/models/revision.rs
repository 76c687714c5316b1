use super::timestamp;
use crate::addon::{AddonId, Revision};
use crate::error::{Error, ErrorKind};
use crate::status::{StatusFlag, StatusSet};
use exn::ResultExt;

/// One boolean column per status flag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct StatusColumns {
    pub(crate) approved: bool,
    pub(crate) alpha: bool,
    pub(crate) beta: bool,
    pub(crate) release_candidate: bool,
    pub(crate) latest: bool,
    pub(crate) fan_made: bool,
    pub(crate) high_quality: bool,
    pub(crate) dfsg_compliant: bool,
    pub(crate) featured: bool,
    pub(crate) texture_not_power_of_2: bool,
}
impl StatusColumns {
    fn column(&mut self, flag: StatusFlag) -> &mut bool {
        match flag {
            StatusFlag::Approved => &mut self.approved,
            StatusFlag::Alpha => &mut self.alpha,
            StatusFlag::Beta => &mut self.beta,
            StatusFlag::ReleaseCandidate => &mut self.release_candidate,
            StatusFlag::Latest => &mut self.latest,
            StatusFlag::FanMade => &mut self.fan_made,
            StatusFlag::HighQuality => &mut self.high_quality,
            StatusFlag::DfsgCompliant => &mut self.dfsg_compliant,
            StatusFlag::Featured => &mut self.featured,
            StatusFlag::TextureNotPowerOf2 => &mut self.texture_not_power_of_2,
        }
    }
}
impl From<&StatusSet> for StatusColumns {
    fn from(status: &StatusSet) -> Self {
        let mut columns = Self::default();
        for flag in status.iter() {
            *columns.column(flag) = true;
        }
        columns
    }
}
impl From<StatusColumns> for StatusSet {
    fn from(mut columns: StatusColumns) -> Self {
        StatusFlag::ALL.into_iter().filter(|flag| *columns.column(*flag)).collect()
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RevisionRow {
    pub(crate) id: String,
    pub(crate) addon_id: String,
    pub(crate) revision: i64,
    pub(crate) format: i64,
    pub(crate) image: String,
    pub(crate) created_at: i64,
    #[sqlx(flatten)]
    pub(crate) status: StatusColumns,
}
impl TryFrom<RevisionRow> for Revision {
    type Error = Error;
    fn try_from(row: RevisionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            addon_id: AddonId::parse(&row.addon_id).or_raise(|| ErrorKind::InvalidData("add-on id"))?,
            number: u32::try_from(row.revision).or_raise(|| ErrorKind::InvalidData("revision number"))?,
            format: u32::try_from(row.format).or_raise(|| ErrorKind::InvalidData("revision format"))?,
            image: row.image,
            created_at: timestamp(row.created_at)?,
            status: row.status.into(),
        })
    }
}
