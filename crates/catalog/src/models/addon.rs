use super::timestamp;
use crate::addon::{Addon, AddonId, AddonKind};
use crate::error::{Error, ErrorKind};
use exn::ResultExt;

#[derive(sqlx::FromRow)]
pub(crate) struct AddonRow {
    pub(crate) id: String,
    pub(crate) kind: String,
    pub(crate) name: String,
    pub(crate) designer: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) uploader: i64,
    pub(crate) created_at: i64,
}
impl TryFrom<AddonRow> for Addon {
    type Error = Error;
    fn try_from(row: AddonRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AddonId::parse(&row.id).or_raise(|| ErrorKind::InvalidData("add-on id"))?,
            kind: row.kind.parse::<AddonKind>().or_raise(|| ErrorKind::InvalidData("add-on kind"))?,
            name: row.name,
            designer: row.designer,
            description: row.description,
            uploader: u64::try_from(row.uploader).or_raise(|| ErrorKind::InvalidData("uploader"))?,
            created_at: timestamp(row.created_at)?,
        })
    }
}
