use super::{AddonRow, RevisionRow, StatusColumns};
use crate::addon::{Addon, Revision};
use crate::error::Error;

/// An add-on joined with its LATEST revision.
#[derive(sqlx::FromRow)]
pub(crate) struct LatestRow {
    addon_id: String,
    kind: String,
    name: String,
    designer: Option<String>,
    description: Option<String>,
    uploader: i64,
    addon_created_at: i64,
    id: String,
    revision: i64,
    format: i64,
    image: String,
    created_at: i64,
    #[sqlx(flatten)]
    status: StatusColumns,
}
impl TryFrom<LatestRow> for (Addon, Revision) {
    type Error = Error;
    fn try_from(row: LatestRow) -> Result<Self, Self::Error> {
        let addon = AddonRow {
            id: row.addon_id.clone(),
            kind: row.kind,
            name: row.name,
            designer: row.designer,
            description: row.description,
            uploader: row.uploader,
            created_at: row.addon_created_at,
        };
        let revision = RevisionRow {
            id: row.id,
            addon_id: row.addon_id,
            revision: row.revision,
            format: row.format,
            image: row.image,
            created_at: row.created_at,
            status: row.status,
        };
        Ok((addon.try_into()?, revision.try_into()?))
    }
}
