use crate::addon::AddonId;
use crate::cache::CacheEntry;
use crate::error::{Error, ErrorKind};
use exn::ResultExt;

#[derive(sqlx::FromRow)]
pub(crate) struct CacheRow {
    file: String,
    addon: Option<String>,
    props: Option<String>,
}
impl TryFrom<CacheRow> for CacheEntry {
    type Error = Error;
    fn try_from(row: CacheRow) -> Result<Self, Self::Error> {
        Ok(Self {
            file: row.file,
            addon: row.addon.map(AddonId::parse).transpose().or_raise(|| ErrorKind::InvalidData("cache owner"))?,
            props: row.props,
        })
    }
}
