mod addon;
mod cache;
mod latest;
mod revision;

pub(crate) use self::addon::AddonRow;
pub(crate) use self::cache::CacheRow;
pub(crate) use self::latest::LatestRow;
pub(crate) use self::revision::{RevisionRow, StatusColumns};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;

fn timestamp(value: i64) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(value).or_raise(|| ErrorKind::InvalidData("timestamp"))
}
