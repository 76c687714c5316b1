mod addon;
mod auth;
pub mod cache;
mod catalog;
mod db;
pub mod error;
mod models;
mod notify;
mod status;
pub mod update;

pub use crate::addon::{Addon, AddonId, AddonKind, AddonProperty, NewAddon, NewRevision, Revision};
pub use crate::auth::Actor;
pub use crate::cache::{CacheEntry, CacheIndex};
pub use crate::catalog::{Catalog, Created, Creation};
pub use crate::db::Database;
pub use crate::notify::{NoopNotifier, Notifier, NotifierHandle};
pub use crate::status::{StatusFlag, StatusSet};
pub use crate::update::StatusUpdate;
