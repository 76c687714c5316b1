//! File storage for the add-on catalog.
//!
//! Uploaded add-on assets and the derived artifacts generated from them (such
//! as resized preview images) live on a [`StorageBackend`]. Every path handed
//! to a backend is relative to that backend's root and is validated before
//! touching anything.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
