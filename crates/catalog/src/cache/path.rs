//! Derived artifact naming.

use derive_more::Display;
use std::path::Path;
use std::str::FromStr;

/// Fixed size classes of resized preview images.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSize {
    #[display("small")]
    Small,
    #[display("medium")]
    Medium,
    /// Anything that isn't one of the named classes.
    #[display("default")]
    Default,
    #[display("big")]
    Big,
}

impl ImageSize {
    /// Edge length in pixels.
    pub fn pixels(self) -> u32 {
        match self {
            Self::Small => 25,
            Self::Medium => 75,
            Self::Default => 100,
            Self::Big => 300,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Small => "25--",
            Self::Medium => "75--",
            Self::Default => "100--",
            Self::Big => "300--",
        }
    }
}

impl FromStr for ImageSize {
    type Err = std::convert::Infallible;

    /// Unrecognised names fall back to [`ImageSize::Default`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "small" => Self::Small,
            "medium" => Self::Medium,
            "big" => Self::Big,
            _ => Self::Default,
        })
    }
}

/// Prefix for a derived file; no size at all means a custom-sized artifact
/// with no prefix.
pub fn cache_prefix(size: Option<ImageSize>) -> &'static str {
    size.map_or("", ImageSize::prefix)
}

/// `<size-prefix><basename>` for a source image.
///
/// ```
/// use addons_catalog::cache::{ImageSize, cache_path};
///
/// assert_eq!(cache_path("images/tux.png", Some(ImageSize::Big)), "300--tux.png");
/// assert_eq!(cache_path("tux.png", None), "tux.png");
/// ```
pub fn cache_path(image: &str, size: Option<ImageSize>) -> String {
    let base = Path::new(image).file_name().and_then(|name| name.to_str()).unwrap_or(image);
    format!("{}{base}", cache_prefix(size))
}

/// Where the image-serving path should get an image from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// The derived file is indexed and can be served from the cache.
    Cached(String),
    /// Nothing indexed yet: resize `source` and store the result at `target`.
    Generate { source: String, target: String },
}
