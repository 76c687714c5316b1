//! Add-on and revision models.

use crate::error::{Error, ErrorKind, Result};
use crate::status::StatusSet;
use derive_more::Display;
use std::str::FromStr;
use time::UtcDateTime;

/// Stable add-on identifier: non-empty, lowercase ASCII letters, digits,
/// hyphens and underscores.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddonId(String);

impl AddonId {
    fn allowed(c: char) -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'
    }

    /// Accepts an identifier only if it is already well-formed.
    ///
    /// ```
    /// use addons_catalog::AddonId;
    ///
    /// assert_eq!(AddonId::parse("supertux-kart").unwrap().as_str(), "supertux-kart");
    /// assert!(AddonId::parse("SuperTux Kart").is_err());
    /// assert!(AddonId::parse("").is_err());
    /// ```
    pub fn parse(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();
        if id.is_empty() {
            exn::bail!(ErrorKind::Validation("add-on id is empty".to_string()));
        }
        if !id.chars().all(Self::allowed) {
            exn::bail!(ErrorKind::Validation(format!("add-on id `{id}` contains invalid characters")));
        }
        Ok(Self(id.to_string()))
    }

    /// Derives an identifier from free text, the way uploads name new
    /// add-ons: lowercased, with every other character replaced by `-`.
    ///
    /// ```
    /// use addons_catalog::AddonId;
    ///
    /// assert_eq!(AddonId::clean("SuperTux Kart!").unwrap().as_str(), "supertux-kart-");
    /// ```
    pub fn clean(text: impl AsRef<str>) -> Result<Self> {
        let text = text.as_ref();
        if text.is_empty() {
            exn::bail!(ErrorKind::Validation("add-on id is empty".to_string()));
        }
        let id = text.to_lowercase().chars().map(|c| if Self::allowed(c) { c } else { '-' }).collect();
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AddonId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AddonId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// What kind of content an add-on packages.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddonKind {
    #[display("kart")]
    Kart,
    #[display("track")]
    Track,
    #[display("arena")]
    Arena,
}

impl AddonKind {
    /// Human-readable game versions that can load a revision of the given
    /// format number.
    pub fn compatibility(self, format: u32) -> &'static str {
        match (self, format) {
            (Self::Kart, 1) => "Pre-0.7",
            (Self::Kart, 2) => "0.7.0 - latest",
            (Self::Track | Self::Arena, 1..=2) => "Pre-0.7",
            (Self::Track | Self::Arena, 3..=5) => "0.7.0 - 0.8.1",
            (Self::Track | Self::Arena, 6) => "0.9.0 - latest",
            _ => "Unknown",
        }
    }
}

impl FromStr for AddonKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kart" | "karts" => Ok(Self::Kart),
            "track" | "tracks" => Ok(Self::Track),
            "arena" | "arenas" => Ok(Self::Arena),
            _ => exn::bail!(ErrorKind::Validation(format!("unknown add-on kind `{s}`"))),
        }
    }
}

/// The editable scalar attributes of an add-on.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum AddonProperty {
    #[display("name")]
    Name,
    #[display("designer")]
    Designer,
    #[display("description")]
    Description,
}

impl FromStr for AddonProperty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => exn::bail!(ErrorKind::Validation("field name is empty".to_string())),
            "name" => Ok(Self::Name),
            "designer" => Ok(Self::Designer),
            "description" => Ok(Self::Description),
            _ => exn::bail!(ErrorKind::Validation(format!("unknown add-on field `{s}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addon {
    pub id: AddonId,
    pub kind: AddonKind,
    pub name: String,
    pub designer: Option<String>,
    pub description: Option<String>,
    /// User id of whoever created the add-on.
    pub uploader: u64,
    pub created_at: UtcDateTime,
}

/// Attributes of an add-on about to be created. The uploader is whoever
/// performs the creation.
#[derive(Debug, Clone)]
pub struct NewAddon {
    pub id: AddonId,
    pub kind: AddonKind,
    pub name: String,
    pub designer: Option<String>,
    pub description: Option<String>,
}

impl NewAddon {
    pub fn new(id: AddonId, kind: AddonKind, name: impl Into<String>) -> Self {
        Self { id, kind, name: name.into(), designer: None, description: None }
    }

    pub fn with_designer(mut self, designer: impl Into<String>) -> Self {
        self.designer = Some(designer.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One uploaded version of an add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Uploaded file identifier, unique across all add-ons.
    pub id: String,
    pub addon_id: AddonId,
    /// Per-add-on sequence number, starting at 1.
    pub number: u32,
    pub format: u32,
    /// Primary image, relative to the upload storage root.
    pub image: String,
    pub created_at: UtcDateTime,
    pub status: StatusSet,
}

#[derive(Debug, Clone)]
pub struct NewRevision {
    pub id: String,
    pub format: u32,
    pub image: String,
    pub status: StatusSet,
}

impl NewRevision {
    pub fn new(id: impl Into<String>, format: u32, image: impl Into<String>) -> Self {
        Self { id: id.into(), format, image: image.into(), status: StatusSet::new() }
    }

    pub fn with_status(mut self, status: StatusSet) -> Self {
        self.status = status;
        self
    }
}
