//! Explicit authorisation context.

use crate::addon::Addon;

/// The user performing an operation, as established by whatever
/// authenticated the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user: u64,
    /// Holds the "manage add-ons" capability.
    pub manage_addons: bool,
}

impl Actor {
    pub fn new(user: u64) -> Self {
        Self { user, manage_addons: false }
    }

    pub fn manager(user: u64) -> Self {
        Self { user, manage_addons: true }
    }

    pub fn is_uploader_of(&self, addon: &Addon) -> bool {
        self.user == addon.uploader
    }

    /// Uploaders may edit their own add-ons; managers may edit any.
    pub fn can_edit(&self, addon: &Addon) -> bool {
        self.manage_addons || self.is_uploader_of(addon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::{AddonId, AddonKind};
    use time::UtcDateTime;

    fn addon(uploader: u64) -> Addon {
        Addon {
            id: AddonId::parse("tux").unwrap(),
            kind: AddonKind::Kart,
            name: "Tux".to_string(),
            designer: None,
            description: None,
            uploader,
            created_at: UtcDateTime::now(),
        }
    }

    #[test]
    fn test_can_edit() {
        let addon = addon(7);
        assert!(Actor::new(7).can_edit(&addon));
        assert!(!Actor::new(8).can_edit(&addon));
        assert!(Actor::manager(8).can_edit(&addon));
    }
}
