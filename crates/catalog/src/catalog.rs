//! Revision numbering, status tracking and add-on edits.

use crate::addon::{Addon, AddonId, AddonProperty, NewAddon, NewRevision, Revision};
use crate::auth::Actor;
use crate::cache::CacheIndex;
use crate::error::{ErrorKind, Result};
use crate::models::{AddonRow, LatestRow, RevisionRow, StatusColumns};
use crate::notify::NotifierHandle;
use crate::status::{StatusFlag, StatusSet};
use crate::update::StatusUpdate;
use crate::Database;
use exn::{OptionExt, ResultExt};
use sqlx::{SqliteConnection, SqlitePool};
use time::UtcDateTime;
use tracing::{debug, info, instrument, warn};

/// How many times an insert is retried after losing the race for a revision
/// number.
const REVISION_NUMBER_RETRIES: usize = 3;

/// What [`Catalog::create_addon()`] should do if the add-on already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    /// Fail with [`ErrorKind::DuplicateAddon`].
    Required,
    /// Carry on with the existing add-on.
    IfAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    New,
    Existing,
}

/// The add-on catalog: add-ons, their revisions and each revision's status.
///
/// Every mutation takes an explicit [`Actor`] (except the asset validator's
/// [`set_texture_flag()`](Self::set_texture_flag)), is checked before
/// anything is written, and triggers the notifier once it has been committed.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
    cache: CacheIndex,
    notifier: NotifierHandle,
}

impl Catalog {
    pub fn new(db: &Database, cache: CacheIndex, notifier: NotifierHandle) -> Self {
        Self { pool: db.pool().clone(), cache, notifier }
    }

    pub fn cache(&self) -> &CacheIndex {
        &self.cache
    }

    fn now() -> i64 {
        UtcDateTime::now().unix_timestamp()
    }

    fn user_id(user: u64) -> Result<i64> {
        i64::try_from(user).or_raise(|| ErrorKind::Validation(format!("user id {user} out of range")))
    }

    fn authorize(actor: &Actor, addon: &Addon) -> Result<()> {
        if !actor.can_edit(addon) {
            exn::bail!(ErrorKind::PermissionDenied(format!("user {} may not edit add-on {}", actor.user, addon.id)));
        }
        Ok(())
    }

    fn require_manager(actor: &Actor, action: &str) -> Result<()> {
        if !actor.manage_addons {
            exn::bail!(ErrorKind::PermissionDenied(format!("user {} may not {action}", actor.user)));
        }
        Ok(())
    }

    fn check_initial_status(actor: &Actor, status: &StatusSet) -> Result<()> {
        if !actor.manage_addons && status.has_moderator_only() {
            exn::bail!(ErrorKind::PermissionDenied(format!(
                "user {} may not set moderator flags on upload",
                actor.user
            )));
        }
        Ok(())
    }

    fn unique_violation(err: &sqlx::Error, column: &str) -> bool {
        err.as_database_error().is_some_and(|e| e.is_unique_violation() && e.message().contains(column))
    }

    async fn require_addon(&self, id: &AddonId) -> Result<Addon> {
        self.addon(id).await?.ok_or_raise(|| ErrorKind::AddonNotFound(id.to_string()))
    }

    async fn ensure_new_revision_id(&self, revision: &NewRevision) -> Result<()> {
        if revision.id.is_empty() {
            exn::bail!(ErrorKind::Validation("revision id is empty".to_string()));
        }
        let exists: bool = sqlx::query_scalar(include_str!("../queries/revision_id_exists.sql"))
            .bind(&revision.id)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        if exists {
            exn::bail!(ErrorKind::DuplicateRevision(revision.id.clone()));
        }
        Ok(())
    }

    // =========================================================================
    // Statements shared by several operations, run inside a transaction.
    // =========================================================================

    async fn fetch_addon(conn: &mut SqliteConnection, id: &AddonId) -> Result<Option<Addon>> {
        let row: Option<AddonRow> = sqlx::query_as(include_str!("../queries/get_addon.sql"))
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        row.map(Addon::try_from).transpose()
    }

    async fn insert_addon(conn: &mut SqliteConnection, actor: &Actor, new: &NewAddon, creation: Creation) -> Result<Created> {
        if new.name.is_empty() {
            exn::bail!(ErrorKind::Validation("add-on name is empty".to_string()));
        }
        let inserted = sqlx::query(include_str!("../queries/insert_addon.sql"))
            .bind(new.id.as_str())
            .bind(new.kind.to_string())
            .bind(&new.name)
            .bind(new.designer.as_deref())
            .bind(new.description.as_deref())
            .bind(Self::user_id(actor.user)?)
            .bind(Self::now())
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Persistence)?
            .rows_affected();
        match (inserted, creation) {
            (0, Creation::Required) => exn::bail!(ErrorKind::DuplicateAddon(new.id.to_string())),
            (0, Creation::IfAbsent) => Ok(Created::Existing),
            _ => Ok(Created::New),
        }
    }

    async fn insert_revision(conn: &mut SqliteConnection, addon: &AddonId, new: &NewRevision) -> Result<u32> {
        if new.status.is_latest() {
            sqlx::query(include_str!("../queries/clear_latest.sql"))
                .bind(addon.as_str())
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Persistence)?;
        }
        let status = StatusColumns::from(&new.status);
        let created_at = Self::now();
        let mut attempt = 0;
        loop {
            let result: sqlx::Result<i64> = sqlx::query_scalar(include_str!("../queries/insert_revision.sql"))
                .bind(&new.id)
                .bind(addon.as_str())
                .bind(i64::from(new.format))
                .bind(&new.image)
                .bind(created_at)
                .bind(status.approved)
                .bind(status.alpha)
                .bind(status.beta)
                .bind(status.release_candidate)
                .bind(status.latest)
                .bind(status.fan_made)
                .bind(status.high_quality)
                .bind(status.dfsg_compliant)
                .bind(status.featured)
                .bind(status.texture_not_power_of_2)
                .bind(addon.as_str())
                .fetch_one(&mut *conn)
                .await;
            match result {
                Ok(number) => return u32::try_from(number).or_raise(|| ErrorKind::InvalidData("revision number")),
                Err(e) if Self::unique_violation(&e, "revisions.id") => {
                    exn::bail!(ErrorKind::DuplicateRevision(new.id.clone()))
                },
                Err(e) if attempt < REVISION_NUMBER_RETRIES && Self::unique_violation(&e, "revisions.revision") => {
                    attempt += 1;
                    debug!(addon = %addon, attempt, "Revision number taken concurrently; retrying");
                },
                Err(e) => return Err(e).or_raise(|| ErrorKind::Persistence),
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create an add-on owned by `actor`.
    #[instrument(skip(self, new), fields(addon = %new.id))]
    pub async fn create_addon(&self, actor: &Actor, new: &NewAddon, creation: Creation) -> Result<Created> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Persistence)?;
        let created = Self::insert_addon(&mut tx, actor, new, creation).await?;
        tx.commit().await.or_raise(|| ErrorKind::Persistence)?;
        match created {
            Created::New => {
                info!(kind = %new.kind, uploader = actor.user, "Created add-on");
                self.notifier.notify();
            },
            Created::Existing => debug!("Add-on already exists"),
        }
        Ok(created)
    }

    /// Add a revision to an existing add-on and return its number.
    ///
    /// Numbers start at 1 and increase by one per add-on. If the initial
    /// status includes LATEST, every other revision loses it in the same
    /// transaction.
    #[instrument(skip(self, new), fields(revision_id = new.id))]
    pub async fn add_revision(&self, actor: &Actor, addon: &AddonId, new: &NewRevision) -> Result<u32> {
        let existing = self.require_addon(addon).await?;
        Self::authorize(actor, &existing)?;
        Self::check_initial_status(actor, &new.status)?;
        self.ensure_new_revision_id(new).await?;

        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Persistence)?;
        let number = Self::insert_revision(&mut tx, addon, new).await?;
        tx.commit().await.or_raise(|| ErrorKind::Persistence)?;
        info!(revision = number, status = %new.status, "Added revision");
        self.notifier.notify();
        Ok(number)
    }

    /// Create the add-on if needed and add its next revision, atomically.
    ///
    /// An add-on that already exists, even one created concurrently by
    /// someone else, must be editable by `actor`.
    #[instrument(skip(self, addon, revision), fields(addon = %addon.id, revision_id = revision.id))]
    pub async fn upload(&self, actor: &Actor, addon: &NewAddon, revision: &NewRevision) -> Result<u32> {
        Self::check_initial_status(actor, &revision.status)?;
        self.ensure_new_revision_id(revision).await?;

        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Persistence)?;
        // Write first so the ownership read below sees the committed state.
        let created = Self::insert_addon(&mut tx, actor, addon, Creation::IfAbsent).await?;
        if created == Created::Existing {
            let existing = Self::fetch_addon(&mut tx, &addon.id)
                .await?
                .ok_or_raise(|| ErrorKind::AddonNotFound(addon.id.to_string()))?;
            Self::authorize(actor, &existing)?;
        }
        let number = Self::insert_revision(&mut tx, &addon.id, revision).await?;
        tx.commit().await.or_raise(|| ErrorKind::Persistence)?;
        info!(revision = number, new_addon = created == Created::New, "Uploaded revision");
        self.notifier.notify();
        Ok(number)
    }

    /// Apply per-revision flag changes and the LATEST selection in one
    /// transaction.
    ///
    /// The texture flag is never written. A non-manager may pick the LATEST
    /// revision and change ALPHA, BETA and RC, but not moderator-only flags.
    /// Any reference to a missing revision fails the whole update with
    /// [`ErrorKind::RevisionNotFound`] and nothing is changed.
    #[instrument(skip(self, update), fields(latest = update.latest()))]
    pub async fn update_status(&self, actor: &Actor, addon: &AddonId, update: &StatusUpdate) -> Result<()> {
        let existing = self.require_addon(addon).await?;
        Self::authorize(actor, &existing)?;
        if !actor.manage_addons && update.changes_moderator_only() {
            exn::bail!(ErrorKind::PermissionDenied(format!(
                "user {} may not change moderator flags",
                actor.user
            )));
        }
        if update.is_empty() {
            debug!("Empty status update");
            return Ok(());
        }

        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Persistence)?;
        if let Some(latest) = update.latest() {
            // Clear first: the partial unique index rejects a moment with two.
            sqlx::query(include_str!("../queries/clear_latest.sql"))
                .bind(addon.as_str())
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Persistence)?;
            let updated = sqlx::query(include_str!("../queries/set_latest.sql"))
                .bind(addon.as_str())
                .bind(i64::from(latest))
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Persistence)?
                .rows_affected();
            if updated == 0 {
                exn::bail!(ErrorKind::RevisionNotFound(addon.to_string(), latest));
            }
        }
        for revision in update.revisions() {
            for (flag, _) in update.flags(revision).filter(|(flag, _)| !flag.is_moderated()) {
                debug!(revision, %flag, "Ignoring flag in status update");
            }
            let change = |flag| update.change(revision, flag);
            let updated = sqlx::query(include_str!("../queries/update_moderation.sql"))
                .bind(change(StatusFlag::Approved))
                .bind(change(StatusFlag::Alpha))
                .bind(change(StatusFlag::Beta))
                .bind(change(StatusFlag::ReleaseCandidate))
                .bind(change(StatusFlag::FanMade))
                .bind(change(StatusFlag::HighQuality))
                .bind(change(StatusFlag::DfsgCompliant))
                .bind(change(StatusFlag::Featured))
                .bind(addon.as_str())
                .bind(i64::from(revision))
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Persistence)?
                .rows_affected();
            if updated == 0 {
                exn::bail!(ErrorKind::RevisionNotFound(addon.to_string(), revision));
            }
        }
        tx.commit().await.or_raise(|| ErrorKind::Persistence)?;
        info!(user = actor.user, "Updated revision status");
        self.notifier.notify();
        Ok(())
    }

    /// Flip APPROVED on one revision and return the new value.
    #[instrument(skip(self))]
    pub async fn toggle_approval(&self, actor: &Actor, addon: &AddonId, revision: u32) -> Result<bool> {
        Self::require_manager(actor, "approve add-ons")?;
        let approved: Option<bool> = sqlx::query_scalar(include_str!("../queries/toggle_approval.sql"))
            .bind(addon.as_str())
            .bind(i64::from(revision))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        let approved = approved.ok_or_raise(|| ErrorKind::RevisionNotFound(addon.to_string(), revision))?;
        info!(approved, "Toggled approval");
        self.notifier.notify();
        Ok(approved)
    }

    /// Change one scalar attribute. An empty or missing value clears the
    /// designer or description; the name can't be cleared.
    #[instrument(skip(self, value))]
    pub async fn set_property(&self, actor: &Actor, addon: &AddonId, field: &str, value: Option<&str>) -> Result<()> {
        let property = field.parse::<AddonProperty>()?;
        let existing = self.require_addon(addon).await?;
        Self::authorize(actor, &existing)?;
        let value = value.filter(|v| !v.is_empty());
        let query = match property {
            AddonProperty::Name if value.is_none() => {
                exn::bail!(ErrorKind::Validation("add-on name is empty".to_string()))
            },
            AddonProperty::Name => include_str!("../queries/set_addon_name.sql"),
            AddonProperty::Designer => include_str!("../queries/set_addon_designer.sql"),
            AddonProperty::Description => include_str!("../queries/set_addon_description.sql"),
        };
        sqlx::query(query)
            .bind(value)
            .bind(addon.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        info!(%property, "Updated add-on");
        self.notifier.notify();
        Ok(())
    }

    /// Delete an add-on and all of its revisions. Its cached files are
    /// cleared first, on a best-effort basis.
    #[instrument(skip(self))]
    pub async fn remove_addon(&self, actor: &Actor, addon: &AddonId) -> Result<()> {
        Self::require_manager(actor, "remove add-ons")?;
        self.require_addon(addon).await?;
        if !self.cache.invalidate_addon(addon).await {
            warn!("Cached files not fully cleared; removing the add-on anyway");
        }

        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Persistence)?;
        let revisions = sqlx::query(include_str!("../queries/delete_revisions.sql"))
            .bind(addon.as_str())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Persistence)?
            .rows_affected();
        let removed = sqlx::query(include_str!("../queries/delete_addon.sql"))
            .bind(addon.as_str())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Persistence)?
            .rows_affected();
        if removed == 0 {
            exn::bail!(ErrorKind::AddonNotFound(addon.to_string()));
        }
        tx.commit().await.or_raise(|| ErrorKind::Persistence)?;
        info!(revisions, "Removed add-on");
        self.notifier.notify();
        Ok(())
    }

    /// Point a revision at a new primary image and drop the add-on's stale
    /// derived files.
    #[instrument(skip(self))]
    pub async fn replace_image(&self, actor: &Actor, addon: &AddonId, revision: u32, image: &str) -> Result<()> {
        if image.is_empty() {
            exn::bail!(ErrorKind::Validation("image reference is empty".to_string()));
        }
        let existing = self.require_addon(addon).await?;
        Self::authorize(actor, &existing)?;
        let updated = sqlx::query(include_str!("../queries/set_revision_image.sql"))
            .bind(image)
            .bind(addon.as_str())
            .bind(i64::from(revision))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?
            .rows_affected();
        if updated == 0 {
            exn::bail!(ErrorKind::RevisionNotFound(addon.to_string(), revision));
        }
        if !self.cache.invalidate_addon(addon).await {
            warn!("Stale cached images may remain");
        }
        info!("Replaced revision image");
        self.notifier.notify();
        Ok(())
    }

    /// Record the asset validator's verdict on texture sizes. The only
    /// operation that writes TEXTURE_NOT_POWER_OF_2.
    #[instrument(skip(self))]
    pub async fn set_texture_flag(&self, addon: &AddonId, revision: u32, value: bool) -> Result<()> {
        let updated = sqlx::query(include_str!("../queries/set_texture_flag.sql"))
            .bind(value)
            .bind(addon.as_str())
            .bind(i64::from(revision))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?
            .rows_affected();
        if updated == 0 {
            exn::bail!(ErrorKind::RevisionNotFound(addon.to_string(), revision));
        }
        self.notifier.notify();
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn addon(&self, id: &AddonId) -> Result<Option<Addon>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Persistence)?;
        Self::fetch_addon(&mut conn, id).await
    }

    pub async fn addons_by_uploader(&self, user: u64) -> Result<Vec<Addon>> {
        let rows: Vec<AddonRow> = sqlx::query_as(include_str!("../queries/get_addons_by_uploader.sql"))
            .bind(Self::user_id(user)?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        rows.into_iter().map(Addon::try_from).collect()
    }

    /// The number the next revision of `addon` would get. Informational only:
    /// inserts compute their own number.
    pub async fn next_revision_number(&self, addon: &AddonId) -> Result<u32> {
        let next: i64 = sqlx::query_scalar(include_str!("../queries/next_revision_number.sql"))
            .bind(addon.as_str())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        u32::try_from(next).or_raise(|| ErrorKind::InvalidData("revision number"))
    }

    /// All revisions of an add-on, lowest number first.
    pub async fn revisions(&self, addon: &AddonId) -> Result<Vec<Revision>> {
        let rows: Vec<RevisionRow> = sqlx::query_as(include_str!("../queries/get_revisions.sql"))
            .bind(addon.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        rows.into_iter().map(Revision::try_from).collect()
    }

    pub async fn revision(&self, addon: &AddonId, number: u32) -> Result<Option<Revision>> {
        let row: Option<RevisionRow> = sqlx::query_as(include_str!("../queries/get_revision.sql"))
            .bind(addon.as_str())
            .bind(i64::from(number))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        row.map(Revision::try_from).transpose()
    }

    /// The LATEST revision, if the add-on has one. Having none is valid: the
    /// add-on simply has no displayable version.
    pub async fn latest_revision(&self, addon: &AddonId) -> Result<Option<Revision>> {
        let row: Option<RevisionRow> = sqlx::query_as(include_str!("../queries/get_latest_revision.sql"))
            .bind(addon.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        row.map(Revision::try_from).transpose()
    }

    /// Every add-on with a LATEST revision, by name.
    pub async fn list_latest(&self) -> Result<Vec<(Addon, Revision)>> {
        let rows: Vec<LatestRow> = sqlx::query_as(include_str!("../queries/list_latest.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        rows.into_iter().map(<(Addon, Revision)>::try_from).collect()
    }

    /// Revisions `viewer` is allowed to see: everything for the uploader and
    /// managers, approved revisions only for everyone else.
    pub async fn visible_revisions(&self, viewer: Option<&Actor>, addon: &AddonId) -> Result<Vec<Revision>> {
        let existing = self.require_addon(addon).await?;
        let revisions = self.revisions(addon).await?;
        if viewer.is_some_and(|viewer| viewer.can_edit(&existing)) {
            return Ok(revisions);
        }
        Ok(revisions.into_iter().filter(|revision| revision.status.is_approved()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::AddonKind;
    use addons_storage::backend::{MockBackend, StorageBackend};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const UPLOADER: Actor = Actor { user: 7, manage_addons: false };
    const STRANGER: Actor = Actor { user: 8, manage_addons: false };
    const MANAGER: Actor = Actor { user: 1, manage_addons: true };

    struct Fixture {
        catalog: Catalog,
        notified: Arc<AtomicUsize>,
        backend: Arc<MockBackend>,
        _dir: Option<tempfile::TempDir>,
    }
    impl Fixture {
        async fn new() -> Self {
            Self::with_backend(MockBackend::default()).await
        }

        async fn with_backend(backend: MockBackend) -> Self {
            let db = Database::connect_in_memory().await.unwrap();
            Self::with_database(db, backend, None).await
        }

        /// A database file with a real connection pool, for tests that race
        /// writers against each other.
        async fn on_disk() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = Database::connect(dir.path().join("catalog.sqlite")).await.unwrap();
            Self::with_database(db, MockBackend::default(), Some(dir)).await
        }

        async fn with_database(db: Database, backend: MockBackend, dir: Option<tempfile::TempDir>) -> Self {
            let backend = Arc::new(backend);
            let notified = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&notified);
            let notifier: NotifierHandle = Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            let cache = CacheIndex::new(&db, backend.clone());
            Self { catalog: Catalog::new(&db, cache, notifier), notified, backend, _dir: dir }
        }

        fn notifications(&self) -> usize {
            self.notified.load(Ordering::SeqCst)
        }

        /// Upload `count` plain revisions of a kart owned by [`UPLOADER`].
        async fn kart(&self, id: &str, count: usize) -> AddonId {
            let addon = NewAddon::new(AddonId::parse(id).unwrap(), AddonKind::Kart, id);
            for n in 0..count {
                let revision = NewRevision::new(format!("{id}-file-{n}"), 2, format!("images/{id}.png"));
                self.catalog.upload(&UPLOADER, &addon, &revision).await.unwrap();
            }
            addon.id
        }

        async fn status(&self, addon: &AddonId) -> Vec<(u32, StatusSet)> {
            self.catalog.revisions(addon).await.unwrap().into_iter().map(|r| (r.number, r.status)).collect()
        }

        async fn latest_count(&self, addon: &AddonId) -> usize {
            self.status(addon).await.iter().filter(|(_, status)| status.is_latest()).count()
        }
    }

    #[tokio::test]
    async fn test_revision_numbers_are_sequential() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 0).await;
        let addon = NewAddon::new(id.clone(), AddonKind::Kart, "Tux");
        assert_eq!(fx.catalog.next_revision_number(&id).await.unwrap(), 1);
        for expected in 1..=4 {
            let revision = NewRevision::new(format!("file-{expected}"), 2, "tux.png");
            assert_eq!(fx.catalog.upload(&UPLOADER, &addon, &revision).await.unwrap(), expected);
        }
        let numbers: Vec<_> = fx.status(&id).await.into_iter().map(|(n, _)| n).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(fx.catalog.next_revision_number(&id).await.unwrap(), 5);
        assert_eq!(fx.notifications(), 4);
    }

    #[tokio::test]
    async fn test_revision_numbers_are_per_addon() {
        let fx = Fixture::new().await;
        let tux = fx.kart("tux", 2).await;
        let kiki = fx.kart("kiki", 1).await;
        assert_eq!(fx.catalog.next_revision_number(&tux).await.unwrap(), 3);
        assert_eq!(fx.catalog.next_revision_number(&kiki).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_addon() {
        let fx = Fixture::new().await;
        let addon = NewAddon::new(AddonId::parse("snowtrack").unwrap(), AddonKind::Track, "Snow Track")
            .with_designer("Hexley");
        assert_eq!(fx.catalog.create_addon(&UPLOADER, &addon, Creation::Required).await.unwrap(), Created::New);
        assert_eq!(fx.catalog.create_addon(&UPLOADER, &addon, Creation::IfAbsent).await.unwrap(), Created::Existing);
        let err = fx.catalog.create_addon(&UPLOADER, &addon, Creation::Required).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::DuplicateAddon(_)));
        assert_eq!(fx.notifications(), 1);

        let stored = fx.catalog.addon(&addon.id).await.unwrap().unwrap();
        assert_eq!(stored.kind, AddonKind::Track);
        assert_eq!(stored.designer.as_deref(), Some("Hexley"));
        assert_eq!(stored.uploader, UPLOADER.user);
        // No revisions yet, so nothing to display.
        assert_eq!(fx.catalog.latest_revision(&addon.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_addon_requires_name() {
        let fx = Fixture::new().await;
        let addon = NewAddon::new(AddonId::parse("tux").unwrap(), AddonKind::Kart, "");
        let err = fx.catalog.create_addon(&UPLOADER, &addon, Creation::Required).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
        assert_eq!(fx.catalog.addon(&addon.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_revision() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 1).await;
        let revision = NewRevision::new("upload-42", 2, "images/tux-v2.png");
        assert_eq!(fx.catalog.add_revision(&UPLOADER, &id, &revision).await.unwrap(), 2);
        let stored = fx.catalog.revision(&id, 2).await.unwrap().unwrap();
        assert_eq!(stored.id, "upload-42");
        assert_eq!(stored.image, "images/tux-v2.png");
        assert!(stored.status.is_empty());
    }

    #[tokio::test]
    async fn test_add_revision_duplicate_id() {
        let fx = Fixture::new().await;
        let tux = fx.kart("tux", 1).await;
        let kiki = NewAddon::new(AddonId::parse("kiki").unwrap(), AddonKind::Kart, "Kiki");
        fx.catalog.create_addon(&UPLOADER, &kiki, Creation::Required).await.unwrap();
        let kiki = kiki.id;
        let before = fx.notifications();
        // Revision ids are unique across every add-on.
        let revision = NewRevision::new("tux-file-0", 2, "kiki.png");
        let err = fx.catalog.add_revision(&UPLOADER, &kiki, &revision).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::DuplicateRevision(_)));
        assert_eq!(fx.catalog.next_revision_number(&kiki).await.unwrap(), 1);
        assert_eq!(fx.status(&tux).await.len(), 1);
        assert_eq!(fx.notifications(), before);
    }

    #[tokio::test]
    async fn test_add_revision_errors() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 1).await;
        let missing = AddonId::parse("nobody").unwrap();
        let err = fx.catalog.add_revision(&UPLOADER, &missing, &NewRevision::new("x", 1, "x.png")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AddonNotFound(_)));
        let err = fx.catalog.add_revision(&STRANGER, &id, &NewRevision::new("x", 1, "x.png")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        let err = fx.catalog.add_revision(&UPLOADER, &id, &NewRevision::new("", 1, "x.png")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
        let approved = NewRevision::new("x", 1, "x.png").with_status(StatusSet::from([StatusFlag::Approved]));
        let err = fx.catalog.add_revision(&UPLOADER, &id, &approved).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert_eq!(fx.status(&id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_to_someone_elses_addon() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 1).await;
        let before = fx.notifications();
        let addon = NewAddon::new(id.clone(), AddonKind::Kart, "Not Tux");
        let err = fx.catalog.upload(&STRANGER, &addon, &NewRevision::new("hijack", 2, "x.png")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert_eq!(fx.status(&id).await.len(), 1);
        assert_eq!(fx.catalog.addon(&id).await.unwrap().unwrap().name, "tux");
        assert_eq!(fx.notifications(), before);
        // A manager may add to any add-on.
        assert_eq!(fx.catalog.upload(&MANAGER, &addon, &NewRevision::new("fix", 2, "x.png")).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_add_revision_numbers() {
        const WRITERS: u32 = 16;
        let fx = Fixture::on_disk().await;
        let addon = NewAddon::new(AddonId::parse("tux").unwrap(), AddonKind::Kart, "Tux");
        fx.catalog.create_addon(&UPLOADER, &addon, Creation::Required).await.unwrap();
        let tasks: Vec<_> = (0..WRITERS)
            .map(|n| {
                let catalog = fx.catalog.clone();
                let id = addon.id.clone();
                tokio::spawn(async move {
                    let revision = NewRevision::new(format!("tux-{n}"), 2, "tux.png");
                    catalog.add_revision(&UPLOADER, &id, &revision).await.unwrap()
                })
            })
            .collect();
        let mut numbers = Vec::new();
        for task in tasks {
            numbers.push(task.await.unwrap());
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=WRITERS).collect::<Vec<_>>());
        assert_eq!(fx.catalog.next_revision_number(&addon.id).await.unwrap(), WRITERS + 1);
        assert_eq!(fx.notifications(), WRITERS as usize + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_latest_selection() {
        const REVISIONS: u32 = 8;
        let fx = Fixture::on_disk().await;
        let id = fx.kart("tux", REVISIONS as usize).await;
        let tasks: Vec<_> = (1..=REVISIONS)
            .map(|n| {
                let catalog = fx.catalog.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    catalog.update_status(&UPLOADER, &id, &StatusUpdate::new().with_latest(n)).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(fx.latest_count(&id).await, 1);
        assert!(fx.catalog.latest_revision(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_latest_revision_moves_latest() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 0).await;
        let addon = NewAddon::new(id.clone(), AddonKind::Kart, "Tux");
        let latest = StatusSet::from([StatusFlag::Latest]);
        for n in 1..=3 {
            let revision = NewRevision::new(format!("f{n}"), 2, "tux.png").with_status(latest.clone());
            fx.catalog.upload(&UPLOADER, &addon, &revision).await.unwrap();
            assert_eq!(fx.latest_count(&id).await, 1);
        }
        assert_eq!(fx.catalog.latest_revision(&id).await.unwrap().unwrap().number, 3);
    }

    #[tokio::test]
    async fn test_update_status_moves_latest() {
        let fx = Fixture::new().await;
        let id = fx.kart("supertux-kart", 2).await;
        fx.catalog.update_status(&UPLOADER, &id, &StatusUpdate::new().with_latest(1)).await.unwrap();
        assert_eq!(fx.status(&id).await, vec![(1, StatusSet::from([StatusFlag::Latest])), (2, StatusSet::new())]);

        // Nothing said about revision 1, yet it loses LATEST.
        fx.catalog.update_status(&UPLOADER, &id, &StatusUpdate::new().with_latest(2)).await.unwrap();
        assert_eq!(fx.status(&id).await, vec![(1, StatusSet::new()), (2, StatusSet::from([StatusFlag::Latest]))]);
    }

    #[tokio::test]
    async fn test_update_status_leaves_unmentioned_flags() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 2).await;
        let mut update = StatusUpdate::new();
        update.set(1, StatusFlag::Alpha, true);
        update.set(2, StatusFlag::Approved, true);
        update.set(2, StatusFlag::Featured, true);
        fx.catalog.update_status(&MANAGER, &id, &update).await.unwrap();

        let mut update = StatusUpdate::new();
        update.set(2, StatusFlag::Featured, false);
        update.set(2, StatusFlag::Beta, true);
        fx.catalog.update_status(&MANAGER, &id, &update).await.unwrap();
        assert_eq!(
            fx.status(&id).await,
            vec![
                (1, StatusSet::from([StatusFlag::Alpha])),
                (2, StatusSet::from([StatusFlag::Approved, StatusFlag::Beta])),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_status_preserves_texture_flag() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 2).await;
        fx.catalog.set_texture_flag(&id, 1, true).await.unwrap();
        let mut update = StatusUpdate::new().with_latest(1);
        update.set(1, StatusFlag::TextureNotPowerOf2, false);
        update.set(1, StatusFlag::Beta, true);
        update.set(2, StatusFlag::TextureNotPowerOf2, true);
        fx.catalog.update_status(&MANAGER, &id, &update).await.unwrap();
        assert_eq!(
            fx.status(&id).await,
            vec![
                (1, StatusSet::from([StatusFlag::Beta, StatusFlag::Latest, StatusFlag::TextureNotPowerOf2])),
                (2, StatusSet::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_status_is_atomic() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 2).await;
        fx.catalog.update_status(&UPLOADER, &id, &StatusUpdate::new().with_latest(1)).await.unwrap();
        let before = fx.status(&id).await;
        let notified = fx.notifications();

        let mut update = StatusUpdate::new().with_latest(2);
        update.set(1, StatusFlag::Alpha, true);
        update.set(9, StatusFlag::Beta, true);
        let err = fx.catalog.update_status(&UPLOADER, &id, &update).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RevisionNotFound(_, 9)));
        assert_eq!(fx.status(&id).await, before);

        let err = fx.catalog.update_status(&UPLOADER, &id, &StatusUpdate::new().with_latest(5)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RevisionNotFound(_, 5)));
        assert_eq!(fx.status(&id).await, before);
        assert_eq!(fx.notifications(), notified);
    }

    #[tokio::test]
    async fn test_update_status_without_latest_keeps_latest() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 2).await;
        fx.catalog.update_status(&UPLOADER, &id, &StatusUpdate::new().with_latest(2)).await.unwrap();
        let mut update = StatusUpdate::new();
        update.set(1, StatusFlag::ReleaseCandidate, true);
        fx.catalog.update_status(&UPLOADER, &id, &update).await.unwrap();
        assert_eq!(fx.catalog.latest_revision(&id).await.unwrap().unwrap().number, 2);
        assert_eq!(fx.latest_count(&id).await, 1);
    }

    #[tokio::test]
    async fn test_update_status_permissions() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 1).await;
        let before = fx.status(&id).await;

        let err = fx.catalog.update_status(&STRANGER, &id, &StatusUpdate::new().with_latest(1)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));

        let mut update = StatusUpdate::new().with_latest(1);
        update.set(1, StatusFlag::HighQuality, true);
        let err = fx.catalog.update_status(&UPLOADER, &id, &update).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert_eq!(fx.status(&id).await, before);

        fx.catalog.update_status(&MANAGER, &id, &update).await.unwrap();
        assert_eq!(fx.status(&id).await, vec![(1, StatusSet::from([StatusFlag::Latest, StatusFlag::HighQuality]))]);
    }

    #[tokio::test]
    async fn test_update_status_unknown_addon() {
        let fx = Fixture::new().await;
        let missing = AddonId::parse("nobody").unwrap();
        let err = fx.catalog.update_status(&MANAGER, &missing, &StatusUpdate::new().with_latest(1)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AddonNotFound(_)));
    }

    #[tokio::test]
    async fn test_toggle_approval_twice_restores() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 2).await;
        assert!(fx.catalog.toggle_approval(&MANAGER, &id, 2).await.unwrap());
        assert!(fx.catalog.revision(&id, 2).await.unwrap().unwrap().status.is_approved());
        assert!(!fx.catalog.revision(&id, 1).await.unwrap().unwrap().status.is_approved());
        assert!(!fx.catalog.toggle_approval(&MANAGER, &id, 2).await.unwrap());
        assert!(!fx.catalog.revision(&id, 2).await.unwrap().unwrap().status.is_approved());
    }

    #[tokio::test]
    async fn test_toggle_approval_errors() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 1).await;
        let err = fx.catalog.toggle_approval(&UPLOADER, &id, 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        let err = fx.catalog.toggle_approval(&MANAGER, &id, 3).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RevisionNotFound(_, 3)));
        assert!(!fx.catalog.revision(&id, 1).await.unwrap().unwrap().status.is_approved());
    }

    #[tokio::test]
    async fn test_set_property() {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 1).await;
        fx.catalog.set_property(&UPLOADER, &id, "designer", Some("Hexley")).await.unwrap();
        fx.catalog.set_property(&MANAGER, &id, "name", Some("Tux the Penguin")).await.unwrap();
        fx.catalog.set_property(&UPLOADER, &id, "description", Some("Fast.")).await.unwrap();
        fx.catalog.set_property(&UPLOADER, &id, "description", None).await.unwrap();
        let addon = fx.catalog.addon(&id).await.unwrap().unwrap();
        assert_eq!(addon.designer.as_deref(), Some("Hexley"));
        assert_eq!(addon.name, "Tux the Penguin");
        assert_eq!(addon.description, None);
    }

    #[rstest::rstest]
    #[case(STRANGER, "designer", Some("Evil"))]
    #[case(UPLOADER, "", Some("x"))]
    #[case(UPLOADER, "uploader", Some("8"))]
    #[case(UPLOADER, "name", Some(""))]
    #[case(UPLOADER, "name", None)]
    #[tokio::test]
    async fn test_set_property_rejected(#[case] actor: Actor, #[case] field: &str, #[case] value: Option<&str>) {
        let fx = Fixture::new().await;
        let id = fx.kart("tux", 1).await;
        let before = fx.catalog.addon(&id).await.unwrap();
        let notified = fx.notifications();
        let err = fx.catalog.set_property(&actor, &id, field, value).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_) | ErrorKind::PermissionDenied(_)));
        assert_eq!(fx.catalog.addon(&id).await.unwrap(), before);
        assert_eq!(fx.notifications(), notified);
    }

    #[tokio::test]
    async fn test_remove_addon() {
        let fx = Fixture::with_backend(MockBackend::with_files([("100--tux.png", "a")])).await;
        let id = fx.kart("tux", 3).await;
        fx.catalog.cache().record("100--tux.png", Some(&id), None).await;

        let err = fx.catalog.remove_addon(&UPLOADER, &id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert_eq!(fx.status(&id).await.len(), 3);

        fx.catalog.remove_addon(&MANAGER, &id).await.unwrap();
        assert_eq!(fx.catalog.addon(&id).await.unwrap(), None);
        assert!(fx.catalog.revisions(&id).await.unwrap().is_empty());
        assert_eq!(fx.catalog.cache().lookup("100--tux.png").await, None);
        assert!(!fx.backend.exists(Path::new("100--tux.png")).await.unwrap());

        let err = fx.catalog.remove_addon(&MANAGER, &id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AddonNotFound(_)));
    }

    #[tokio::test]
    async fn test_replace_image_invalidates_cache() {
        let fx = Fixture::with_backend(MockBackend::with_files([("300--tux.png", "old")])).await;
        let id = fx.kart("tux", 1).await;
        fx.catalog.cache().record("300--tux.png", Some(&id), Some("w=300")).await;

        fx.catalog.replace_image(&UPLOADER, &id, 1, "images/tux-new.png").await.unwrap();
        assert_eq!(fx.catalog.revision(&id, 1).await.unwrap().unwrap().image, "images/tux-new.png");
        assert_eq!(fx.catalog.cache().lookup("300--tux.png").await, None);
        assert!(!fx.backend.exists(Path::new("300--tux.png")).await.unwrap());

        let err = fx.catalog.replace_image(&UPLOADER, &id, 2, "x.png").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RevisionNotFound(_, 2)));
        let err = fx.catalog.replace_image(&STRANGER, &id, 1, "x.png").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_list_latest_and_visibility() {
        let fx = Fixture::new().await;
        let tux = fx.kart("tux", 2).await;
        let kiki = fx.kart("kiki", 1).await;
        let _hidden = fx.kart("aaa-unreleased", 1).await;
        fx.catalog.update_status(&UPLOADER, &tux, &StatusUpdate::new().with_latest(2)).await.unwrap();
        fx.catalog.update_status(&UPLOADER, &kiki, &StatusUpdate::new().with_latest(1)).await.unwrap();
        fx.catalog.toggle_approval(&MANAGER, &tux, 1).await.unwrap();

        let latest: Vec<_> =
            fx.catalog.list_latest().await.unwrap().into_iter().map(|(a, r)| (a.name, r.number)).collect();
        assert_eq!(latest, vec![("kiki".to_string(), 1), ("tux".to_string(), 2)]);

        let numbers = |revisions: Vec<Revision>| revisions.into_iter().map(|r| r.number).collect::<Vec<_>>();
        assert_eq!(numbers(fx.catalog.visible_revisions(None, &tux).await.unwrap()), vec![1]);
        assert_eq!(numbers(fx.catalog.visible_revisions(Some(&STRANGER), &tux).await.unwrap()), vec![1]);
        assert_eq!(numbers(fx.catalog.visible_revisions(Some(&UPLOADER), &tux).await.unwrap()), vec![1, 2]);
        assert_eq!(numbers(fx.catalog.visible_revisions(Some(&MANAGER), &tux).await.unwrap()), vec![1, 2]);

        assert_eq!(fx.catalog.addons_by_uploader(UPLOADER.user).await.unwrap().len(), 3);
        assert!(fx.catalog.addons_by_uploader(STRANGER.user).await.unwrap().is_empty());
    }
}
