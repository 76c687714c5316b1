//! Wiring configuration into a running catalog, and executing commands
//! against it.

use crate::cli::{CacheCommand, Command};
use crate::error::{ErrorKind, Result};
use crate::notify::CommandNotifier;
use addons_catalog::{Actor, CacheIndex, Catalog, Database, NoopNotifier, NotifierHandle, StatusUpdate};
use addons_config::Config;
use addons_storage::backend::LocalBackend;
use exn::{OptionExt, ResultExt};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct App {
    db: Database,
    catalog: Catalog,
    keep: Regex,
}

impl App {
    #[instrument(skip(config), fields(database = %config.database.display()))]
    pub async fn open(config: &Config) -> Result<Self> {
        let keep = config.cache.keep_pattern().or_raise(|| ErrorKind::Config)?;
        let backend = LocalBackend::new("cache", &config.cache.root).or_raise(|| ErrorKind::Storage)?;
        let db = Database::connect(&config.database).await.map_err(ErrorKind::catalog)?;
        let notifier: NotifierHandle = match config.feeds.command.as_deref().and_then(CommandNotifier::new) {
            Some(command) => Arc::new(command),
            None => {
                debug!("No feed command configured");
                Arc::new(NoopNotifier)
            },
        };
        let cache = CacheIndex::new(&db, Arc::new(backend));
        let catalog = Catalog::new(&db, cache, notifier);
        Ok(Self { db, catalog, keep })
    }

    pub async fn close(self) {
        self.db.close().await;
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Cache(command) => self.cache(command).await,
            Command::Revisions { addon, user, manager } => {
                let viewer = user.map(|user| Actor { user, manage_addons: manager });
                let kind = self
                    .catalog
                    .addon(&addon)
                    .await
                    .map_err(ErrorKind::catalog)?
                    .ok_or_raise(|| ErrorKind::Usage(format!("unknown add-on {addon}")))?
                    .kind;
                let revisions =
                    self.catalog.visible_revisions(viewer.as_ref(), &addon).await.map_err(ErrorKind::catalog)?;
                for revision in revisions {
                    println!(
                        "{}\t{}\t{}\t{}",
                        revision.number,
                        revision.id,
                        kind.compatibility(revision.format),
                        revision.status
                    );
                }
                Ok(())
            },
            Command::Latest => {
                let latest = self.catalog.list_latest().await.map_err(ErrorKind::catalog)?;
                for (addon, revision) in latest {
                    println!("{}\t{}\t{}\t{}\t{}", addon.id, addon.kind, revision.number, addon.name, revision.status);
                }
                Ok(())
            },
            Command::Status { addon, latest, changes, actor } => {
                let mut update = StatusUpdate::new();
                if let Some(latest) = latest {
                    update = update.with_latest(latest);
                }
                for (field, on) in &changes {
                    update.apply_field(field, *on).or_raise(|| ErrorKind::Usage(format!("bad flag `{field}`")))?;
                }
                if update.is_empty() {
                    exn::bail!(ErrorKind::Usage("nothing to change: pass --latest or --set".to_string()));
                }
                self.catalog.update_status(&actor.into(), &addon, &update).await.map_err(ErrorKind::catalog)
            },
            Command::Approve { addon, revision, actor } => {
                let approved =
                    self.catalog.toggle_approval(&actor.into(), &addon, revision).await.map_err(ErrorKind::catalog)?;
                println!("{addon} revision {revision}: {}", if approved { "approved" } else { "unapproved" });
                Ok(())
            },
            Command::Set { addon, field, value, actor } => self
                .catalog
                .set_property(&actor.into(), &addon, &field, value.as_deref())
                .await
                .map_err(ErrorKind::catalog),
            Command::Remove { addon, actor } => {
                self.catalog.remove_addon(&actor.into(), &addon).await.map_err(ErrorKind::catalog)
            },
        }
    }

    async fn cache(&self, command: CacheCommand) -> Result<()> {
        let cache = self.catalog.cache();
        match command {
            CacheCommand::Clear { keep } => {
                let keep = match keep {
                    Some(pattern) => Regex::new(&pattern)
                        .or_raise(|| ErrorKind::Usage(format!("invalid keep pattern `{pattern}`")))?,
                    None => self.keep.clone(),
                };
                cache.invalidate_all(&keep).await.map_err(ErrorKind::catalog)
            },
            CacheCommand::ClearAddon { addon } => {
                if !cache.invalidate_addon(&addon).await {
                    exn::bail!(ErrorKind::Usage(format!("cache for {addon} was not fully cleared, see the log")));
                }
                Ok(())
            },
            CacheCommand::Lookup { path } => {
                match cache.lookup(&path).await {
                    Some(entry) => println!(
                        "{}\t{}\t{}",
                        entry.file,
                        entry.addon.as_ref().map_or("-", |addon| addon.as_str()),
                        entry.props.as_deref().unwrap_or("-")
                    ),
                    None => println!("{path}: not indexed"),
                }
                Ok(())
            },
        }
    }
}
