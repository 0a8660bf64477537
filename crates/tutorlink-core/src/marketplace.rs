//! Entry point that owns the database handle and the compiled rule catalogue
//! and hands out the per-collection services.

use std::path::Path;

use tutorlink_shared::rules::RuleSet;
use tutorlink_store::{database, Database};

use crate::access::AccessControl;
use crate::blocking::BlockingGuard;
use crate::booking::SlotBookingManager;
use crate::config::CoreConfig;
use crate::conversations::ConversationAggregator;
use crate::error::{CoreError, Result};
use crate::moderation::ModerationLog;
use crate::users::UserDirectory;

pub struct Marketplace {
    db: Database,
    access: AccessControl,
    config: CoreConfig,
}

impl Marketplace {
    /// Open the database named by `config` (or the platform default) and
    /// load the rule catalogue.
    pub fn open(config: CoreConfig) -> Result<Self> {
        let path = match &config.database_path {
            Some(path) => path.clone(),
            None => database::default_path()?,
        };
        let db = Database::open_at(&path)?;
        db.set_busy_timeout(config.busy_timeout())?;
        let rules = load_rules(&config)?;
        Ok(Self::with_database(db, rules, config))
    }

    /// A private in-memory marketplace; nothing survives the value.
    pub fn open_in_memory(config: CoreConfig) -> Result<Self> {
        let db = Database::open_in_memory()?;
        let rules = load_rules(&config)?;
        Ok(Self::with_database(db, rules, config))
    }

    pub fn with_database(db: Database, rules: RuleSet, config: CoreConfig) -> Self {
        Self {
            db,
            access: AccessControl::new(rules),
            config,
        }
    }

    pub fn slots(&self) -> SlotBookingManager<'_> {
        SlotBookingManager::new(&self.db, &self.access, self.config.max_conflict_retries)
    }

    pub fn conversations(&self) -> ConversationAggregator<'_> {
        ConversationAggregator::new(&self.db, &self.access, self.config.max_conflict_retries)
    }

    pub fn blocking(&self) -> BlockingGuard<'_> {
        BlockingGuard::new(&self.db, &self.access, self.config.max_conflict_retries)
    }

    pub fn moderation(&self) -> ModerationLog<'_> {
        ModerationLog::new(&self.db, &self.access, self.config.max_conflict_retries)
    }

    pub fn users(&self) -> UserDirectory<'_> {
        UserDirectory::new(&self.db, &self.access, self.config.max_conflict_retries)
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}

/// The rule catalogue named by `config.rules_path`, or the built-in one.
pub fn load_rules(config: &CoreConfig) -> Result<RuleSet> {
    match &config.rules_path {
        Some(path) => load_rules_file(path),
        None => Ok(RuleSet::defaults()?),
    }
}

fn load_rules_file(path: &Path) -> Result<RuleSet> {
    let json = std::fs::read_to_string(path).map_err(|source| CoreError::RulesFile {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = RuleSet::from_json(&json)?;
    tracing::info!(path = %path.display(), "loaded rule catalogue");
    Ok(rules)
}
