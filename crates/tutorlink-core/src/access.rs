//! The gate every service passes through before touching the store.

use tutorlink_shared::auth::AuthContext;
use tutorlink_shared::collections::{Action, Collection};
use tutorlink_shared::rules::{Rule, RuleRecord, RuleSet};
use tutorlink_store::SqlFilter;

use crate::error::{CoreError, Result};

/// A compiled rule catalogue and the two ways of applying it: against one
/// record in memory, or as a SQL filter over a whole collection.
#[derive(Debug, Clone)]
pub struct AccessControl {
    rules: RuleSet,
}

impl AccessControl {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rule(&self, collection: Collection, action: Action) -> &Rule {
        self.rules.rule(collection, action)
    }

    pub fn allows(
        &self,
        collection: Collection,
        action: Action,
        auth: &AuthContext,
        record: &dyn RuleRecord,
    ) -> bool {
        self.rule(collection, action).evaluate(auth, record)
    }

    /// `Ok(())` if `auth` may perform `action` on `record`.
    pub fn authorize(
        &self,
        collection: Collection,
        action: Action,
        auth: &AuthContext,
        record: &dyn RuleRecord,
    ) -> Result<()> {
        if self.allows(collection, action, auth, record) {
            tracing::debug!(%collection, %action, user = ?auth.user_id, "access granted");
            Ok(())
        } else {
            tracing::debug!(%collection, %action, user = ?auth.user_id, "access denied");
            Err(CoreError::denied(collection, action))
        }
    }

    /// SQL filter restricting `collection` to the rows `auth` may see for
    /// `action`. A locked rule is refused outright instead of producing a
    /// filter that matches nothing.
    pub fn filter(
        &self,
        collection: Collection,
        action: Action,
        auth: &AuthContext,
    ) -> Result<SqlFilter> {
        let rule = self.rule(collection, action);
        if rule.is_locked() && !auth.is_admin {
            tracing::debug!(%collection, %action, user = ?auth.user_id, "locked rule");
            return Err(CoreError::denied(collection, action));
        }
        Ok(SqlFilter::compile(rule, collection, auth))
    }
}
