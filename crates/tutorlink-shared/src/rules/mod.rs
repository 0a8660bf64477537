//! Access rules.
//!
//! Every collection carries one rule per [`Action`]. A rule is either locked
//! (`null` in the catalogue: only administrative callers pass), open (`""`:
//! everyone passes, anonymous callers included) or a boolean expression over
//! record fields and the request's auth context.
//!
//! Expressions are parsed once, when the catalogue is loaded. A catalogue
//! that fails to parse is a configuration error and is never used.

pub mod ast;
pub mod catalogue;
pub mod eval;
pub mod parser;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::collections::{Action, Collection};
use crate::error::{ExprError, RuleError};

pub use ast::{CompareOp, Expr, Operand, Side, Value};
pub use eval::RuleRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Locked,
    Open,
    Expr(Expr),
}

impl Rule {
    pub fn parse(source: Option<&str>, collection: Collection) -> Result<Self, ExprError> {
        match source {
            None => Ok(Self::Locked),
            Some(s) if s.trim().is_empty() => Ok(Self::Open),
            Some(s) => parser::parse(s, collection).map(Self::Expr),
        }
    }

    /// Decide whether `auth` may act on `record`.
    ///
    /// A locked rule denies every non-administrative caller no matter what
    /// any expression elsewhere would say.
    pub fn evaluate(&self, auth: &AuthContext, record: &dyn RuleRecord) -> bool {
        if auth.is_admin {
            return true;
        }
        match self {
            Self::Locked => false,
            Self::Open => true,
            Self::Expr(expr) => eval::evaluate(expr, auth, record),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked)
    }
}

/// Catalogue entry as it appears in a collections export.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCollectionRules {
    pub list_rule: Option<String>,
    pub view_rule: Option<String>,
    pub create_rule: Option<String>,
    pub update_rule: Option<String>,
    pub delete_rule: Option<String>,
}

impl RawCollectionRules {
    fn source(&self, action: Action) -> Option<&str> {
        match action {
            Action::List => self.list_rule.as_deref(),
            Action::View => self.view_rule.as_deref(),
            Action::Create => self.create_rule.as_deref(),
            Action::Update => self.update_rule.as_deref(),
            Action::Delete => self.delete_rule.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRules {
    pub list: Rule,
    pub view: Rule,
    pub create: Rule,
    pub update: Rule,
    pub delete: Rule,
}

impl CollectionRules {
    pub fn locked() -> Self {
        Self {
            list: Rule::Locked,
            view: Rule::Locked,
            create: Rule::Locked,
            update: Rule::Locked,
            delete: Rule::Locked,
        }
    }

    pub fn compile(collection: Collection, raw: &RawCollectionRules) -> Result<Self, RuleError> {
        let rule = |action: Action| {
            Rule::parse(raw.source(action), collection).map_err(|source| RuleError::Invalid {
                collection: collection.name(),
                action,
                source,
            })
        };
        Ok(Self {
            list: rule(Action::List)?,
            view: rule(Action::View)?,
            create: rule(Action::Create)?,
            update: rule(Action::Update)?,
            delete: rule(Action::Delete)?,
        })
    }

    pub fn rule(&self, action: Action) -> &Rule {
        match action {
            Action::List => &self.list,
            Action::View => &self.view,
            Action::Create => &self.create,
            Action::Update => &self.update,
            Action::Delete => &self.delete,
        }
    }
}

/// Compiled rules for every collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    collections: HashMap<Collection, CollectionRules>,
}

impl RuleSet {
    /// Compile a catalogue keyed by collection name. Collections absent from
    /// the catalogue are fully locked.
    pub fn compile(raw: &HashMap<String, RawCollectionRules>) -> Result<Self, RuleError> {
        let mut collections: HashMap<Collection, CollectionRules> = Collection::ALL
            .into_iter()
            .map(|c| (c, CollectionRules::locked()))
            .collect();

        for (name, entry) in raw {
            let collection = Collection::from_name(name)
                .ok_or_else(|| RuleError::UnknownCollection(name.clone()))?;
            collections.insert(collection, CollectionRules::compile(collection, entry)?);
        }

        Ok(Self { collections })
    }

    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let raw: HashMap<String, RawCollectionRules> =
            serde_json::from_str(json).map_err(|e| RuleError::Json(e.to_string()))?;
        Self::compile(&raw)
    }

    /// The built-in catalogue.
    pub fn defaults() -> Result<Self, RuleError> {
        Self::compile(&catalogue::default_catalogue())
    }

    pub fn rule(&self, collection: Collection, action: Action) -> &Rule {
        static LOCKED: Rule = Rule::Locked;
        self.collections
            .get(&collection)
            .map_or(&LOCKED, |rules| rules.rule(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, UserId};

    struct Empty;

    impl RuleRecord for Empty {
        fn field(&self, _name: &str) -> Value {
            Value::Null
        }
    }

    struct Owned(UserId);

    impl RuleRecord for Owned {
        fn field(&self, name: &str) -> Value {
            match name {
                "reportedBy" => Value::Text(self.0.to_string()),
                _ => Value::Null,
            }
        }
    }

    #[test]
    fn null_denies_even_satisfiable_callers() {
        let me = UserId::new();
        let auth = AuthContext::user(me, Role::Student);
        let rule = Rule::parse(None, Collection::Reports).unwrap();
        assert!(!rule.evaluate(&auth, &Owned(me)));
        assert!(rule.evaluate(&AuthContext::admin(), &Owned(me)));
    }

    #[test]
    fn empty_allows_anonymous() {
        let rule = Rule::parse(Some(""), Collection::Users).unwrap();
        assert_eq!(rule, Rule::Open);
        assert!(rule.evaluate(&AuthContext::anonymous(), &Empty));
    }

    #[test]
    fn defaults_compile() {
        let rules = RuleSet::defaults().unwrap();
        assert!(rules.rule(Collection::Reports, Action::List).is_locked());
        assert!(rules.rule(Collection::Chats, Action::Delete).is_locked());
        assert_eq!(rules.rule(Collection::Users, Action::Create), &Rule::Open);
    }

    #[test]
    fn catalogue_from_export_json() {
        let json = r#"{
            "reports": { "createRule": "reportedBy = @request.auth.id" },
            "users": { "listRule": "", "viewRule": "" }
        }"#;
        let rules = RuleSet::from_json(json).unwrap();
        assert!(rules.rule(Collection::Reports, Action::View).is_locked());
        assert!(!rules.rule(Collection::Reports, Action::Create).is_locked());
        assert!(rules.rule(Collection::Slots, Action::List).is_locked());
    }

    #[test]
    fn malformed_catalogue_is_rejected_at_load() {
        let json = r#"{ "messages": { "listRule": "senderId = " } }"#;
        match RuleSet::from_json(json) {
            Err(RuleError::Invalid {
                collection, action, ..
            }) => {
                assert_eq!(collection, "messages");
                assert_eq!(action, Action::List);
            }
            other => panic!("expected invalid rule, got {other:?}"),
        }
        assert!(matches!(
            RuleSet::from_json(r#"{ "channels": {} }"#),
            Err(RuleError::UnknownCollection(_))
        ));
    }
}
