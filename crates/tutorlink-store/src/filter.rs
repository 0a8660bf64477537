//! Compile access rules into SQL `WHERE` fragments.
//!
//! List and view queries apply the caller's rule inside the query itself,
//! so rows the caller may not see are never read out of the store. The
//! fragment has the same truth table as [`Rule::evaluate`] on the
//! corresponding model.

use rusqlite::types::Value as SqlValue;

use tutorlink_shared::auth::AuthContext;
use tutorlink_shared::collections::{Collection, FieldKind};
use tutorlink_shared::rules::eval::compare_sides;
use tutorlink_shared::rules::{CompareOp, Expr, Rule, RuleRecord, Side, Value};

/// A boolean SQL expression plus its positional (`?`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlValue>,
}

impl SqlFilter {
    pub fn allow_all() -> Self {
        Self::constant(true)
    }

    pub fn deny_all() -> Self {
        Self::constant(false)
    }

    fn constant(value: bool) -> Self {
        Self {
            clause: if value { "1" } else { "0" }.to_string(),
            params: Vec::new(),
        }
    }

    /// Translate `rule` for `auth` against the columns of `collection`.
    pub fn compile(rule: &Rule, collection: Collection, auth: &AuthContext) -> Self {
        if auth.is_admin {
            return Self::allow_all();
        }
        match rule {
            Rule::Locked => Self::deny_all(),
            Rule::Open => Self::allow_all(),
            Rule::Expr(expr) => {
                let mut params = Vec::new();
                let clause = compile_expr(expr, collection, auth, &mut params);
                Self { clause, params }
            }
        }
    }
}

struct NoFields;

impl RuleRecord for NoFields {
    fn field(&self, _name: &str) -> Value {
        Value::Null
    }
}

fn compile_expr(
    expr: &Expr,
    collection: Collection,
    auth: &AuthContext,
    params: &mut Vec<SqlValue>,
) -> String {
    match expr {
        Expr::And(items) | Expr::Or(items) => {
            let joiner = if matches!(expr, Expr::And(_)) {
                " AND "
            } else {
                " OR "
            };
            let parts: Vec<String> = items
                .iter()
                .map(|e| compile_expr(e, collection, auth, params))
                .collect();
            format!("({})", parts.join(joiner))
        }
        Expr::Compare { left, op, right } => {
            let (left, right) = (left.resolve(auth), right.resolve(auth));
            compile_compare(*op, &left, &right, collection, params)
        }
    }
}

fn compile_compare(
    op: CompareOp,
    left: &Side<'_>,
    right: &Side<'_>,
    collection: Collection,
    params: &mut Vec<SqlValue>,
) -> String {
    let sql_op = match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
    };

    match (left, right) {
        (Side::Field { name: a, kind: ka }, Side::Field { name: b, kind: kb }) => format!(
            "{} {sql_op} {}",
            coalesced(collection, a, *ka),
            coalesced(collection, b, *kb)
        ),
        (Side::Field { name, kind }, Side::Constant(value))
        | (Side::Constant(value), Side::Field { name, kind }) => {
            params.push(to_sql(value, *kind));
            format!("{} {sql_op} ?", coalesced(collection, name, *kind))
        }
        // Remaining shapes involve no column and fold to a constant; this
        // also covers an anonymous id against a field.
        _ => {
            if compare_sides(op, left, right, &NoFields) {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
    }
}

fn coalesced(collection: Collection, field: &str, kind: FieldKind) -> String {
    let zero = match kind {
        FieldKind::Text => "''",
        FieldKind::Bool | FieldKind::Number => "0",
    };
    format!("COALESCE({}, {zero})", column(collection, field))
}

fn to_sql(value: &Value, kind: FieldKind) -> SqlValue {
    match value {
        Value::Null => match kind {
            FieldKind::Text => SqlValue::Text(String::new()),
            FieldKind::Bool | FieldKind::Number => SqlValue::Integer(0),
        },
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => SqlValue::Real(*n),
    }
}

/// SQL expression holding rule field `field` of `collection`.
///
/// Field names come from the collection catalogue, which the rule parser
/// has already checked; an unmapped name would be a catalogue bug and
/// compiles to `NULL`.
pub fn column(collection: Collection, field: &str) -> &'static str {
    match (collection, field) {
        (Collection::Users, "id") => "users.id",
        (Collection::Users, "role") => "users.role",
        (Collection::Users, "name") => "users.name",
        (Collection::Users, "username") => "users.username",
        (Collection::Users, "city") => "users.city",
        (Collection::Users, "bio") => "users.bio",
        (Collection::Users, "birthDate") => "users.birth_date",

        (Collection::Slots, "id") => "slots.id",
        (Collection::Slots, "tutorId") => "slots.tutor_id",
        (Collection::Slots, "studentId") => "slots.student_id",
        (Collection::Slots, "date") => "slots.date",
        (Collection::Slots, "startTime") => "slots.start_time",
        (Collection::Slots, "endTime") => "slots.end_time",
        (Collection::Slots, "isBooked") => "(slots.state <> 'free')",
        (Collection::Slots, "isPaid") => "(slots.state = 'paid')",

        (Collection::Chats, "id") => "chats.id",
        (Collection::Chats, "user1Id") => "chats.user1_id",
        (Collection::Chats, "user2Id") => "chats.user2_id",
        (Collection::Chats, "lastMessage") => "chats.last_message",
        (Collection::Chats, "lastMessageType") => "chats.last_message_type",
        (Collection::Chats, "lastSenderId") => "chats.last_sender_id",
        (Collection::Chats, "unreadCountUser1") => "chats.unread_count_user1",
        (Collection::Chats, "unreadCountUser2") => "chats.unread_count_user2",

        (Collection::Messages, "id") => "messages.id",
        (Collection::Messages, "chatId") => "messages.chat_id",
        (Collection::Messages, "senderId") => "messages.sender_id",
        (Collection::Messages, "receiverId") => "messages.receiver_id",
        (Collection::Messages, "message") => "messages.body",
        (Collection::Messages, "type") => "messages.type",
        (Collection::Messages, "isRead") => "messages.is_read",

        (Collection::BlockedUsers, "id") => "blocked_users.id",
        (Collection::BlockedUsers, "userId") => "blocked_users.user_id",
        (Collection::BlockedUsers, "blockedUserId") => "blocked_users.blocked_user_id",

        (Collection::Reports, "id") => "reports.id",
        (Collection::Reports, "reportedBy") => "reports.reported_by",
        (Collection::Reports, "messageId") => "reports.message_id",
        (Collection::Reports, "messageOwnerId") => "reports.message_owner_id",

        _ => "NULL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorlink_shared::types::{Role, UserId};

    fn rule(src: &str, collection: Collection) -> Rule {
        Rule::parse(Some(src), collection).unwrap()
    }

    #[test]
    fn every_catalogue_field_has_a_column() {
        for collection in Collection::ALL {
            for field in collection.fields() {
                assert_ne!(column(collection, field.name), "NULL", "{collection}.{}", field.name);
            }
        }
    }

    #[test]
    fn owner_rule_binds_caller_id() {
        let me = UserId::new();
        let auth = AuthContext::user(me, Role::Student);
        let filter = SqlFilter::compile(
            &rule("senderId = @request.auth.id || receiverId = @request.auth.id", Collection::Messages),
            Collection::Messages,
            &auth,
        );
        assert_eq!(
            filter.clause,
            "(COALESCE(messages.sender_id, '') = ? OR COALESCE(messages.receiver_id, '') = ?)"
        );
        assert_eq!(
            filter.params,
            vec![SqlValue::Text(me.to_string()), SqlValue::Text(me.to_string())]
        );
    }

    #[test]
    fn anonymous_against_field_folds_to_false() {
        let filter = SqlFilter::compile(
            &rule("tutorId = @request.auth.id || isBooked = false", Collection::Slots),
            Collection::Slots,
            &AuthContext::anonymous(),
        );
        assert_eq!(filter.clause, "(0 OR COALESCE((slots.state <> 'free'), 0) = ?)");
        assert_eq!(filter.params, vec![SqlValue::Integer(0)]);
    }

    #[test]
    fn constant_comparisons_fold() {
        let src = "@request.auth.id != \"\"";
        let anon = SqlFilter::compile(&rule(src, Collection::Users), Collection::Users, &AuthContext::anonymous());
        assert_eq!(anon, SqlFilter::deny_all());

        let user = AuthContext::user(UserId::new(), Role::Tutor);
        let authed = SqlFilter::compile(&rule(src, Collection::Users), Collection::Users, &user);
        assert_eq!(authed, SqlFilter::allow_all());
    }

    #[test]
    fn locked_and_open_rules() {
        let user = AuthContext::user(UserId::new(), Role::Tutor);
        assert_eq!(
            SqlFilter::compile(&Rule::Locked, Collection::Reports, &user),
            SqlFilter::deny_all()
        );
        assert_eq!(
            SqlFilter::compile(&Rule::Locked, Collection::Reports, &AuthContext::admin()),
            SqlFilter::allow_all()
        );
        assert_eq!(
            SqlFilter::compile(&Rule::Open, Collection::Users, &AuthContext::anonymous()),
            SqlFilter::allow_all()
        );
    }
}
