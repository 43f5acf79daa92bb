//! Filter predicate compilation.
//!
//! Predicates fold left to right into one boolean tree. Each later predicate
//! combines with everything before it, so `a OR b AND c` is `(a OR b) AND c`.

use crate::error::ValidationError;
use crate::literal::Literal;
use crate::schema::{FieldRef, FieldType};
use crate::spec::{Connective, FilterPredicate, Operator};
use crate::sql::{escape_like, SqlWriter};

/// Check `operator` against the field type and coerce `value` to it.
pub(crate) fn validate(
    field: &FieldRef,
    operator: Operator,
    value: Literal,
) -> Result<Literal, ValidationError> {
    let ty = field.ty();
    if ty == FieldType::TextArray {
        return Err(ValidationError::NotFilterable(field.qualified()));
    }
    if !operator.accepts(ty) {
        return Err(ValidationError::OperatorTypeMismatch {
            field: field.qualified(),
            operator,
            ty,
        });
    }
    value.coerce(field)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Condition {
    pub field: FieldRef,
    pub operator: Operator,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Leaf(Condition),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Fold predicates left to right. The first predicate's connective is ignored.
    pub fn fold(filters: &[FilterPredicate]) -> Option<Predicate> {
        let mut iter = filters.iter();
        let first = iter.next()?;
        let seed = Predicate::Leaf(Condition::from(first));
        Some(iter.fold(seed, |acc, next| {
            let leaf = Box::new(Predicate::Leaf(Condition::from(next)));
            match next.connective {
                Connective::And => Predicate::And(Box::new(acc), leaf),
                Connective::Or => Predicate::Or(Box::new(acc), leaf),
            }
        }))
    }

    pub fn write(&self, w: &mut SqlWriter) {
        match self {
            Predicate::Leaf(condition) => condition.write(w),
            Predicate::And(lhs, rhs) => write_binary(w, lhs, "AND", rhs),
            Predicate::Or(lhs, rhs) => write_binary(w, lhs, "OR", rhs),
        }
    }
}

fn write_binary(w: &mut SqlWriter, lhs: &Predicate, connective: &str, rhs: &Predicate) {
    w.push("(");
    lhs.write(w);
    w.push(" ").push(connective).push(" ");
    rhs.write(w);
    w.push(")");
}

impl From<&FilterPredicate> for Condition {
    fn from(filter: &FilterPredicate) -> Self {
        Condition {
            field: filter.field,
            operator: filter.operator,
            value: filter.value.clone(),
        }
    }
}

impl Condition {
    fn write(&self, w: &mut SqlWriter) {
        let expr = self.field.sql_expr();
        match self.operator {
            Operator::Contains => {
                let needle = match &self.value {
                    Literal::Text(s) => s.as_str(),
                    _ => "",
                };
                let pattern = format!("%{}%", escape_like(needle));
                w.push("COALESCE(")
                    .push(&expr)
                    .push(", '') ILIKE ")
                    .push_bind(Literal::Text(pattern));
            }
            Operator::Equals => self.write_comparison(w, &expr, "="),
            Operator::Gt => self.write_comparison(w, &expr, ">"),
            Operator::Lt => self.write_comparison(w, &expr, "<"),
            Operator::Gte => self.write_comparison(w, &expr, ">="),
            Operator::Lte => self.write_comparison(w, &expr, "<="),
        }
    }

    fn write_comparison(&self, w: &mut SqlWriter, expr: &str, symbol: &str) {
        w.push(expr)
            .push(" ")
            .push(symbol)
            .push(" ")
            .push_bind(self.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::QuerySpec;

    fn compile(spec: &QuerySpec) -> (String, Vec<Literal>) {
        let mut w = SqlWriter::new();
        Predicate::fold(&spec.filters).unwrap().write(&mut w);
        w.finish()
    }

    #[test]
    fn test_left_fold_groups_earlier_predicates() {
        let mut spec = QuerySpec::new();
        spec.add_filter("sessions.language", "equals", "en", "AND")
            .unwrap()
            .add_filter("sessions.language", "equals", "de", "OR")
            .unwrap()
            .add_filter("sessions.viewer_count", "gte", 100, "AND")
            .unwrap();

        let (sql, params) = compile(&spec);
        assert_eq!(
            sql,
            "((sessions.language = $1 OR sessions.language = $2) AND sessions.viewer_count >= $3)"
        );
        assert_eq!(
            params,
            vec![Literal::from("en"), Literal::from("de"), Literal::Integer(100)]
        );
    }

    #[test]
    fn test_first_connective_is_ignored() {
        let mut a = QuerySpec::new();
        a.add_filter("clips.view_count", "gt", 5, "OR").unwrap();
        let mut b = QuerySpec::new();
        b.add_filter("clips.view_count", "gt", 5, "AND").unwrap();
        assert_eq!(compile(&a), compile(&b));
        assert_eq!(compile(&a).0, "clips.view_count > $1");
    }

    #[test]
    fn test_no_filters_fold_to_nothing() {
        assert!(Predicate::fold(&[]).is_none());
    }

    #[test]
    fn test_contains_escapes_and_binds_pattern() {
        let mut spec = QuerySpec::new();
        spec.add_filter("sessions.title", "contains", "100%_done", "AND")
            .unwrap();
        let (sql, params) = compile(&spec);
        assert_eq!(sql, "COALESCE(sessions.title, '') ILIKE $1");
        assert_eq!(params, vec![Literal::from("%100\\%\\_done%")]);
    }

    #[test]
    fn test_empty_contains_matches_everything() {
        let mut spec = QuerySpec::new();
        spec.add_filter("accounts.description", "contains", "", "AND")
            .unwrap();
        let (_, params) = compile(&spec);
        assert_eq!(params, vec![Literal::from("%%")]);
    }

    #[test]
    fn test_injection_stays_in_parameters() {
        let payload = "'; DROP TABLE accounts; --";
        let mut spec = QuerySpec::new();
        spec.add_filter("accounts.login", "equals", payload, "AND")
            .unwrap();
        let (sql, params) = compile(&spec);
        assert!(!sql.contains("DROP"));
        assert_eq!(sql, "accounts.login = $1");
        assert_eq!(params, vec![Literal::from(payload)]);
    }

    #[test]
    fn test_related_field_uses_hop_alias() {
        let mut spec = QuerySpec::new();
        spec.add_filter("clips.category.name", "equals", "Chess", "AND")
            .unwrap();
        assert_eq!(compile(&spec).0, "clips__category.name = $1");
    }

    #[test]
    fn test_ordering_operator_rejected_for_text() {
        let mut spec = QuerySpec::new();
        let err = spec
            .add_filter("accounts.login", "gt", "m", "AND")
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::OperatorTypeMismatch {
                field: "accounts.login".to_string(),
                operator: Operator::Gt,
                ty: FieldType::Text,
            }
        );
    }

    #[test]
    fn test_contains_rejected_for_numbers() {
        let mut spec = QuerySpec::new();
        let err = spec
            .add_filter("clips.view_count", "contains", "1", "AND")
            .unwrap_err();
        assert!(matches!(err, ValidationError::OperatorTypeMismatch { .. }));
    }

    #[test]
    fn test_tag_ids_not_filterable() {
        let mut spec = QuerySpec::new();
        let err = spec
            .add_filter("sessions.tag_ids", "equals", "en", "AND")
            .unwrap_err();
        assert_eq!(err, ValidationError::NotFilterable("sessions.tag_ids".to_string()));
    }

    #[test]
    fn test_timestamp_comparison_binds_parsed_value() {
        let mut spec = QuerySpec::new();
        spec.add_filter("clips.created_at", "lt", "2024-01-01T00:00:00Z", "AND")
            .unwrap();
        let (sql, params) = compile(&spec);
        assert_eq!(sql, "clips.created_at < $1");
        assert!(matches!(params[0], Literal::Timestamp(_)));
    }

    #[test]
    fn test_boolean_equals() {
        let mut spec = QuerySpec::new();
        spec.add_filter("sessions.is_mature", "equals", false, "AND")
            .unwrap();
        assert_eq!(compile(&spec).1, vec![Literal::Boolean(false)]);
    }
}
