use std::cmp::Ordering;

use serde_json::Value;

use crate::{get_path, Document, Fields};

/// Field predicate. Paths are dotted; a document missing the field never
/// matches, including for `NotEq`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    NotEq(String, Value),
    ArrayContains(String, Value),
    Gte(String, Value),
    Lte(String, Value),
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(path.into(), value.into())
    }

    pub fn not_eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEq(path.into(), value.into())
    }

    pub fn array_contains(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::ArrayContains(path.into(), value.into())
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(path.into(), value.into())
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte(path.into(), value.into())
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        let (path, expected) = match self {
            Self::Eq(p, v)
            | Self::NotEq(p, v)
            | Self::ArrayContains(p, v)
            | Self::Gte(p, v)
            | Self::Lte(p, v) => (p, v),
        };
        let Some(actual) = get_path(fields, path) else {
            return false;
        };
        match self {
            Self::Eq(..) => values_equal(actual, expected),
            Self::NotEq(..) => !values_equal(actual, expected),
            Self::ArrayContains(..) => actual
                .as_array()
                .map_or(false, |items| items.iter().any(|i| values_equal(i, expected))),
            Self::Gte(..) => matches!(
                compare_values(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lte(..) => matches!(
                compare_values(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b || compare_values(a, b) == Some(Ordering::Equal)
}

/// Order two scalar values of the same type. Mixed types do not compare.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Position of a value's type in the sort order: null, bool, number,
/// string, then arrays and objects.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) | Value::Object(_) => 4,
    }
}

/// Total order used for sorting: type rank first, then the value. Arrays and
/// objects tie with each other.
fn sort_values(a: &Value, b: &Value) -> Ordering {
    type_rank(a)
        .cmp(&type_rank(b))
        .then_with(|| compare_values(a, b).unwrap_or(Ordering::Equal))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filters, optional ordering and an optional cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Select, order and cap `docs`. Documents lacking the order field are
    /// dropped. Values of different types order by type, nulls first; ties
    /// keep id order so results are deterministic.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = docs
            .into_iter()
            .filter(|d| d.matches(&self.filters))
            .collect();
        if let Some(order) = &self.order_by {
            selected.retain(|d| d.get(&order.field).is_some());
            selected.sort_by(|a, b| {
                let ord = match (a.get(&order.field), b.get(&order.field)) {
                    (Some(x), Some(y)) => sort_values(x, y),
                    _ => Ordering::Equal,
                };
                let ord = match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                ord.then_with(|| a.id.cmp(&b.id))
            });
        } else {
            selected.sort_by(|a, b| a.id.cmp(&b.id));
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, v: Value) -> Document {
        Document::new(id, v.as_object().cloned().unwrap())
    }

    #[test]
    fn prefix_range_on_strings() {
        let docs = vec![
            doc("1", json!({"username": "anna"})),
            doc("2", json!({"username": "andrew"})),
            doc("3", json!({"username": "bob"})),
        ];
        let q = Query::new()
            .filter(Filter::gte("username", "an"))
            .filter(Filter::lte("username", "an\u{f8ff}"));
        let ids: Vec<_> = q.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn not_eq_skips_missing_fields() {
        let docs = vec![
            doc("1", json!({"phone": ""})),
            doc("2", json!({"phone": "+100"})),
            doc("3", json!({})),
        ];
        let q = Query::new().filter(Filter::not_eq("phone", ""));
        let ids: Vec<_> = q.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[test]
    fn order_desc_with_limit_drops_unordered() {
        let docs = vec![
            doc("a", json!({"participants": ["u1"], "t": 5})),
            doc("b", json!({"participants": ["u1", "u2"], "t": 9})),
            doc("c", json!({"participants": ["u2"], "t": 7})),
            doc("d", json!({"participants": ["u1"]})),
            doc("e", json!({"participants": ["u1"], "t": 1})),
        ];
        let q = Query::new()
            .filter(Filter::array_contains("participants", "u1"))
            .order_by("t", Direction::Desc)
            .limit(2);
        let ids: Vec<_> = q.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn order_over_mixed_types_is_total() {
        let docs = vec![
            doc("x", json!({"t": 1})),
            doc("y", json!({"t": null})),
            doc("z", json!({"t": 2})),
            doc("w", json!({"t": "late"})),
            doc("v", json!({"t": 3})),
        ];
        let q = Query::new().order_by("t", Direction::Desc);
        let ids: Vec<_> = q.apply(docs.clone()).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["w", "v", "z", "x", "y"]);

        let q = Query::new().order_by("t", Direction::Asc);
        let ids: Vec<_> = q.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["y", "x", "z", "v", "w"]);
    }

    #[test]
    fn mixed_types_never_compare() {
        assert_eq!(compare_values(&json!(1), &json!("1")), None);
        assert_eq!(compare_values(&json!(1), &json!(1.0)), Some(Ordering::Equal));
    }
}
