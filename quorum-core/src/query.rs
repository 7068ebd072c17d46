use std::cmp::Ordering;

use serde_json::{Map, Value};

/// What a query runs against: one concrete collection path, or every
/// collection sharing a name regardless of which document it is nested
/// under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    Collection(String),
    Group(String),
}

/// Sort direction for an ordered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// An equality constraint on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A declarative description of a document fetch or live query.
///
/// Filters are equality-only and combine conjunctively, mirroring the
/// query surface of the backing store. Anything richer is done client-side
/// on the returned snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub target: QueryTarget,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    /// A query over a single collection path.
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            target: QueryTarget::Collection(path.into()),
            filters: vec![],
            order: None,
            limit: None,
        }
    }

    /// A query over every collection with the given name, across all
    /// parents at once.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            target: QueryTarget::Group(name.into()),
            filters: vec![],
            order: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, equals: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            equals,
        });

        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(OrderBy {
            field: field.into(),
            direction,
        });

        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether documents in the given collection path are candidates for
    /// this query.
    pub fn covers_collection(&self, path: &str) -> bool {
        match &self.target {
            QueryTarget::Collection(collection) => collection == path,
            QueryTarget::Group(name) => path.rsplit('/').next() == Some(name.as_str()),
        }
    }

    /// Whether a document's fields pass every filter. A filter only matches
    /// a field that is present and equal, so missing fields never match.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        self.filters
            .iter()
            .all(|filter| fields.get(&filter.field) == Some(&filter.equals))
    }

    /// A readable name for the query target, for logs and errors.
    pub fn target_name(&self) -> &str {
        match &self.target {
            QueryTarget::Collection(path) => path,
            QueryTarget::Group(name) => name,
        }
    }
}

/// Total order over JSON values used when sorting query results.
///
/// Values of different kinds sort by kind: null, booleans, numbers,
/// strings, arrays, then objects. Objects compare equal to each other,
/// since nothing orders by them in practice.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);

            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (a, b) in a.iter().zip(b) {
                let ordering = compare_values(a, b);

                if ordering != Ordering::Equal {
                    return ordering;
                }
            }

            a.len().cmp(&b.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
