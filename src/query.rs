//! Field filters, text search, sorting and pagination over list
//! collections. There is no query language: filters are exact matches on
//! top-level fields.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::collection::Collection;
use crate::error::CmsError;
use crate::working_set::WorkingSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

impl FromStr for Filter {
    type Err = CmsError;

    /// Parses `field=value`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((field, value)) if !field.trim().is_empty() => Ok(Filter {
                field: field.trim().to_string(),
                value: value.to_string(),
            }),
            _ => Err(CmsError::InvalidRecord(format!("filter must look like field=value, got '{s}'"))),
        }
    }
}

impl Filter {
    fn matches(&self, record: &Value) -> bool {
        match record.get(&self.field) {
            Some(Value::Array(items)) => items.iter().any(|item| scalar_eq(item, &self.value)),
            Some(value) => scalar_eq(value, &self.value),
            None => false,
        }
    }
}

fn scalar_eq(value: &Value, wanted: &str) -> bool {
    match value {
        Value::String(s) => s == wanted,
        Value::Number(n) => n.to_string() == wanted,
        Value::Bool(b) => b.to_string() == wanted,
        Value::Null => wanted == "null",
        _ => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    /// Case-insensitive substring match over any top-level string field.
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub order: SortOrder,
    /// One-based; zero is treated as one.
    pub page: usize,
    /// Page size; `None` returns everything on a single page.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<Value>,
    pub total: usize,
    pub page: usize,
    pub limit: Option<usize>,
    pub total_pages: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.order = order;
        self
    }

    pub fn paginate(mut self, page: usize, limit: usize) -> Self {
        self.page = page;
        self.limit = Some(limit);
        self
    }

    pub fn apply(&self, records: &[Value]) -> Page {
        let needle = self.search.as_ref().map(|s| s.to_lowercase());

        let mut matched: Vec<&Value> = records
            .iter()
            .filter(|record| self.filters.iter().all(|f| f.matches(record)))
            .filter(|record| match &needle {
                Some(needle) => contains_text(record, needle),
                None => true,
            })
            .collect();

        if let Some(field) = &self.sort_by {
            matched.sort_by(|a, b| compare_field(a.get(field), b.get(field), self.order));
        }

        let total = matched.len();
        let page = self.page.max(1);
        let (items, total_pages) = match self.limit {
            Some(limit) if limit > 0 => {
                let items = matched
                    .into_iter()
                    .skip((page - 1).saturating_mul(limit))
                    .take(limit)
                    .cloned()
                    .collect();
                (items, total.div_ceil(limit))
            }
            _ => (matched.into_iter().cloned().collect(), usize::from(total > 0)),
        };

        Page {
            items,
            total,
            page,
            limit: self.limit,
            total_pages,
        }
    }
}

fn contains_text(record: &Value, needle: &str) -> bool {
    match record {
        Value::Object(fields) => fields.values().any(|v| match v {
            Value::String(s) => s.to_lowercase().contains(needle),
            _ => false,
        }),
        _ => false,
    }
}

// Missing fields sort last regardless of order.
fn compare_field(a: Option<&Value>, b: Option<&Value>, order: SortOrder) -> Ordering {
    let (a, b) = match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => return Ordering::Equal,
        (None | Some(Value::Null), _) => return Ordering::Greater,
        (_, None | Some(Value::Null)) => return Ordering::Less,
        (Some(a), Some(b)) => (a, b),
    };

    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    };

    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

impl WorkingSet {
    /// Runs `query` against a list collection.
    pub fn query(&self, collection: Collection, query: &Query) -> crate::Result<Page> {
        let records = self.records(collection)?;
        Ok(query.apply(&records))
    }
}
