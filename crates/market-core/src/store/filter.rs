//! Query filters
//!
//! Filters are data: they render to an Airtable `filterByFormula` string and
//! evaluate directly against in-memory field maps.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// Record filter expression
#[derive(Clone, Debug, PartialEq)]
pub enum RecordFilter {
    /// Every record
    All,
    /// Field equals a value (strings compare trimmed)
    Eq(String, Value),
    /// Checkbox-style field is set
    IsTrue(String),
    /// Field missing or empty
    Blank(String),
    And(Vec<RecordFilter>),
    Or(Vec<RecordFilter>),
}

impl RecordFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        RecordFilter::Eq(field.into(), value.into())
    }

    pub fn is_true(field: impl Into<String>) -> Self {
        RecordFilter::IsTrue(field.into())
    }

    pub fn blank(field: impl Into<String>) -> Self {
        RecordFilter::Blank(field.into())
    }

    /// Render as an Airtable formula; `None` for [`RecordFilter::All`]
    pub fn to_formula(&self) -> Option<String> {
        match self {
            RecordFilter::All => None,
            RecordFilter::Eq(field, value) => Some(format!("{{{field}}}={}", formula_literal(value))),
            RecordFilter::IsTrue(field) => Some(format!("{{{field}}}=TRUE()")),
            RecordFilter::Blank(field) => Some(format!("{{{field}}}=''")),
            RecordFilter::And(parts) => combine("AND", parts),
            RecordFilter::Or(parts) => combine("OR", parts),
        }
    }

    /// Evaluate against a field map
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::Eq(field, expected) => fields
                .get(field)
                .is_some_and(|actual| values_equal(actual, expected)),
            RecordFilter::IsTrue(field) => matches!(fields.get(field), Some(Value::Bool(true))),
            RecordFilter::Blank(field) => match fields.get(field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            },
            RecordFilter::And(parts) => parts.iter().all(|p| p.matches(fields)),
            RecordFilter::Or(parts) => parts.iter().any(|p| p.matches(fields)),
        }
    }
}

fn combine(op: &str, parts: &[RecordFilter]) -> Option<String> {
    let rendered: Vec<String> = parts.iter().filter_map(RecordFilter::to_formula).collect();
    match rendered.len() {
        0 => None,
        1 => rendered.into_iter().next(),
        _ => Some(format!("{op}({})", rendered.join(", "))),
    }
}

fn formula_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Bool(true) => "TRUE()".into(),
        Value::Bool(false) => "FALSE()".into(),
        Value::Number(n) => n.to_string(),
        Value::Null => "BLANK()".into(),
        other => format!("'{}'", other.to_string().replace('\'', "\\'")),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a.trim() == b.trim(),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Order two field maps on this sort key; missing values sort last
    pub fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        let ordering = match (sort_key(a.get(&self.field)), sort_key(b.get(&self.field))) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        };

        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

// RFC 3339 timestamps order correctly as strings
fn sort_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(format!("{:020.6}", n.as_f64().unwrap_or_default())),
        _ => None,
    }
}

/// A store query
#[derive(Clone, Debug, PartialEq)]
pub struct RecordQuery {
    pub filter: RecordFilter,
    pub sort: Vec<Sort>,
    /// Records per upstream page (Airtable caps this at 100)
    pub page_size: u32,
    /// Stop after this many records
    pub max_records: Option<usize>,
}

impl RecordQuery {
    pub fn new(filter: RecordFilter) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            page_size: 100,
            max_records: None,
        }
    }

    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn limit(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self.page_size = u32::try_from(max_records.clamp(1, 100)).unwrap_or(100);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_formula_rendering() {
        let filter = RecordFilter::And(vec![
            RecordFilter::is_true("pickup_confirmed"),
            RecordFilter::eq("seller_payout_status", "Pending"),
        ]);
        assert_eq!(
            filter.to_formula().as_deref(),
            Some("AND({pickup_confirmed}=TRUE(), {seller_payout_status}='Pending')")
        );

        assert_eq!(RecordFilter::All.to_formula(), None);
        assert_eq!(
            RecordFilter::eq("stripe_payment_intent", "pi_it's").to_formula().as_deref(),
            Some("{stripe_payment_intent}='pi_it\\'s'")
        );
    }

    #[test]
    fn test_in_memory_matching() {
        let record = fields(json!({
            "pickup_confirmed": true,
            "seller_payout_status": "Pending ",
            "payout_error": ""
        }));

        assert!(RecordFilter::is_true("pickup_confirmed").matches(&record));
        assert!(RecordFilter::eq("seller_payout_status", "Pending").matches(&record));
        assert!(RecordFilter::blank("payout_error").matches(&record));
        assert!(RecordFilter::blank("stripe_transfer_id").matches(&record));
        assert!(!RecordFilter::is_true("chargeback_flag").matches(&record));
        assert!(RecordFilter::Or(vec![
            RecordFilter::is_true("chargeback_flag"),
            RecordFilter::is_true("pickup_confirmed"),
        ])
        .matches(&record));
    }

    #[test]
    fn test_sort_desc_missing_last() {
        let sort = Sort::desc("payout_sent_at");
        let older = fields(json!({"payout_sent_at": "2026-01-01T00:00:00.000Z"}));
        let newer = fields(json!({"payout_sent_at": "2026-02-01T00:00:00.000Z"}));
        let none = fields(json!({}));

        assert_eq!(sort.compare(&newer, &older), Ordering::Less);
        assert_eq!(sort.compare(&none, &older), Ordering::Greater);
    }
}
