//! In-process evaluation of the filter language.
//!
//! Mirrors the SQL rendered by [`FilterWhere`](super::filter_where::FilterWhere) closely
//! enough that the in-memory store and Postgres agree on which rows a filter selects:
//! missing fields behave like SQL NULL, comparisons against NULL are false, and
//! ascending sorts put NULLs last.

use std::cmp::Ordering;

use chrono::DateTime;
use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::types::{FilterData, FilterOp, SortDirection};

pub struct FilterMatch;

impl FilterMatch {
    /// Run the complete filter (where, order, offset, limit, select) over `records`.
    pub fn apply(records: Vec<Map<String, Value>>, filter: &FilterData) -> Result<Vec<Map<String, Value>>, FilterError> {
        let mut selected = Vec::new();
        for record in records {
            let keep = match &filter.where_clause {
                Some(where_data) => Self::matches(where_data, &record)?,
                None => true,
            };
            if keep { selected.push(record); }
        }

        if let Some(order) = &filter.order {
            let infos = FilterOrder::validate_and_parse(order)?;
            selected.sort_by(|a, b| {
                for info in &infos {
                    let ord = sort_cmp(a.get(&info.column), b.get(&info.column));
                    let ord = if info.sort == SortDirection::Desc { ord.reverse() } else { ord };
                    if ord != Ordering::Equal { return ord; }
                }
                Ordering::Equal
            });
        }

        let offset = match filter.offset {
            Some(o) if o < 0 => return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string())),
            Some(o) => o as usize,
            None => 0,
        };
        let limit = match filter.limit {
            Some(l) if l < 0 => return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string())),
            Some(l) => {
                let max_limit = crate::config::CONFIG.filter.max_limit.unwrap_or(i32::MAX);
                Some(l.min(max_limit) as usize)
            }
            None => None,
        };

        let page = selected.into_iter().skip(offset);
        let page: Vec<_> = match limit {
            Some(l) => page.take(l).collect(),
            None => page.collect(),
        };

        match &filter.select {
            Some(columns) if !columns.iter().any(|c| c == "*") => {
                Ok(page
                    .into_iter()
                    .map(|row| row.into_iter().filter(|(k, _)| columns.contains(k)).collect())
                    .collect())
            }
            _ => Ok(page),
        }
    }

    pub fn matches(where_data: &Value, record: &Map<String, Value>) -> Result<bool, FilterError> {
        match where_data {
            Value::Null => Ok(true),
            Value::Object(obj) => {
                for (key, value) in obj {
                    let ok = if key.starts_with('$') {
                        Self::match_logical(key, value, record)?
                    } else {
                        Self::match_field(key, value, record)?
                    };
                    if !ok { return Ok(false); }
                }
                Ok(true)
            }
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn match_logical(op: &str, value: &Value, record: &Map<String, Value>) -> Result<bool, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value.as_array().ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let mut results = Vec::with_capacity(arr.len());
                for v in arr {
                    results.push(Self::matches(v, record)?);
                }
                Ok(if op == "$and" { results.iter().all(|r| *r) } else { results.iter().any(|r| *r) })
            }
            "$not" => Ok(!Self::matches(value, record)?),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn match_field(field: &str, condition: &Value, record: &Map<String, Value>) -> Result<bool, FilterError> {
        let actual = record.get(field).unwrap_or(&Value::Null);
        match condition {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => {
                for (op_key, operand) in obj {
                    let op = FilterOp::parse(op_key).ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    if !Self::match_op(&op, actual, operand)? { return Ok(false); }
                }
                Ok(true)
            }
            _ => Self::match_op(&FilterOp::Eq, actual, condition),
        }
    }

    fn match_op(op: &FilterOp, actual: &Value, operand: &Value) -> Result<bool, FilterError> {
        Ok(match op {
            FilterOp::Eq => {
                if operand.is_null() { actual.is_null() } else { values_equal(actual, operand) }
            }
            FilterOp::Neq => {
                if operand.is_null() { !actual.is_null() } else { !values_equal(actual, operand) }
            }
            FilterOp::Gt => value_cmp(actual, operand) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(value_cmp(actual, operand), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => value_cmp(actual, operand) == Some(Ordering::Less),
            FilterOp::Lte => matches!(value_cmp(actual, operand), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Like | FilterOp::ILike => match (actual.as_str(), operand.as_str()) {
                (Some(text), Some(pattern)) => like_match(pattern, text, *op == FilterOp::ILike),
                _ => false,
            },
            FilterOp::In => match operand {
                Value::Array(values) => values.iter().any(|v| values_equal(actual, v)),
                other => values_equal(actual, other),
            },
            FilterOp::Between => match operand {
                Value::Array(bounds) if bounds.len() == 2 => {
                    matches!(value_cmp(actual, &bounds[0]), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(value_cmp(actual, &bounds[1]), Some(Ordering::Less | Ordering::Equal))
                }
                _ => return Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string())),
            },
            FilterOp::Any => {
                let wanted = as_list(operand);
                match actual {
                    Value::Array(items) => items.iter().any(|i| wanted.iter().any(|w| values_equal(i, w))),
                    _ => false,
                }
            }
            FilterOp::All => {
                let wanted = as_list(operand);
                match actual {
                    Value::Array(items) => wanted.iter().all(|w| items.iter().any(|i| values_equal(i, w))),
                    _ => false,
                }
            }
            FilterOp::Size => match (actual, operand.as_u64()) {
                (Value::Array(items), Some(n)) => items.len() as u64 == n,
                (Value::Null, Some(0)) => true,
                _ => false,
            },
            FilterOp::Raw => return Err(FilterError::UnsupportedOperator("raw".to_string())),
        })
    }
}

fn as_list(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Null, _) | (_, Value::Null) => false,
        _ => a == b,
    }
}

fn value_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            // RFC 3339 timestamps vary in fractional digits, so compare them as instants
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(a), Ok(b)) => Some(a.cmp(&b)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// NULLs sort after every value, as Postgres does for ASC.
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => value_cmp(x, y).unwrap_or(Ordering::Equal),
    }
}

/// SQL LIKE: `%` any run, `_` any single char, `\` escapes.
fn like_match(pattern: &str, text: &str, case_insensitive: bool) -> bool {
    let (pattern, text) = if case_insensitive {
        (pattern.to_lowercase(), text.to_lowercase())
    } else {
        (pattern.to_string(), text.to_string())
    };
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    like_from(&p, &t)
}

fn like_from(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('%') => (0..=t.len()).any(|i| like_from(&p[1..], &t[i..])),
        Some('_') => !t.is_empty() && like_from(&p[1..], &t[1..]),
        Some('\\') if p.len() > 1 => t.first() == Some(&p[1]) && like_from(&p[2..], &t[1..]),
        Some(c) => t.first() == Some(c) && like_from(&p[1..], &t[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn implicit_equality_and_ranges() {
        let r = row(json!({"status": "new", "price": 150.0, "assigned_to": null}));
        assert!(FilterMatch::matches(&json!({"status": "new", "price": {"$gte": 100, "$lt": 200}}), &r).unwrap());
        assert!(!FilterMatch::matches(&json!({"price": {"$gt": 150}}), &r).unwrap());
        assert!(FilterMatch::matches(&json!({"assigned_to": null}), &r).unwrap());
        assert!(FilterMatch::matches(&json!({"missing": null}), &r).unwrap());
    }

    #[test]
    fn comparisons_against_null_are_false() {
        let r = row(json!({"min_price": null}));
        assert!(!FilterMatch::matches(&json!({"min_price": {"$gte": 0}}), &r).unwrap());
        assert!(!FilterMatch::matches(&json!({"min_price": {"$lt": 0}}), &r).unwrap());
    }

    #[test]
    fn logical_operators() {
        let r = row(json!({"user_id": "u1", "assigned_to": "s1"}));
        assert!(FilterMatch::matches(&json!({"$or": [{"user_id": "x"}, {"assigned_to": "s1"}]}), &r).unwrap());
        assert!(!FilterMatch::matches(&json!({"$not": {"user_id": "u1"}}), &r).unwrap());
    }

    #[test]
    fn ilike_substring() {
        let r = row(json!({"location": "New Cairo, Egypt"}));
        assert!(FilterMatch::matches(&json!({"location": {"$ilike": "%cairo%"}}), &r).unwrap());
        assert!(!FilterMatch::matches(&json!({"location": {"$like": "%cairo%"}}), &r).unwrap());
    }

    #[test]
    fn apply_orders_and_pages() {
        let rows = vec![
            row(json!({"id": 1, "price": 300})),
            row(json!({"id": 2, "price": null})),
            row(json!({"id": 3, "price": 100})),
            row(json!({"id": 4, "price": 200})),
        ];
        let out = FilterMatch::apply(rows.clone(), &FilterData::new().order_by("price asc").limit(2).offset(1)).unwrap();
        let ids: Vec<_> = out.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![4, 1]);

        let out = FilterMatch::apply(rows, &FilterData::new().order_by("price desc")).unwrap();
        assert_eq!(out[0]["id"], json!(2));
    }
}
