use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter::is_valid_identifier;
use super::filter_order::compare_values;
use super::types::{FilterOp, FilterWhereOptions};

/// WHERE clause compiler. The same JSON filter can be rendered to
/// parameterized SQL (`generate`) or evaluated against an in-memory
/// record (`matches`); both must agree.
pub struct FilterWhere<'a> {
    param_values: Vec<Value>,
    param_index: usize,
    options: &'a FilterWhereOptions,
}

impl<'a> FilterWhere<'a> {
    pub fn new(starting_param_index: usize, options: &'a FilterWhereOptions) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            options,
        }
    }

    pub fn generate(where_data: &Value, starting_param_index: usize, options: &FilterWhereOptions) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = FilterWhere::new(starting_param_index, options);
        let sql = filter_where.clause(where_data)?;
        Ok((sql, filter_where.param_values))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        Self::columns(where_data).map(|_| ())
    }

    /// Every column referenced by the filter, in order of appearance
    pub fn columns(where_data: &Value) -> Result<Vec<String>, FilterError> {
        let mut out = Vec::new();
        collect_columns(where_data, &mut out)?;
        Ok(out)
    }

    fn clause(&mut self, where_data: &Value) -> Result<String, FilterError> {
        match where_data {
            Value::Null => Ok("1=1".to_string()),
            Value::Object(obj) => {
                let mut parts = Vec::new();
                for (key, value) in obj {
                    if key.starts_with('$') {
                        parts.push(self.logical(key, value)?);
                    } else {
                        parts.extend(self.field(key, value)?);
                    }
                }
                if parts.is_empty() { Ok("1=1".to_string()) } else { Ok(parts.join(" AND ")) }
            }
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn logical(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value.as_array().ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Ok(if op == "$and" { "1=1".to_string() } else { "1=0".to_string() });
                }
                let mut sql_parts = Vec::new();
                for v in arr {
                    sql_parts.push(format!("({})", self.clause(v)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            "$not" => Ok(format!("NOT ({})", self.clause(value)?)),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn field(&mut self, field: &str, value: &Value) -> Result<Vec<String>, FilterError> {
        if !is_valid_identifier(field) {
            return Err(FilterError::InvalidColumn(field.to_string()));
        }
        match value {
            Value::Object(obj) => {
                let mut out = Vec::new();
                for (op_key, op_val) in obj {
                    let operator = FilterOp::parse(op_key).ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    out.push(self.condition(field, operator, op_val)?);
                }
                Ok(out)
            }
            // Implicit equality: { field: value }
            _ => Ok(vec![self.condition(field, FilterOp::Eq, value)?]),
        }
    }

    fn condition(&mut self, column: &str, operator: FilterOp, data: &Value) -> Result<String, FilterError> {
        let quoted_column = format!("\"{}\"", column);
        match operator {
            FilterOp::Eq => {
                if data.is_null() { Ok(format!("{} IS NULL", quoted_column)) }
                else { Ok(format!("{} = {}", quoted_column, self.param(column, scalar(operator, data)?))) }
            }
            FilterOp::Ne => {
                if data.is_null() { Ok(format!("{} IS NOT NULL", quoted_column)) }
                else { Ok(format!("{} <> {}", quoted_column, self.param(column, scalar(operator, data)?))) }
            }
            FilterOp::Gt => Ok(format!("{} > {}", quoted_column, self.param(column, non_null(operator, data)?))),
            FilterOp::Gte => Ok(format!("{} >= {}", quoted_column, self.param(column, non_null(operator, data)?))),
            FilterOp::Lt => Ok(format!("{} < {}", quoted_column, self.param(column, non_null(operator, data)?))),
            FilterOp::Lte => Ok(format!("{} <= {}", quoted_column, self.param(column, non_null(operator, data)?))),
            FilterOp::Like => Ok(format!("{} LIKE {}", quoted_column, self.param(column, pattern(operator, data)?))),
            FilterOp::ILike => Ok(format!("{} ILIKE {}", quoted_column, self.param(column, pattern(operator, data)?))),
            FilterOp::In | FilterOp::NIn => {
                let values = list(operator, data)?;
                if values.is_empty() {
                    return Ok(if operator == FilterOp::In { "1=0".to_string() } else { "1=1".to_string() });
                }
                let params: Vec<String> = values.iter().map(|v| self.param(column, v)).collect();
                let keyword = if operator == FilterOp::In { "IN" } else { "NOT IN" };
                Ok(format!("{} {} ({})", quoted_column, keyword, params.join(", ")))
            }
            FilterOp::Between => {
                let (low, high) = bounds(data)?;
                Ok(format!("{} BETWEEN {} AND {}", quoted_column, self.param(column, low), self.param(column, high)))
            }
        }
    }

    fn param(&mut self, column: &str, value: &Value) -> String {
        self.param_values.push(value.clone());
        self.param_index += 1;
        match self.options.cast_for(column) {
            Some(cast) => format!("${}::{}", self.param_index, cast),
            None => format!("${}", self.param_index),
        }
    }

    /// Evaluate the filter against a record with the same semantics as the
    /// generated SQL: comparisons against a NULL field are false.
    pub fn matches(where_data: &Value, record: &Map<String, Value>) -> Result<bool, FilterError> {
        match where_data {
            Value::Null => Ok(true),
            Value::Object(obj) => {
                for (key, value) in obj {
                    let ok = if key.starts_with('$') {
                        Self::matches_logical(key, value, record)?
                    } else {
                        Self::matches_field(key, value, record)?
                    };
                    if !ok {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn matches_logical(op: &str, value: &Value, record: &Map<String, Value>) -> Result<bool, FilterError> {
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

    fn matches_field(field: &str, value: &Value, record: &Map<String, Value>) -> Result<bool, FilterError> {
        if !is_valid_identifier(field) {
            return Err(FilterError::InvalidColumn(field.to_string()));
        }
        let actual = record.get(field).unwrap_or(&Value::Null);
        match value {
            Value::Object(obj) => {
                for (op_key, op_val) in obj {
                    let operator = FilterOp::parse(op_key).ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    if !Self::matches_condition(actual, operator, op_val)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Self::matches_condition(actual, FilterOp::Eq, value),
        }
    }

    fn matches_condition(actual: &Value, operator: FilterOp, data: &Value) -> Result<bool, FilterError> {
        match operator {
            FilterOp::Eq if data.is_null() => return Ok(actual.is_null()),
            FilterOp::Ne if data.is_null() => return Ok(!actual.is_null()),
            _ => {}
        }
        match operator {
            FilterOp::Eq => Ok(!actual.is_null() && values_equal(actual, scalar(operator, data)?)),
            FilterOp::Ne => Ok(!actual.is_null() && !values_equal(actual, scalar(operator, data)?)),
            FilterOp::Gt => Ok(ordering(actual, non_null(operator, data)?) == Some(Ordering::Greater)),
            FilterOp::Gte => Ok(matches!(ordering(actual, non_null(operator, data)?), Some(Ordering::Greater | Ordering::Equal))),
            FilterOp::Lt => Ok(ordering(actual, non_null(operator, data)?) == Some(Ordering::Less)),
            FilterOp::Lte => Ok(matches!(ordering(actual, non_null(operator, data)?), Some(Ordering::Less | Ordering::Equal))),
            FilterOp::Like | FilterOp::ILike => {
                let pat = pattern(operator, data)?.as_str().unwrap_or_default();
                match actual.as_str() {
                    Some(text) => Ok(like_match(pat, text, operator == FilterOp::ILike)),
                    None => Ok(false),
                }
            }
            FilterOp::In => {
                let values = list(operator, data)?;
                Ok(!actual.is_null() && values.iter().any(|v| values_equal(actual, v)))
            }
            FilterOp::NIn => {
                let values = list(operator, data)?;
                Ok(!actual.is_null() && !values.iter().any(|v| values_equal(actual, v)))
            }
            FilterOp::Between => {
                let (low, high) = bounds(data)?;
                Ok(matches!(ordering(actual, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(ordering(actual, high), Some(Ordering::Less | Ordering::Equal)))
            }
        }
    }
}

fn collect_columns(where_data: &Value, out: &mut Vec<String>) -> Result<(), FilterError> {
    match where_data {
        Value::Null => Ok(()),
        Value::Object(obj) => {
            for (key, value) in obj {
                match key.as_str() {
                    "$and" | "$or" => {
                        let arr = value.as_array().ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", key)))?;
                        for v in arr {
                            collect_columns(v, out)?;
                        }
                    }
                    "$not" => collect_columns(value, out)?,
                    op if op.starts_with('$') => return Err(FilterError::UnsupportedOperator(op.to_string())),
                    field => {
                        if !is_valid_identifier(field) {
                            return Err(FilterError::InvalidColumn(field.to_string()));
                        }
                        if let Value::Object(ops) = value {
                            for op_key in ops.keys() {
                                FilterOp::parse(op_key).ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                            }
                        }
                        if !out.iter().any(|c| c == field) {
                            out.push(field.to_string());
                        }
                    }
                }
            }
            Ok(())
        }
        _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
    }
}

fn scalar(op: FilterOp, data: &Value) -> Result<&Value, FilterError> {
    match data {
        Value::Array(_) | Value::Object(_) => Err(FilterError::InvalidOperatorData(format!("{:?} requires a scalar value", op))),
        _ => Ok(data),
    }
}

fn non_null(op: FilterOp, data: &Value) -> Result<&Value, FilterError> {
    if data.is_null() {
        return Err(FilterError::InvalidOperatorData(format!("{:?} does not accept null", op)));
    }
    scalar(op, data)
}

fn pattern(op: FilterOp, data: &Value) -> Result<&Value, FilterError> {
    if data.is_string() { Ok(data) } else { Err(FilterError::InvalidOperatorData(format!("{:?} requires a string pattern", op))) }
}

fn list(op: FilterOp, data: &Value) -> Result<&Vec<Value>, FilterError> {
    let values = data.as_array().ok_or_else(|| FilterError::InvalidOperatorData(format!("{:?} requires an array", op)))?;
    if values.iter().any(|v| v.is_array() || v.is_object() || v.is_null()) {
        return Err(FilterError::InvalidOperatorData(format!("{:?} accepts only non-null scalars", op)));
    }
    Ok(values)
}

fn bounds(data: &Value) -> Result<(&Value, &Value), FilterError> {
    match data.as_array().map(|v| v.as_slice()) {
        Some([low, high]) if !low.is_null() && !high.is_null() => Ok((low, high)),
        _ => Err(FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string())),
    }
}

fn ordering(actual: &Value, expected: &Value) -> Option<Ordering> {
    if actual.is_null() { None } else { compare_values(actual, expected) }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    compare_values(actual, expected) == Some(Ordering::Equal) || actual == expected
}

/// SQL LIKE: `%` matches any run, `_` one character, `\` escapes
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
    match p.split_first() {
        None => t.is_empty(),
        Some(('%', rest)) => (0..=t.len()).any(|i| like_from(rest, &t[i..])),
        Some(('_', rest)) => !t.is_empty() && like_from(rest, &t[1..]),
        Some(('\\', rest)) if !rest.is_empty() => {
            !t.is_empty() && t[0] == rest[0] && like_from(&rest[1..], &t[1..])
        }
        Some((c, rest)) => !t.is_empty() && t[0] == *c && like_from(rest, &t[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn generates_numbered_params_across_nested_groups() {
        let opts = FilterWhereOptions::default();
        let (sql, params) = FilterWhere::generate(
            &json!({ "title": "a", "$or": [{ "published": true }, { "name": { "$in": ["x", "y"] } }] }),
            0,
            &opts,
        )
        .unwrap();
        assert_eq!(sql, "\"title\" = $1 AND ((\"published\" = $2) OR (\"name\" IN ($3, $4)))");
        assert_eq!(params, vec![json!("a"), json!(true), json!("x"), json!("y")]);
    }

    #[test]
    fn applies_column_casts_to_params() {
        let mut opts = FilterWhereOptions::default();
        opts.casts.insert("id".to_string(), "uuid");
        let (sql, _) = FilterWhere::generate(&json!({ "id": "6f1c..." }), 2, &opts).unwrap();
        assert_eq!(sql, "\"id\" = $3::uuid");
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let opts = FilterWhereOptions::default();
        let (sql, params) = FilterWhere::generate(&json!({ "name": null }), 0, &opts).unwrap();
        assert_eq!(sql, "\"name\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_injection_in_column_names() {
        let opts = FilterWhereOptions::default();
        let err = FilterWhere::generate(&json!({ "title\" OR 1=1 --": "x" }), 0, &opts).unwrap_err();
        assert!(matches!(err, FilterError::InvalidColumn(_)));
    }

    #[test]
    fn in_memory_matching_agrees_with_operators() {
        let rec = record(json!({ "title": "Hello World", "published": false, "name": null }));
        assert!(FilterWhere::matches(&json!({ "title": { "$like": "Hello%" } }), &rec).unwrap());
        assert!(FilterWhere::matches(&json!({ "title": { "$ilike": "%world" } }), &rec).unwrap());
        assert!(!FilterWhere::matches(&json!({ "published": true }), &rec).unwrap());
        assert!(FilterWhere::matches(&json!({ "name": null }), &rec).unwrap());
        // comparisons against NULL are false, as in SQL
        assert!(!FilterWhere::matches(&json!({ "name": { "$ne": "x" } }), &rec).unwrap());
        assert!(FilterWhere::matches(&json!({ "$not": { "published": true } }), &rec).unwrap());
        assert!(FilterWhere::matches(&json!({ "$or": [{ "published": true }, { "title": "Hello World" }] }), &rec).unwrap());
    }

    #[test]
    fn timestamps_compare_as_instants_in_memory() {
        let rec = record(json!({ "createdAt": "2024-03-01T12:00:00.000000Z" }));
        assert!(FilterWhere::matches(&json!({ "createdAt": { "$gt": "2024-03-01T13:00:00+02:00" } }), &rec).unwrap());
        assert!(FilterWhere::matches(&json!({ "createdAt": "2024-03-01T12:00:00+00:00" }), &rec).unwrap());
    }

    #[test]
    fn collects_referenced_columns() {
        let cols = FilterWhere::columns(&json!({ "a": 1, "$and": [{ "b": { "$gt": 1 } }, { "$not": { "a": 2 } }] })).unwrap();
        assert_eq!(cols, vec!["a".to_string(), "b".to_string()]);
        assert!(FilterWhere::columns(&json!({ "a": { "$regex": "x" } })).is_err());
    }
}
