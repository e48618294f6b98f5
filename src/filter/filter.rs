use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterOrderInfo, FilterWhereOptions, SqlResult};

/// A validated select against one table. Renders to SQL for Postgres and
/// evaluates in memory for the in-process store, with identical semantics.
#[derive(Debug, Clone)]
pub struct Filter {
    table_name: String,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    options: FilterWhereOptions,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        Self::validate_table_name(&table_name)?;
        Ok(Self {
            table_name,
            where_data: None,
            order_data: vec![],
            options: FilterWhereOptions::default(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        let order_info = FilterOrder::validate_and_parse(&order_spec)?;
        for info in &order_info {
            if !is_valid_identifier(&info.column) {
                return Err(FilterError::InvalidColumn(info.column.clone()));
            }
        }
        self.order_data = order_info;
        Ok(self)
    }

    pub fn with_options(&mut self, options: FilterWhereOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn order_info(&self) -> &[FilterOrderInfo] {
        &self.order_data
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_sql(0)?;
        let order_clause = FilterOrder::generate(&self.order_data)?;

        let query = [
            "SELECT row_to_json(t) AS row".to_string(),
            format!("FROM \"{}\" AS t", self.table_name),
            format!("WHERE {}", where_clause),
            order_clause,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlResult { query, params })
    }

    /// WHERE body only, numbering params after `starting_param_index`
    pub fn where_sql(&self, starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        match self.where_data {
            Some(ref where_data) => FilterWhere::generate(where_data, starting_param_index, &self.options),
            None => Ok(("1=1".to_string(), vec![])),
        }
    }

    pub fn matches(&self, record: &Map<String, Value>) -> Result<bool, FilterError> {
        match self.where_data {
            Some(ref where_data) => FilterWhere::matches(where_data, record),
            None => Ok(true),
        }
    }

    /// Stable sort by the parsed order; records keep insertion order on ties
    pub fn sort(&self, records: &mut [Map<String, Value>]) {
        if self.order_data.is_empty() {
            return;
        }
        records.sort_by(|a, b| FilterOrder::compare_records(&self.order_data, a, b));
    }

    fn validate_table_name(name: &str) -> Result<(), FilterError> {
        if name.is_empty() { return Err(FilterError::InvalidTableName("Table name cannot be empty".to_string())); }
        if !is_valid_identifier(name) {
            return Err(FilterError::InvalidTableName(format!("Invalid table name format: {}", name)));
        }
        Ok(())
    }
}

/// Letters, digits and underscores, not starting with a digit
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
