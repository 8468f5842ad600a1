//! Decoding of `/query` responses
//!
//! InfluxDB answers every query with `{"results": [...]}`, one entry per
//! statement. Failures show up either as a top-level `error` (bad request,
//! auth) or as an `error` on the statement result, usually with HTTP 200.

use super::ApiError;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl QueryResponse {
    /// Fails on the first reported error, otherwise returns the statement results
    pub fn into_results(self) -> Result<Vec<StatementResult>, ApiError> {
        if let Some(error) = self.error {
            return Err(ApiError::QueryError(error));
        }
        if let Some(error) = self.results.iter().find_map(|r| r.error.clone()) {
            return Err(ApiError::QueryError(error));
        }
        Ok(self.results)
    }

    /// Series of the first statement; empty when the statement produced no rows
    pub fn into_series(self) -> Result<Vec<Series>, ApiError> {
        Ok(self
            .into_results()?
            .into_iter()
            .next()
            .map(|result| result.series)
            .unwrap_or_default())
    }
}

impl Series {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.values.iter().map(move |values| Row {
            series: self,
            values,
        })
    }
}

/// One row of a series, with cells looked up by column name
pub struct Row<'a> {
    series: &'a Series,
    values: &'a [Value],
}

impl Row<'_> {
    fn cell(&self, column: &str) -> Result<&Value, ApiError> {
        let idx = self.series.column(column).ok_or_else(|| {
            ApiError::ParseError(format!(
                "column '{}' missing from series '{}'",
                column, self.series.name
            ))
        })?;
        Ok(self.values.get(idx).unwrap_or(&Value::Null))
    }

    pub fn get_str(&self, column: &str) -> Result<String, ApiError> {
        match self.cell(column)? {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            other => Err(ApiError::ParseError(format!(
                "column '{}' is not a string: {}",
                column, other
            ))),
        }
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, ApiError> {
        match self.cell(column)? {
            Value::Bool(b) => Ok(*b),
            other => Err(ApiError::ParseError(format!(
                "column '{}' is not a bool: {}",
                column, other
            ))),
        }
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, ApiError> {
        let value = self.cell(column)?;
        value.as_i64().ok_or_else(|| {
            ApiError::ParseError(format!("column '{}' is not an integer: {}", column, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> QueryResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn statement_error_is_surfaced_verbatim() {
        let response = parse(
            r#"{"results":[{"statement_id":0,"error":"retention policy not found: weekly"}]}"#,
        );
        match response.into_results() {
            Err(ApiError::QueryError(msg)) => assert_eq!(msg, "retention policy not found: weekly"),
            other => panic!("expected query error, got {:?}", other),
        }
    }

    #[test]
    fn top_level_error_wins() {
        let response = parse(r#"{"error":"error parsing query: found EOF"}"#);
        assert!(matches!(response.into_results(), Err(ApiError::QueryError(_))));
    }

    #[test]
    fn statement_without_series_yields_no_rows() {
        let response = parse(r#"{"results":[{"statement_id":0}]}"#);
        assert!(response.into_series().unwrap().is_empty());

        let response = parse(r#"{"results":[]}"#);
        assert!(response.into_series().unwrap().is_empty());
    }

    #[test]
    fn rows_are_read_by_column_name() {
        let response = parse(
            r#"{"results":[{"statement_id":0,"series":[{
                "columns":["name","duration","shardGroupDuration","replicaN","default"],
                "values":[["autogen","0s","168h0m0s",1,true]]
            }]}]}"#,
        );
        let series = response.into_series().unwrap();
        let row = series[0].rows().next().unwrap();

        assert_eq!(row.get_str("name").unwrap(), "autogen");
        assert_eq!(row.get_i64("replicaN").unwrap(), 1);
        assert!(row.get_bool("default").unwrap());
        assert!(matches!(row.get_str("missing"), Err(ApiError::ParseError(_))));
        assert!(matches!(row.get_bool("name"), Err(ApiError::ParseError(_))));
    }
}
