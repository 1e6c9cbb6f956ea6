#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{cmp::Ordering, collections::BTreeMap, fmt, io::Read, path::Path};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed CSV cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No value.
    Empty,
    /// `true` / `false`.
    Bool(bool),
    /// A whole number.
    Integer(i64),
    /// Any other number.
    Float(f64),
    /// Anything that is not a number or a boolean.
    Text(String),
}

impl Cell {
    /// Infers the type of a raw CSV field.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if has_leading_zero(trimmed) {
            return Self::Text(trimmed.to_string());
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>()
            && f.is_finite()
        {
            return Self::Float(f);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    /// A cell kept verbatim, for identifier columns.
    pub fn text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() { Self::Empty } else { Self::Text(trimmed.to_string()) }
    }

    /// Numeric value of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Name of the cell's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }

    /// The cell as a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Whether the cell equals a JSON filter value. Numbers compare
    /// numerically, everything else compares by its text.
    fn matches(&self, expected: &Value) -> bool {
        match (self, expected) {
            (Self::Empty, Value::Null) => true,
            (Self::Bool(b), Value::Bool(e)) => b == e,
            (Self::Text(s), Value::Number(n)) => *s == n.to_string(),
            (cell, Value::Number(n)) => match (cell.as_f64(), n.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() < 1e-9,
                _ => false,
            },
            (cell, Value::String(s)) => cell.to_string() == s.trim(),
            _ => false,
        }
    }

    /// Orders the cell against a range bound: numerically for number bounds,
    /// lexicographically for string bounds (so ISO dates compare correctly).
    fn compare(&self, bound: &Value) -> Option<Ordering> {
        match bound {
            Value::Number(n) => self.as_f64()?.partial_cmp(&n.as_f64()?),
            Value::String(s) => match self {
                Self::Empty => None,
                cell => Some(cell.to_string().as_str().cmp(s.as_str())),
            },
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Cell must equal the value.
    Equals(Value),
    /// Cell must fall inside the bounds; any bound may be absent.
    Range {
        /// Inclusive lower bound.
        gte: Option<Value>,
        /// Inclusive upper bound.
        lte: Option<Value>,
        /// Exclusive lower bound.
        gt:  Option<Value>,
        /// Exclusive upper bound.
        lt:  Option<Value>,
    },
}

impl Condition {
    /// Reads a condition from its JSON form: an object with any of `gte`,
    /// `lte`, `gt`, `lt` is a range, anything else is an exact match.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(mut map)
                if ["gte", "lte", "gt", "lt"].iter().any(|k| map.contains_key(*k)) =>
            {
                Self::Range {
                    gte: map.remove("gte"),
                    lte: map.remove("lte"),
                    gt:  map.remove("gt"),
                    lt:  map.remove("lt"),
                }
            }
            other => Self::Equals(other),
        }
    }

    /// Whether `cell` satisfies the condition.
    fn accepts(&self, cell: &Cell) -> bool {
        match self {
            Self::Equals(expected) => cell.matches(expected),
            Self::Range { gte, lte, gt, lt } => {
                let check = |bound: &Option<Value>, ok: fn(Ordering) -> bool| match bound {
                    Some(b) => cell.compare(b).is_some_and(ok),
                    None => true,
                };
                check(gte, |o| o != Ordering::Less)
                    && check(lte, |o| o != Ordering::Greater)
                    && check(gt, |o| o == Ordering::Greater)
                    && check(lt, |o| o == Ordering::Less)
            }
        }
    }
}

/// Summary statistic computed over the numeric columns of matching rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// Number of matching rows.
    Count,
    /// Column sums.
    Sum,
    /// Column means.
    Mean,
    /// Column minimums.
    Min,
    /// Column maximums.
    Max,
}

/// A read-only query against a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    /// Column filters, all of which must hold.
    pub filter:    BTreeMap<String, Condition>,
    /// Columns to return; all columns when `None`.
    pub columns:   Option<Vec<String>>,
    /// Statistic to compute instead of listing rows.
    pub aggregate: Option<Aggregate>,
    /// Maximum number of rows to return.
    pub limit:     usize,
}

impl RowQuery {
    /// A query returning up to `limit` unfiltered rows.
    pub fn all(limit: usize) -> Self {
        Self {
            filter: BTreeMap::new(),
            columns: None,
            aggregate: None,
            limit,
        }
    }

    /// Adds a filter.
    pub fn with_filter(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.filter.insert(column.into(), condition);
        self
    }

    /// Restricts the returned columns.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Requests a statistic.
    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }
}

/// Result of a [`RowQuery`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// Dataset the rows come from.
    pub dataset:    String,
    /// Number of rows matching the filter.
    pub matched:    usize,
    /// Identifiers of the first matching rows, at most the query limit.
    pub row_ids:    Vec<String>,
    /// Returned column names.
    pub columns:    Vec<String>,
    /// Returned rows, at most the query limit.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows:       Vec<Vec<Value>>,
    /// Statistic per numeric column, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregates: Option<BTreeMap<String, f64>>,
    /// True when more rows matched than were listed.
    pub truncated:  bool,
}

/// Per-column description of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    /// Column name.
    pub name:    String,
    /// Dominant cell type.
    pub kind:    String,
    /// Number of empty cells.
    pub missing: usize,
    /// Smallest numeric value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min:     Option<f64>,
    /// Largest numeric value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max:     Option<f64>,
    /// Mean of the numeric values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean:    Option<f64>,
}

/// Shape and column statistics of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    /// Dataset name.
    pub name:      String,
    /// Number of data rows.
    pub row_count: usize,
    /// Column identifying rows, if one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,
    /// Per-column summaries.
    pub columns:   Vec<ColumnSummary>,
}

/// Errors raised when a query references something the dataset lacks.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// A filter or projection names a column that does not exist.
    #[error("Column `{column}` not found in {dataset}; available columns: {available}")]
    UnknownColumn {
        /// Dataset name.
        dataset:   String,
        /// Requested column.
        column:    String,
        /// Comma-separated list of real columns.
        available: String,
    },
}

/// Errors raised while reading a dataset file.
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// No dataset with that name exists.
    #[error("Dataset `{name}` not found; available datasets: {available}")]
    NotFound {
        /// Requested name.
        name:      String,
        /// Comma-separated list of known datasets.
        available: String,
    },
    /// The file exists but could not be read.
    #[error("Could not read dataset `{name}`: {source}")]
    Io {
        /// Dataset name.
        name:   String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid CSV.
    #[error("Dataset `{name}` is not valid CSV: {source}")]
    Csv {
        /// Dataset name.
        name:   String,
        /// Underlying failure.
        #[source]
        source: csv::Error,
    },
}

/// Named tabular data loaded from a CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Dataset name, usually the file name.
    name:      String,
    /// Column headers.
    headers:   Vec<String>,
    /// Typed data rows.
    rows:      Vec<Vec<Cell>>,
    /// Column used for row identifiers.
    id_column: Option<usize>,
}

impl Dataset {
    /// Reads CSV data with a header row.
    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let id_column = headers.iter().position(|h| {
            let h = h.to_ascii_lowercase();
            h == "id" || h.ends_with("_id")
        });

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<Cell> = record
                .iter()
                .enumerate()
                .map(|(c, raw)| if Some(c) == id_column { Cell::text(raw) } else { Cell::parse(raw) })
                .collect();
            row.resize(headers.len(), Cell::Empty);
            rows.push(row);
        }

        Ok(Self {
            name: name.into(),
            headers,
            rows,
            id_column,
        })
    }

    /// Reads a CSV file.
    pub fn from_path(name: impl Into<String>, path: &Path) -> Result<Self, DatasetError> {
        let name = name.into();
        let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
            name: name.clone(),
            source,
        })?;
        Self::from_reader(name.clone(), file).map_err(|source| DatasetError::Csv { name, source })
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the dataset has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stable identifier of a row: the value of the id column, or `row <n>`
    /// (1-based) when the dataset has no id column or the cell is empty.
    pub fn row_id(&self, row: usize) -> String {
        match self.id_column.map(|c| &self.rows[row][c]) {
            Some(cell) if *cell != Cell::Empty => cell.to_string(),
            _ => format!("row {}", row + 1),
        }
    }

    /// Position of a column.
    fn column(&self, name: &str) -> Result<usize, QueryError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| QueryError::UnknownColumn {
                dataset:   self.name.clone(),
                column:    name.to_string(),
                available: self.headers.join(", "),
            })
    }

    /// Runs a query.
    pub fn query(&self, query: &RowQuery) -> Result<QueryOutcome, QueryError> {
        let filters = query
            .filter
            .iter()
            .map(|(column, condition)| Ok((self.column(column)?, condition)))
            .collect::<Result<Vec<_>, QueryError>>()?;

        let projection = match &query.columns {
            Some(columns) => columns
                .iter()
                .map(|c| self.column(c))
                .collect::<Result<Vec<_>, _>>()?,
            None => (0..self.headers.len()).collect(),
        };

        let matching: Vec<usize> = (0..self.rows.len())
            .filter(|&r| filters.iter().all(|(c, cond)| cond.accepts(&self.rows[r][*c])))
            .collect();

        let columns: Vec<String> = projection.iter().map(|&c| self.headers[c].clone()).collect();
        let listed = &matching[..matching.len().min(query.limit)];
        let row_ids = listed.iter().map(|&r| self.row_id(r)).collect();

        let (rows, aggregates) = match query.aggregate {
            Some(aggregate) => (Vec::new(), Some(self.aggregate(aggregate, &matching, &projection))),
            None => {
                let rows = listed
                    .iter()
                    .map(|&r| projection.iter().map(|&c| self.rows[r][c].to_json()).collect())
                    .collect();
                (rows, None)
            }
        };

        Ok(QueryOutcome {
            dataset: self.name.clone(),
            matched: matching.len(),
            row_ids,
            columns,
            rows,
            aggregates,
            truncated: matching.len() > listed.len(),
        })
    }

    /// Computes a statistic over the numeric columns among `projection`.
    fn aggregate(
        &self,
        aggregate: Aggregate,
        matching: &[usize],
        projection: &[usize],
    ) -> BTreeMap<String, f64> {
        if aggregate == Aggregate::Count {
            return BTreeMap::from([("count".to_string(), matching.len() as f64)]);
        }

        projection
            .iter()
            .filter_map(|&c| {
                let values = self.numeric_values(c, matching)?;
                let stat = match aggregate {
                    Aggregate::Sum => values.iter().sum(),
                    Aggregate::Mean => values.iter().sum::<f64>() / values.len() as f64,
                    Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                    Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    Aggregate::Count => unreachable!("handled above"),
                };
                Some((self.headers[c].clone(), round_cents(stat)))
            })
            .collect()
    }

    /// Numeric values of column `c` across `rows`, or `None` when the column
    /// holds non-numeric data or no values at all.
    fn numeric_values(&self, c: usize, rows: &[usize]) -> Option<Vec<f64>> {
        let mut values = Vec::new();
        for &r in rows {
            match &self.rows[r][c] {
                Cell::Empty => {}
                cell => values.push(cell.as_f64()?),
            }
        }
        if values.is_empty() { None } else { Some(values) }
    }

    /// Describes the dataset's shape and columns.
    pub fn describe(&self) -> DatasetSummary {
        let all: Vec<usize> = (0..self.rows.len()).collect();
        let columns = self
            .headers
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let missing = self.rows.iter().filter(|row| row[c] == Cell::Empty).count();
                let kind = self
                    .rows
                    .iter()
                    .map(|row| row[c].kind())
                    .filter(|k| *k != "empty")
                    .counts()
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                    .map(|(k, _)| k)
                    .unwrap_or("empty")
                    .to_string();
                let values = self.numeric_values(c, &all);
                let (min, max, mean) = match values {
                    Some(v) => (
                        Some(v.iter().copied().fold(f64::INFINITY, f64::min)),
                        Some(v.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                        Some(round_cents(v.iter().sum::<f64>() / v.len() as f64)),
                    ),
                    None => (None, None, None),
                };
                ColumnSummary {
                    name: name.clone(),
                    kind,
                    missing,
                    min,
                    max,
                    mean,
                }
            })
            .collect();

        DatasetSummary {
            name: self.name.clone(),
            row_count: self.rows.len(),
            id_column: self.id_column.map(|c| self.headers[c].clone()),
            columns,
        }
    }
}

/// Numbers written with a leading zero (`007`, `-0042`) are identifiers, not
/// quantities.
fn has_leading_zero(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let mut chars = digits.chars();
    chars.next() == Some('0') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// Rounds to two decimals to keep floating point noise out of prompts.
fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
