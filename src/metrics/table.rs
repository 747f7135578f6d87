//! Column-ordered metric storage with CSV export

use std::fmt;
use std::path::Path;

pub use crate::error::MetricsError;

/// One cell of a metrics table
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(value) => Some(*value as f64),
            MetricValue::Float(value) => Some(*value),
            MetricValue::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(value) => write!(f, "{value}"),
            // Missing values are written as empty cells
            MetricValue::Float(value) if value.is_nan() => Ok(()),
            MetricValue::Float(value) => write!(f, "{value}"),
            MetricValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue::Int(value as i64)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Named columns kept in the order they were first pushed
#[derive(Debug, Clone, Default)]
pub struct MetricsTable {
    columns: Vec<(String, Vec<MetricValue>)>,
}

impl MetricsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to `name`, creating the column on first use
    pub fn push(&mut self, name: &str, value: impl Into<MetricValue>) {
        let value = value.into();
        match self.columns.iter_mut().find(|(column, _)| column == name) {
            Some((_, values)) => values.push(value),
            None => self.columns.push((name.to_string(), vec![value])),
        }
    }

    pub fn extend<I, V>(&mut self, metrics: I)
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<MetricValue>,
    {
        for (name, value) in metrics {
            self.push(name, value);
        }
    }

    /// Number of rows, taken from the longest column
    pub fn len(&self) -> usize {
        self.columns
            .iter()
            .map(|(_, values)| values.len())
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, name: &str) -> Option<&[MetricValue]> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Write the table as CSV
    ///
    /// Column order is `index`, then `leading`, then every other column in
    /// first-push order, then `trailing`. `leading` and `trailing` hold
    /// values repeated on every row.
    pub fn write_csv(
        &self,
        path: &Path,
        index: &str,
        leading: &[(&str, MetricValue)],
        trailing: &[(&str, MetricValue)],
    ) -> Result<(), MetricsError> {
        let index_values = self
            .column(index)
            .ok_or_else(|| MetricsError::MissingIndex(index.to_string()))?;
        let rows = index_values.len();

        if let Some((column, values)) = self.columns.iter().find(|(_, values)| values.len() != rows) {
            return Err(MetricsError::Ragged {
                column: column.clone(),
                len: values.len(),
                expected: rows,
            });
        }

        let body: Vec<&(String, Vec<MetricValue>)> = self
            .columns
            .iter()
            .filter(|(name, _)| name != index)
            .collect();

        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec![index.to_string()];
        header.extend(leading.iter().map(|(name, _)| name.to_string()));
        header.extend(body.iter().map(|(name, _)| name.clone()));
        header.extend(trailing.iter().map(|(name, _)| name.to_string()));
        writer.write_record(&header)?;

        for row in 0..rows {
            let mut record = vec![index_values[row].to_string()];
            record.extend(leading.iter().map(|(_, value)| value.to_string()));
            record.extend(body.iter().map(|(_, values)| values[row].to_string()));
            record.extend(trailing.iter().map(|(_, value)| value.to_string()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}
