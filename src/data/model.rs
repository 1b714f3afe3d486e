use std::fmt;

// ---------------------------------------------------------------------------
// CellValue – a single cell in a table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the storage classes of the source
/// tables (SQLite, CSV, JSON, Parquet).
/// Cells end up as `BTreeMap` keys downstream so `CellValue` must be `Ord`.
#[derive(Debug, Clone)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can count CellValues in a BTreeMap --

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Text(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "'{s}'"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Try to interpret the value as an `f64` for the statistical checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) if !v.is_nan() => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Null, NaN and blank text all count as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Float(v) => v.is_nan(),
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Integer(_) | CellValue::Float(_))
    }
}

// ---------------------------------------------------------------------------
// Column – one named series of cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Column {
            name: name.into(),
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset – one table loaded from a store
// ---------------------------------------------------------------------------

/// A loaded table: an optional designated index plus ordered regular
/// columns, all of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    /// Materialized index column, if the source carried one.
    pub index: Option<Column>,
    /// Regular columns in source order.
    pub columns: Vec<Column>,
}

impl Dataset {
    /// Build a dataset from column-ordered data.
    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Dataset {
            name: name.into(),
            index: None,
            columns,
        }
    }

    /// Build a dataset from a header and row-ordered records. Short rows
    /// are padded with `Null`, extra cells are dropped.
    pub fn from_rows(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|h| Column::new(h, Vec::with_capacity(rows.len())))
            .collect();

        for row in rows {
            let mut cells = row.into_iter();
            for col in &mut columns {
                col.values.push(cells.next().unwrap_or(CellValue::Null));
            }
        }
        Dataset::from_columns(name, columns)
    }

    /// Attach an already materialized index column.
    pub fn with_index(mut self, index: Column) -> Self {
        self.index = Some(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index
            .as_ref()
            .or_else(|| self.columns.first())
            .map_or(0, |c| c.values.len())
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
