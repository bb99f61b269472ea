//! In-memory columnar [`EventSource`].
//!
//! Each named column holds one value (or one vector of values) per entry.
//! Files on disk are JSON documents with the same shape:
//!
//! ```json
//! {
//!   "kind": "reco",
//!   "exposure": 1.0e20,
//!   "columns": { "pt": [0.1, 0.4], "ann_vtx": [[1.0, 2.0], [0.5]] }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use xs_core::{Error, EventSource, Result, SourceKind};

/// One column: scalar per entry or vector per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    /// One number per entry.
    Scalar(Vec<f64>),
    /// One vector per entry.
    Vector(Vec<Vec<f64>>),
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::Scalar(v) => v.len(),
            Column::Vector(v) => v.len(),
        }
    }
}

/// Column-oriented event sample held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnarSource {
    kind: SourceKind,
    /// Exposure (protons on target) of the sample, if known.
    #[serde(default)]
    exposure: Option<f64>,
    columns: BTreeMap<String, Column>,
    #[serde(skip)]
    n_entries: usize,
    #[serde(skip)]
    cursor: usize,
}

impl ColumnarSource {
    /// Empty source of the given kind. Add columns, then call [`build`](Self::build).
    pub fn new(kind: SourceKind) -> Self {
        Self { kind, exposure: None, columns: BTreeMap::new(), n_entries: 0, cursor: 0 }
    }

    /// Set the exposure.
    pub fn exposure(mut self, pot: f64) -> Self {
        self.exposure = Some(pot);
        self
    }

    /// Add a scalar column.
    pub fn with_scalar(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), Column::Scalar(values));
        self
    }

    /// Add a vector column.
    pub fn with_vector(mut self, name: impl Into<String>, values: Vec<Vec<f64>>) -> Self {
        self.columns.insert(name.into(), Column::Vector(values));
        self
    }

    /// Check that every column has the same length and rewind.
    pub fn build(mut self) -> Result<Self> {
        let mut n: Option<usize> = None;
        for (name, col) in &self.columns {
            match n {
                None => n = Some(col.len()),
                Some(m) if m != col.len() => {
                    return Err(Error::Data(format!(
                        "column '{name}' has {} entries, expected {m}",
                        col.len()
                    )));
                }
                Some(_) => {}
            }
        }
        if let Some(pot) = self.exposure
            && !(pot.is_finite() && pot >= 0.0)
        {
            return Err(Error::Data(format!("exposure must be finite and >= 0, got {pot}")));
        }
        self.n_entries = n.unwrap_or(0);
        self.cursor = 0;
        Ok(self)
    }

    /// Load a JSON sample file.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let src: ColumnarSource = serde_json::from_slice(&bytes)?;
        let src = src.build().map_err(|e| match e {
            Error::Data(msg) => Error::Data(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        log::debug!("loaded {} ({} sample, {} entries)", path.display(), src.kind, src.n_entries);
        Ok(src)
    }

    /// Exposure of the sample, if recorded.
    pub fn pot(&self) -> Option<f64> {
        self.exposure
    }

    fn column(&self, field: &str) -> Result<&Column> {
        self.columns.get(field).ok_or_else(|| {
            Error::Data(format!("entry {}: missing field '{field}'", self.cursor))
        })
    }
}

impl EventSource for ColumnarSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn n_entries(&self) -> usize {
        self.n_entries
    }

    fn reposition(&mut self, entry: usize) -> Result<()> {
        if entry >= self.n_entries {
            return Err(Error::Data(format!(
                "entry {entry} out of range (sample has {})",
                self.n_entries
            )));
        }
        self.cursor = entry;
        Ok(())
    }

    fn entry(&self) -> usize {
        self.cursor
    }

    fn f64(&self, field: &str) -> Result<f64> {
        match self.column(field)? {
            Column::Scalar(v) => Ok(v[self.cursor]),
            Column::Vector(_) => Err(Error::Data(format!(
                "entry {}: field '{field}' is a vector, read as scalar",
                self.cursor
            ))),
        }
    }

    fn int(&self, field: &str) -> Result<i64> {
        let v = self.f64(field)?;
        if v.fract() != 0.0 || !v.is_finite() {
            return Err(Error::Data(format!(
                "entry {}: field '{field}' = {v} is not an integer code",
                self.cursor
            )));
        }
        Ok(v as i64)
    }

    fn vec(&self, field: &str) -> Result<&[f64]> {
        match self.column(field)? {
            Column::Vector(v) => Ok(&v[self.cursor]),
            Column::Scalar(_) => Err(Error::Data(format!(
                "entry {}: field '{field}' is a scalar, read as vector",
                self.cursor
            ))),
        }
    }
}
