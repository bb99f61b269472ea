//! Persistent histogram store.
//!
//! [`HistogramFile`] is a self-describing JSON document holding named 1D/2D
//! histograms (with all universes and covariance matrices) plus scalar
//! parameters. It passes results from the event loop to the extraction step.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use xs_core::{Error, MetadataStore, Result};

use crate::hist1d::Hist1D;
use crate::hist2d::Hist2D;

/// Schema tag written into every histogram file.
pub const HISTOGRAM_FILE_SCHEMA: &str = "xsec_histograms_v0";

/// Write/read named histograms.
pub trait HistogramStore {
    /// Store a 1D histogram under its own name (replacing any previous one).
    fn put_hist1d(&mut self, hist: Hist1D);

    /// Store a 2D histogram under its own name (replacing any previous one).
    fn put_hist2d(&mut self, hist: Hist2D);

    /// Read a 1D histogram.
    fn hist1d(&self, name: &str) -> Result<&Hist1D>;

    /// Read a 2D histogram.
    fn hist2d(&self, name: &str) -> Result<&Hist2D>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredObject {
    H1(Hist1D),
    H2(Hist2D),
}

/// JSON-backed [`HistogramStore`] + [`MetadataStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramFile {
    schema_version: String,
    objects: BTreeMap<String, StoredObject>,
    parameters: BTreeMap<String, f64>,
}

impl Default for HistogramFile {
    fn default() -> Self {
        Self::new()
    }
}

impl HistogramFile {
    /// Empty file.
    pub fn new() -> Self {
        Self {
            schema_version: HISTOGRAM_FILE_SCHEMA.to_string(),
            objects: BTreeMap::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Read and validate a file written by [`save`](Self::save).
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file: HistogramFile = serde_json::from_slice(&bytes)?;
        if file.schema_version != HISTOGRAM_FILE_SCHEMA {
            return Err(Error::Validation(format!(
                "{}: unsupported schema_version '{}' (expected '{}')",
                path.display(),
                file.schema_version,
                HISTOGRAM_FILE_SCHEMA
            )));
        }
        for obj in file.objects.values() {
            match obj {
                StoredObject::H1(h) => h.validate()?,
                StoredObject::H2(h) => h.validate()?,
            }
        }
        log::debug!("opened {} ({} objects)", path.display(), file.objects.len());
        Ok(file)
    }

    /// Write as pretty JSON, replacing an existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write as pretty JSON; fail if `path` already exists.
    pub fn save_new(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().write(true).create_new(true).open(path)?;
        f.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        Ok(())
    }

    /// Names of stored histograms.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(|k| k.as_str())
    }

    /// Whether a histogram named `name` is stored.
    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Names of stored parameters.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(|k| k.as_str())
    }
}

impl HistogramStore for HistogramFile {
    fn put_hist1d(&mut self, hist: Hist1D) {
        self.objects.insert(hist.name().to_string(), StoredObject::H1(hist));
    }

    fn put_hist2d(&mut self, hist: Hist2D) {
        self.objects.insert(hist.name().to_string(), StoredObject::H2(hist));
    }

    fn hist1d(&self, name: &str) -> Result<&Hist1D> {
        match self.objects.get(name) {
            Some(StoredObject::H1(h)) => Ok(h),
            Some(StoredObject::H2(_)) => {
                Err(Error::Validation(format!("'{name}' is a 2D histogram, expected 1D")))
            }
            None => Err(Error::NotFound(format!("histogram '{name}'"))),
        }
    }

    fn hist2d(&self, name: &str) -> Result<&Hist2D> {
        match self.objects.get(name) {
            Some(StoredObject::H2(h)) => Ok(h),
            Some(StoredObject::H1(_)) => {
                Err(Error::Validation(format!("'{name}' is a 1D histogram, expected 2D")))
            }
            None => Err(Error::NotFound(format!("histogram '{name}'"))),
        }
    }
}

impl MetadataStore for HistogramFile {
    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        if self.parameters.contains_key(name) {
            return Err(Error::Validation(format!("parameter '{name}' already written")));
        }
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }

    fn parameter(&self, name: &str) -> Result<f64> {
        self.parameters
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("parameter '{name}'")))
    }
}
