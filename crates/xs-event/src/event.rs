//! Read-only views of the entry an [`EventSource`] currently points at.
//!
//! [`Event`] exposes every field. [`TruthEvent`] can only be obtained from a
//! simulated sample, so code that takes a `TruthEvent` cannot run on data.

use xs_core::{Error, EventSource, Result, SourceKind};

/// The current entry of a source.
#[derive(Clone, Copy)]
pub struct Event<'a> {
    source: &'a dyn EventSource,
}

impl<'a> Event<'a> {
    /// View the entry `source` is positioned at.
    pub fn new(source: &'a dyn EventSource) -> Self {
        Self { source }
    }

    /// Entry index.
    pub fn entry(&self) -> usize {
        self.source.entry()
    }

    /// Sample kind.
    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// Scalar field.
    pub fn f64(&self, field: &str) -> Result<f64> {
        self.source.f64(field)
    }

    /// Integer-coded field.
    pub fn int(&self, field: &str) -> Result<i64> {
        self.source.int(field)
    }

    /// Vector field.
    pub fn vec(&self, field: &str) -> Result<&'a [f64]> {
        self.source.vec(field)
    }

    /// Truth-level view. Fails on data.
    pub fn truth(&self) -> Result<TruthEvent<'a>> {
        if !self.kind().has_truth() {
            return Err(Error::Data(format!(
                "entry {}: truth information requested from a {} sample",
                self.entry(),
                self.kind()
            )));
        }
        Ok(TruthEvent { source: self.source })
    }
}

/// Truth-level view of a simulated entry.
#[derive(Clone, Copy)]
pub struct TruthEvent<'a> {
    source: &'a dyn EventSource,
}

impl<'a> TruthEvent<'a> {
    /// Entry index.
    pub fn entry(&self) -> usize {
        self.source.entry()
    }

    /// Scalar field.
    pub fn f64(&self, field: &str) -> Result<f64> {
        self.source.f64(field)
    }

    /// Integer-coded field.
    pub fn int(&self, field: &str) -> Result<i64> {
        self.source.int(field)
    }

    /// Vector field.
    pub fn vec(&self, field: &str) -> Result<&'a [f64]> {
        self.source.vec(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ColumnarSource;

    #[test]
    fn truth_view_rejected_on_data() {
        let src = ColumnarSource::new(SourceKind::Data).with_scalar("x", vec![1.0]).build().unwrap();
        let ev = Event::new(&src);
        assert_eq!(ev.f64("x").unwrap(), 1.0);
        assert!(matches!(ev.truth(), Err(Error::Data(_))));
    }

    #[test]
    fn truth_view_on_mc() {
        let src =
            ColumnarSource::new(SourceKind::Reco).with_scalar("q2", vec![0.3]).build().unwrap();
        let t = Event::new(&src).truth().unwrap();
        assert_eq!(t.f64("q2").unwrap(), 0.3);
        assert_eq!(t.entry(), 0);
    }
}
