//! Traits for the collaborators the engine does not implement itself.
//!
//! The event loop only needs a seekable source of entries with named fields;
//! the extraction stage only needs scalar metadata next to its histograms.
//! Concrete implementations live in the crates that own the data formats.

use crate::{Result, SourceKind};

/// A sequential, randomly addressable source of events.
///
/// The source has a cursor: callers [`reposition`](EventSource::reposition)
/// to an entry and then read fields of that entry. A missing field is an
/// error, never a default value.
pub trait EventSource {
    /// What kind of sample this is (reco MC, truth MC, or data).
    fn kind(&self) -> SourceKind;

    /// Number of entries; valid indices are `0..n_entries()`.
    fn n_entries(&self) -> usize;

    /// Move the cursor to `entry`.
    fn reposition(&mut self, entry: usize) -> Result<()>;

    /// Entry the cursor points at.
    fn entry(&self) -> usize;

    /// Scalar numeric field of the current entry.
    fn f64(&self, field: &str) -> Result<f64>;

    /// Categorical (integer code) field of the current entry.
    fn int(&self, field: &str) -> Result<i64>;

    /// Vector-valued field of the current entry.
    fn vec(&self, field: &str) -> Result<&[f64]>;
}

/// Named double-precision metadata (exposure, nucleon counts).
pub trait MetadataStore {
    /// Record `value` under `name`. Each name may be written once.
    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()>;

    /// Read a previously recorded value.
    fn parameter(&self, name: &str) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::HashMap;

    struct DummyMetadata(HashMap<String, f64>);

    impl MetadataStore for DummyMetadata {
        fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
            if self.0.insert(name.to_string(), value).is_some() {
                return Err(Error::Validation(format!("parameter '{name}' already written")));
            }
            Ok(())
        }

        fn parameter(&self, name: &str) -> Result<f64> {
            self.0.get(name).copied().ok_or_else(|| Error::NotFound(name.to_string()))
        }
    }

    #[test]
    fn test_dummy_metadata() {
        let mut store = DummyMetadata(HashMap::new());
        store.set_parameter("POTUsed", 1e20).unwrap();
        assert_eq!(store.parameter("POTUsed").unwrap(), 1e20);
        assert!(store.set_parameter("POTUsed", 2e20).is_err());
        assert!(store.parameter("missing").is_err());
    }
}
