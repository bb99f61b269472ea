//! Common data types for xsec

use serde::{Deserialize, Serialize};

/// Name of the exposure (protons on target) scalar written next to every
/// set of histograms.
pub const POT_USED: &str = "POTUsed";

/// Kind of sample an event source provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Reconstructed simulation: reco and truth fields available.
    Reco,
    /// Truth-only simulation used for the efficiency denominator.
    Truth,
    /// Recorded data: no truth information.
    Data,
}

impl SourceKind {
    /// Whether truth-level fields may be read from this kind of sample.
    pub fn has_truth(self) -> bool {
        !matches!(self, SourceKind::Data)
    }

    /// Whether this sample is simulation.
    pub fn is_mc(self) -> bool {
        !matches!(self, SourceKind::Data)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::Reco => "reco",
            SourceKind::Truth => "truth",
            SourceKind::Data => "data",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_has_no_truth() {
        assert!(!SourceKind::Data.has_truth());
        assert!(SourceKind::Reco.has_truth());
        assert!(SourceKind::Truth.has_truth());
    }

    #[test]
    fn serde_names() {
        let s = serde_json::to_string(&SourceKind::Truth).unwrap();
        assert_eq!(s, "\"truth\"");
    }
}
