//! Selection predicates.
//!
//! Reconstructed-level cuts see the event through a [`Universe`] (so lateral
//! shifts can move events across a cut) and may record derived quantities in
//! the [`EventContext`]. Truth-level cuts only get a [`TruthEvent`].

use serde::{Deserialize, Serialize};
use xs_core::{Error, Result};

use crate::event::{Event, TruthEvent};
use crate::universe::Universe;

/// Per-event, per-universe scratch state filled while cuts run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventContext {
    /// Index of the selected candidate in vector-valued fields.
    pub candidate: Option<usize>,
    /// Sideband the event was classified into.
    pub sideband: Option<usize>,
}

/// Reconstructed-level predicate.
pub trait RecoCut: Send + Sync {
    /// Name shown in the cut table.
    fn name(&self) -> &str;

    /// Whether the event passes in `universe`.
    fn pass(&self, event: &Event<'_>, universe: &dyn Universe, ctx: &mut EventContext)
    -> Result<bool>;
}

/// Truth-level predicate (signal definition, phase space).
pub trait TruthCut: Send + Sync {
    /// Name shown in the cut table.
    fn name(&self) -> &str;

    /// Whether the event passes in `universe`.
    fn pass(&self, event: &TruthEvent<'_>, universe: &dyn Universe) -> Result<bool>;
}

/// Comparison applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// `v > x`
    Above(f64),
    /// `v >= x`
    AtLeast(f64),
    /// `v < x`
    Below(f64),
    /// `v <= x`
    AtMost(f64),
    /// `lo <= v < hi`
    Within(f64, f64),
    /// Integer code equals.
    Equals(i64),
    /// Integer code in set.
    OneOf(Vec<i64>),
}

impl Comparison {
    fn is_categorical(&self) -> bool {
        matches!(self, Comparison::Equals(_) | Comparison::OneOf(_))
    }

    fn test(&self, v: f64) -> bool {
        match self {
            Comparison::Above(x) => v > *x,
            Comparison::AtLeast(x) => v >= *x,
            Comparison::Below(x) => v < *x,
            Comparison::AtMost(x) => v <= *x,
            Comparison::Within(lo, hi) => v >= *lo && v < *hi,
            Comparison::Equals(_) | Comparison::OneOf(_) => false,
        }
    }

    fn test_code(&self, code: i64) -> bool {
        match self {
            Comparison::Equals(x) => code == *x,
            Comparison::OneOf(xs) => xs.contains(&code),
            _ => false,
        }
    }
}

/// Compare one field against a threshold or code set.
#[derive(Debug, Clone)]
pub struct FieldCut {
    name: String,
    field: String,
    comparison: Comparison,
}

impl FieldCut {
    /// Named field cut.
    pub fn new(name: impl Into<String>, field: impl Into<String>, comparison: Comparison) -> Self {
        Self { name: name.into(), field: field.into(), comparison }
    }
}

impl RecoCut for FieldCut {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass(
        &self,
        event: &Event<'_>,
        universe: &dyn Universe,
        _ctx: &mut EventContext,
    ) -> Result<bool> {
        if self.comparison.is_categorical() {
            Ok(self.comparison.test_code(event.int(&self.field)?))
        } else {
            Ok(self.comparison.test(universe.reco(event, &self.field)?))
        }
    }
}

impl TruthCut for FieldCut {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass(&self, event: &TruthEvent<'_>, universe: &dyn Universe) -> Result<bool> {
        if self.comparison.is_categorical() {
            Ok(self.comparison.test_code(event.int(&self.field)?))
        } else {
            Ok(self.comparison.test(universe.truth(event, &self.field)?))
        }
    }
}

/// Whether `(x, y)` lies inside a regular hexagon with flat sides at
/// `x = ±apothem`.
pub fn inside_hexagon(x: f64, y: f64, apothem: f64) -> bool {
    let side = apothem * 2.0 / 3f64.sqrt();
    if x * x + y * y < apothem * apothem {
        return true;
    }
    if x.abs() > apothem || y.abs() > side {
        return false;
    }
    if y.abs() < side / 2.0 {
        return true;
    }
    let slope = (side / 2.0) / apothem;
    y.abs() <= side - slope * x.abs()
}

/// Transverse fiducial cut: vertex inside a hexagon.
#[derive(Debug, Clone)]
pub struct Hexagon {
    name: String,
    x_field: String,
    y_field: String,
    apothem: f64,
}

impl Hexagon {
    /// Hexagon cut on `(x_field, y_field)`.
    pub fn new(
        name: impl Into<String>,
        x_field: impl Into<String>,
        y_field: impl Into<String>,
        apothem: f64,
    ) -> Self {
        Self { name: name.into(), x_field: x_field.into(), y_field: y_field.into(), apothem }
    }
}

impl RecoCut for Hexagon {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass(
        &self,
        event: &Event<'_>,
        universe: &dyn Universe,
        _ctx: &mut EventContext,
    ) -> Result<bool> {
        let x = universe.reco(event, &self.x_field)?;
        let y = universe.reco(event, &self.y_field)?;
        Ok(inside_hexagon(x, y, self.apothem))
    }
}

impl TruthCut for Hexagon {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass(&self, event: &TruthEvent<'_>, universe: &dyn Universe) -> Result<bool> {
        let x = universe.truth(event, &self.x_field)?;
        let y = universe.truth(event, &self.y_field)?;
        Ok(inside_hexagon(x, y, self.apothem))
    }
}

/// Picks the highest-valued element of a vector field above `min` and
/// records its index as the event's candidate. Fails the event if none.
#[derive(Debug, Clone)]
pub struct BestCandidate {
    name: String,
    field: String,
    min: f64,
}

impl BestCandidate {
    /// Candidate selection on `field`.
    pub fn new(name: impl Into<String>, field: impl Into<String>, min: f64) -> Self {
        Self { name: name.into(), field: field.into(), min }
    }
}

impl RecoCut for BestCandidate {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass(
        &self,
        event: &Event<'_>,
        _universe: &dyn Universe,
        ctx: &mut EventContext,
    ) -> Result<bool> {
        let values = event.vec(&self.field)?;
        let best = values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > self.min)
            .fold(None, |acc: Option<(usize, f64)>, (i, v)| match acc {
                Some((_, b)) if b >= *v => acc,
                _ => Some((i, *v)),
            });
        ctx.candidate = best.map(|(i, _)| i);
        Ok(best.is_some())
    }
}

/// Serializable cut description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum CutSpec {
    /// `field > value`
    Above {
        /// Field name.
        field: String,
        /// Threshold.
        value: f64,
        /// Display name (defaults to a description of the cut).
        #[serde(default)]
        name: Option<String>,
    },
    /// `field >= value`
    AtLeast {
        /// Field name.
        field: String,
        /// Threshold.
        value: f64,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// `field < value`
    Below {
        /// Field name.
        field: String,
        /// Threshold.
        value: f64,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// `field <= value`
    AtMost {
        /// Field name.
        field: String,
        /// Threshold.
        value: f64,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// `lo <= field < hi`
    Within {
        /// Field name.
        field: String,
        /// Lower edge (inclusive).
        lo: f64,
        /// Upper edge (exclusive).
        hi: f64,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// Integer code equals `value`.
    Equals {
        /// Field name.
        field: String,
        /// Code.
        value: i64,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// Integer code in `values`.
    OneOf {
        /// Field name.
        field: String,
        /// Accepted codes.
        values: Vec<i64>,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// Angle field (radians) below `degrees`.
    MaxAngle {
        /// Field name.
        field: String,
        /// Maximum angle in degrees.
        degrees: f64,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// Vertex inside a hexagon.
    Hexagon {
        /// Transverse x field.
        x_field: String,
        /// Transverse y field.
        y_field: String,
        /// Apothem.
        apothem: f64,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// Best vector element above `min` becomes the candidate (reco only).
    Candidate {
        /// Vector field name.
        field: String,
        /// Threshold.
        min: f64,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
}

impl CutSpec {
    fn field_cut(&self) -> Option<FieldCut> {
        let (field, cmp, default, name) = match self {
            CutSpec::Above { field, value, name } => {
                (field, Comparison::Above(*value), format!("{field} > {value}"), name)
            }
            CutSpec::AtLeast { field, value, name } => {
                (field, Comparison::AtLeast(*value), format!("{field} >= {value}"), name)
            }
            CutSpec::Below { field, value, name } => {
                (field, Comparison::Below(*value), format!("{field} < {value}"), name)
            }
            CutSpec::AtMost { field, value, name } => {
                (field, Comparison::AtMost(*value), format!("{field} <= {value}"), name)
            }
            CutSpec::Within { field, lo, hi, name } => {
                (field, Comparison::Within(*lo, *hi), format!("{lo} <= {field} < {hi}"), name)
            }
            CutSpec::Equals { field, value, name } => {
                (field, Comparison::Equals(*value), format!("{field} == {value}"), name)
            }
            CutSpec::OneOf { field, values, name } => {
                (field, Comparison::OneOf(values.clone()), format!("{field} in {values:?}"), name)
            }
            CutSpec::MaxAngle { field, degrees, name } => (
                field,
                Comparison::Below(degrees.to_radians()),
                format!("{field} < {degrees} deg"),
                name,
            ),
            CutSpec::Hexagon { .. } | CutSpec::Candidate { .. } => return None,
        };
        Some(FieldCut::new(name.clone().unwrap_or(default), field.clone(), cmp))
    }

    fn validate(&self) -> Result<()> {
        let bad = match self {
            CutSpec::Within { lo, hi, .. } => !(lo < hi),
            CutSpec::Hexagon { apothem, .. } => !(apothem.is_finite() && *apothem > 0.0),
            CutSpec::MaxAngle { degrees, .. } => !degrees.is_finite(),
            _ => false,
        };
        if bad {
            return Err(Error::Config(format!("invalid cut {self:?}")));
        }
        Ok(())
    }

    /// Build a reconstructed-level cut.
    pub fn build_reco(&self) -> Result<Box<dyn RecoCut>> {
        self.validate()?;
        if let Some(c) = self.field_cut() {
            return Ok(Box::new(c));
        }
        match self {
            CutSpec::Hexagon { x_field, y_field, apothem, name } => Ok(Box::new(Hexagon::new(
                name.clone().unwrap_or_else(|| format!("hexagon({apothem})")),
                x_field.clone(),
                y_field.clone(),
                *apothem,
            ))),
            CutSpec::Candidate { field, min, name } => Ok(Box::new(BestCandidate::new(
                name.clone().unwrap_or_else(|| format!("candidate {field} > {min}")),
                field.clone(),
                *min,
            ))),
            _ => Err(Error::Config(format!("cannot build cut {self:?}"))),
        }
    }

    /// Build a truth-level cut. Candidate selection has no truth form.
    pub fn build_truth(&self) -> Result<Box<dyn TruthCut>> {
        self.validate()?;
        if let Some(c) = self.field_cut() {
            return Ok(Box::new(c));
        }
        match self {
            CutSpec::Hexagon { x_field, y_field, apothem, name } => Ok(Box::new(Hexagon::new(
                name.clone().unwrap_or_else(|| format!("true hexagon({apothem})")),
                x_field.clone(),
                y_field.clone(),
                *apothem,
            ))),
            _ => Err(Error::Config(format!("{self:?} cannot be used as a truth-level cut"))),
        }
    }
}
