//! Event weights: a product of reweighters evaluated per universe.

use xs_core::{Error, Result};

use crate::event::Event;
use crate::universe::Universe;

/// One multiplicative factor of the event weight.
pub trait Reweighter: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Factor for `event` in `universe`.
    fn weight(&self, event: &Event<'_>, universe: &dyn Universe) -> Result<f64>;
}

/// Central MC weight stored in a per-event field.
#[derive(Debug, Clone)]
pub struct FieldWeight {
    field: String,
}

impl FieldWeight {
    /// Read the weight from `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Reweighter for FieldWeight {
    fn name(&self) -> &str {
        &self.field
    }

    fn weight(&self, event: &Event<'_>, _universe: &dyn Universe) -> Result<f64> {
        event.f64(&self.field)
    }
}

/// The universe's own weight factor.
#[derive(Debug, Clone, Default)]
pub struct UniverseWeight;

impl Reweighter for UniverseWeight {
    fn name(&self) -> &str {
        "universe"
    }

    fn weight(&self, event: &Event<'_>, universe: &dyn Universe) -> Result<f64> {
        universe.weight_factor(event)
    }
}

/// Product of reweighters.
#[derive(Default)]
pub struct Model {
    reweighters: Vec<Box<dyn Reweighter>>,
}

impl Model {
    /// Empty model (weight 1).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reweighter.
    pub fn with(mut self, reweighter: impl Reweighter + 'static) -> Self {
        self.reweighters.push(Box::new(reweighter));
        self
    }

    /// Optional central weight field times the universe factor.
    pub fn standard(weight_field: Option<&str>) -> Self {
        let model = Self::new();
        let model = match weight_field {
            Some(f) => model.with(FieldWeight::new(f)),
            None => model,
        };
        model.with(UniverseWeight)
    }

    /// Names of the reweighters, in order.
    pub fn names(&self) -> Vec<&str> {
        self.reweighters.iter().map(|r| r.name()).collect()
    }

    /// Weight of `event` in `universe`.
    pub fn weight(&self, event: &Event<'_>, universe: &dyn Universe) -> Result<f64> {
        let mut w = 1.0;
        for r in &self.reweighters {
            w *= r.weight(event, universe)?;
        }
        if !w.is_finite() {
            return Err(Error::Data(format!(
                "entry {}: non-finite weight {w} in universe '{}'",
                event.entry(),
                universe.name()
            )));
        }
        Ok(w)
    }
}
