//! Entry signals and the trait every strategy variant implements.

use crate::domain::features::{BarContext, FeatureFrame, IndicatorSpec};
use crate::domain::grid::SweepGrid;
use crate::domain::trade::Side;
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    #[default]
    None,
    Long,
    Short,
}

impl Signal {
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::None => None,
            Signal::Long => Some(Side::Long),
            Signal::Short => Some(Side::Short),
        }
    }

    /// Pick a direction from two predicates. Long wins if both hold.
    pub fn from_conditions(long: bool, short: bool) -> Self {
        if long {
            Signal::Long
        } else if short {
            Signal::Short
        } else {
            Signal::None
        }
    }
}

/// A strategy variant: a pure predicate over one bar's features.
///
/// Implementations must not look past `ctx.bar`; the simulator relies on
/// signals being decided on information available at the signal bar close.
pub trait SignalGenerator: Send + Sync + Debug {
    /// Persisted identifier, e.g. `RSI-EMA`.
    fn name(&self) -> &'static str;

    fn indicator_spec(&self) -> IndicatorSpec;

    /// Bars needed before every indicator the predicate reads is defined.
    fn required_lookback(&self) -> usize;

    fn evaluate(&self, ctx: &BarContext<'_>) -> Signal;

    fn default_grid(&self) -> SweepGrid {
        SweepGrid::default()
    }
}

/// Every (bar index, side) where the generator fires, ascending.
pub fn scan_signals(generator: &dyn SignalGenerator, frame: &FeatureFrame) -> Vec<(usize, Side)> {
    (0..frame.len())
        .filter_map(|i| {
            let ctx = frame.context(i)?;
            generator.evaluate(&ctx).side().map(|side| (i, side))
        })
        .collect()
}
