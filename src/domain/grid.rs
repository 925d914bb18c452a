//! Risk parameter grid: reward/risk ratio × ATR multiplier.

use crate::domain::error::RrsweepError;
use crate::domain::trade::TradeParameters;

pub const DEFAULT_RR_RATIOS: [f64; 4] = [1.5, 2.0, 2.5, 3.0];

/// 2.0 to 6.0 inclusive in steps of 0.5.
pub fn default_atr_multipliers() -> Vec<f64> {
    float_range(2.0, 6.0, 0.5)
}

/// Inclusive float range, computed by index so steps do not accumulate error.
/// Callers pass `step > 0` and `end >= start`.
fn float_range(start: f64, end: f64, step: f64) -> Vec<f64> {
    let steps = ((end - start) / step + 1e-9).floor() as usize;
    (0..=steps).map(|i| start + step * i as f64).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid {
    rr_ratios: Vec<f64>,
    atr_multipliers: Vec<f64>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            rr_ratios: DEFAULT_RR_RATIOS.to_vec(),
            atr_multipliers: default_atr_multipliers(),
        }
    }
}

impl SweepGrid {
    /// Both axes must be non-empty and every value a valid parameter.
    pub fn new(rr_ratios: Vec<f64>, atr_multipliers: Vec<f64>) -> Result<Self, RrsweepError> {
        if rr_ratios.is_empty() || atr_multipliers.is_empty() {
            return Err(RrsweepError::InvalidParameters {
                reason: "grid axes must not be empty".to_string(),
            });
        }
        for &rr in &rr_ratios {
            for &atr in &atr_multipliers {
                TradeParameters::new(atr, rr)?;
            }
        }
        Ok(Self {
            rr_ratios,
            atr_multipliers,
        })
    }

    pub fn rr_ratios(&self) -> &[f64] {
        &self.rr_ratios
    }

    pub fn atr_multipliers(&self) -> &[f64] {
        &self.atr_multipliers
    }

    pub fn total_combinations(&self) -> usize {
        self.rr_ratios.len() * self.atr_multipliers.len()
    }

    /// rr-major order, duplicates (after quantisation) dropped.
    pub fn combinations(&self) -> Vec<TradeParameters> {
        let mut out: Vec<TradeParameters> = Vec::with_capacity(self.total_combinations());
        for &rr in &self.rr_ratios {
            for &atr in &self.atr_multipliers {
                let params = TradeParameters {
                    atr_multiplier: atr,
                    rr_ratio: rr,
                };
                if !out.contains(&params) {
                    out.push(params);
                }
            }
        }
        out
    }
}
