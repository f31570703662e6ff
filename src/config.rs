use std::fmt;
use std::path::PathBuf;

use grb::prelude::*;
use serde::{Deserialize, Serialize};

use crate::problem::Cost;

/// Scalar knobs of the procurement model.
///
/// Every parameter carries a default and a validated range; the set is
/// resolved once per solve and passed by reference into the model builder,
/// never read from ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    /// Total inventory the upstream site can hold in any period
    pub inventory_capacity_pack: f64,
    /// Total inventory the downstream site can hold in any period
    pub inventory_capacity_gourmet: f64,
    /// Cap on the total quantity transferred downstream per period
    pub transport_limit_by_period: f64,
    /// Cap on the total quantity acquired per period
    pub acquisition_limit_by_period: f64,
    /// Longest stay (in periods) of a unit at the upstream site before it
    /// must have been transferred onward
    pub max_dwell_periods: usize,
    /// Cap on the number of distinct items transferred in one period.
    /// `None` leaves the diversity block out of the model
    pub diversity_limit: Option<usize>,
    /// Transport batching extension; `None` leaves it out of the model
    pub batching: Option<BatchingParams>,
    /// Quantity discount extension; `None` leaves it out of the model
    pub discount: Option<DiscountParams>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        ParameterSet {
            inventory_capacity_pack: 5000.0,
            inventory_capacity_gourmet: 4000.0,
            transport_limit_by_period: 4000.0,
            acquisition_limit_by_period: 4000.0,
            max_dwell_periods: 1,
            diversity_limit: None,
            batching: None,
            discount: None,
        }
    }
}

/// Transport is priced per discrete carrying unit (a truck), not per
/// item-unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingParams {
    /// Quantity one batch can carry
    pub batch_capacity: f64,
    /// Cost of each batch used
    pub batch_cost: Cost,
}

impl Default for BatchingParams {
    fn default() -> Self {
        BatchingParams {
            batch_capacity: 4000.0,
            batch_cost: 350.0,
        }
    }
}

/// Volume discount on acquisitions that reach a threshold quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountParams {
    /// Acquired quantity at or above which the discount applies
    pub threshold: f64,
    /// Fraction of the acquisition cost waived when the discount applies
    pub rate: f64,
}

impl Default for DiscountParams {
    fn default() -> Self {
        DiscountParams {
            threshold: 100.0,
            rate: 0.10,
        }
    }
}

impl ParameterSet {
    /// Checks every knob against its permissible range.
    pub fn validate(&self) -> Result<(), ParameterError> {
        let nonnegative = [
            ("inventory_capacity_pack", self.inventory_capacity_pack),
            ("inventory_capacity_gourmet", self.inventory_capacity_gourmet),
            ("transport_limit_by_period", self.transport_limit_by_period),
            ("acquisition_limit_by_period", self.acquisition_limit_by_period),
        ];
        for (name, value) in nonnegative {
            if !value.is_finite() || value < 0.0 {
                return Err(ParameterError::out_of_range(name, value, 0.0, f64::INFINITY));
            }
        }

        if self.max_dwell_periods < 1 {
            return Err(ParameterError::out_of_range(
                "max_dwell_periods",
                self.max_dwell_periods as f64,
                1.0,
                f64::INFINITY,
            ));
        }

        if let Some(limit) = self.diversity_limit {
            if limit < 1 {
                return Err(ParameterError::out_of_range(
                    "diversity_limit",
                    limit as f64,
                    1.0,
                    f64::INFINITY,
                ));
            }
        }

        if let Some(batching) = &self.batching {
            if !batching.batch_capacity.is_finite() || batching.batch_capacity <= 0.0 {
                return Err(ParameterError::out_of_range(
                    "batch_capacity",
                    batching.batch_capacity,
                    f64::EPSILON,
                    f64::INFINITY,
                ));
            }
            if !batching.batch_cost.is_finite() || batching.batch_cost < 0.0 {
                return Err(ParameterError::out_of_range(
                    "batch_cost",
                    batching.batch_cost,
                    0.0,
                    f64::INFINITY,
                ));
            }
        }

        if let Some(discount) = &self.discount {
            if !discount.threshold.is_finite() || discount.threshold < 0.0 {
                return Err(ParameterError::out_of_range(
                    "discount.threshold",
                    discount.threshold,
                    0.0,
                    f64::INFINITY,
                ));
            }
            if !discount.rate.is_finite() || !(0.0..=1.0).contains(&discount.rate) {
                return Err(ParameterError::out_of_range(
                    "discount.rate",
                    discount.rate,
                    0.0,
                    1.0,
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterError {
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl ParameterError {
    fn out_of_range(name: &'static str, value: f64, min: f64, max: f64) -> ParameterError {
        ParameterError::OutOfRange {
            name,
            value,
            min,
            max,
        }
    }
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterError::OutOfRange {
                name,
                value,
                min,
                max,
            } => write!(
                f,
                "parameter '{}' = {} outside permissible range [{}, {}]",
                name, value, min, max
            ),
        }
    }
}

impl std::error::Error for ParameterError {}

/// Opaque controls handed through to the external solver, plus the
/// advisory model-dump location used for failure diagnosis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Wall-clock limit in seconds
    pub time_limit: Option<f64>,
    /// Relative MIP gap at which the solver may stop
    pub mip_gap: Option<f64>,
    /// Suppress solver console output
    pub quiet: bool,
    /// Where to dump the model when the solve does not end optimal
    pub write_model_to: Option<PathBuf>,
}

impl SolverSettings {
    /// Applies the settings to a freshly built model.
    pub fn apply(&self, model: &mut Model) -> grb::Result<()> {
        if self.quiet {
            model.set_param(param::OutputFlag, 0)?;
        }
        if let Some(limit) = self.time_limit {
            model.set_param(param::TimeLimit, limit)?;
        }
        if let Some(gap) = self.mip_gap {
            model.set_param(param::MIPGap, gap)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = ParameterSet::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.inventory_capacity_pack, 5000.0);
        assert_eq!(params.inventory_capacity_gourmet, 4000.0);
        assert_eq!(params.max_dwell_periods, 1);
        assert!(params.batching.is_none());
        assert!(params.discount.is_none());
    }

    #[test]
    fn extension_defaults_are_valid() {
        let params = ParameterSet {
            batching: Some(BatchingParams::default()),
            discount: Some(DiscountParams::default()),
            ..Default::default()
        };
        assert!(params.validate().is_ok());
        assert_eq!(params.batching.as_ref().unwrap().batch_cost, 350.0);
        assert_eq!(params.discount.as_ref().unwrap().rate, 0.10);
    }

    #[test]
    fn rejects_negative_capacity() {
        let params = ParameterSet {
            inventory_capacity_pack: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParameterError::OutOfRange {
                name: "inventory_capacity_pack",
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_dwell() {
        let params = ParameterSet {
            max_dwell_periods: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_discount_rate_above_one() {
        let params = ParameterSet {
            discount: Some(DiscountParams {
                threshold: 100.0,
                rate: 1.5,
            }),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch_capacity() {
        let params = ParameterSet {
            batching: Some(BatchingParams {
                batch_capacity: 0.0,
                batch_cost: 350.0,
            }),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
