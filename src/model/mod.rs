//! Allocation laws for spatial interaction models.
//!
//! Each law maps per-pair predictors (distance, intervening opportunity,
//! destination mass, origin mass) to an unnormalized allocation weight.
//! Weights are later rescaled per origin so that every origin's block
//! sums to its observed total outflow.

use std::{fmt, str::FromStr};

use anyhow::{bail, ensure, Result};

/// A spatial interaction model variant, selected by its canonical tag.
///
/// Gravity models (`GM_*`) decay destination mass with distance; the
/// radiation and intervening-opportunity families rank destinations by
/// the competing mass closer than them instead of by distance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Model {
    /// `GM_Zipf`: destination mass over distance.
    GravityZipf,
    /// `GM_Pow`: destination mass over a power of distance.
    GravityPower,
    /// `GM_Exp`: destination mass with exponential distance decay.
    GravityExponential,
    /// `RM`: the parameter-free radiation model.
    Radiation,
    /// `ERM`: the one-parameter extended radiation model.
    ExtendedRadiation,
    /// `IO`: the intervening-opportunities model (negative parameter).
    InterveningOpportunities,
    /// `OPS`: opportunity-proportional share.
    OpportunityShare,
}

impl Model {
    /// All model variants, in the conventional evaluation order.
    pub const ALL: [Model; 7] = [
        Model::GravityZipf,
        Model::GravityPower,
        Model::GravityExponential,
        Model::Radiation,
        Model::ExtendedRadiation,
        Model::InterveningOpportunities,
        Model::OpportunityShare,
    ];

    /// Canonical tag, used in CLI arguments, report columns and file names.
    pub fn tag(&self) -> &'static str {
        match self {
            Model::GravityZipf => "GM_Zipf",
            Model::GravityPower => "GM_Pow",
            Model::GravityExponential => "GM_Exp",
            Model::Radiation => "RM",
            Model::ExtendedRadiation => "ERM",
            Model::InterveningOpportunities => "IO",
            Model::OpportunityShare => "OPS",
        }
    }

    /// Whether this variant carries a free parameter to calibrate.
    #[inline]
    pub fn needs_param(&self) -> bool {
        matches!(
            self,
            Model::GravityPower
                | Model::GravityExponential
                | Model::ExtendedRadiation
                | Model::InterveningOpportunities
        )
    }

    /// Initial guess and optional box bound for calibration.
    ///
    /// The intervening-opportunities exponent must stay in a narrow
    /// negative band: outside it the exponentials overflow and the
    /// objective is no longer finite.
    pub fn initial_guess(&self) -> (f64, Option<(f64, f64)>) {
        match self {
            Model::InterveningOpportunities => (-0.001, Some((-0.15, -0.0001))),
            _ => (1.0, None),
        }
    }

    /// Evaluate the law elementwise over four same-length predictor slices.
    ///
    /// Inputs must be pre-filtered to positive masses and distances; the
    /// law does not guard its denominators. Parameter-free variants
    /// ignore `param`, parametric ones require it.
    pub fn allocate(
        &self,
        distance: &[f64],
        opportunity: &[f64],
        dest_mass: &[f64],
        origin_mass: &[f64],
        param: Option<f64>,
    ) -> Result<Vec<f64>> {
        let n = distance.len();
        ensure!(
            opportunity.len() == n && dest_mass.len() == n && origin_mass.len() == n,
            "[model] predictor slices differ in length: dist {} io {} dmass {} omass {}",
            n,
            opportunity.len(),
            dest_mass.len(),
            origin_mass.len()
        );
        ensure!(
            !self.needs_param() || param.is_some(),
            "[model] {} requires a parameter",
            self.tag()
        );

        let weights = match self {
            Model::GravityZipf => (0..n).map(|i| dest_mass[i] / distance[i]).collect(),
            Model::GravityPower => {
                let beta = param.unwrap();
                (0..n).map(|i| dest_mass[i] / distance[i].powf(beta)).collect()
            }
            Model::GravityExponential => {
                let beta = param.unwrap();
                (0..n).map(|i| dest_mass[i] / (beta * distance[i]).exp()).collect()
            }
            Model::Radiation => (0..n)
                .map(|i| {
                    let reach = origin_mass[i] + opportunity[i];
                    dest_mass[i] / (reach * (reach + dest_mass[i]))
                })
                .collect(),
            Model::ExtendedRadiation => {
                let alpha = param.unwrap();
                (0..n)
                    .map(|i| {
                        let near = origin_mass[i] + opportunity[i];
                        let far = near + dest_mass[i];
                        (far.powf(alpha) - near.powf(alpha)) * (1.0 + origin_mass[i].powf(alpha))
                            / ((1.0 + near.powf(alpha)) * (1.0 + far.powf(alpha)))
                    })
                    .collect()
            }
            Model::InterveningOpportunities => {
                let gamma = param.unwrap();
                (0..n)
                    .map(|i| {
                        (gamma * opportunity[i]).exp()
                            - (gamma * (opportunity[i] + dest_mass[i])).exp()
                    })
                    .collect()
            }
            Model::OpportunityShare => (0..n)
                .map(|i| {
                    let total = origin_mass[i] + opportunity[i] + dest_mass[i];
                    dest_mass[i] / total
                })
                .collect(),
        };
        Ok(weights)
    }
}

impl FromStr for Model {
    type Err = anyhow::Error;

    fn from_str(tag: &str) -> Result<Self> {
        for model in Model::ALL {
            if model.tag() == tag {
                return Ok(model);
            }
        }
        bail!("[model] unsupported model tag: '{tag}'")
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One origin with three destinations at increasing distance.
    fn make_test_predictors() -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        (
            vec![2.0, 5.0, 9.0],    // distance
            vec![1.0, 11.0, 26.0],  // opportunity
            vec![10.0, 15.0, 4.0],  // dest mass
            vec![5.0, 5.0, 5.0],    // origin mass
        )
    }

    #[test]
    fn tags_round_trip() {
        for model in Model::ALL {
            assert_eq!(model.tag().parse::<Model>().unwrap(), model);
        }
        assert!("GM_Cubic".parse::<Model>().is_err());
    }

    #[test]
    fn zipf_is_mass_over_distance() {
        let (dis, io, md, mo) = make_test_predictors();
        let w = Model::GravityZipf.allocate(&dis, &io, &md, &mo, None).unwrap();
        assert_eq!(w[0], 10.0 / 2.0);
        assert_eq!(w[1], 15.0 / 5.0);
        assert_eq!(w[2], 4.0 / 9.0);
    }

    #[test]
    fn radiation_matches_closed_form() {
        // mo=2, io=3, md=5 -> 5 / ((2+3) * (2+3+5)) = 0.1
        let w = Model::Radiation
            .allocate(&[1.0], &[3.0], &[5.0], &[2.0], None)
            .unwrap();
        assert!((w[0] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn power_law_at_unit_exponent_equals_zipf() {
        let (dis, io, md, mo) = make_test_predictors();
        let zipf = Model::GravityZipf.allocate(&dis, &io, &md, &mo, None).unwrap();
        let pow = Model::GravityPower
            .allocate(&dis, &io, &md, &mo, Some(1.0))
            .unwrap();
        for (a, b) in zipf.iter().zip(&pow) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn all_laws_finite_and_nonnegative_on_valid_inputs() {
        let (dis, io, md, mo) = make_test_predictors();
        for model in Model::ALL {
            let param = model.needs_param().then(|| model.initial_guess().0);
            let w = model.allocate(&dis, &io, &md, &mo, param).unwrap();
            for (i, v) in w.iter().enumerate() {
                assert!(v.is_finite() && *v >= 0.0, "{model} weight {i} = {v}");
            }
        }
    }

    #[test]
    fn parameter_free_laws_ignore_param() {
        let (dis, io, md, mo) = make_test_predictors();
        for model in [Model::GravityZipf, Model::Radiation, Model::OpportunityShare] {
            let bare = model.allocate(&dis, &io, &md, &mo, None).unwrap();
            let with = model.allocate(&dis, &io, &md, &mo, Some(7.5)).unwrap();
            assert_eq!(bare, with, "{model} must not depend on a parameter");
        }
    }

    #[test]
    fn parametric_laws_reject_missing_param() {
        let (dis, io, md, mo) = make_test_predictors();
        for model in Model::ALL.into_iter().filter(Model::needs_param) {
            assert!(model.allocate(&dis, &io, &md, &mo, None).is_err());
        }
    }

    #[test]
    fn intervening_opportunities_decays_with_opportunity() {
        // Closer competing mass should shrink the weight.
        let w = Model::InterveningOpportunities
            .allocate(&[1.0, 1.0], &[5.0, 50.0], &[10.0, 10.0], &[3.0, 3.0], Some(-0.05))
            .unwrap();
        assert!(w[0] > w[1]);
    }
}
