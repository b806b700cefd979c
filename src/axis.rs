// Axis break computation for timeline plots

use serde::{Deserialize, Serialize};

const NICE_MULTIPLIERS: [f64; 3] = [1.0, 2.0, 5.0];
/// Upper bound on the requested step count
const MAX_STEPS: usize = 1000;

/// Evenly spaced "nice" break values for an axis starting at zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotAxisBreaks {
    pub breaks: Vec<f64>,
    pub step: f64,
    /// Number of breaks
    pub length: usize,
    /// Last break value, 0 when there are no breaks
    pub max_label: f64,
}

impl PlotAxisBreaks {
    /// Breaks from 0 up to `extent` spaced by the smallest step from
    /// {1, 2, 5}×10^k that yields at most `steps` intervals.
    ///
    /// Non-positive or non-finite extents and a zero step count give no breaks,
    /// as do extents too small for a representable step. Step counts above
    /// `MAX_STEPS` are treated as `MAX_STEPS`.
    pub fn new(extent: f64, steps: usize) -> Self {
        if !extent.is_finite() || extent <= 0.0 || steps == 0 {
            return Self::default();
        }
        let steps = steps.min(MAX_STEPS);

        let step = nice_step(extent / steps as f64);
        let ratio = extent / step;
        if !step.is_finite() || step <= 0.0 || !ratio.is_finite() {
            return Self::default();
        }
        let count = ((ratio + 1e-9).floor() as usize).min(steps);
        let breaks: Vec<f64> = (0..=count).map(|i| round_to_step(i as f64 * step, step)).collect();
        Self {
            length: breaks.len(),
            max_label: breaks.last().copied().unwrap_or(0.0),
            breaks,
            step,
        }
    }
}

fn nice_step(raw_step: f64) -> f64 {
    let decade = 10_f64.powi(raw_step.log10().floor() as i32);
    for exponent_shift in [1.0, 10.0] {
        for multiplier in NICE_MULTIPLIERS {
            let candidate = decade * exponent_shift * multiplier;
            if candidate >= raw_step * (1.0 - 1e-9) {
                return candidate;
            }
        }
    }
    decade * 100.0
}

/// Removes accumulated float noise such as 0.30000000000000004.
fn round_to_step(value: f64, step: f64) -> f64 {
    let decimals = (-step.log10().floor()).max(0.0) as i32;
    let factor = 10_f64.powi(decimals);
    if !factor.is_finite() {
        return value;
    }
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hundred_in_five_steps() {
        let axis = PlotAxisBreaks::new(100.0, 5);
        assert_eq!(axis.step, 20.0);
        assert_eq!(axis.breaks, vec![0.0, 20.0, 40.0, 60.0, 80.0, 100.0]);
        assert_eq!(axis.length, 6);
        assert_eq!(axis.max_label, 100.0);
    }

    #[test]
    fn test_breaks_do_not_exceed_extent() {
        let axis = PlotAxisBreaks::new(7300.0, 4);
        assert_eq!(axis.step, 2000.0);
        assert_eq!(axis.breaks, vec![0.0, 2000.0, 4000.0, 6000.0]);
        assert_eq!(axis.max_label, 6000.0);
    }

    #[test]
    fn test_fractional_extent() {
        let axis = PlotAxisBreaks::new(0.9, 3);
        assert_eq!(axis.step, 0.5);
        assert_eq!(axis.breaks, vec![0.0, 0.5]);

        let axis = PlotAxisBreaks::new(0.3, 3);
        assert_eq!(axis.step, 0.1);
        assert_eq!(axis.breaks, vec![0.0, 0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(PlotAxisBreaks::new(0.0, 5).breaks.is_empty());
        assert!(PlotAxisBreaks::new(-3.0, 5).breaks.is_empty());
        assert!(PlotAxisBreaks::new(100.0, 0).breaks.is_empty());
        assert!(PlotAxisBreaks::new(f64::NAN, 5).breaks.is_empty());
        assert_eq!(PlotAxisBreaks::new(0.0, 5).max_label, 0.0);
    }

    #[test]
    fn test_subnormal_extent_gives_bounded_breaks() {
        for extent in [1e-310, f64::MIN_POSITIVE, 5e-324] {
            let axis = PlotAxisBreaks::new(extent, 5);
            assert!(axis.length <= 6);
            assert!(axis.breaks.iter().all(|b| b.is_finite() && *b >= 0.0));
            assert_eq!(axis.length, axis.breaks.len());
        }
    }

    #[test]
    fn test_huge_step_count_is_capped() {
        let axis = PlotAxisBreaks::new(100.0, usize::MAX);
        assert!(axis.length <= MAX_STEPS + 1);
        assert_eq!(axis.max_label, 100.0);
        assert!(axis.step > 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_breaks_are_bounded_and_nice(extent in 0.001f64..1e9, steps in 1usize..20) {
            let axis = PlotAxisBreaks::new(extent, steps);
            prop_assert!(!axis.breaks.is_empty());
            prop_assert!(axis.max_label <= extent * (1.0 + 1e-9));
            prop_assert!(axis.length <= steps + 1);
            prop_assert_eq!(axis.max_label, *axis.breaks.last().unwrap());
            for pair in axis.breaks.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            let mantissa = axis.step / 10_f64.powi(axis.step.log10().floor() as i32);
            prop_assert!(
                NICE_MULTIPLIERS.iter().any(|m| (mantissa - m).abs() < 1e-6)
                    || (mantissa - 10.0).abs() < 1e-6
            );
        }

        #[test]
        fn prop_zero_inputs_give_no_breaks(x in -1e6f64..1e6, n in 0usize..50) {
            prop_assert!(PlotAxisBreaks::new(0.0, n).breaks.is_empty());
            prop_assert!(PlotAxisBreaks::new(x, 0).breaks.is_empty());
        }
    }
}
