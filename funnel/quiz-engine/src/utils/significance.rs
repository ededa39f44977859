use crate::models::experiment::SignificanceResult;

const SIGNIFICANCE_THRESHOLD: f64 = 0.05;
const MAX_CONFIDENCE: f64 = 99.9;

/// Two-tailed two-proportion z-test between a control and a variant.
///
/// Empty groups produce a non-significant result instead of NaN.
pub fn calculate_statistical_significance(
    control_conversions: u64,
    control_total: u64,
    variant_conversions: u64,
    variant_total: u64,
) -> SignificanceResult {
    let control_rate = rate(control_conversions, control_total);
    let variant_rate = rate(variant_conversions, variant_total);

    let uplift = if control_rate > 0.0 {
        (variant_rate - control_rate) / control_rate * 100.0
    } else {
        0.0
    };

    let z_score = if control_total > 0 && variant_total > 0 {
        let pooled = (control_conversions as f64 + variant_conversions as f64)
            / (control_total as f64 + variant_total as f64);
        let se = (pooled
            * (1.0 - pooled)
            * (1.0 / control_total as f64 + 1.0 / variant_total as f64))
            .sqrt();
        if se > 0.0 {
            (variant_rate - control_rate) / se
        } else {
            0.0
        }
    } else {
        0.0
    };

    let p_value = (2.0 * (1.0 - normal_cdf(z_score.abs()))).clamp(0.0, 1.0);

    SignificanceResult {
        p_value,
        is_significant: p_value < SIGNIFICANCE_THRESHOLD,
        confidence_level: ((1.0 - p_value) * 100.0).min(MAX_CONFIDENCE),
        uplift,
    }
}

fn rate(conversions: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        conversions as f64 / total as f64
    }
}

// Abramowitz-Stegun polynomial approximation
fn normal_cdf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let d = 0.3989423 * (-x * x / 2.0).exp();
    let prob = d
        * t
        * (0.3193815 + t * (-0.3565638 + t * (1.781478 + t * (-1.821256 + t * 1.330274))));
    if x > 0.0 {
        1.0 - prob
    } else {
        prob
    }
}
