// src/analysis/normality.rs
use std::{collections::HashMap, fmt};

use arrow::{datatypes::DataType, record_batch::RecordBatch};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use tracing::{debug, info, warn};

use super::{SampleError, TestOutcome};
use crate::config::check_alpha;
use crate::error::Result;
use crate::process::convert::as_float64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NormalityMethod {
    ShapiroWilk,
    DAgostinoPearson,
}

impl NormalityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalityMethod::ShapiroWilk => "Shapiro-Wilk",
            NormalityMethod::DAgostinoPearson => "D'Agostino-Pearson",
        }
    }

    pub fn run(&self, values: &[f64]) -> Result<TestOutcome, SampleError> {
        match self {
            NormalityMethod::ShapiroWilk => shapiro_wilk(values),
            NormalityMethod::DAgostinoPearson => dagostino_pearson(values),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalityVerdict {
    Gaussian,
    NotGaussian,
}

impl NormalityVerdict {
    /// H0 (the sample is Gaussian) is kept when `p > alpha`.
    pub fn from_p(p_value: f64, alpha: f64) -> Self {
        if p_value > alpha {
            NormalityVerdict::Gaussian
        } else {
            NormalityVerdict::NotGaussian
        }
    }
}

impl fmt::Display for NormalityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            NormalityVerdict::Gaussian => "GAUSSIAN",
            NormalityVerdict::NotGaussian => "NOT_GAUSSIAN",
        })
    }
}

/// One method's verdict for one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestVerdict {
    pub variable: String,
    pub method: NormalityMethod,
    pub statistic: f64,
    pub p_value: f64,
    pub verdict: NormalityVerdict,
}

/// Both methods' verdicts for one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityRow {
    pub variable: String,
    pub shapiro_wilk: TestVerdict,
    pub dagostino_pearson: TestVerdict,
}

fn is_numeric(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Run `method` on every column. Columns the method cannot test (too few
/// observations, all identical) are left out with a warning.
fn run_method(
    method: NormalityMethod,
    columns: &[(String, Vec<f64>)],
    alpha: f64,
) -> Vec<TestVerdict> {
    columns
        .iter()
        .filter_map(|(name, values)| {
            let outcome = match method.run(values) {
                Ok(outcome) => outcome,
                Err(reason) => {
                    warn!(column = %name, method = method.as_str(), %reason, "column skipped");
                    return None;
                }
            };
            debug!(column = %name, method = method.as_str(), p = outcome.p_value, "normality test");
            Some(TestVerdict {
                variable: name.clone(),
                method,
                statistic: outcome.statistic,
                p_value: outcome.p_value,
                verdict: NormalityVerdict::from_p(outcome.p_value, alpha),
            })
        })
        .collect()
}

/// Run Shapiro-Wilk and D'Agostino-Pearson on every numeric column and join
/// the two verdict lists by variable name. Nulls and NaN are left out of each
/// sample; a column either method skips is missing from the result.
#[tracing::instrument(level = "info", skip(batch), fields(columns = batch.num_columns()))]
pub fn normality_sweep(batch: &RecordBatch, alpha: f64) -> Result<Vec<NormalityRow>> {
    check_alpha(alpha)?;

    let schema = batch.schema();
    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
    for (fld, arr) in schema.fields().iter().zip(batch.columns()) {
        if !is_numeric(fld.data_type()) {
            continue;
        }
        let values = as_float64(fld.name(), arr)?
            .iter()
            .flatten()
            .filter(|v| !v.is_nan())
            .collect();
        columns.push((fld.name().clone(), values));
    }

    let shapiro = run_method(NormalityMethod::ShapiroWilk, &columns, alpha);
    let dagostino = run_method(NormalityMethod::DAgostinoPearson, &columns, alpha);

    let mut by_name: HashMap<String, TestVerdict> = dagostino
        .into_iter()
        .map(|v| (v.variable.clone(), v))
        .collect();
    let rows: Vec<NormalityRow> = shapiro
        .into_iter()
        .filter_map(|sw| {
            by_name.remove(&sw.variable).map(|dp| NormalityRow {
                variable: sw.variable.clone(),
                shapiro_wilk: sw,
                dagostino_pearson: dp,
            })
        })
        .collect();

    info!(variables = rows.len(), alpha, "normality sweep done");
    Ok(rows)
}

pub(crate) fn standard_normal() -> Normal {
    Normal::new(0.0, 1.0).expect("standard normal parameters are valid")
}

/// `c[0] + c[1] x + c[2] x² + ...`
fn poly(c: &[f64], x: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &ci| acc * x + ci)
}

const SMALL: f64 = 1e-19;

/// Shapiro-Wilk W test (Royston's approximation, AS R94).
pub fn shapiro_wilk(values: &[f64]) -> Result<TestOutcome, SampleError> {
    const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
    const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
    const C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
    const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
    const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
    const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
    const G: [f64; 2] = [-2.273, 0.459];

    let n = values.len();
    if n < 3 {
        return Err(SampleError::TooSmall { min: 3, n });
    }
    if n > 5000 {
        warn!(n, "Shapiro-Wilk p-values are approximate above 5000 observations");
    }
    let mut x = values.to_vec();
    x.sort_by(f64::total_cmp);
    if x[n - 1] - x[0] < SMALL {
        return Err(SampleError::Constant);
    }

    let an = n as f64;
    let half = n / 2;
    let norm = standard_normal();

    // coefficients for the lower half, applied antisymmetrically
    let mut a = vec![0.0; half];
    if n == 3 {
        a[0] = std::f64::consts::FRAC_1_SQRT_2;
    } else {
        let m: Vec<f64> = (1..=half)
            .map(|i| norm.inverse_cdf((i as f64 - 0.375) / (an + 0.25)))
            .collect();
        let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
        let ssumm2 = summ2.sqrt();
        let rsn = 1.0 / an.sqrt();
        let a1 = poly(&C1, rsn) - m[0] / ssumm2;

        let (first, fac) = if n > 5 {
            let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
            let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
                / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
                .sqrt();
            a[1] = a2;
            (2, fac)
        } else {
            let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
            (1, fac)
        };
        a[0] = a1;
        for i in first..half {
            a[i] = -m[i] / fac;
        }
    }

    let mean = x.iter().sum::<f64>() / an;
    let ssq: f64 = x.iter().map(|v| (v - mean) * (v - mean)).sum();
    let num: f64 = a
        .iter()
        .enumerate()
        .map(|(i, ai)| ai * (x[n - 1 - i] - x[i]))
        .sum();
    let mut w = (num * num / ssq).min(1.0);

    if n == 3 {
        w = w.max(0.75);
        let pi6 = 6.0 / std::f64::consts::PI;
        let stqr = std::f64::consts::FRAC_PI_3;
        let p = (pi6 * (w.sqrt().asin() - stqr)).clamp(0.0, 1.0);
        return Ok(TestOutcome {
            statistic: w,
            p_value: p,
        });
    }

    let w1 = 1.0 - w;
    if w1 <= 0.0 {
        return Ok(TestOutcome {
            statistic: w,
            p_value: 1.0,
        });
    }
    let mut y = w1.ln();
    let (mu, sigma) = if n <= 11 {
        let gamma = poly(&G, an);
        if y >= gamma {
            return Ok(TestOutcome {
                statistic: w,
                p_value: 1e-99,
            });
        }
        y = -(gamma - y).ln();
        (poly(&C3, an), poly(&C4, an).exp())
    } else {
        let xx = an.ln();
        (poly(&C5, xx), poly(&C6, xx).exp())
    };
    let p = norm.sf((y - mu) / sigma);

    Ok(TestOutcome {
        statistic: w,
        p_value: p.clamp(0.0, 1.0),
    })
}

fn central_moments(x: &[f64]) -> (f64, f64, f64) {
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in x {
        let d = v - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// z-score of the sample skewness.
fn skew_z(b1: f64, n: f64) -> f64 {
    let y = b1 * (((n + 1.0) * (n + 3.0)) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    let ya = y / alpha;
    delta * (ya + (ya * ya + 1.0).sqrt()).ln()
}

/// z-score of the sample (Pearson) kurtosis.
fn kurtosis_z(b2: f64, n: f64) -> f64 {
    let e = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0).powi(2) * (n + 3.0) * (n + 5.0));
    let x = (b2 - e) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * ((6.0 * (n + 3.0) * (n + 5.0)) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0
        + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    (term1 - term2) / (2.0 / (9.0 * a)).sqrt()
}

/// D'Agostino-Pearson K² omnibus test: squared skewness and kurtosis
/// z-scores, referred to χ² with 2 degrees of freedom.
pub fn dagostino_pearson(values: &[f64]) -> Result<TestOutcome, SampleError> {
    let n = values.len();
    if n < 8 {
        return Err(SampleError::TooSmall { min: 8, n });
    }
    if n < 20 {
        debug!(n, "kurtosis z-score is unreliable below 20 observations");
    }
    let (m2, m3, m4) = central_moments(values);
    if m2 <= SMALL {
        return Err(SampleError::Constant);
    }
    let nf = n as f64;
    let zs = skew_z(m3 / m2.powf(1.5), nf);
    let zk = kurtosis_z(m4 / (m2 * m2), nf);
    let k2 = zs * zs + zk * zk;

    let chi2 = ChiSquared::new(2.0).expect("two degrees of freedom is valid");
    Ok(TestOutcome {
        statistic: k2,
        p_value: chi2.sf(k2).clamp(0.0, 1.0),
    })
}

#[cfg(test)]
pub(crate) mod samples {
    use super::standard_normal;
    use statrs::distribution::ContinuousCDF;

    /// Evenly spaced quantiles of N(mean, sd²).
    pub fn gaussian(n: usize, mean: f64, sd: f64) -> Vec<f64> {
        let norm = standard_normal();
        (0..n)
            .map(|i| mean + sd * norm.inverse_cdf((i as f64 + 0.5) / n as f64))
            .collect()
    }

    /// Evenly spaced quantiles of Exp(1).
    pub fn exponential(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| -(1.0 - (i as f64 + 0.5) / n as f64).ln())
            .collect()
    }

    /// Two well separated Gaussian clusters.
    pub fn bimodal(n: usize) -> Vec<f64> {
        let mut v = gaussian(n / 2, -5.0, 1.0);
        v.extend(gaussian(n - n / 2, 5.0, 1.0));
        v
    }
}
