// src/analysis/nonparam.rs
use std::{collections::HashMap, fmt};

use arrow::record_batch::RecordBatch;
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{debug, info};

use super::normality::standard_normal;
use super::rank::rank_average;
use super::{SampleError, TestOutcome};
use crate::config::check_alpha;
use crate::error::{Error, Result};
use crate::process::convert::{as_float64, as_utf8};

/// Without ties, a comparison where either sample is at or below this size
/// uses the exact Mann-Whitney distribution.
const EXACT_MWU_MAX: usize = 8;

/// Group label for rows whose category is missing.
pub const MISSING_LABEL: &str = "nan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RankTest {
    MannWhitneyU,
    KruskalWallis,
}

impl RankTest {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankTest::MannWhitneyU => "Mann-Whitney U",
            RankTest::KruskalWallis => "Kruskal-Wallis H",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupVerdict {
    SameDistribution,
    DifferentDistributions,
}

impl GroupVerdict {
    pub fn from_p(p_value: f64, alpha: f64) -> Self {
        if p_value > alpha {
            GroupVerdict::SameDistribution
        } else {
            GroupVerdict::DifferentDistributions
        }
    }
}

impl fmt::Display for GroupVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GroupVerdict::SameDistribution => "same distribution (H0 not rejected)",
            GroupVerdict::DifferentDistributions => "different distributions (H0 rejected)",
        })
    }
}

/// Result of comparing `target` across the groups of `column`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupComparison {
    pub target: String,
    pub column: String,
    pub groups: usize,
    pub test: RankTest,
    pub statistic: f64,
    pub p_value: f64,
    pub alpha: f64,
    pub verdict: GroupVerdict,
}

/// Split the `target` values by the distinct values of `column`, in order of
/// first appearance. Rows with a null or NaN target are skipped; a null
/// category is its own group, labelled [`MISSING_LABEL`].
pub fn partition(batch: &RecordBatch, target: &str, column: &str) -> Result<Vec<(String, Vec<f64>)>> {
    let lookup = |name: &str| {
        batch.schema().index_of(name).map_err(|_| Error::JoinKey {
            table: "merged",
            column: name.to_string(),
        })
    };
    let values = as_float64(target, batch.column(lookup(target)?))?;
    let labels = as_utf8(column, batch.column(lookup(column)?))?;

    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for (label, value) in labels.iter().zip(values.iter()) {
        let Some(value) = value.filter(|v| !v.is_nan()) else {
            continue;
        };
        let label = label.unwrap_or(MISSING_LABEL);
        let slot = *slots.entry(label).or_insert_with(|| {
            groups.push((label.to_string(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(value);
    }
    Ok(groups)
}

/// Compare the distribution of `target` across the groups of `column`:
/// Mann-Whitney U for two groups, Kruskal-Wallis H for three or more.
#[tracing::instrument(level = "info", skip(batch))]
pub fn compare_groups(
    batch: &RecordBatch,
    target: &str,
    column: &str,
    alpha: f64,
) -> Result<GroupComparison> {
    check_alpha(alpha)?;
    let groups = partition(batch, target, column)?;
    let k = groups.len();

    let samples: Vec<&[f64]> = groups.iter().map(|(_, v)| v.as_slice()).collect();
    let (test, outcome) = match k {
        0 | 1 => {
            return Err(Error::UnsupportedGroupCount {
                column: column.to_string(),
                groups: k,
            })
        }
        2 => (RankTest::MannWhitneyU, mann_whitney_u(samples[0], samples[1])),
        _ => (RankTest::KruskalWallis, kruskal_wallis(&samples)),
    };
    let outcome = outcome.map_err(|source| Error::Sample {
        column: column.to_string(),
        method: test.as_str(),
        source,
    })?;

    let verdict = GroupVerdict::from_p(outcome.p_value, alpha);
    info!(
        column,
        groups = k,
        test = test.as_str(),
        p = outcome.p_value,
        %verdict,
        "group comparison"
    );
    Ok(GroupComparison {
        target: target.to_string(),
        column: column.to_string(),
        groups: k,
        test,
        statistic: outcome.statistic,
        p_value: outcome.p_value,
        alpha,
        verdict,
    })
}

/// [`compare_groups`] for each of `columns`; the first failure aborts.
pub fn compare_all_groups<S: AsRef<str>>(
    batch: &RecordBatch,
    target: &str,
    columns: &[S],
    alpha: f64,
) -> Result<Vec<GroupComparison>> {
    columns
        .iter()
        .map(|c| compare_groups(batch, target, c.as_ref(), alpha))
        .collect()
}

/// Number of arrangements giving each value of U (pairs with x > y) for
/// samples of size `m` and `n` without ties: the coefficients of the
/// Gaussian binomial `[m + n choose m]_q`, built one factor
/// `(1 - q^(n+i)) / (1 - q^i)` at a time over the smaller sample.
fn mwu_counts(m: usize, n: usize) -> Vec<f64> {
    let (m, n) = (m.min(n), m.max(n));
    let mut c = vec![0.0; m * n + 1];
    c[0] = 1.0;
    for i in 1..=m {
        let top = i * n;
        for k in (n + i..=top).rev() {
            c[k] -= c[k - n - i];
        }
        for k in i..=top {
            c[k] += c[k - i];
        }
    }
    c
}

/// Two-sided Mann-Whitney U test. The statistic is U for the first sample.
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> Result<TestOutcome, SampleError> {
    let (n1, n2) = (x.len(), y.len());
    if n1 == 0 || n2 == 0 {
        return Err(SampleError::TooSmall { min: 1, n: n1.min(n2) });
    }
    let all: Vec<f64> = x.iter().chain(y).copied().collect();
    let (ranks, tie_term) = rank_average(&all);
    let r1: f64 = ranks[..n1].iter().sum();
    let (f1, f2) = (n1 as f64, n2 as f64);
    let u1 = r1 - f1 * (f1 + 1.0) / 2.0;
    let u2 = f1 * f2 - u1;
    let u = u1.max(u2);

    let p = if tie_term == 0.0 && (n1 <= EXACT_MWU_MAX || n2 <= EXACT_MWU_MAX) {
        let counts = mwu_counts(n1, n2);
        let total: f64 = counts.iter().sum();
        let at_least = counts[(u.round() as usize).min(counts.len())..].iter().sum::<f64>();
        2.0 * at_least / total
    } else {
        let n = f1 + f2;
        let mu = f1 * f2 / 2.0;
        let var = f1 * f2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
        if var <= 0.0 {
            return Err(SampleError::Constant);
        }
        let z = (u - mu - 0.5) / var.sqrt();
        2.0 * standard_normal().sf(z)
    };
    debug!(u1, n1, n2, "Mann-Whitney U");

    Ok(TestOutcome {
        statistic: u1,
        p_value: p.clamp(0.0, 1.0),
    })
}

/// Kruskal-Wallis H test with tie correction, p from χ²(k − 1).
pub fn kruskal_wallis(samples: &[&[f64]]) -> Result<TestOutcome, SampleError> {
    let k = samples.len();
    if k < 2 {
        return Err(SampleError::TooSmall { min: 2, n: k });
    }
    if let Some(empty) = samples.iter().find(|s| s.is_empty()) {
        return Err(SampleError::TooSmall { min: 1, n: empty.len() });
    }
    let all: Vec<f64> = samples.iter().flat_map(|s| s.iter().copied()).collect();
    let n = all.len() as f64;
    let (ranks, tie_term) = rank_average(&all);

    let correction = 1.0 - tie_term / (n * n * n - n);
    if correction <= 0.0 {
        return Err(SampleError::Constant);
    }

    let mut offset = 0;
    let mut sum = 0.0;
    for s in samples {
        let r: f64 = ranks[offset..offset + s.len()].iter().sum();
        sum += r * r / s.len() as f64;
        offset += s.len();
    }
    let h = (12.0 / (n * (n + 1.0)) * sum - 3.0 * (n + 1.0)) / correction;

    let chi2 = ChiSquared::new((k - 1) as f64).expect("k >= 2 gives positive degrees of freedom");
    Ok(TestOutcome {
        statistic: h,
        p_value: chi2.sf(h).clamp(0.0, 1.0),
    })
}
