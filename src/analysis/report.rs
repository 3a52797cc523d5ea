// src/analysis/report.rs
use std::fmt;

use serde::Serialize;

use super::{GroupComparison, NormalityRow};

/// Everything the analysis stages produce for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub alpha: f64,
    pub normality: Vec<NormalityRow>,
    pub comparisons: Vec<GroupComparison>,
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Normality (alpha = {})", self.alpha)?;
        writeln!(
            f,
            "{:<24} {:>10} {:>12} {:<13} {:>10} {:>12} {:<13}",
            "variable", "W", "p", "shapiro", "K2", "p", "dagostino"
        )?;
        for row in &self.normality {
            let (sw, dp) = (&row.shapiro_wilk, &row.dagostino_pearson);
            writeln!(
                f,
                "{:<24} {:>10.4} {:>12.4e} {:<13} {:>10.4} {:>12.4e} {:<13}",
                row.variable,
                sw.statistic,
                sw.p_value,
                sw.verdict,
                dp.statistic,
                dp.p_value,
                dp.verdict
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Group comparisons")?;
        for c in &self.comparisons {
            writeln!(
                f,
                "{} by {} ({} groups, {}): stat = {:.4}, p = {:.4e} -> {}",
                c.target,
                c.column,
                c.groups,
                c.test.as_str(),
                c.statistic,
                c.p_value,
                c.verdict
            )?;
        }
        Ok(())
    }
}
