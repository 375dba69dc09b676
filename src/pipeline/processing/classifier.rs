use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

use crate::domain::EmployeeErrorCount;

/// Quantity compared against the peer mean
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMetric {
    /// Raw mismatch count per employee
    #[default]
    AbsoluteCount,
    /// Mismatches per comparable first visit
    PerVisitRate,
}

/// Non-negative fraction in lowest terms, used to compare per-visit rates exactly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ratio {
    num: u128,
    den: u128,
}

impl Ratio {
    const ZERO: Ratio = Ratio { num: 0, den: 1 };

    fn reduced(num: u128, den: u128) -> Self {
        let g = gcd(num, den).max(1);
        Ratio {
            num: num / g,
            den: den / g,
        }
    }

    /// Zero when the employee has no comparable first visits
    fn rate_of(row: &EmployeeErrorCount) -> Self {
        if row.first_visit_count == 0 {
            return Ratio::ZERO;
        }
        Ratio::reduced(row.mistake_count as u128, row.first_visit_count as u128)
    }

    fn checked_add(self, other: Ratio) -> Option<Ratio> {
        let g = gcd(self.den, other.den);
        let den = (self.den / g).checked_mul(other.den)?;
        let num = self
            .num
            .checked_mul(other.den / g)?
            .checked_add(other.num.checked_mul(self.den / g)?)?;
        Some(Ratio::reduced(num, den))
    }

    fn checked_div_int(self, n: u128) -> Option<Ratio> {
        Some(Ratio::reduced(self.num, self.den.checked_mul(n)?))
    }

    /// `self > other`, or `None` if the cross products overflow
    fn checked_gt(self, other: Ratio) -> Option<bool> {
        Some(self.num.checked_mul(other.den)? > other.num.checked_mul(self.den)?)
    }

    fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Rates built from u64 counts never overflow a u128 cross product
fn cmp_rates(a: &EmployeeErrorCount, b: &EmployeeErrorCount) -> Ordering {
    let (ra, rb) = (Ratio::rate_of(a), Ratio::rate_of(b));
    (ra.num * rb.den).cmp(&(rb.num * ra.den))
}

impl fmt::Display for OutlierMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierMetric::AbsoluteCount => write!(f, "absolute_count"),
            OutlierMetric::PerVisitRate => write!(f, "per_visit_rate"),
        }
    }
}

impl FromStr for OutlierMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "absolute_count" | "count" => Ok(OutlierMetric::AbsoluteCount),
            "per_visit_rate" | "rate" => Ok(OutlierMetric::PerVisitRate),
            other => Err(format!("unknown outlier metric '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspectSet {
    pub metric: OutlierMetric,
    /// Unweighted mean over employees with at least one mismatch; `None` when there are none
    pub mean: Option<f64>,
    /// Ordered by mistake_count desc, employee_name asc
    pub suspects: Vec<EmployeeErrorCount>,
}

impl SuspectSet {
    pub fn contains(&self, employee_name: &str) -> bool {
        self.suspects.iter().any(|s| s.employee_name == employee_name)
    }

    pub fn len(&self) -> usize {
        self.suspects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suspects.is_empty()
    }
}

/// Flag employees whose metric is strictly above the mean of their peers.
///
/// Employees with zero mismatches have no row and do not pull the mean down.
/// An empty input yields an empty set.
#[instrument(skip(counts), fields(employees = counts.len()))]
pub fn classify_outliers(counts: &[EmployeeErrorCount], metric: OutlierMetric) -> SuspectSet {
    if counts.is_empty() {
        debug!("No employee error counts; suspect set is empty");
        return SuspectSet {
            metric,
            mean: None,
            suspects: Vec::new(),
        };
    }

    let (mean, mut suspects): (f64, Vec<EmployeeErrorCount>) = match metric {
        OutlierMetric::AbsoluteCount => {
            // count > sum / n  <=>  count * n > sum, kept in integers so ties with the mean are exact
            let sum: u64 = counts.iter().map(|c| c.mistake_count).sum();
            let n = counts.len() as u64;
            let suspects = counts
                .iter()
                .filter(|c| c.mistake_count * n > sum)
                .cloned()
                .collect();
            (sum as f64 / n as f64, suspects)
        }
        OutlierMetric::PerVisitRate => classify_by_rate(counts),
    };

    suspects.sort_by(|a, b| {
        let primary = match metric {
            OutlierMetric::AbsoluteCount => b.mistake_count.cmp(&a.mistake_count),
            OutlierMetric::PerVisitRate => {
                cmp_rates(b, a).then_with(|| b.mistake_count.cmp(&a.mistake_count))
            }
        };
        primary.then_with(|| a.employee_name.cmp(&b.employee_name))
    });

    info!(%metric, mean, suspects = suspects.len(), "Classified outlier employees");

    SuspectSet {
        metric,
        mean: Some(mean),
        suspects,
    }
}

/// Rate above the mean rate, compared as exact fractions
fn classify_by_rate(counts: &[EmployeeErrorCount]) -> (f64, Vec<EmployeeErrorCount>) {
    let n = counts.len() as u128;
    let exact_mean = counts
        .iter()
        .try_fold(Ratio::ZERO, |acc, c| acc.checked_add(Ratio::rate_of(c)))
        .and_then(|sum| sum.checked_div_int(n));

    let Some(mean) = exact_mean else {
        debug!("Rate sum overflowed exact arithmetic; comparing as floating point");
        let mean = counts.iter().map(|c| c.error_rate()).sum::<f64>() / n as f64;
        let suspects = counts.iter().filter(|c| c.error_rate() > mean).cloned().collect();
        return (mean, suspects);
    };

    let suspects = counts
        .iter()
        .filter(|c| {
            Ratio::rate_of(c)
                .checked_gt(mean)
                .unwrap_or_else(|| c.error_rate() > mean.as_f64())
        })
        .cloned()
        .collect();
    (mean.as_f64(), suspects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(name: &str, mistakes: u64, visits: u64) -> EmployeeErrorCount {
        EmployeeErrorCount {
            employee_name: name.to_string(),
            mistake_count: mistakes,
            first_visit_count: visits,
        }
    }

    fn names(set: &SuspectSet) -> Vec<&str> {
        set.suspects.iter().map(|s| s.employee_name.as_str()).collect()
    }

    #[test]
    fn test_above_mean_is_suspect() {
        let counts = vec![count("A", 5, 10), count("B", 2, 10), count("C", 2, 10)];
        let set = classify_outliers(&counts, OutlierMetric::AbsoluteCount);
        assert_eq!(set.mean, Some(3.0));
        assert_eq!(names(&set), vec!["A"]);
    }

    #[test]
    fn test_count_equal_to_mean_is_not_suspect() {
        let counts = vec![count("A", 3, 3), count("B", 1, 3), count("C", 2, 3)];
        let set = classify_outliers(&counts, OutlierMetric::AbsoluteCount);
        assert_eq!(set.mean, Some(2.0));
        assert_eq!(names(&set), vec!["A"]);
        assert!(!set.contains("C"));
    }

    #[test]
    fn test_uniform_counts_produce_no_suspects() {
        let counts = vec![count("A", 4, 9), count("B", 4, 9)];
        let set = classify_outliers(&counts, OutlierMetric::AbsoluteCount);
        assert!(set.is_empty());
    }

    #[test]
    fn test_empty_input_is_no_suspects() {
        let set = classify_outliers(&[], OutlierMetric::AbsoluteCount);
        assert!(set.is_empty());
        assert_eq!(set.mean, None);
    }

    #[test]
    fn test_suspects_are_ordered_by_count_then_name() {
        let counts = vec![
            count("Dee", 9, 20),
            count("Abe", 9, 20),
            count("Cy", 10, 20),
            count("Bo", 1, 20),
            count("Eli", 1, 20),
        ];
        let set = classify_outliers(&counts, OutlierMetric::AbsoluteCount);
        assert_eq!(names(&set), vec!["Cy", "Abe", "Dee"]);
    }

    #[test]
    fn test_per_visit_rate_normalizes_by_volume() {
        // A has the most mistakes but also the most visits
        let counts = vec![count("A", 6, 60), count("B", 2, 4), count("C", 1, 10)];
        let by_count = classify_outliers(&counts, OutlierMetric::AbsoluteCount);
        assert_eq!(names(&by_count), vec!["A"]);

        let by_rate = classify_outliers(&counts, OutlierMetric::PerVisitRate);
        assert_eq!(names(&by_rate), vec!["B"]);
    }

    #[test]
    fn test_uniform_rates_produce_no_suspects() {
        // 7/10 has no exact binary form; a float mean lands a hair above or below it
        let counts = vec![count("A", 7, 10), count("B", 7, 10), count("C", 7, 10)];
        let set = classify_outliers(&counts, OutlierMetric::PerVisitRate);
        assert!(set.is_empty());
        assert_eq!(set.mean, Some(0.7));
    }

    #[test]
    fn test_rate_equal_to_mean_is_not_suspect() {
        // rates 1/10, 3/10, 1/2: mean is 3/10
        let counts = vec![count("A", 1, 10), count("B", 3, 10), count("C", 5, 10)];
        let set = classify_outliers(&counts, OutlierMetric::PerVisitRate);
        assert_eq!(names(&set), vec!["C"]);
        assert!(!set.contains("B"));
    }

    #[test]
    fn test_equal_rates_from_different_volumes_tie() {
        // 1/3 and 2/6 are the same rate; D pulls the mean below both
        let counts = vec![count("A", 1, 3), count("B", 2, 6), count("D", 1, 30)];
        let set = classify_outliers(&counts, OutlierMetric::PerVisitRate);
        assert_eq!(names(&set), vec!["B", "A"]);
    }

    #[test]
    fn test_metric_parses_from_cli_spelling() {
        assert_eq!("per-visit-rate".parse::<OutlierMetric>().unwrap(), OutlierMetric::PerVisitRate);
        assert_eq!("count".parse::<OutlierMetric>().unwrap(), OutlierMetric::AbsoluteCount);
        assert!("median".parse::<OutlierMetric>().is_err());
    }
}
