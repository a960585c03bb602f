//! Equi-width histograms for selectivity estimation over one integer column.

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::{DbError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PredicateOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Display for PredicateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            PredicateOp::Eq => "=",
            PredicateOp::Ne => "!=",
            PredicateOp::Lt => "<",
            PredicateOp::Le => "<=",
            PredicateOp::Gt => ">",
            PredicateOp::Ge => ">=",
        };
        write!(f, "{symbol}")
    }
}

impl FromStr for PredicateOp {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "=" | "==" | "EQ" => Ok(PredicateOp::Eq),
            "!=" | "<>" | "NE" => Ok(PredicateOp::Ne),
            "<" | "LT" => Ok(PredicateOp::Lt),
            "<=" | "LE" => Ok(PredicateOp::Le),
            ">" | "GT" => Ok(PredicateOp::Gt),
            ">=" | "GE" => Ok(PredicateOp::Ge),
            _ => Err(DbError::UnsupportedOperator(s.to_string())),
        }
    }
}

/// A fixed number of equal-width buckets over the inclusive range `[min, max]`.
///
/// Values outside the range are not counted. Estimates assume values are spread
/// uniformly inside each bucket and truncate every fractional bucket share.
#[derive(Clone, Debug)]
pub struct ColumnStats {
    histogram: Vec<usize>,
    min: i32,
    max: i32,
    bucket_width: f64,
    total_count: usize,
}

impl ColumnStats {
    pub fn new(buckets: usize, min: i32, max: i32) -> Result<Self> {
        if min >= max {
            return Err(DbError::InvalidArgument(format!(
                "histogram range [{min}, {max}] is empty; min must be less than max"
            )));
        }
        if buckets == 0 {
            return Err(DbError::InvalidArgument(
                "histogram needs at least one bucket".to_string(),
            ));
        }
        let span = (max as i64 + 1) - min as i64;
        Ok(Self {
            histogram: vec![0; buckets],
            min,
            max,
            bucket_width: span as f64 / buckets as f64,
            total_count: 0,
        })
    }

    /// Build a histogram and feed it every value of `values`.
    pub fn from_values<I>(buckets: usize, min: i32, max: i32, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = i32>,
    {
        let mut stats = Self::new(buckets, min, max)?;
        values.into_iter().for_each(|v| stats.add_value(v));
        Ok(stats)
    }

    pub fn add_value(&mut self, v: i32) {
        if v < self.min || v > self.max {
            return;
        }
        let bucket = self.bucket_of(v);
        self.histogram[bucket] += 1;
        self.total_count += 1;
    }

    /// Approximate number of added values `x` with `x op v`.
    ///
    /// For `v` outside `[min, max]` this is 0 when no value can qualify on that
    /// side (`<`/`<=` below the range, `>`/`>=` above it) and the total count
    /// for every other operator, including `=` and `!=`.
    pub fn estimate_cardinality(&self, op: PredicateOp, v: i32) -> usize {
        if self.total_count == 0 {
            return 0;
        }
        if v < self.min {
            return match op {
                PredicateOp::Lt | PredicateOp::Le => 0,
                _ => self.total_count,
            };
        }
        if v > self.max {
            return match op {
                PredicateOp::Gt | PredicateOp::Ge => 0,
                _ => self.total_count,
            };
        }

        let bucket = self.bucket_of(v);
        let count = self.histogram[bucket];
        let width = self.bucket_width;
        let narrow = width < 1.0;
        let bucket_start = self.min as f64 + bucket as f64 * width;
        let bucket_end = bucket_start + width;
        let v = v as f64;
        let before: usize = self.histogram[..bucket].iter().sum();
        let after: usize = self.histogram[bucket + 1..].iter().sum();

        match op {
            PredicateOp::Eq => self.equal_share(count),
            PredicateOp::Ne => self.total_count - self.equal_share(count),
            PredicateOp::Lt => before + share(count, (v - bucket_start) / width),
            PredicateOp::Le if narrow => before + count,
            PredicateOp::Le => before + share(count, (v - bucket_start + 1.0) / width),
            PredicateOp::Gt if narrow => after,
            PredicateOp::Gt => share(count, (bucket_end - v - 1.0) / width) + after,
            PredicateOp::Ge if narrow => count + after,
            PredicateOp::Ge => share(count, (bucket_end - v) / width) + after,
        }
    }

    pub fn buckets(&self) -> usize {
        self.histogram.len()
    }

    pub fn bucket_count(&self, bucket: usize) -> Result<usize> {
        self.histogram.get(bucket).copied().ok_or_else(|| {
            DbError::OutOfRange(format!(
                "bucket {} of {}",
                bucket,
                self.histogram.len()
            ))
        })
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn bucket_width(&self) -> f64 {
        self.bucket_width
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    // `v` must lie in [min, max]. Rounding can land `max` one past the end.
    fn bucket_of(&self, v: i32) -> usize {
        let bucket = ((v as i64 - self.min as i64) as f64 / self.bucket_width) as usize;
        bucket.min(self.histogram.len() - 1)
    }

    // A bucket narrower than one value holds only exact matches.
    fn equal_share(&self, count: usize) -> usize {
        if self.bucket_width < 1.0 {
            count
        } else {
            share(count, 1.0 / self.bucket_width)
        }
    }
}

// Truncated (and non-negative) fraction of a bucket count.
fn share(count: usize, fraction: f64) -> usize {
    (count as f64 * fraction) as usize
}

#[cfg(test)]
mod column_stats_tests {
    use super::*;
    use test_case::test_case;

    fn sample() -> ColumnStats {
        ColumnStats::from_values(10, 0, 99, [5, 5, 15, 95]).unwrap()
    }

    #[test]
    fn construction_validates_range() {
        assert!(matches!(
            ColumnStats::new(10, 5, 5),
            Err(DbError::InvalidArgument(_))
        ));
        assert!(matches!(
            ColumnStats::new(10, 6, 5),
            Err(DbError::InvalidArgument(_))
        ));
        assert!(matches!(
            ColumnStats::new(0, 0, 5),
            Err(DbError::InvalidArgument(_))
        ));
        let stats = ColumnStats::new(4, i32::MIN, i32::MAX).unwrap();
        assert_eq!(stats.bucket_width(), (1u64 << 32) as f64 / 4.0);
    }

    #[test]
    fn out_of_range_values_are_ignored() {
        let mut stats = ColumnStats::new(10, 0, 99).unwrap();
        for v in [-1, 0, 50, 99, 100, i32::MAX] {
            stats.add_value(v);
        }
        assert_eq!(stats.total_count(), 3);
        assert_eq!(stats.bucket_count(0).unwrap(), 1);
        assert_eq!(stats.bucket_count(5).unwrap(), 1);
        assert_eq!(stats.bucket_count(9).unwrap(), 1);
        assert!(stats.bucket_count(10).is_err());
    }

    #[test]
    fn buckets_sum_to_total() {
        let stats = ColumnStats::from_values(7, -50, 50, (-80..80).step_by(3)).unwrap();
        let sum: usize = (0..stats.buckets())
            .map(|b| stats.bucket_count(b).unwrap())
            .sum();
        assert_eq!(sum, stats.total_count());
        assert_eq!(stats.total_count(), (-50..=50).filter(|v| (v + 80) % 3 == 0).count());
    }

    #[test]
    fn max_lands_in_last_bucket() {
        let stats = ColumnStats::from_values(3, 0, 9, [9]).unwrap();
        assert_eq!(stats.bucket_count(2).unwrap(), 1);
    }

    #[test]
    fn empty_histogram_estimates_zero() {
        let stats = ColumnStats::new(10, 0, 99).unwrap();
        for op in [PredicateOp::Eq, PredicateOp::Ne, PredicateOp::Ge] {
            assert_eq!(stats.estimate_cardinality(op, 50), 0);
        }
    }

    #[test_case(PredicateOp::Lt, -1 => 0; "lt below range")]
    #[test_case(PredicateOp::Le, -1 => 0; "le below range")]
    #[test_case(PredicateOp::Eq, -1 => 4; "eq below range counts everything")]
    #[test_case(PredicateOp::Ne, -1 => 4; "ne below range")]
    #[test_case(PredicateOp::Gt, -1 => 4; "gt below range")]
    #[test_case(PredicateOp::Ge, -1 => 4; "ge below range")]
    #[test_case(PredicateOp::Gt, 100 => 0; "gt above range")]
    #[test_case(PredicateOp::Ge, 100 => 0; "ge above range")]
    #[test_case(PredicateOp::Eq, 100 => 4; "eq above range counts everything")]
    #[test_case(PredicateOp::Lt, 100 => 4; "lt above range")]
    fn out_of_range_policy(op: PredicateOp, v: i32) -> usize {
        sample().estimate_cardinality(op, v)
    }

    #[test_case(PredicateOp::Eq, 5 => 0; "eq spreads a bucket over ten values")]
    #[test_case(PredicateOp::Ne, 5 => 4; "ne is total minus eq")]
    #[test_case(PredicateOp::Lt, 15 => 2; "lt prefix plus half of one")]
    #[test_case(PredicateOp::Le, 15 => 2; "le prefix plus six tenths of one")]
    #[test_case(PredicateOp::Lt, 20 => 3; "lt at bucket start")]
    #[test_case(PredicateOp::Gt, 99 => 0; "gt at max")]
    #[test_case(PredicateOp::Ge, 95 => 0; "ge in last bucket")]
    #[test_case(PredicateOp::Ge, 90 => 1; "ge at last bucket start")]
    #[test_case(PredicateOp::Gt, 0 => 3; "gt at min")]
    #[test_case(PredicateOp::Ge, 0 => 4; "ge at min")]
    fn wide_buckets(op: PredicateOp, v: i32) -> usize {
        sample().estimate_cardinality(op, v)
    }

    #[test]
    fn lt_on_sample_is_between_prefix_and_total() {
        let estimate = sample().estimate_cardinality(PredicateOp::Lt, 15);
        assert!((2..4).contains(&estimate));
    }

    #[test]
    fn dense_bucket_shares() {
        //  one bucket of width 8 holding 16 values
        let stats = ColumnStats::from_values(1, 0, 7, (0..8).chain(0..8)).unwrap();
        assert_eq!(stats.estimate_cardinality(PredicateOp::Eq, 3), 2);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Ne, 3), 14);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Lt, 3), 6);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Le, 3), 8);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Gt, 3), 8);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Ge, 3), 10);
    }

    #[test]
    fn narrow_buckets_are_exact() {
        //  width 0.5: each value owns one of two buckets
        let stats = ColumnStats::from_values(20, 0, 9, [2, 2, 2, 4, 7]).unwrap();
        assert!(stats.bucket_width() < 1.0);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Eq, 2), 3);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Ne, 2), 2);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Le, 4), 4);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Gt, 4), 1);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Ge, 4), 2);
        assert_eq!(stats.estimate_cardinality(PredicateOp::Lt, 4), 3);
    }

    #[test]
    fn operators_parse_from_symbols_and_names() {
        assert_eq!("<=".parse::<PredicateOp>().unwrap(), PredicateOp::Le);
        assert_eq!("ne".parse::<PredicateOp>().unwrap(), PredicateOp::Ne);
        assert_eq!("<>".parse::<PredicateOp>().unwrap(), PredicateOp::Ne);
        assert!(matches!(
            "LIKE".parse::<PredicateOp>(),
            Err(DbError::UnsupportedOperator(_))
        ));
        assert_eq!(PredicateOp::Ge.to_string(), ">=");
    }
}
