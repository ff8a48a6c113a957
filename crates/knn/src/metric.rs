//! Supported distance metrics.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::KnnError;

/// Distance metric used to rank candidates against a query.
///
/// | Metric | Formula |
/// |--------|---------|
/// | Euclidean | `sqrt(Σ (qᵢ − pᵢ)²)` |
/// | Manhattan | `Σ |qᵢ − pᵢ|` |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Straight-line (L2) distance.
    #[default]
    Euclidean,
    /// City-block (L1) distance.
    Manhattan,
}

impl DistanceMetric {
    /// All metrics, in lane-code order.
    pub const ALL: [DistanceMetric; 2] = [DistanceMetric::Euclidean, DistanceMetric::Manhattan];

    /// Numeric code passed to device kernels.
    pub fn code(self) -> u32 {
        match self {
            DistanceMetric::Euclidean => 0,
            DistanceMetric::Manhattan => 1,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = KnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "manhattan" => Ok(DistanceMetric::Manhattan),
            _ => Err(KnnError::InvalidMetric { tag: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_euclidean() {
        assert_eq!(DistanceMetric::default(), DistanceMetric::Euclidean);
    }

    #[test]
    fn test_codes_are_stable() {
        // Device kernels hard-code these values.
        assert_eq!(DistanceMetric::Euclidean.code(), 0);
        assert_eq!(DistanceMetric::Manhattan.code(), 1);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(
            "Manhattan".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Manhattan
        );
        assert_eq!(
            " EUCLIDEAN ".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Euclidean
        );
    }

    #[test]
    fn test_parse_unknown() {
        let err = "cosine".parse::<DistanceMetric>().unwrap_err();
        assert!(matches!(err, KnnError::InvalidMetric { ref tag } if tag == "cosine"));
    }

    #[test]
    fn test_display_matches_parse() {
        for metric in DistanceMetric::ALL {
            assert_eq!(metric.to_string().parse::<DistanceMetric>().unwrap(), metric);
        }
    }
}
