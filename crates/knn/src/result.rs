//! Output type for nearest-neighbor queries.

/// The k nearest neighbors of one query.
///
/// Distances are sorted ascending; `indices[i]` is the original row of the
/// fitted matrix whose distance is `distances[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    distances: Vec<f64>,
    indices: Vec<usize>,
    labels: Option<Vec<String>>,
}

impl Neighbors {
    /// Creates a new `Neighbors`.
    pub(crate) fn new(distances: Vec<f64>, indices: Vec<usize>, labels: Option<Vec<String>>) -> Self {
        debug_assert_eq!(distances.len(), indices.len());
        Self {
            distances,
            indices,
            labels,
        }
    }

    /// Distances of the neighbors, ascending.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Original row indices of the neighbors.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Labels of the neighbors, if the engine was fitted with labels.
    pub fn labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    /// Number of neighbors returned.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if no neighbors were returned.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The closest neighbor as `(index, distance)`.
    pub fn nearest(&self) -> Option<(usize, f64)> {
        self.iter().next()
    }

    /// Iterates `(index, distance)` pairs in ascending distance order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.distances.iter().copied())
    }

    /// Consumes the result, returning `(distances, indices)`.
    pub fn into_parts(self) -> (Vec<f64>, Vec<usize>) {
        (self.distances, self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let result = Neighbors::new(vec![0.0, 1.5], vec![4, 2], None);
        assert_eq!(result.distances(), &[0.0, 1.5]);
        assert_eq!(result.indices(), &[4, 2]);
        assert_eq!(result.len(), 2);
        assert!(!result.is_empty());
        assert!(result.labels().is_none());
        assert_eq!(result.nearest(), Some((4, 0.0)));
    }

    #[test]
    fn test_iter_pairs() {
        let result = Neighbors::new(vec![0.5, 0.7, 0.9], vec![10, 20, 30], None);
        let pairs: Vec<(usize, f64)> = result.iter().collect();
        assert_eq!(pairs, vec![(10, 0.5), (20, 0.7), (30, 0.9)]);
    }

    #[test]
    fn test_labels() {
        let result = Neighbors::new(
            vec![0.0],
            vec![1],
            Some(vec!["So What".to_string()]),
        );
        assert_eq!(result.labels(), Some(&["So What".to_string()][..]));
    }

    #[test]
    fn test_into_parts() {
        let (d, i) = Neighbors::new(vec![1.0], vec![3], None).into_parts();
        assert_eq!(d, vec![1.0]);
        assert_eq!(i, vec![3]);
    }
}
