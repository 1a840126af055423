//! Field Projection
//!
//! A projection restricts which field paths the transposed decoder
//! materializes. Paths are chains of proto field numbers from the record
//! root. A field survives projection when it lies on the way to a
//! projected path (ancestor) or below one (descendant); everything else
//! is elided from the reconstructed records, as if the writer had never
//! seen those fields.

use serde::{Deserialize, Serialize};

/// A field path: proto field numbers from the record root downward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath(pub Vec<u32>);

impl FieldPath {
    pub fn new(numbers: impl Into<Vec<u32>>) -> Self {
        Self(numbers.into())
    }
}

impl From<Vec<u32>> for FieldPath {
    fn from(numbers: Vec<u32>) -> Self {
        Self(numbers)
    }
}

/// Which field paths to materialize during transposed decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldProjection {
    /// Keep every field; records decode byte-identically.
    #[default]
    All,
    /// Keep only fields on or under the given paths (and the ancestors
    /// needed to reach them).
    Paths(Vec<FieldPath>),
}

impl FieldProjection {
    pub fn is_all(&self) -> bool {
        matches!(self, FieldProjection::All)
    }

    /// Whether a field at `path` is materialized.
    pub fn includes(&self, path: &[u32]) -> bool {
        match self {
            FieldProjection::All => true,
            FieldProjection::Paths(paths) => paths.iter().any(|projected| {
                let common = projected.0.len().min(path.len());
                projected.0[..common] == path[..common]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_includes_everything() {
        let projection = FieldProjection::All;
        assert!(projection.includes(&[]));
        assert!(projection.includes(&[1, 2, 3]));
    }

    #[test]
    fn test_descendants_of_projected_path_included() {
        let projection = FieldProjection::Paths(vec![FieldPath::new(vec![2])]);
        assert!(projection.includes(&[2]));
        assert!(projection.includes(&[2, 5]));
        assert!(projection.includes(&[2, 5, 9]));
        assert!(!projection.includes(&[3]));
    }

    #[test]
    fn test_ancestors_of_projected_leaf_included() {
        let projection = FieldProjection::Paths(vec![FieldPath::new(vec![1, 4, 7])]);
        assert!(projection.includes(&[1]));
        assert!(projection.includes(&[1, 4]));
        assert!(projection.includes(&[1, 4, 7]));
        assert!(projection.includes(&[1, 4, 7, 2]));
        assert!(!projection.includes(&[1, 5]));
        assert!(!projection.includes(&[4]));
    }

    #[test]
    fn test_multiple_paths() {
        let projection =
            FieldProjection::Paths(vec![FieldPath::new(vec![1]), FieldPath::new(vec![3, 2])]);
        assert!(projection.includes(&[1, 9]));
        assert!(projection.includes(&[3]));
        assert!(projection.includes(&[3, 2]));
        assert!(!projection.includes(&[3, 4]));
        assert!(!projection.includes(&[2]));
    }

    #[test]
    fn test_empty_path_set_excludes_all_fields() {
        let projection = FieldProjection::Paths(vec![]);
        assert!(!projection.includes(&[1]));
    }

    #[test]
    fn test_serde_roundtrip() {
        let projection =
            FieldProjection::Paths(vec![FieldPath::new(vec![1, 2]), FieldPath::new(vec![7])]);
        let json = serde_json::to_string(&projection).unwrap();
        let restored: FieldProjection = serde_json::from_str(&json).unwrap();
        assert_eq!(projection, restored);
    }
}
