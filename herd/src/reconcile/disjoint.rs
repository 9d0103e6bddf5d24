//! Pairwise disjointness of changed-path sets

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Two sets that share at least one path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Overlap {
    pub first: String,
    pub second: String,
    pub paths: Vec<String>,
}

impl fmt::Display for Overlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} and {} both change {}", self.first, self.second, self.paths.join(", "))
    }
}

/// Every overlapping pair among the named sets
///
/// Pairs are reported with names in ascending order and sorted, so the result
/// does not depend on input order. Empty means pairwise disjoint.
pub fn overlaps<'a, I>(sets: I) -> Vec<Overlap>
where
    I: IntoIterator<Item = (&'a str, &'a BTreeSet<String>)>,
{
    let mut named: Vec<(&str, &BTreeSet<String>)> = sets.into_iter().collect();
    named.sort_by(|a, b| a.0.cmp(b.0));

    let mut found = Vec::new();
    for (i, (first, a)) in named.iter().enumerate() {
        for (second, b) in &named[i + 1..] {
            let shared: Vec<String> = a.intersection(b).cloned().collect();
            if !shared.is_empty() {
                found.push(Overlap {
                    first: first.to_string(),
                    second: second.to_string(),
                    paths: shared,
                });
            }
        }
    }
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_disjoint_sets() {
        let a = set(&["src/x.txt"]);
        let b = set(&["src/y.txt"]);
        let c = set(&[]);
        assert!(overlaps([("a", &a), ("b", &b), ("c", &c)]).is_empty());
    }

    #[test]
    fn test_overlap_reports_pair_and_paths() {
        let a = set(&["src/x.txt", "README.md"]);
        let b = set(&["src/y.txt", "src/x.txt"]);
        let c = set(&["docs/z.md"]);

        let found = overlaps([("b", &b), ("c", &c), ("a", &a)]);
        assert_eq!(
            found,
            vec![Overlap {
                first: "a".to_string(),
                second: "b".to_string(),
                paths: vec!["src/x.txt".to_string()],
            }]
        );
        assert_eq!(found[0].to_string(), "a and b both change src/x.txt");
    }

    #[test]
    fn test_every_pair_is_checked() {
        let a = set(&["1", "2"]);
        let b = set(&["2", "3"]);
        let c = set(&["3", "1"]);
        let found = overlaps([("a", &a), ("b", &b), ("c", &c)]);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_single_set_is_disjoint() {
        let a = set(&["x"]);
        assert!(overlaps([("a", &a)]).is_empty());
        assert!(overlaps(std::iter::empty::<(&str, &BTreeSet<String>)>()).is_empty());
    }
}
