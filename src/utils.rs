use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use log::debug;

use crate::error::{Error, Result};

/// Which lists take part in [`multi_intersection`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cutoff {
    /// Lists longer than this fraction of the longest list.
    Fraction(f64),
    /// Lists longer than this many elements.
    MinLength(usize),
}

/// Sorted values shared by every list that passes `cutoff`.
pub fn multi_intersection<T: Ord + Clone>(lists: &[Vec<T>], cutoff: Option<Cutoff>) -> Result<Vec<T>> {
    let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
    let selected: Vec<&Vec<T>> = lists
        .iter()
        .filter(|list| match cutoff {
            Some(Cutoff::Fraction(f)) => list.len() as f64 > longest as f64 * f,
            Some(Cutoff::MinLength(n)) => list.len() > n,
            None => true,
        })
        .collect();
    debug!("Intersecting {} of {} lists", selected.len(), lists.len());

    let (first, rest) = selected.split_first().ok_or(Error::EmptyIntersection)?;
    let mut shared: BTreeSet<T> = first.iter().cloned().collect();
    for list in rest {
        let other: BTreeSet<&T> = list.iter().collect();
        shared.retain(|v| other.contains(v));
    }
    Ok(shared.into_iter().collect())
}

/// Map entries ordered by descending value.
pub fn sort_by_value_desc<K: Clone + Eq + Hash>(map: &HashMap<K, f64>) -> Vec<(K, f64)> {
    let mut entries: Vec<(K, f64)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries
}

/// Scale values into [-1, 1] by the largest magnitude, optionally after
/// subtracting the mean.
pub fn normit(values: &[f64], center: bool) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let mean = if center {
        values.iter().sum::<f64>() / values.len() as f64
    } else {
        0.0
    };
    let shifted: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let max = shifted.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if max == 0.0 {
        return shifted;
    }
    shifted.iter().map(|v| v / max).collect()
}
