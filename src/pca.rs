//! Principal component analysis over contact frequencies.
//!
//! Rows of the input matrix are conditions, columns are contacts. Each
//! retained component gets one loading per contact; the loading tables are
//! indexed by contact label and by component (`PC1`, `PC2`, ...), ordered by
//! descending explained variance.

use std::ops::{Range, RangeInclusive};
use std::path::Path;

use log::info;
use nalgebra::DMatrix;

use crate::contact_frequencies::Edge;
use crate::contact_id::{split_id, ContactId, LabelIndex, ParseMode};
use crate::error::{Error, Result};
use crate::table::FrequencyTable;

/// How many components to keep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Retain {
    /// Smallest number of components whose cumulative explained variance
    /// ratio exceeds this fraction (0 < f < 1).
    Variance(f64),
    /// Fixed number of components, capped at the rank limit.
    Count(usize),
}

impl Default for Retain {
    fn default() -> Self {
        Retain::Variance(0.999)
    }
}

/// Output of a [`Decomposition`].
#[derive(Debug, Clone)]
pub struct Components {
    /// One row per component, one column per feature.
    pub components: DMatrix<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

/// Dimensionality reduction primitive.
pub trait Decomposition {
    fn decompose(&self, data: &DMatrix<f64>, retain: Retain) -> Result<Components>;
}

/// Full SVD of the column-centred data.
///
/// Each component's sign is chosen so its largest-magnitude entry is positive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvdDecomposition;

impl Decomposition for SvdDecomposition {
    fn decompose(&self, data: &DMatrix<f64>, retain: Retain) -> Result<Components> {
        let (n_samples, n_features) = data.shape();
        if n_samples < 2 || n_features == 0 {
            return Err(Error::Decomposition(format!(
                "need at least 2 conditions and 1 contact, got {n_samples}x{n_features}"
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(Error::Decomposition(
                "frequencies contain NaN or infinite values".to_string(),
            ));
        }

        let mut centered = data.clone();
        for mut column in centered.column_iter_mut() {
            let mean = column.mean();
            column.add_scalar_mut(-mean);
        }

        let svd = centered.svd(false, true);
        let v_t = svd
            .v_t
            .ok_or_else(|| Error::Decomposition("SVD returned no right singular vectors".to_string()))?;
        let singular = svd.singular_values;

        let mut order: Vec<usize> = (0..singular.len()).collect();
        order.sort_by(|&a, &b| singular[b].total_cmp(&singular[a]));

        let variance: Vec<f64> = order
            .iter()
            .map(|&i| singular[i].powi(2) / (n_samples - 1) as f64)
            .collect();
        let total: f64 = variance.iter().sum();
        if !(total > 0.0) {
            return Err(Error::Decomposition("frequencies have no variance".to_string()));
        }
        let ratio: Vec<f64> = variance.iter().map(|v| v / total).collect();

        let n_keep = n_components(&ratio, retain)?;
        let mut components = DMatrix::zeros(n_keep, n_features);
        for (k, &i) in order.iter().take(n_keep).enumerate() {
            let row = v_t.row(i);
            let pivot = row.iter().copied().fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            for (j, v) in row.iter().enumerate() {
                components[(k, j)] = sign * v;
            }
        }

        Ok(Components {
            components,
            explained_variance_ratio: ratio[..n_keep].to_vec(),
        })
    }
}

fn n_components(ratio: &[f64], retain: Retain) -> Result<usize> {
    match retain {
        Retain::Count(0) => Err(Error::Decomposition("cannot keep zero components".to_string())),
        Retain::Count(n) => Ok(n.min(ratio.len())),
        Retain::Variance(f) if f > 0.0 && f < 1.0 => {
            let mut cumulative = 0.0;
            let below = ratio
                .iter()
                .take_while(|r| {
                    cumulative += *r;
                    cumulative <= f
                })
                .count();
            Ok((below + 1).min(ratio.len()))
        }
        Retain::Variance(f) => Err(Error::Decomposition(format!(
            "variance fraction must be between 0 and 1, got {f}"
        ))),
    }
}

/// Linear-interpolation percentile (0-100) of `values`.
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Loadings indexed by contact (rows) and component (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingTable {
    contacts: LabelIndex,
    values: DMatrix<f64>,
}

impl LoadingTable {
    pub fn contacts(&self) -> &LabelIndex {
        &self.contacts
    }

    pub fn n_components(&self) -> usize {
        self.values.ncols()
    }

    pub fn component_labels(&self) -> Vec<String> {
        (1..=self.n_components()).map(|pc| format!("PC{pc}")).collect()
    }

    fn check_pc(&self, pc: usize) -> Result<usize> {
        if pc == 0 || pc > self.n_components() {
            return Err(Error::ComponentOutOfRange {
                requested: pc,
                available: self.n_components(),
            });
        }
        Ok(pc - 1)
    }

    /// Loadings of component `pc` (1-based), in row order.
    pub fn component(&self, pc: usize) -> Result<&[f64]> {
        let col = self.check_pc(pc)?;
        let n = self.contacts.len();
        Ok(&self.values.as_slice()[col * n..(col + 1) * n])
    }

    pub fn get(&self, contact: &str, pc: usize) -> Option<f64> {
        let row = self.contacts.position(contact)?;
        let col = self.check_pc(pc).ok()?;
        Some(self.values[(row, col)])
    }

    /// Row positions ordered by descending absolute loading on `pc`.
    fn order_by(&self, pc: usize) -> Result<Vec<usize>> {
        let column = self.component(pc)?;
        let mut order: Vec<usize> = (0..column.len()).collect();
        order.sort_by(|&a, &b| column[b].abs().total_cmp(&column[a].abs()));
        Ok(order)
    }

    /// Rows reordered by descending absolute loading on `pc`.
    pub fn sorted_by(&self, pc: usize) -> Result<LoadingTable> {
        let order = self.order_by(pc)?;
        let contacts = order
            .iter()
            .filter_map(|&row| self.contacts.get(row))
            .map(str::to_string)
            .collect();
        Ok(LoadingTable {
            contacts,
            values: self.values.select_rows(order.iter()),
        })
    }

    /// 1-based position of `contact` when sorted by `pc`.
    pub fn rank(&self, contact: &str, pc: usize) -> Result<Option<usize>> {
        let Some(row) = self.contacts.position(contact) else {
            return Ok(None);
        };
        Ok(self.order_by(pc)?.iter().position(|&r| r == row).map(|p| p + 1))
    }

    /// Each column's absolute values divided by its largest absolute value.
    pub fn normalized(&self) -> LoadingTable {
        let mut values = self.values.abs();
        for mut column in values.column_iter_mut() {
            let max = column.max();
            if max > 0.0 {
                column /= max;
            }
        }
        LoadingTable {
            contacts: self.contacts.clone(),
            values,
        }
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        let mut header = vec![String::new()];
        header.extend(self.component_labels());
        writer.write_record(&header)?;
        for (row, contact) in self.contacts.iter().enumerate() {
            let mut record = vec![contact.to_string()];
            record.extend(self.values.row(row).iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Highest normalized loading involving a residue, see
/// [`ContactPca::get_top_contact`].
#[derive(Debug, Clone, PartialEq)]
pub struct TopContact {
    pub contact: String,
    pub score: f64,
    pub component: usize,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScore {
    pub rank: usize,
    pub score: f64,
}

/// PCA of a frequency table with loading queries and edge export.
#[derive(Debug, Clone)]
pub struct ContactPca {
    loadings: LoadingTable,
    norm_loadings: LoadingTable,
    explained_variance_ratio: Vec<f64>,
}

impl ContactPca {
    pub fn new(freqs: &FrequencyTable, retain: Retain) -> Result<Self> {
        Self::with_decomposition(freqs, retain, &SvdDecomposition)
    }

    pub fn with_decomposition(freqs: &FrequencyTable, retain: Retain, method: &dyn Decomposition) -> Result<Self> {
        let fitted = method.decompose(freqs.matrix(), retain)?;
        if fitted.components.ncols() != freqs.n_contacts() {
            return Err(Error::Shape(format!(
                "{} loadings per component for {} contacts",
                fitted.components.ncols(),
                freqs.n_contacts()
            )));
        }

        let loadings = LoadingTable {
            contacts: freqs.contacts().clone(),
            values: fitted.components.transpose(),
        };
        let norm_loadings = loadings.normalized();
        info!(
            "Kept {} components explaining {:.4} of the variance",
            loadings.n_components(),
            fitted.explained_variance_ratio.iter().sum::<f64>()
        );

        Ok(Self {
            loadings,
            norm_loadings,
            explained_variance_ratio: fitted.explained_variance_ratio,
        })
    }

    pub fn n_components(&self) -> usize {
        self.loadings.n_components()
    }

    pub fn component_labels(&self) -> Vec<String> {
        self.loadings.component_labels()
    }

    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    pub fn loadings(&self) -> &LoadingTable {
        &self.loadings
    }

    pub fn norm_loadings(&self) -> &LoadingTable {
        &self.norm_loadings
    }

    pub fn sorted_loadings(&self, pc: usize) -> Result<LoadingTable> {
        self.loadings.sorted_by(pc)
    }

    pub fn sorted_norm_loadings(&self, pc: usize) -> Result<LoadingTable> {
        self.norm_loadings.sorted_by(pc)
    }

    /// Edges for contacts whose signed loading on `pc` is above the
    /// `percentile` of that component's loadings, strongest first.
    pub fn edges(&self, pc: usize, percentile_cutoff: f64, weights: bool) -> Result<Vec<Edge>> {
        let sorted = self.sorted_loadings(pc)?;
        let column = sorted.component(pc)?;
        let threshold = percentile(column, percentile_cutoff);

        let mut edges = Vec::new();
        for (contact, &loading) in sorted.contacts.iter().zip(column) {
            if loading > threshold {
                edges.push(make_edge(contact, weights.then_some(loading))?);
            }
        }
        Ok(edges)
    }

    /// One edge per contact, weighted by its raw loading on `pc`.
    pub fn all_edges(&self, pc: usize, weights: bool) -> Result<Vec<Edge>> {
        let column = self.loadings.component(pc)?;
        self.loadings
            .contacts
            .iter()
            .zip(column)
            .map(|(contact, &loading)| make_edge(contact, weights.then_some(loading)))
            .collect()
    }

    /// Across components `pcs` (end exclusive), the contact involving
    /// residue `resnum` with the highest normalized loading.
    ///
    /// Returns `None` when no contact involves the residue.
    pub fn get_top_contact(&self, resnum: i32, pcs: Range<usize>) -> Result<Option<TopContact>> {
        for pc in pcs.clone() {
            self.norm_loadings.check_pc(pc)?;
        }

        let mut involved = Vec::new();
        for (row, label) in self.norm_loadings.contacts.iter().enumerate() {
            if ContactId::parse(label, ParseMode::Plain)?.involves(resnum) {
                involved.push(row);
            }
        }

        let mut best: Option<(usize, usize, f64)> = None;
        for pc in pcs {
            let column = self.norm_loadings.component(pc)?;
            for &row in &involved {
                let score = column[row];
                if best.map_or(true, |(_, _, s)| score > s) {
                    best = Some((row, pc, score));
                }
            }
        }

        let Some((row, pc, score)) = best else {
            return Ok(None);
        };
        let contact = self.norm_loadings.contacts.get(row).unwrap_or_default().to_string();
        let rank = self.norm_loadings.rank(&contact, pc)?.unwrap_or_default();
        Ok(Some(TopContact {
            contact,
            score,
            component: pc,
            rank,
        }))
    }

    /// Normalized score and rank of `contact` on each component in `pcs`,
    /// highest score first. Empty if the contact is unknown.
    pub fn get_scores(&self, contact: &str, pcs: RangeInclusive<usize>) -> Result<Vec<(usize, ComponentScore)>> {
        let Some(row) = self.norm_loadings.contacts.position(contact) else {
            return Ok(Vec::new());
        };

        let mut scores = Vec::new();
        for pc in pcs {
            let score = self.norm_loadings.component(pc)?[row];
            let rank = self.norm_loadings.rank(contact, pc)?.unwrap_or_default();
            scores.push((pc, ComponentScore { rank, score }));
        }
        // Equal scores list the later component first.
        scores.sort_by(|(_, a), (_, b)| a.score.total_cmp(&b.score));
        scores.reverse();
        Ok(scores)
    }

    /// Whether `contact`'s normalized loading on `pc` is above the
    /// `percentile` of that component.
    pub fn in_percentile(&self, contact: &str, percentile_cutoff: f64, pc: usize) -> Result<bool> {
        let column = self.norm_loadings.component(pc)?;
        let Some(row) = self.norm_loadings.contacts.position(contact) else {
            return Ok(false);
        };
        Ok(column[row] > percentile(column, percentile_cutoff))
    }
}

fn make_edge(contact: &str, weight: Option<f64>) -> Result<Edge> {
    let (res_a, res_b) = split_id(contact)?;
    Ok(Edge {
        res_a: res_a.to_string(),
        res_b: res_b.to_string(),
        weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const C1: &str = "A:ALA:10-A:GLY:20";
    const C2: &str = "A:ALA:10-B:SER:30";
    const C3: &str = "A:LEU:40-A:SER:30";

    /// Two orthogonal patterns across four conditions: C1 follows the first,
    /// C2 and C3 follow the second in a 2:1 ratio.
    fn two_pattern_table() -> FrequencyTable {
        let u1 = [1.0, -1.0, 1.0, -1.0];
        let u2 = [1.0, 1.0, -1.0, -1.0];
        let values = DMatrix::from_fn(4, 3, |row, col| match col {
            0 => 0.5 + 0.3 * u1[row],
            1 => 0.5 + 0.2 * u2[row],
            _ => 0.5 + 0.1 * u2[row],
        });
        FrequencyTable::new(
            vec![300.0, 310.0, 320.0, 330.0],
            vec![C1.to_string(), C2.to_string(), C3.to_string()],
            values,
        )
        .unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_percentile_interpolation() {
        assert_eq!(percentile(&[3.0, 1.0, 2.0], 50.0), 2.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 100.0), 4.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 0.0), 1.0);
    }

    #[test]
    fn test_n_components() {
        let ratio = [0.6, 0.3, 0.1];
        assert_eq!(n_components(&ratio, Retain::Variance(0.5)).unwrap(), 1);
        assert_eq!(n_components(&ratio, Retain::Variance(0.85)).unwrap(), 2);
        assert_eq!(n_components(&ratio, Retain::Variance(0.999)).unwrap(), 3);
        assert_eq!(n_components(&ratio, Retain::Count(5)).unwrap(), 3);
        assert!(n_components(&ratio, Retain::Count(0)).is_err());
        assert!(n_components(&ratio, Retain::Variance(1.5)).is_err());
    }

    #[test]
    fn test_components_and_variance() {
        let pca = ContactPca::new(&two_pattern_table(), Retain::default()).unwrap();
        assert_eq!(pca.n_components(), 2);
        assert_eq!(pca.component_labels(), vec!["PC1", "PC2"]);

        let ratio = pca.explained_variance_ratio();
        assert!(close(ratio[0], 0.36 / 0.56));
        assert!(close(ratio[1], 0.20 / 0.56));

        let loadings = pca.loadings();
        assert!(close(loadings.get(C1, 1).unwrap(), 1.0));
        assert!(close(loadings.get(C2, 2).unwrap(), 2.0 / 5f64.sqrt()));
        assert!(close(loadings.get(C3, 2).unwrap(), 1.0 / 5f64.sqrt()));
        assert!(loadings.get(C1, 3).is_none());
    }

    #[test]
    fn test_normalized_loadings_bounded_and_sorted() {
        let pca = ContactPca::new(&two_pattern_table(), Retain::default()).unwrap();
        for pc in 1..=pca.n_components() {
            let column = pca.norm_loadings().component(pc).unwrap();
            assert!(column.iter().all(|v| (0.0..=1.0).contains(v)));

            let sorted = pca.sorted_norm_loadings(pc).unwrap();
            let sorted_column = sorted.component(pc).unwrap();
            assert!(sorted_column.windows(2).all(|w| w[0].abs() >= w[1].abs()));
        }

        let sorted = pca.sorted_loadings(2).unwrap();
        assert_eq!(sorted.contacts().get(0), Some(C2));
        assert_eq!(sorted.contacts().get(1), Some(C3));
        assert!(close(pca.norm_loadings().get(C3, 2).unwrap(), 0.5));
    }

    #[test]
    fn test_edges_above_percentile() {
        let pca = ContactPca::new(&two_pattern_table(), Retain::default()).unwrap();
        let edges = pca.edges(2, 50.0, true).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].res_a, "A:ALA:10");
        assert_eq!(edges[0].res_b, "B:SER:30");
        assert!(close(edges[0].weight.unwrap(), 2.0 / 5f64.sqrt()));

        let unweighted = pca.edges(2, 50.0, false).unwrap();
        assert_eq!(unweighted[0].weight, None);

        assert_eq!(pca.all_edges(1, true).unwrap().len(), 3);
        assert!(matches!(
            pca.edges(3, 99.0, true),
            Err(Error::ComponentOutOfRange { requested: 3, available: 2 })
        ));
    }

    #[test]
    fn test_get_top_contact() {
        let pca = ContactPca::new(&two_pattern_table(), Retain::default()).unwrap();

        let top = pca.get_top_contact(30, 1..3).unwrap().unwrap();
        assert_eq!(top.contact, C2);
        assert_eq!(top.component, 2);
        assert_eq!(top.rank, 1);
        assert!(close(top.score, 1.0));

        let top = pca.get_top_contact(40, 1..3).unwrap().unwrap();
        assert_eq!(top.contact, C3);
        assert_eq!(top.component, 2);
        assert_eq!(top.rank, 2);
        assert!(close(top.score, 0.5));

        assert_eq!(pca.get_top_contact(99, 1..3).unwrap(), None);
        assert!(pca.get_top_contact(40, 1..4).is_err());
    }

    #[test]
    fn test_get_scores() {
        let pca = ContactPca::new(&two_pattern_table(), Retain::default()).unwrap();
        let scores = pca.get_scores(C3, 1..=2).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].0, 2);
        assert_eq!(scores[0].1.rank, 2);
        assert!(close(scores[0].1.score, 0.5));
        assert_eq!(scores[1].0, 1);

        assert!(pca.get_scores("A:ALA:1-A:GLY:2", 1..=2).unwrap().is_empty());
    }

    #[test]
    fn test_in_percentile() {
        let pca = ContactPca::new(&two_pattern_table(), Retain::default()).unwrap();
        assert!(pca.in_percentile(C2, 50.0, 2).unwrap());
        assert!(!pca.in_percentile(C3, 50.0, 2).unwrap());
        assert!(!pca.in_percentile("A:ALA:1-A:GLY:2", 50.0, 2).unwrap());
    }

    #[test]
    fn test_single_condition_rejected() {
        let table = FrequencyTable::new(vec![0.0], vec![C1.to_string()], DMatrix::from_element(1, 1, 0.5)).unwrap();
        assert!(matches!(
            ContactPca::new(&table, Retain::default()),
            Err(Error::Decomposition(_))
        ));
    }

    #[test]
    fn test_non_finite_frequencies_rejected() {
        let mut table = two_pattern_table();
        let mut values = table.matrix().clone();
        values[(1, 2)] = f64::NAN;
        table = FrequencyTable::new(table.conditions().to_vec(), table.contacts().as_slice().to_vec(), values).unwrap();
        assert!(matches!(
            ContactPca::new(&table, Retain::default()),
            Err(Error::Decomposition(_))
        ));
    }

    /// Fixed components: C1 loads equally on PC1 and PC3, and not on PC2.
    struct FixedComponents;

    impl Decomposition for FixedComponents {
        fn decompose(&self, _data: &DMatrix<f64>, _retain: Retain) -> Result<Components> {
            Ok(Components {
                components: DMatrix::from_row_slice(3, 3, &[0.5, 0.5, 0.0, 0.0, 0.2, 0.8, 0.5, 0.0, 0.5]),
                explained_variance_ratio: vec![0.5, 0.3, 0.2],
            })
        }
    }

    #[test]
    fn test_get_scores_ties_latest_component_first() {
        let pca = ContactPca::with_decomposition(&two_pattern_table(), Retain::default(), &FixedComponents).unwrap();
        let scores = pca.get_scores(C1, 1..=3).unwrap();
        let order: Vec<usize> = scores.iter().map(|(pc, _)| *pc).collect();
        assert_eq!(order, vec![3, 1, 2]);
        assert!(close(scores[0].1.score, 1.0));
        assert!(close(scores[1].1.score, 1.0));
        assert!(close(scores[2].1.score, 0.0));
    }
}
