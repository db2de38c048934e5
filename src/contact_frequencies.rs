use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use nalgebra::DMatrix;

use crate::contact_id::{split_id, ContactId, LabelIndex, PairKey, ParseMode};
use crate::error::{Error, Result};
use crate::structure::ContactOracle;
use crate::table::{FrequencyTable, Heatmap, HeatmapFormat};

/// Representative chain for same-chain contacts after averaging.
const SAME_CHAIN: &str = "A";
/// Representative chains for inter-chain contacts after averaging.
const INTER_CHAIN: (&str, &str) = ("A", "B");

/// A network edge between two residues (`chain:resname:resid` strings).
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub res_a: String,
    pub res_b: String,
    pub weight: Option<f64>,
}

/// Options for [`ContactFrequencies::all_edges`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeOptions {
    /// Attach a weight to each edge.
    pub weights: bool,
    /// Use `1 / frequency` as the weight. Zero-frequency contacts are skipped.
    pub inverse: bool,
    /// Row position of the condition to read frequencies from.
    pub condition: usize,
}

impl Default for EdgeOptions {
    fn default() -> Self {
        Self {
            weights: true,
            inverse: true,
            condition: 0,
        }
    }
}

/// Query, filtering and averaging over a [`FrequencyTable`].
///
/// Column labels are parsed once at construction; a malformed label makes
/// construction fail.
#[derive(Debug, Clone)]
pub struct ContactFrequencies {
    freqs: FrequencyTable,
    ids: Vec<ContactId>,
    mode: ParseMode,
}

impl ContactFrequencies {
    pub fn new(freqs: FrequencyTable, mode: ParseMode) -> Result<Self> {
        let ids = freqs
            .contacts()
            .iter()
            .map(|label| ContactId::parse(label, mode))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { freqs, ids, mode })
    }

    /// Load a CSV or binary table, optionally relabelling rows with `temps`.
    pub fn from_path(path: impl AsRef<Path>, temps: Option<&[f64]>, mode: ParseMode) -> Result<Self> {
        let mut freqs = FrequencyTable::from_path(path)?;
        if let Some(temps) = temps {
            freqs = freqs.with_conditions(temps);
        }
        Self::new(freqs, mode)
    }

    pub fn freqs(&self) -> &FrequencyTable {
        &self.freqs
    }

    pub fn into_table(self) -> FrequencyTable {
        self.freqs
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    pub fn contact_ids(&self) -> &[ContactId] {
        &self.ids
    }

    fn labels(&self) -> impl Iterator<Item = (&str, &ContactId)> + '_ {
        self.freqs.contacts().iter().zip(self.ids.iter())
    }

    /// Contact labels involving `resid`, or only those between `resid` and
    /// `resid_2` (in either order) when it is given.
    pub fn contact_partners(&self, resid: i32, resid_2: Option<i32>) -> Vec<&str> {
        self.labels()
            .filter(|(_, id)| match resid_2 {
                Some(other) => {
                    (id.a.resid == resid && id.b.resid == other) || (id.b.resid == resid && id.a.resid == other)
                }
                None => id.involves(resid),
            })
            .map(|(label, _)| label)
            .collect()
    }

    /// Residue numbers of every partner of `resid`, one per contact.
    pub fn partner_ids(&self, resid: i32) -> Vec<i32> {
        self.ids
            .iter()
            .filter_map(|id| {
                if id.a.resid == resid {
                    Some(id.b.resid)
                } else if id.b.resid == resid {
                    Some(id.a.resid)
                } else {
                    None
                }
            })
            .collect()
    }

    /// One edge per contact at the chosen condition.
    pub fn all_edges(&self, options: EdgeOptions) -> Result<Vec<Edge>> {
        if options.condition >= self.freqs.n_conditions() {
            return Err(Error::Shape(format!(
                "condition {} requested from a table with {} conditions",
                options.condition,
                self.freqs.n_conditions()
            )));
        }

        let mut edges = Vec::with_capacity(self.freqs.n_contacts());
        let mut skipped = 0usize;
        for (col, label) in self.freqs.contacts().iter().enumerate() {
            let (res_a, res_b) = split_id(label)?;
            let weight = if options.weights {
                let freq = self.freqs.column_at(col)[options.condition];
                if options.inverse {
                    if freq == 0.0 {
                        skipped += 1;
                        continue;
                    }
                    Some(1.0 / freq)
                } else {
                    Some(freq)
                }
            } else {
                None
            };
            edges.push(Edge {
                res_a: res_a.to_string(),
                res_b: res_b.to_string(),
                weight,
            });
        }
        if skipped > 0 {
            debug!("Skipped {} zero-frequency contacts when inverting weights", skipped);
        }
        Ok(edges)
    }

    /// Weighted edges keyed by residue pair.
    pub fn all_edges_map(&self, inverse: bool, condition: usize) -> Result<HashMap<(String, String), f64>> {
        let options = EdgeOptions {
            weights: true,
            inverse,
            condition,
        };
        Ok(self
            .all_edges(options)?
            .into_iter()
            .filter_map(|e| e.weight.map(|w| ((e.res_a, e.res_b), w)))
            .collect())
    }

    /// Both residue strings of every contact, in column order.
    pub fn all_residues(&self) -> Result<Vec<&str>> {
        let mut residues = Vec::with_capacity(self.freqs.n_contacts() * 2);
        for label in self.freqs.contacts().iter() {
            let (a, b) = split_id(label)?;
            residues.push(a);
            residues.push(b);
        }
        Ok(residues)
    }

    /// Labels of contacts that are not trivially close in sequence.
    ///
    /// Same-chain contacts need a residue-number separation greater than
    /// `n_neighbors`; inter-chain contacts are always kept.
    pub fn exclude_neighbors(&self, n_neighbors: u32) -> Vec<&str> {
        self.labels()
            .filter(|(_, id)| !id.same_chain() || id.a.resid.abs_diff(id.b.resid) > n_neighbors)
            .map(|(label, _)| label)
            .collect()
    }

    /// Partition of the columns into groups of equivalent contacts, in pivot order.
    ///
    /// Every column lands in exactly one group.
    fn average_groups(&self) -> Result<Vec<Vec<usize>>> {
        let mut by_key: HashMap<PairKey, Vec<usize>> = HashMap::new();
        for (col, id) in self.ids.iter().enumerate() {
            by_key.entry(id.pair_key()).or_default().push(col);
        }

        let mut remaining: BTreeSet<usize> = (0..self.ids.len()).collect();
        let mut groups = Vec::new();
        while let Some(pivot) = remaining.pop_first() {
            let key = self.ids[pivot].pair_key();
            let group: Vec<usize> = by_key
                .remove(&key)
                .unwrap_or_default()
                .into_iter()
                .filter(|&col| col == pivot || remaining.remove(&col))
                .collect();
            if group.is_empty() {
                return Err(Error::NonTermination {
                    pivot: self.ids[pivot].to_string(),
                });
            }
            groups.push(group);
        }
        Ok(groups)
    }

    /// Merge contacts that are equivalent across identical subunits.
    ///
    /// Same-chain contacts are grouped by their unordered residue-number pair
    /// and relabelled onto chain A. Inter-chain contacts are grouped by their
    /// ordered residue-number pair and relabelled A/B, or, when an `oracle`
    /// is given, named after the spatially closest observed chain pairing.
    /// Each output column is the row-wise mean of its group.
    pub fn average_contacts(&self, oracle: Option<&dyn ContactOracle>) -> Result<FrequencyTable> {
        let groups = self.average_groups()?;

        let pb = ProgressBar::new(groups.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} groups ({percent}%)")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let n_rows = self.freqs.n_conditions();
        let mut labels = Vec::with_capacity(groups.len());
        let mut means = Vec::with_capacity(groups.len() * n_rows);

        for group in &groups {
            let pivot = &self.ids[group[0]];
            let label = if pivot.same_chain() {
                pivot.with_chains(SAME_CHAIN, SAME_CHAIN)
            } else {
                let canonical = pivot.with_chains(INTER_CHAIN.0, INTER_CHAIN.1);
                match oracle {
                    Some(oracle) => {
                        let candidates: Vec<ContactId> = group.iter().map(|&col| self.ids[col].clone()).collect();
                        oracle.closest_contact(&candidates)?.unwrap_or_else(|| {
                            warn!("No structure coordinates for {}, using {}", pivot, canonical);
                            canonical
                        })
                    }
                    None => canonical,
                }
            };

            for row in 0..n_rows {
                let sum: f64 = group.iter().map(|&col| self.freqs.column_at(col)[row]).sum();
                means.push(sum / group.len() as f64);
            }
            debug!("Averaged {} columns into {}", group.len(), label);
            labels.push(label.to_string());
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!("Averaged {} contacts into {}", self.ids.len(), labels.len());
        let values = DMatrix::from_vec(n_rows, labels.len(), means);
        FrequencyTable::new(self.freqs.conditions().to_vec(), labels, values)
    }

    /// Old label -> label with residues renumbered to start at
    /// `starting_residue_number` (assuming the current numbering starts at 1).
    pub fn renumber_residues(&self, starting_residue_number: i32) -> Vec<(String, String)> {
        let shift = starting_residue_number - 1;
        self.labels()
            .map(|(label, id)| {
                let mut renamed = id.clone();
                renamed.a.resid += shift;
                renamed.b.resid += shift;
                (label.to_string(), renamed.to_string())
            })
            .collect()
    }

    /// The table relabelled with [`renumber_residues`](Self::renumber_residues).
    pub fn renumbered(&self, starting_residue_number: i32) -> Result<FrequencyTable> {
        let labels = self
            .renumber_residues(starting_residue_number)
            .into_iter()
            .map(|(_, new)| new)
            .collect();
        self.freqs.with_contacts(labels)
    }

    /// Keep contacts whose maximum frequency over `condition_range` (all
    /// conditions when `None`) exceeds `min_frequency`.
    pub fn exclude_below(&self, min_frequency: f64, condition_range: Option<Range<usize>>) -> FrequencyTable {
        let rows = self.freqs.clamp_rows(condition_range);
        let keep: Vec<usize> = (0..self.freqs.n_contacts())
            .filter(|&col| {
                self.freqs.column_at(col)[rows.clone()]
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max)
                    > min_frequency
            })
            .collect();
        self.freqs.select_columns(&keep)
    }

    /// Keep contacts whose minimum frequency is below `max_frequency`.
    pub fn exclude_above(&self, max_frequency: f64) -> FrequencyTable {
        let keep: Vec<usize> = (0..self.freqs.n_contacts())
            .filter(|&col| {
                self.freqs
                    .column_at(col)
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min)
                    < max_frequency
            })
            .collect();
        self.freqs.select_columns(&keep)
    }

    /// Residue x residue matrix of a per-contact summary statistic.
    ///
    /// Labels are `chain+resid`, chains in order of first appearance and
    /// residues ascending within each chain.
    pub fn to_heatmap(&self, format: HeatmapFormat) -> Heatmap {
        let mut chains: Vec<(&str, BTreeSet<i32>)> = Vec::new();
        for id in &self.ids {
            for res in [&id.a, &id.b] {
                match chains.iter_mut().find(|(chain, _)| *chain == res.chain) {
                    Some((_, resids)) => {
                        resids.insert(res.resid);
                    }
                    None => chains.push((res.chain.as_str(), BTreeSet::from([res.resid]))),
                }
            }
        }

        let mut index = LabelIndex::new();
        for (chain, resids) in &chains {
            for resid in resids {
                let label = format!("{chain}{resid}");
                if index.contains(&label) {
                    debug!("Heatmap label {} is shared by more than one residue", label);
                }
                index.insert(label);
            }
        }

        let mut values = DMatrix::zeros(index.len(), index.len());
        for (col, id) in self.ids.iter().enumerate() {
            let (Some(i), Some(j)) = (index.position(&id.a.compact()), index.position(&id.b.compact())) else {
                continue;
            };
            let value = summarize(self.freqs.column_at(col), format);
            values[(i, j)] = value;
            values[(j, i)] = value;
        }

        Heatmap {
            labels: index.into(),
            values,
        }
    }

    /// Least-squares slope of a contact's frequency against the condition
    /// labels over `condition_range`.
    pub fn slope(&self, contact: &str, condition_range: Range<usize>) -> Option<f64> {
        let rows = self.freqs.clamp_rows(Some(condition_range));
        let ys = &self.freqs.column(contact)?[rows.clone()];
        let xs = &self.freqs.conditions()[rows];
        if xs.len() < 2 {
            return None;
        }

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;
        let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
        let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
        if sxx == 0.0 {
            return None;
        }
        Some(sxy / sxx)
    }
}

fn summarize(values: &[f64], format: HeatmapFormat) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    match format {
        HeatmapFormat::Mean => values.iter().sum::<f64>() / n as f64,
        HeatmapFormat::Stdev => {
            if n < 2 {
                return 0.0;
            }
            let mean = values.iter().sum::<f64>() / n as f64;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        }
        HeatmapFormat::Difference => values[n - 1] - values[0],
    }
}
