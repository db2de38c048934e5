use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::contact_id::LabelIndex;
use crate::error::Result;

/// Contact label -> one frequency per replica, in discovery order.
///
/// Every value list has exactly `n_replicas` entries; a contact missing from
/// a replica holds `0.0` at that position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactDictionary {
    labels: LabelIndex,
    values: Vec<Vec<f64>>,
    n_replicas: usize,
}

impl ContactDictionary {
    pub fn n_replicas(&self) -> usize {
        self.n_replicas
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }

    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.labels.position(label).map(|pos| self.values[pos].as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> + '_ {
        self.labels.iter().zip(self.values.iter().map(Vec::as_slice))
    }

    pub(crate) fn into_parts(self) -> (LabelIndex, Vec<Vec<f64>>, usize) {
        (self.labels, self.values, self.n_replicas)
    }
}

/// Accumulates per-replica frequency files into a [`ContactDictionary`].
///
/// Replicas must be added in order: the position of a replica decides where
/// its frequencies land in every value list.
#[derive(Debug, Default)]
pub struct FrequencyDictionaryBuilder {
    dict: ContactDictionary,
}

impl FrequencyDictionaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of replicas added so far.
    pub fn n_replicas(&self) -> usize {
        self.dict.n_replicas
    }

    /// Read one replica's frequency file.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path.as_ref())?;
        self.add_replica(BufReader::new(file))
    }

    /// Read one replica from any line source.
    ///
    /// Lines that are not `CHAIN:RES:NUM CHAIN:RES:NUM FREQ` are skipped.
    pub fn add_replica<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let replica = self.dict.n_replicas;

        for line in reader.lines() {
            let line = line?;
            let Some((label, freq)) = parse_frequency_line(&line) else {
                continue;
            };

            match self.dict.labels.position(&label) {
                None => {
                    let mut values = vec![0.0; replica];
                    values.push(freq);
                    self.dict.labels.insert(label);
                    self.dict.values.push(values);
                }
                Some(pos) => {
                    let values = &mut self.dict.values[pos];
                    if values.len() > replica {
                        warn!("Duplicate contact {} in replica {}, keeping the last value", label, replica);
                        values[replica] = freq;
                    } else {
                        values.push(freq);
                    }
                }
            }
        }

        // Contacts seen earlier but absent from this replica
        for values in &mut self.dict.values {
            values.resize(replica + 1, 0.0);
        }
        self.dict.n_replicas = replica + 1;

        Ok(())
    }

    pub fn build(self) -> ContactDictionary {
        self.dict
    }
}

/// Build the dictionary from an ordered list of replica files.
pub fn make_contact_frequency_dictionary<P: AsRef<Path>>(freq_files: &[P]) -> Result<ContactDictionary> {
    let pb = ProgressBar::new(freq_files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} replicas ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut builder = FrequencyDictionaryBuilder::new();
    for path in freq_files {
        builder.add_file(path)?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    let dict = builder.build();
    info!("Read {} contacts across {} replicas", dict.len(), dict.n_replicas());
    Ok(dict)
}

/// Parse `A:ALA:10 A:GLY:20 0.53` into (`A:ALA:10-A:GLY:20`, 0.53).
fn parse_frequency_line(line: &str) -> Option<(String, f64)> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    let second = tokens.next()?;
    let freq = tokens.next()?;
    if tokens.next().is_some() || !is_residue_token(first) || !is_residue_token(second) {
        return None;
    }
    let freq = freq.parse::<f64>().ok()?;
    Some((format!("{first}-{second}"), freq))
}

fn is_residue_token(token: &str) -> bool {
    let is_word = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_');
    let mut parts = token.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(chain), Some(resname), Some(resid), None) => {
            is_word(chain) && is_word(resname) && !resid.is_empty() && resid.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}
