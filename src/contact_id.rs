use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// How chain identifiers in a label are interpreted.
///
/// `MergedDataset` is for tables combined from several systems, where chain A
/// carries a prepended group name (`"sys1_A"`). In that mode chain A becomes
/// the second underscore-separated token (`"my_sys_A"` reads as `"sys"`).
/// `Plain` leaves chain ids as-is, underscores included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    Plain,
    MergedDataset,
}

/// One residue of a contact: `chain:resname:resid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResidueId {
    pub chain: String,
    pub resname: String,
    pub resid: i32,
}

impl ResidueId {
    pub fn new(chain: impl Into<String>, resname: impl Into<String>, resid: i32) -> Self {
        Self {
            chain: chain.into(),
            resname: resname.into(),
            resid,
        }
    }

    /// Chain id followed directly by the residue number, e.g. `A10`.
    pub fn compact(&self) -> String {
        format!("{}{}", self.chain, self.resid)
    }
}

impl fmt::Display for ResidueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.chain, self.resname, self.resid)
    }
}

/// Grouping key used when averaging equivalent contacts across subunits.
///
/// Same-chain contacts are unordered (`first <= second`); inter-chain
/// contacts keep residue A / residue B order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub first: i32,
    pub second: i32,
    pub same_chain: bool,
}

/// A parsed contact label, `chainA:resnA:residA-chainB:resnB:residB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContactId {
    pub a: ResidueId,
    pub b: ResidueId,
}

impl ContactId {
    pub fn new(a: ResidueId, b: ResidueId) -> Self {
        Self { a, b }
    }

    /// Parse a label into its six fields.
    ///
    /// Fields are separated by `:`, `-` or runs of whitespace, so both the
    /// column form (`A:ALA:10-A:GLY:20`) and the frequency-file form
    /// (`A:ALA:10 A:GLY:20`) are accepted.
    pub fn parse(label: &str, mode: ParseMode) -> Result<Self> {
        let fields: Vec<&str> = label
            .split_whitespace()
            .flat_map(|chunk| chunk.split(|c: char| c == ':' || c == '-'))
            .collect();

        if fields.len() != 6 {
            return Err(Error::malformed(
                label,
                format!("expected 6 fields, found {}", fields.len()),
            ));
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(Error::malformed(label, "empty field"));
        }

        let resid_a = parse_resid(label, fields[2])?;
        let resid_b = parse_resid(label, fields[5])?;

        let mut chain_a = fields[0];
        if mode == ParseMode::MergedDataset {
            if let Some(chain) = chain_a.split('_').nth(1) {
                chain_a = chain;
            }
        }

        Ok(Self {
            a: ResidueId::new(chain_a, fields[1], resid_a),
            b: ResidueId::new(fields[3], fields[4], resid_b),
        })
    }

    pub fn same_chain(&self) -> bool {
        self.a.chain == self.b.chain
    }

    pub fn involves(&self, resid: i32) -> bool {
        self.a.resid == resid || self.b.resid == resid
    }

    pub fn pair_key(&self) -> PairKey {
        if self.same_chain() {
            PairKey {
                first: self.a.resid.min(self.b.resid),
                second: self.a.resid.max(self.b.resid),
                same_chain: true,
            }
        } else {
            PairKey {
                first: self.a.resid,
                second: self.b.resid,
                same_chain: false,
            }
        }
    }

    /// Same residues with the chains replaced by `chain_a` / `chain_b`.
    pub fn with_chains(&self, chain_a: &str, chain_b: &str) -> Self {
        Self {
            a: ResidueId::new(chain_a, self.a.resname.clone(), self.a.resid),
            b: ResidueId::new(chain_b, self.b.resname.clone(), self.b.resid),
        }
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

fn parse_resid(label: &str, field: &str) -> Result<i32> {
    field
        .parse::<i32>()
        .map_err(|_| Error::malformed(label, format!("residue number '{field}' is not an integer")))
}

/// Split a label on its single top-level hyphen into the two residue strings.
pub fn split_id(label: &str) -> Result<(&str, &str)> {
    match label.split_once('-') {
        Some((a, b)) if !a.is_empty() && !b.is_empty() && !b.contains('-') => Ok((a, b)),
        _ => Err(Error::malformed(label, "expected exactly one '-' between residues")),
    }
}

/// Grouping key for a raw label.
pub fn canonical_pair_key(label: &str, mode: ParseMode) -> Result<PairKey> {
    Ok(ContactId::parse(label, mode)?.pair_key())
}

/// Ordered set of labels with O(1) label -> position lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelIndex {
    labels: Vec<String>,
    positions: HashMap<String, usize>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label, returning its position. Existing labels keep theirs.
    pub fn insert(&mut self, label: impl Into<String>) -> usize {
        let label = label.into();
        if let Some(&pos) = self.positions.get(&label) {
            return pos;
        }
        let pos = self.labels.len();
        self.positions.insert(label.clone(), pos);
        self.labels.push(label);
        pos
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.positions.contains_key(label)
    }

    pub fn get(&self, pos: usize) -> Option<&str> {
        self.labels.get(pos).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

impl From<Vec<String>> for LabelIndex {
    fn from(labels: Vec<String>) -> Self {
        let mut index = LabelIndex::new();
        for label in labels {
            index.insert(label);
        }
        index
    }
}

impl From<LabelIndex> for Vec<String> {
    fn from(index: LabelIndex) -> Self {
        index.labels
    }
}

impl FromIterator<String> for LabelIndex {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut index = LabelIndex::new();
        for label in iter {
            index.insert(label);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_label() {
        let id = ContactId::parse("A:ALA:10-B:GLY:20", ParseMode::Plain).unwrap();
        assert_eq!(id.a, ResidueId::new("A", "ALA", 10));
        assert_eq!(id.b, ResidueId::new("B", "GLY", 20));
        assert!(!id.same_chain());
    }

    #[test]
    fn test_parse_file_form() {
        let id = ContactId::parse("A:ALA:10   A:GLY:20", ParseMode::Plain).unwrap();
        assert_eq!(id.to_string(), "A:ALA:10-A:GLY:20");
    }

    #[test]
    fn test_round_trip() {
        for label in ["A:ALA:10-A:GLY:20", "B:LYS:105-C:GLU:7", "X:HOH:1-Y:HOH:2"] {
            let id = ContactId::parse(label, ParseMode::Plain).unwrap();
            assert_eq!(id.to_string(), label);
        }
    }

    #[test]
    fn test_malformed_labels() {
        assert!(matches!(
            ContactId::parse("A:ALA:10-A:GLY", ParseMode::Plain),
            Err(Error::MalformedLabel { .. })
        ));
        assert!(ContactId::parse("A:ALA:ten-A:GLY:20", ParseMode::Plain).is_err());
        assert!(ContactId::parse("A:ALA:10-A:GLY:20:7", ParseMode::Plain).is_err());
        assert!(ContactId::parse("", ParseMode::Plain).is_err());
    }

    #[test]
    fn test_merged_mode_strips_group_name() {
        let label = "sys1_A:ALA:10-B:GLY:20";
        let merged = ContactId::parse(label, ParseMode::MergedDataset).unwrap();
        assert_eq!(merged.a.chain, "A");

        let plain = ContactId::parse(label, ParseMode::Plain).unwrap();
        assert_eq!(plain.a.chain, "sys1_A");

        let nested = ContactId::parse("my_sys_A:ALA:10-B:GLY:20", ParseMode::MergedDataset).unwrap();
        assert_eq!(nested.a.chain, "sys");
    }

    #[test]
    fn test_split_id() {
        assert_eq!(split_id("A:ALA:10-B:GLY:20").unwrap(), ("A:ALA:10", "B:GLY:20"));
        assert!(split_id("A:ALA:10").is_err());
        assert!(split_id("A:ALA:10-B:GLY:20-C:SER:3").is_err());
    }

    #[test]
    fn test_pair_key_ordering() {
        let same = canonical_pair_key("B:GLY:20-B:ALA:10", ParseMode::Plain).unwrap();
        assert_eq!((same.first, same.second, same.same_chain), (10, 20, true));

        let inter = canonical_pair_key("B:GLY:20-A:ALA:10", ParseMode::Plain).unwrap();
        assert_eq!((inter.first, inter.second, inter.same_chain), (20, 10, false));
    }

    #[test]
    fn test_label_index() {
        let mut index = LabelIndex::new();
        assert_eq!(index.insert("x"), 0);
        assert_eq!(index.insert("y"), 1);
        assert_eq!(index.insert("x"), 0);
        assert_eq!(index.len(), 2);
        assert_eq!(index.position("y"), Some(1));
        assert_eq!(index.get(0), Some("x"));
        assert!(!index.contains("z"));
    }
}
