use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::contact_id::ContactId;
use crate::error::{Error, Result};

/// 3D coordinate vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Calculate Euclidean distance to another coordinate
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Decides which observed chain pairing of an inter-subunit contact is the
/// spatially closest one.
pub trait ContactOracle {
    /// Return the closest of `candidates`, or `None` if none can be placed.
    fn closest_contact(&self, candidates: &[ContactId]) -> Result<Option<ContactId>>;
}

/// CA atom positions keyed by (chain, residue number).
#[derive(Debug, Clone, Default)]
pub struct Structure {
    ca: HashMap<(String, i32), Coordinate>,
}

impl Structure {
    /// Read CA atoms from the first model of a PDB file.
    pub fn from_pdb(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Structure(format!("failed to open PDB file {}: {}", path.display(), e)))?;
        let structure = Self::from_reader(BufReader::new(file))?;
        debug!("Loaded {} CA atoms from {}", structure.len(), path.display());
        Ok(structure)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut ca = HashMap::new();

        for line in reader.lines() {
            let line = line?;
            if line.starts_with("ENDMDL") {
                break;
            }
            if !line.starts_with("ATOM") || line.len() < 54 {
                continue;
            }
            // Columns: 12-16 atom name, 21 chain, 22-26 residue number, 30-54 xyz
            if line.get(12..16).map(str::trim) != Some("CA") {
                continue;
            }
            let chain = line.get(21..22).unwrap_or("").trim().to_string();
            let Ok(resid) = line.get(22..26).unwrap_or("").trim().parse::<i32>() else {
                continue;
            };
            let coord = |range: std::ops::Range<usize>| line.get(range).and_then(|s| s.trim().parse::<f64>().ok());
            let (Some(x), Some(y), Some(z)) = (coord(30..38), coord(38..46), coord(46..54)) else {
                continue;
            };

            ca.entry((chain, resid)).or_insert(Coordinate::new(x, y, z));
        }

        if ca.is_empty() {
            return Err(Error::Structure("no CA atoms found".to_string()));
        }
        Ok(Self { ca })
    }

    pub fn len(&self) -> usize {
        self.ca.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ca.is_empty()
    }

    pub fn ca(&self, chain: &str, resid: i32) -> Option<&Coordinate> {
        self.ca.get(&(chain.to_string(), resid))
    }

    /// CA-CA distance of a contact, if both residues are present.
    pub fn contact_distance(&self, contact: &ContactId) -> Option<f64> {
        let a = self.ca(&contact.a.chain, contact.a.resid)?;
        let b = self.ca(&contact.b.chain, contact.b.resid)?;
        Some(a.distance_to(b))
    }
}

impl ContactOracle for Structure {
    fn closest_contact(&self, candidates: &[ContactId]) -> Result<Option<ContactId>> {
        let closest = candidates
            .iter()
            .filter_map(|c| self.contact_distance(c).map(|d| (d, c)))
            .min_by(|(d1, _), (d2, _)| d1.total_cmp(d2))
            .map(|(_, c)| c.clone());
        Ok(closest)
    }
}
