pub mod contact_frequencies;
pub mod contact_id;
pub mod error;
pub mod frequency_dictionary;
pub mod pca;
pub mod structure;
pub mod table;
pub mod utils;

#[cfg(feature = "python")]
pub mod python_bindings;

// Re-export commonly used types and traits
pub use contact_frequencies::{ContactFrequencies, Edge, EdgeOptions};
pub use contact_id::{ContactId, LabelIndex, PairKey, ParseMode, ResidueId};
pub use error::{Error, Result};
pub use frequency_dictionary::{make_contact_frequency_dictionary, ContactDictionary, FrequencyDictionaryBuilder};
pub use pca::{ComponentScore, ContactPca, Decomposition, LoadingTable, Retain, SvdDecomposition, TopContact};
pub use structure::{ContactOracle, Coordinate, Structure};
pub use table::{FrequencyTable, Heatmap, HeatmapFormat};
