use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::contact_frequencies::ContactFrequencies;
use crate::contact_id::ParseMode;
use crate::frequency_dictionary::make_contact_frequency_dictionary;
use crate::pca::{ContactPca, Retain};
use crate::structure::{ContactOracle, Structure};
use crate::table::FrequencyTable;

fn runtime_error(action: &str, e: crate::Error) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("Failed to {}: {}", action, e))
}

/// Python binding for make_contact_frequency_dictionary
#[pyfunction]
#[pyo3(signature = (freq_files))]
fn make_frequency_dictionary(py: Python<'_>, freq_files: Vec<String>) -> PyResult<PyObject> {
    let dict = make_contact_frequency_dictionary(&freq_files)
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyIOError, _>(format!("Failed to read frequency files: {}", e)))?;

    let py_dict = PyDict::new_bound(py);
    for (label, values) in dict.iter() {
        py_dict.set_item(label, PyList::new_bound(py, values))?;
    }
    Ok(py_dict.into())
}

/// Build a frequency table from replica files and save it (.csv or binary)
#[pyfunction]
#[pyo3(signature = (freq_files, output, temps=None))]
fn build_frequency_table(freq_files: Vec<String>, output: &str, temps: Option<Vec<f64>>) -> PyResult<usize> {
    let dict = make_contact_frequency_dictionary(&freq_files).map_err(|e| runtime_error("read frequency files", e))?;
    let mut table = FrequencyTable::from_dictionary(dict);
    if let Some(temps) = temps {
        table = table.with_conditions(&temps);
    }

    let result = if output.to_ascii_lowercase().ends_with(".csv") {
        table.write_csv(output)
    } else {
        table.write_binary(output)
    };
    result.map_err(|e| runtime_error("write table", e))?;
    Ok(table.n_contacts())
}

/// Average equivalent contacts and save the averaged table as CSV.
/// Returns the averaged contact labels.
#[pyfunction]
#[pyo3(signature = (table_file, output_csv, structure=None, merged=false))]
fn average_contacts(
    table_file: &str,
    output_csv: &str,
    structure: Option<&str>,
    merged: bool,
) -> PyResult<Vec<String>> {
    let mode = if merged { ParseMode::MergedDataset } else { ParseMode::Plain };
    let freqs = ContactFrequencies::from_path(table_file, None, mode).map_err(|e| runtime_error("load table", e))?;

    let structure = structure
        .map(Structure::from_pdb)
        .transpose()
        .map_err(|e| runtime_error("load structure", e))?;
    let oracle = structure.as_ref().map(|s| s as &dyn ContactOracle);

    let averaged = freqs
        .average_contacts(oracle)
        .map_err(|e| runtime_error("average contacts", e))?;
    averaged
        .write_csv(output_csv)
        .map_err(|e| runtime_error("write averaged table", e))?;

    Ok(averaged.contacts().as_slice().to_vec())
}

/// Top-scoring contact of a residue over PCs `pc_start..pc_end` (end exclusive).
/// Returns (contact, score, pc, rank) or None.
#[pyfunction]
#[pyo3(signature = (table_file, resnum, pc_start=1, pc_end=5, variance=0.999))]
fn top_contact(
    table_file: &str,
    resnum: i32,
    pc_start: usize,
    pc_end: usize,
    variance: f64,
) -> PyResult<Option<(String, f64, usize, usize)>> {
    let table = FrequencyTable::from_path(table_file).map_err(|e| runtime_error("load table", e))?;
    let pca = ContactPca::new(&table, Retain::Variance(variance)).map_err(|e| runtime_error("run PCA", e))?;
    let top = pca
        .get_top_contact(resnum, pc_start..pc_end)
        .map_err(|e| runtime_error("find top contact", e))?;
    Ok(top.map(|t| (t.contact, t.score, t.component, t.rank)))
}

/// Normalized score and rank of a contact on PCs `pc_start..=pc_end`,
/// as a list of (pc, {"rank", "score"}) ordered by descending score.
#[pyfunction]
#[pyo3(signature = (table_file, contact, pc_start=1, pc_end=4, variance=0.999))]
fn contact_scores(
    py: Python<'_>,
    table_file: &str,
    contact: &str,
    pc_start: usize,
    pc_end: usize,
    variance: f64,
) -> PyResult<PyObject> {
    let table = FrequencyTable::from_path(table_file).map_err(|e| runtime_error("load table", e))?;
    let pca = ContactPca::new(&table, Retain::Variance(variance)).map_err(|e| runtime_error("run PCA", e))?;
    let scores = pca
        .get_scores(contact, pc_start..=pc_end)
        .map_err(|e| runtime_error("score contact", e))?;

    let py_scores = PyList::empty_bound(py);
    for (pc, score) in scores {
        let py_score = PyDict::new_bound(py);
        py_score.set_item("rank", score.rank)?;
        py_score.set_item("score", score.score)?;
        py_scores.append((pc, py_score))?;
    }
    Ok(py_scores.into())
}

/// Python module definition
#[pymodule]
fn contact_analysis_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(make_frequency_dictionary, m)?)?;
    m.add_function(wrap_pyfunction!(build_frequency_table, m)?)?;
    m.add_function(wrap_pyfunction!(average_contacts, m)?)?;
    m.add_function(wrap_pyfunction!(top_contact, m)?)?;
    m.add_function(wrap_pyfunction!(contact_scores, m)?)?;
    m.add("__doc__", "Contact frequency analysis Rust library with Python bindings")?;
    Ok(())
}
