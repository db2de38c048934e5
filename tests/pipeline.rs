use contact_analysis_rs::{
    make_contact_frequency_dictionary, ContactFrequencies, EdgeOptions, FrequencyTable, ParseMode, Retain,
    ContactPca, Structure,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Four replicas of a symmetric dimer. Each line is `resA resB freq`.
fn write_replicas(dir: &TempDir) -> Vec<PathBuf> {
    let replicas = [
        "# replica 0\nA:ALA:10 A:GLY:20 0.9\nB:ALA:10 B:GLY:20 0.7\nA:LYS:5 B:GLU:40 0.2\nA:SER:11 A:ALA:10 0.99\n",
        "A:ALA:10 A:GLY:20 0.6\nB:ALA:10 B:GLY:20 0.4\nA:LYS:5 B:GLU:40 0.4\nB:LYS:5 A:GLU:40 0.2\nA:SER:11 A:ALA:10 1.0\n",
        "A:ALA:10 A:GLY:20 0.3\nA:LYS:5 B:GLU:40 0.6\nB:LYS:5 A:GLU:40 0.4\nA:SER:11 A:ALA:10 0.99\n",
        "B:ALA:10 B:GLY:20 0.1\nA:LYS:5 B:GLU:40 0.9\nB:LYS:5 A:GLU:40 0.7\nA:SER:11 A:ALA:10 1.0\n",
    ];
    replicas
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let path = dir.path().join(format!("rep{i}.freqs.tsv"));
            fs::write(&path, text).unwrap();
            path
        })
        .collect()
}

fn close(actual: &[f64], expected: &[f64]) -> bool {
    actual.len() == expected.len() && actual.iter().zip(expected).all(|(a, e)| (a - e).abs() < 1e-12)
}

#[test]
fn test_replicas_to_averaged_table() {
    let dir = TempDir::new().unwrap();
    let files = write_replicas(&dir);

    let dict = make_contact_frequency_dictionary(&files).unwrap();
    assert_eq!(dict.n_replicas(), 4);
    assert_eq!(dict.get("B:LYS:5-A:GLU:40").unwrap(), &[0.0, 0.2, 0.4, 0.7]);

    let table = FrequencyTable::from_dictionary(dict).with_conditions(&[300.0, 310.0, 320.0, 330.0]);
    let csv_path = dir.path().join("freqs.csv");
    table.write_csv(&csv_path).unwrap();

    let freqs = ContactFrequencies::from_path(&csv_path, None, ParseMode::Plain).unwrap();
    assert_eq!(freqs.freqs().conditions(), &[300.0, 310.0, 320.0, 330.0]);

    let averaged = freqs.average_contacts(None).unwrap();
    assert_eq!(
        averaged.contacts().as_slice(),
        &["A:ALA:10-A:GLY:20", "A:LYS:5-B:GLU:40", "A:SER:11-A:ALA:10"]
    );
    assert!(close(averaged.column("A:ALA:10-A:GLY:20").unwrap(), &[0.8, 0.5, 0.15, 0.05]));
    assert!(close(averaged.column("A:LYS:5-B:GLU:40").unwrap(), &[0.1, 0.3, 0.5, 0.8]));

    // Adjacent-residue and always-on contacts drop out
    let averaged = ContactFrequencies::new(averaged, ParseMode::Plain).unwrap();
    assert_eq!(averaged.exclude_neighbors(1), vec!["A:ALA:10-A:GLY:20", "A:LYS:5-B:GLU:40"]);
    assert_eq!(averaged.exclude_above(0.98).n_contacts(), 2);
}

#[test]
fn test_averaging_named_by_structure() {
    let dir = TempDir::new().unwrap();
    let files = write_replicas(&dir);
    let freqs = ContactFrequencies::new(
        FrequencyTable::from_dictionary(make_contact_frequency_dictionary(&files).unwrap()),
        ParseMode::Plain,
    )
    .unwrap();

    // B:LYS:5 sits next to A:GLU:40; the A5/B40 pair is far apart
    let pdb = [
        "ATOM      1  CA  LYS A   5       0.000   0.000   0.000  1.00  0.00           C",
        "ATOM      2  CA  GLU A  40      30.000   0.000   0.000  1.00  0.00           C",
        "ATOM      3  CA  LYS B   5      25.000   0.000   0.000  1.00  0.00           C",
        "ATOM      4  CA  GLU B  40      20.000   0.000   0.000  1.00  0.00           C",
        "END",
    ]
    .join("\n");
    let pdb_path = dir.path().join("dimer.pdb");
    fs::write(&pdb_path, pdb).unwrap();
    let structure = Structure::from_pdb(&pdb_path).unwrap();

    let averaged = freqs.average_contacts(Some(&structure)).unwrap();
    assert!(averaged.contacts().contains("B:LYS:5-A:GLU:40"));
    assert!(!averaged.contacts().contains("A:LYS:5-B:GLU:40"));
}

#[test]
fn test_edges_and_components() {
    let dir = TempDir::new().unwrap();
    let files = write_replicas(&dir);
    let table = FrequencyTable::from_dictionary(make_contact_frequency_dictionary(&files).unwrap());
    let freqs = ContactFrequencies::new(table, ParseMode::Plain).unwrap();

    // Replica 0 has no B:LYS:5-A:GLU:40, so the inverted edge list skips it
    let edges = freqs.all_edges(EdgeOptions::default()).unwrap();
    assert_eq!(edges.len(), 4);
    assert!(edges.iter().all(|e| e.weight.unwrap().is_finite()));

    let filtered = freqs.exclude_below(0.05, None);
    let pca = ContactPca::new(&filtered, Retain::default()).unwrap();
    assert!(pca.n_components() >= 1);
    let total: f64 = pca.explained_variance_ratio().iter().sum();
    assert!(total > 0.999 - 1e-9);

    let top_edges = pca.edges(1, 50.0, true).unwrap();
    assert!(!top_edges.is_empty());
    assert!(top_edges.len() < filtered.n_contacts());
}
