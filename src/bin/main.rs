use clap::{Parser, Subcommand};
use contact_analysis_rs::{
    make_contact_frequency_dictionary, ContactFrequencies, ContactOracle, ContactPca, Edge, EdgeOptions,
    FrequencyTable, HeatmapFormat, ParseMode, Result, Retain, Structure,
};
use std::path::{Path, PathBuf};

/// Command-line tool for analyzing residue contact frequencies across replicas
#[derive(Parser)]
#[command(name = "contact-analysis")]
#[command(about = "Build, average, filter and decompose contact frequency tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a frequency table from per-replica frequency files
    Build {
        /// Frequency files, one per replica, in replica order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Condition labels (e.g. temperatures) for the rows, comma separated
        #[arg(long, value_delimiter = ',')]
        temps: Option<Vec<f64>>,

        /// Output table (.csv for CSV, anything else for a binary table)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Average equivalent contacts across identical subunits
    Average {
        /// Input frequency table
        #[arg(short, long)]
        input: PathBuf,

        /// PDB structure used to name inter-subunit contacts after the closest pairing
        #[arg(short, long)]
        structure: Option<PathBuf>,

        /// Chain A ids carry a prepended group name (merged datasets)
        #[arg(long)]
        merged: bool,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Drop uninformative contacts
    Filter {
        /// Input frequency table
        #[arg(short, long)]
        input: PathBuf,

        /// Drop contacts whose maximum frequency is not above this value
        #[arg(long)]
        min_frequency: Option<f64>,

        /// Drop contacts whose minimum frequency is not below this value
        #[arg(long)]
        max_frequency: Option<f64>,

        /// Drop same-chain contacts separated by at most this many residues
        #[arg(long)]
        exclude_neighbors: Option<u32>,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Export the contact network as a CSV edge list
    Edges {
        /// Input frequency table
        #[arg(short, long)]
        input: PathBuf,

        /// Row position of the condition to use (default: 0)
        #[arg(short, long, default_value_t = 0)]
        condition: usize,

        /// Use raw frequencies as weights instead of 1/frequency
        #[arg(long)]
        raw: bool,

        /// Write edges without weights
        #[arg(long)]
        unweighted: bool,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a residue x residue heatmap matrix
    Heatmap {
        /// Input frequency table
        #[arg(short, long)]
        input: PathBuf,

        /// Cell statistic: mean, stdev or difference (default: mean)
        #[arg(short, long, default_value = "mean")]
        format: HeatmapFormat,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Principal component analysis of the contact frequencies
    Pca {
        /// Input frequency table
        #[arg(short, long)]
        input: PathBuf,

        /// Fraction of explained variance to retain (default: 0.999)
        #[arg(long, default_value_t = 0.999)]
        variance: f64,

        /// Write raw loadings to this CSV path
        #[arg(long)]
        loadings: Option<PathBuf>,

        /// Component used for the edge list (default: 1)
        #[arg(long, default_value_t = 1)]
        pc: usize,

        /// Percentile cutoff for the edge list (default: 99)
        #[arg(long, default_value_t = 99.0)]
        percentile: f64,

        /// Write the percentile-filtered edge list to this CSV path
        #[arg(long)]
        edges: Option<PathBuf>,

        /// Report the top-scoring contact of this residue over all components
        #[arg(long)]
        residue: Option<i32>,
    },
}

fn write_table(table: &FrequencyTable, path: &Path) -> Result<()> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        table.write_csv(path)
    } else {
        table.write_binary(path)
    }
}

fn write_edges(edges: &[Edge], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["source", "target", "weight"])?;
    for edge in edges {
        let weight = edge.weight.map(|w| w.to_string()).unwrap_or_default();
        writer.write_record([edge.res_a.as_str(), edge.res_b.as_str(), weight.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Build { files, temps, output } => {
            println!("Reading {} replica files", files.len());
            let dict = make_contact_frequency_dictionary(&files)?;
            println!("✅ Found {} contacts across {} replicas", dict.len(), dict.n_replicas());

            let mut table = FrequencyTable::from_dictionary(dict);
            if let Some(temps) = temps {
                table = table.with_conditions(&temps);
            }
            write_table(&table, &output)?;
            println!("📄 Table saved to: {:?}", output);
        }

        Commands::Average {
            input,
            structure,
            merged,
            output,
        } => {
            let mode = if merged { ParseMode::MergedDataset } else { ParseMode::Plain };
            let freqs = ContactFrequencies::from_path(&input, None, mode)?;
            println!("✅ Loaded {} contacts from {:?}", freqs.freqs().n_contacts(), input);

            let structure = structure.map(Structure::from_pdb).transpose()?;
            let oracle = structure.as_ref().map(|s| s as &dyn ContactOracle);
            let averaged = freqs.average_contacts(oracle)?;
            println!("✅ Averaged into {} contacts", averaged.n_contacts());

            write_table(&averaged, &output)?;
            println!("📄 Averaged table saved to: {:?}", output);
        }

        Commands::Filter {
            input,
            min_frequency,
            max_frequency,
            exclude_neighbors,
            output,
        } => {
            let mut table = FrequencyTable::from_path(&input)?;
            let before = table.n_contacts();

            if let Some(min) = min_frequency {
                table = ContactFrequencies::new(table, ParseMode::Plain)?.exclude_below(min, None);
            }
            if let Some(max) = max_frequency {
                table = ContactFrequencies::new(table, ParseMode::Plain)?.exclude_above(max);
            }
            if let Some(n) = exclude_neighbors {
                let freqs = ContactFrequencies::new(table, ParseMode::Plain)?;
                let keep: Vec<usize> = freqs
                    .exclude_neighbors(n)
                    .into_iter()
                    .filter_map(|label| freqs.freqs().position(label))
                    .collect();
                table = freqs.freqs().select_columns(&keep);
            }

            println!("✅ Kept {} of {} contacts", table.n_contacts(), before);
            write_table(&table, &output)?;
            println!("📄 Filtered table saved to: {:?}", output);
        }

        Commands::Edges {
            input,
            condition,
            raw,
            unweighted,
            output,
        } => {
            let freqs = ContactFrequencies::from_path(&input, None, ParseMode::Plain)?;
            let edges = freqs.all_edges(EdgeOptions {
                weights: !unweighted,
                inverse: !raw,
                condition,
            })?;
            println!("✅ {} edges at condition {}", edges.len(), condition);
            write_edges(&edges, &output)?;
            println!("📄 Edges saved to: {:?}", output);
        }

        Commands::Heatmap { input, format, output } => {
            let freqs = ContactFrequencies::from_path(&input, None, ParseMode::Plain)?;
            let heatmap = freqs.to_heatmap(format);
            println!("✅ {} x {} {} heatmap", heatmap.labels.len(), heatmap.labels.len(), format);
            heatmap.write_csv(&output)?;
            println!("📄 Heatmap saved to: {:?}", output);
        }

        Commands::Pca {
            input,
            variance,
            loadings,
            pc,
            percentile,
            edges,
            residue,
        } => {
            let table = FrequencyTable::from_path(&input)?;
            let pca = ContactPca::new(&table, Retain::Variance(variance))?;
            println!("✅ Retained {} components", pca.n_components());
            for (label, ratio) in pca.component_labels().iter().zip(pca.explained_variance_ratio()) {
                println!("   {label}: {ratio:.4}");
            }

            if let Some(path) = loadings {
                pca.loadings().write_csv(&path)?;
                println!("📄 Loadings saved to: {:?}", path);
            }
            if let Some(path) = edges {
                let edges = pca.edges(pc, percentile, true)?;
                write_edges(&edges, &path)?;
                println!("📄 {} PC{} edges saved to: {:?}", edges.len(), pc, path);
            }
            if let Some(resnum) = residue {
                match pca.get_top_contact(resnum, 1..pca.n_components() + 1)? {
                    Some(top) => println!(
                        "✅ Residue {}: {} scores {:.4} on PC{} (rank {})",
                        resnum, top.contact, top.score, top.component, top.rank
                    ),
                    None => println!("No contacts involve residue {}", resnum),
                }
            }
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}
