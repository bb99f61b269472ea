//! `xsec extract`

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use xs_core::{MetadataStore, POT_USED};
use xs_extract::{Extraction, ExtractionConfig};
use xs_hist::HistogramFile;

use crate::exit::{ExitOn, ExtractStatus, Failure, Status};

pub struct Args {
    pub config: PathBuf,
    pub data: PathBuf,
    pub mc: PathBuf,
    pub iterations: Option<usize>,
    pub playlists: Option<u32>,
    pub output_dir: PathBuf,
    pub threads: usize,
}

pub fn run(args: Args) -> Result<(), Failure> {
    if args.threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global();
    }
    let bad_config = Status::BadCmdLine as u8;
    let config = ExtractionConfig::open(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))
        .exit_on(bad_config)?;
    let mut extraction = Extraction::new(config).exit_on(bad_config)?;
    if let Some(k) = args.iterations {
        extraction = extraction.iterations(k).exit_on(bad_config)?;
    }
    if let Some(n) = args.playlists {
        extraction = extraction.playlists(n).exit_on(bad_config)?;
    }

    let data = open_store(&args.data).exit_on(ExtractStatus::BadDataFile as u8)?;
    let mc = open_store(&args.mc).exit_on(ExtractStatus::BadMcFile as u8)?;

    let bad_output = ExtractStatus::BadOutputFile as u8;
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))
        .exit_on(bad_output)?;
    for name in extraction.output_files(&data) {
        let path = args.output_dir.join(name);
        if path.exists() {
            return Err(anyhow!("{} already exists", path.display())).exit_on(bad_output);
        }
    }

    let failed = ExtractStatus::ExtractionFailed as u8;
    let report = extraction.run(&data, &mc).exit_on(failed)?;

    for artifact in &report.artifacts {
        artifact
            .write(&args.output_dir)
            .with_context(|| {
                format!("could not create {}; does it already exist?", artifact.file_name())
            })
            .exit_on(bad_output)?;
    }

    let total = report.artifacts.len() + report.failures.len();
    if !report.is_complete() {
        for f in &report.failures {
            tracing::error!(material = %f.material, observable = %f.observable, "{}", f.error);
        }
        return Err(anyhow!("{} of {total} extractions failed", report.failures.len()))
            .exit_on(failed);
    }
    tracing::info!(extracted = total, output_dir = %args.output_dir.display(), "Success");
    Ok(())
}

/// Open an event-loop result and check that it records its exposure.
fn open_store(path: &Path) -> anyhow::Result<HistogramFile> {
    let store = HistogramFile::open(path).with_context(|| format!("opening {}", path.display()))?;
    let pot = store.parameter(POT_USED).with_context(|| format!("in {}", path.display()))?;
    tracing::info!(path = %path.display(), pot, "histogram file");
    Ok(store)
}
