//! `xsec event-loop`

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use xs_core::EventSource;
use xs_event::{
    AnalysisConfig, ColumnarSource, Exposure, FluxConfig, FluxIntegration, FluxSpectrum, Pass,
};
use xs_hist::{HistogramFile, HistogramStore};

use crate::exit::{ExitOn, Failure, Status};

pub struct Args {
    pub config: PathBuf,
    pub mc: PathBuf,
    pub truth: PathBuf,
    pub data: PathBuf,
    pub mc_pot: Option<f64>,
    pub data_pot: Option<f64>,
    pub skip_systematics: bool,
    pub mc_out: PathBuf,
    pub data_out: PathBuf,
}

pub fn run(args: Args) -> Result<(), Failure> {
    let bad_input = Status::BadInputFile as u8;

    tracing::info!(path = %args.config.display(), "loading analysis configuration");
    let mut config = AnalysisConfig::open(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))
        .exit_on(bad_input)?;
    if args.skip_systematics {
        config.variations.skip_systematics = true;
    }
    let base = args.config.parent().unwrap_or_else(|| Path::new("."));
    let flux = config
        .flux
        .as_ref()
        .map(|f| load_flux(f, base))
        .transpose()
        .exit_on(bad_input)?;
    let mut event_loop = config.build().context("building the event loop").exit_on(bad_input)?;

    let mut mc = open_source(&args.mc).exit_on(bad_input)?;
    let mut truth = open_source(&args.truth).exit_on(bad_input)?;
    let mut data = open_source(&args.data).exit_on(bad_input)?;
    let mc_pot = args
        .mc_pot
        .or(mc.pot())
        .ok_or_else(|| anyhow!("{}: no exposure recorded; pass --mc-pot", args.mc.display()))
        .exit_on(bad_input)?;
    let data_pot = args
        .data_pot
        .or(data.pot())
        .ok_or_else(|| anyhow!("{}: no exposure recorded; pass --data-pot", args.data.display()))
        .exit_on(bad_input)?;

    let bad_read = Status::BadFileRead as u8;
    let summaries = [
        event_loop.run_mc_reco(&mut mc).context("MC reco pass").exit_on(bad_read)?,
        event_loop.run_truth(&mut truth).context("truth pass").exit_on(bad_read)?,
        event_loop.run_data(&mut data).context("data pass").exit_on(bad_read)?,
    ];
    for s in &summaries {
        for (region, stats) in &s.cut_stats {
            let table = if s.pass == Pass::Truth { &stats.truth } else { &stats.reco };
            tracing::info!(
                pass = %s.pass,
                region = %region,
                entries = s.n_entries,
                selected = table.last().raw,
                "pass complete"
            );
        }
    }

    let output = event_loop
        .finish(Exposure { mc_pot, data_pot }, flux.as_ref())
        .context("collecting histograms")
        .exit_on(bad_input)?;
    output
        .write(&args.mc_out, &args.data_out)
        .with_context(|| {
            format!("writing {} and {}", args.mc_out.display(), args.data_out.display())
        })
        .exit_on(Status::BadOutputFile as u8)?;
    tracing::info!(mc_pot, data_pot, "Success");
    Ok(())
}

fn open_source(path: &Path) -> anyhow::Result<ColumnarSource> {
    let source =
        ColumnarSource::open(path).with_context(|| format!("opening {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        kind = %source.kind(),
        entries = source.n_entries(),
        "event source"
    );
    Ok(source)
}

fn load_flux(cfg: &FluxConfig, base: &Path) -> anyhow::Result<FluxIntegration> {
    let path = base.join(&cfg.file);
    let file = HistogramFile::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let hist = file.hist1d(&cfg.histogram).with_context(|| format!("in {}", path.display()))?;
    let spectrum = FluxSpectrum::new(hist.clone())?;
    Ok(FluxIntegration { spectrum, e_min: cfg.e_min, e_max: cfg.e_max })
}
