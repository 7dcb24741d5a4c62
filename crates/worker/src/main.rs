use anyhow::Context;
use clap::Parser;
use foliorank_core::config::{PipelineConfig, Settings};
use foliorank_core::domain::normalize_instruments;
use foliorank_core::provider::{http::HttpJsonAnalysisProvider, stub::StubAnalysisProvider};
use foliorank_core::AnalysisProviders;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "foliorank_worker")]
struct Args {
    /// Ticker symbols to analyze, in priority order.
    #[arg(required = true)]
    symbols: Vec<String>,

    /// Use the built-in placeholder provider instead of ANALYSIS_PROVIDER_BASE_URL.
    #[arg(long)]
    stub: bool,

    /// Validate symbols and configuration, then exit without calling providers.
    #[arg(long)]
    dry_run: bool,

    /// Maximum instruments analyzed at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-instrument weight cap in (0, 1].
    #[arg(long)]
    cap: Option<f64>,

    #[arg(long)]
    min_diversification: Option<usize>,

    #[arg(long)]
    global_timeout_secs: Option<u64>,
}

impl Args {
    fn pipeline_config(&self, base: PipelineConfig) -> PipelineConfig {
        let mut cfg = base;
        if let Some(n) = self.concurrency {
            cfg.concurrency_limit = Some(n);
        }
        if let Some(cap) = self.cap {
            cfg.per_instrument_cap = cap;
        }
        if let Some(n) = self.min_diversification {
            cfg.min_diversification = n;
        }
        if let Some(secs) = self.global_timeout_secs {
            cfg.global_timeout = Duration::from_secs(secs);
        }
        cfg
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&args, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "pipeline run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: &Args, settings: &Settings) -> anyhow::Result<()> {
    let config = args.pipeline_config(PipelineConfig::from_env());

    if args.dry_run {
        let instruments = normalize_instruments(args.symbols.as_slice())?;
        config.validate(instruments.len())?;
        tracing::info!(
            dry_run = true,
            instruments = instruments.len(),
            concurrency = config.effective_concurrency(instruments.len()),
            cap = config.per_instrument_cap,
            min_diversification = config.min_diversification,
            "configuration valid; skipping analysis"
        );
        return Ok(());
    }

    let providers = build_providers(args.stub, settings)?;
    let report = foliorank_core::run_pipeline(args.symbols.as_slice(), &config, providers).await?;

    tracing::info!(
        run_id = %report.run_id,
        state = %report.state,
        overall_failure = report.overall_failure,
        "{}",
        report.summary.headline
    );

    let out = serde_json::to_string_pretty(&report).context("serialize pipeline report failed")?;
    println!("{out}");
    Ok(())
}

fn build_providers(stub: bool, settings: &Settings) -> anyhow::Result<AnalysisProviders> {
    if stub {
        tracing::warn!("using placeholder analysis provider");
        return Ok(AnalysisProviders::from_single(Arc::new(
            StubAnalysisProvider::new(),
        )));
    }
    let http = HttpJsonAnalysisProvider::from_settings(settings)?;
    Ok(AnalysisProviders::from_single(Arc::new(http)))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
