use std::path::Path;
use std::time::Instant;

use anyhow::{Context, bail};
use chrono::NaiveDate;

use crate::artifact::resolve_current;
use crate::cli::BuildArgs;
use crate::config::{BuildConfig, SourceConfig};
use crate::error::IngestError;
use crate::normalize::{AllowList, decode, normalize};
use crate::retrieve::{Freshness, HttpRetriever, Retrieve};
use crate::storage::{StoragePaths, file_present_nonempty, write_records};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Updated { records: usize, skipped: usize },
    /// Upstream unchanged and the table already exists.
    Unchanged,
    Failed { reason: String },
}

pub async fn run(opts: BuildArgs) -> anyhow::Result<()> {
    tracing::info!("weather_db build");
    tracing::info!("data_dir={}", opts.data_dir);
    if opts.force {
        tracing::info!("force=true (will rewrite tables even when sources are unchanged)");
    }

    let mut paths = StoragePaths::new(&opts.data_dir);
    if let Some(cache_dir) = &opts.cache_dir {
        paths = paths.with_cache_dir(cache_dir);
    }
    paths.ensure_dirs().context("create data directories")?;

    let mut config = BuildConfig::load_or_default(opts.config.as_deref().map(Path::new))?;
    if opts.include_legacy {
        config.sources.push(SourceConfig::radar_kmz());
    }
    let today = opts
        .as_of
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    tracing::info!("{} sources, selecting releases as of {today}", config.sources.len());

    let retriever = HttpRetriever::new(&paths.cache_dir)?;
    let outcomes = build_all(&retriever, &config, &paths, opts.force, today).await;

    let failed = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, SourceOutcome::Failed { .. }))
        .count();
    for (name, outcome) in &outcomes {
        match outcome {
            SourceOutcome::Updated { records, skipped } => {
                tracing::info!("{name}: {records} records written, {skipped} rows skipped")
            }
            SourceOutcome::Unchanged => tracing::info!("{name}: unchanged"),
            SourceOutcome::Failed { reason } => tracing::info!("{name}: failed ({reason})"),
        }
    }

    if !outcomes.is_empty() && failed == outcomes.len() {
        bail!("all {failed} sources failed");
    }
    tracing::info!("Build complete: {}", paths.data_dir.display());
    Ok(())
}

/// Builds every configured source in order. A failing source is logged and
/// reported; it never stops the others.
pub async fn build_all<R: Retrieve>(
    retriever: &R,
    config: &BuildConfig,
    paths: &StoragePaths,
    force: bool,
    today: NaiveDate,
) -> Vec<(String, SourceOutcome)> {
    let total = config.sources.len();
    let mut outcomes = Vec::with_capacity(total);

    for (i, source) in config.sources.iter().enumerate() {
        tracing::info!("Step {}/{total}: {} ({})", i + 1, source.name, source.format.kind());
        let t0 = Instant::now();
        let outcome = match build_source(retriever, source, paths, force, today).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn_failure(&source.name, &err);
                SourceOutcome::Failed {
                    reason: format!("{err:#}"),
                }
            }
        };
        tracing::debug!("{} finished in {:.1}s", source.name, t0.elapsed().as_secs_f64());
        outcomes.push((source.name.clone(), outcome));
    }
    outcomes
}

async fn build_source<R: Retrieve>(
    retriever: &R,
    source: &SourceConfig,
    paths: &StoragePaths,
    force: bool,
    today: NaiveDate,
) -> anyhow::Result<SourceOutcome> {
    let output = paths.table_path(&source.output_file);

    let (body, freshness) = fetch(retriever, &source.url).await?;
    let (body, freshness) = match &source.index {
        Some(index) => {
            let (artifact, url) = resolve_current(&decode(&body), &source.url, index, today)?;
            tracing::info!(
                "{}: current release published {} at {url}",
                source.name,
                artifact.published
            );
            fetch(retriever, &url).await?
        }
        None => (body, freshness),
    };

    if freshness == Freshness::Unchanged && !force && file_present_nonempty(&output) {
        tracing::info!(
            "{} unchanged upstream and {} exists; skipping",
            source.name,
            output.display()
        );
        return Ok(SourceOutcome::Unchanged);
    }

    let allow_list = match &source.allow_list {
        Some(allow) => {
            let (xml, _) = fetch(retriever, &allow.url)
                .await
                .with_context(|| format!("fetch allow-list for {}", source.name))?;
            let list = AllowList::from_station_index(&decode(&xml));
            tracing::info!("{}: {} stations on the allow-list", source.name, list.len());
            Some(list)
        }
        None => None,
    };

    let normalized = normalize(&source.name, &source.format, &body, allow_list.as_ref())?;
    if normalized.records.is_empty() {
        return Err(IngestError::malformed_table(
            &source.name,
            format!("no usable records ({} rows skipped)", normalized.skipped),
        )
        .into());
    }

    write_records(&output, source.table, &normalized.records)
        .with_context(|| format!("write {}", output.display()))?;
    Ok(SourceOutcome::Updated {
        records: normalized.records.len(),
        skipped: normalized.skipped,
    })
}

async fn fetch<R: Retrieve>(retriever: &R, url: &str) -> anyhow::Result<(Vec<u8>, Freshness)> {
    let retrieved = retriever.retrieve(url).await?;
    Ok(retrieved.into_content()?)
}

fn warn_failure(name: &str, err: &anyhow::Error) {
    match err.downcast_ref::<IngestError>() {
        Some(IngestError::NoCandidateArtifact { .. }) => {
            tracing::warn!("{name}: no current release on the index page; table left as is: {err:#}")
        }
        Some(IngestError::RetrievalFailure { .. }) => {
            tracing::warn!("{name}: source unavailable; table left as is: {err:#}")
        }
        Some(IngestError::MalformedTable { .. } | IngestError::Archive { .. }) => {
            tracing::warn!("{name}: source not in the expected shape: {err:#}")
        }
        _ => tracing::warn!("{name}: build failed: {err:#}"),
    }
}
