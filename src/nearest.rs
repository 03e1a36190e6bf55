use std::path::Path;

use anyhow::Context;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::cli::NearestArgs;
use crate::config::{BuildConfig, SourceConfig};
use crate::record::{GeoRecord, TableSchema};
use crate::resolver::{Coordinate, NearestMatch, find_nearest};
use crate::retrieve::{HttpRetriever, Retrieve};
use crate::storage::{StoragePaths, read_records, read_records_from_reader};

/// A loaded table tagged with the label it is reported under.
#[derive(Debug, Clone)]
pub struct LabelledTable {
    pub label: String,
    pub schema: TableSchema,
    pub records: Vec<GeoRecord>,
}

#[derive(Debug)]
pub struct ReportEntry<'a> {
    pub label: String,
    /// Column names the match is reported under.
    pub schema: TableSchema,
    pub found: Option<NearestMatch<'a>>,
}

/// Closest record per label, in the order the labels were first configured.
///
/// Serializes as a JSON object. Each match is keyed by the columns of its
/// table (`Name`, `Location`, ... or `Zone`, `Zone_Name`, ...) plus
/// `distance_km`; a label without a match maps to `null`.
#[derive(Debug)]
pub struct NearestReport<'a> {
    pub entries: Vec<ReportEntry<'a>>,
}

impl Serialize for NearestReport<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            let row = entry.found.as_ref().map(|found| TableRow {
                schema: entry.schema,
                found,
            });
            map.serialize_entry(&entry.label, &row)?;
        }
        map.end()
    }
}

struct TableRow<'r, 'a> {
    schema: TableSchema,
    found: &'r NearestMatch<'a>,
}

impl Serialize for TableRow<'_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let header = self.schema.header();
        let mut map = serializer.serialize_map(Some(header.len() + 1))?;
        for (name, value) in header.iter().zip(self.schema.cells(self.found.record)) {
            map.serialize_entry(name, &value)?;
        }
        map.serialize_entry("distance_km", &self.found.distance_km)?;
        map.end()
    }
}

/// Tables sharing a label are searched together, earlier tables first.
pub fn nearest_by_label<'a>(
    tables: &'a [LabelledTable],
    reference: Coordinate,
    half_width_degrees: f64,
) -> NearestReport<'a> {
    // The first table configured under a label names its columns.
    let mut labels: Vec<(&str, TableSchema)> = Vec::new();
    for table in tables {
        if !labels.iter().any(|(label, _)| *label == table.label) {
            labels.push((table.label.as_str(), table.schema));
        }
    }

    let entries = labels
        .into_iter()
        .map(|(label, schema)| {
            let candidates = tables
                .iter()
                .filter(|t| t.label == label)
                .flat_map(|t| t.records.iter());
            ReportEntry {
                label: label.to_string(),
                schema,
                found: find_nearest(reference, half_width_degrees, candidates),
            }
        })
        .collect();
    NearestReport { entries }
}

pub async fn run(opts: NearestArgs) -> anyhow::Result<()> {
    let config = BuildConfig::load_or_default(opts.config.as_deref().map(Path::new))?;
    let paths = StoragePaths::new(&opts.data_dir);

    let tables = if opts.mirror {
        let cache_dir = opts
            .cache_dir
            .as_deref()
            .map(Into::into)
            .unwrap_or_else(|| paths.cache_dir.clone());
        let retriever = HttpRetriever::new(cache_dir)?;
        load_from_mirror(&retriever, &opts.mirror_url, &config.sources).await
    } else {
        load_local(&paths, &config.sources)
    };

    let reference = Coordinate::new(opts.lat, opts.lon);
    let report = nearest_by_label(&tables, reference, opts.half_width);
    let json = serde_json::to_string_pretty(&report).context("encode nearest report")?;
    println!("{json}");
    Ok(())
}

fn load_local(paths: &StoragePaths, sources: &[SourceConfig]) -> Vec<LabelledTable> {
    sources
        .iter()
        .map(|source| {
            let path = paths.table_path(&source.output_file);
            let records = read_records(&path, source.table).unwrap_or_else(|err| {
                tracing::warn!(
                    "{}: no usable table at {} (run `build` first?): {err:#}",
                    source.name,
                    path.display()
                );
                Vec::new()
            });
            LabelledTable {
                label: source.label.clone(),
                schema: source.table,
                records,
            }
        })
        .collect()
}

/// Reads each table from `{mirror_url}{output_file}`.
pub async fn load_from_mirror<R: Retrieve>(
    retriever: &R,
    mirror_url: &str,
    sources: &[SourceConfig],
) -> Vec<LabelledTable> {
    let mut tables = Vec::with_capacity(sources.len());
    for source in sources {
        let url = format!("{mirror_url}{}", source.output_file);
        let records = match fetch_table(retriever, &url, source).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!("{}: mirror copy unusable: {err:#}", source.name);
                Vec::new()
            }
        };
        tables.push(LabelledTable {
            label: source.label.clone(),
            schema: source.table,
            records,
        });
    }
    tables
}

async fn fetch_table<R: Retrieve>(
    retriever: &R,
    url: &str,
    source: &SourceConfig,
) -> anyhow::Result<Vec<GeoRecord>> {
    let (body, _) = retriever.retrieve(url).await?.into_content()?;
    read_records_from_reader(body.as_slice(), source.table).with_context(|| format!("parse {url}"))
}
