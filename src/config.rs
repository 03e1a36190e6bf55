use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactIndex;
use crate::constants::{
    METAR_ALLOW_LIST_URL, METAR_STATIONS_URL, RADAR_KMZ_URL, RADAR_TABLE_URL, ZONE_INDEX_MARKER,
    ZONE_INDEX_URL,
};
use crate::normalize::{
    DelimitedLayout, DelimitedVariant, FixedWidthLayout, KmlLayout, PipeLayout, SourceFormat,
};
use crate::record::TableSchema;

/// One upstream listing and how to turn it into a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Key used for this table in `nearest` output.
    pub label: String,
    pub table: TableSchema,
    /// The listing itself, or the index page when `index` is set.
    pub url: String,
    pub format: SourceFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<ArtifactIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_list: Option<AllowListSource>,
    pub output_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowListSource {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub sources: Vec<SourceConfig>,
}

impl BuildConfig {
    pub fn defaults() -> Self {
        Self {
            sources: vec![
                SourceConfig::radar_table(),
                SourceConfig::metar(),
                SourceConfig::zones(),
            ],
        }
    }

    /// Stock set plus the retired KMZ radar feed, written to its own table.
    pub fn with_legacy() -> Self {
        let mut config = Self::defaults();
        config.sources.push(SourceConfig::radar_kmz());
        config
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed parsing config {}", path.display()))?;
        Ok(config)
    }

    /// `path` when given, otherwise the stock set.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::defaults()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed encoding config")
    }
}

impl SourceConfig {
    pub fn radar_table() -> Self {
        Self {
            name: "radar".to_string(),
            label: "Radar".to_string(),
            table: TableSchema::Station,
            url: RADAR_TABLE_URL.to_string(),
            format: SourceFormat::FixedWidth(FixedWidthLayout {
                id_column: "ICAO".to_string(),
                name_column: "NAME".to_string(),
                region_columns: vec!["ST".to_string(), "COUNTRY".to_string()],
                latitude_column: "LAT".to_string(),
                longitude_column: "LON".to_string(),
                dms_separator: None,
            }),
            index: None,
            allow_list: None,
            output_file: "radar.csv".to_string(),
        }
    }

    pub fn radar_kmz() -> Self {
        Self {
            name: "radar-kmz".to_string(),
            label: "Radar".to_string(),
            table: TableSchema::Station,
            url: RADAR_KMZ_URL.to_string(),
            format: SourceFormat::Kml(KmlLayout::default()),
            index: None,
            allow_list: None,
            output_file: "radar-kmz.csv".to_string(),
        }
    }

    pub fn metar() -> Self {
        let variant = |label: &str, field_count, state_field: Option<usize>| {
            let shift = usize::from(state_field.is_some());
            DelimitedVariant {
                label: label.to_string(),
                field_count,
                id_field: 0,
                location_field: 3,
                state_field,
                state_max_len: 2,
                latitude_field: 6 + shift,
                longitude_field: 7 + shift,
            }
        };
        Self {
            name: "metar".to_string(),
            label: "Observation".to_string(),
            table: TableSchema::Station,
            url: METAR_STATIONS_URL.to_string(),
            format: SourceFormat::Delimited(DelimitedLayout {
                delimiter: ';',
                dms_separator: '-',
                variants: vec![
                    variant("with-state", 14, Some(4)),
                    variant("without-state", 13, None),
                ],
            }),
            index: None,
            allow_list: Some(AllowListSource {
                url: METAR_ALLOW_LIST_URL.to_string(),
            }),
            output_file: "metar.csv".to_string(),
        }
    }

    pub fn zones() -> Self {
        Self {
            name: "zone".to_string(),
            label: "Zone".to_string(),
            table: TableSchema::Zone,
            url: ZONE_INDEX_URL.to_string(),
            format: SourceFormat::PipeDelimited(PipeLayout::default()),
            index: Some(ArtifactIndex {
                marker: ZONE_INDEX_MARKER.to_string(),
                date_format: "%d %B %Y".to_string(),
            }),
            allow_list: None,
            output_file: "zone.csv".to_string(),
        }
    }
}
