use serde::{Deserialize, Serialize};

use crate::coords::parse_pair;
use crate::record::{GeoRecord, Normalized, RecordSet};

/// Field map for the county/forecast-zone correlation file (`bp*.dbx`).
///
/// Upstream columns: state, zone, warning area, zone name, state+zone, county,
/// FIPS, time zone, FE area, latitude, longitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeLayout {
    pub delimiter: char,
    pub zone_field: usize,
    /// Shorter zone codes are header/footer noise.
    pub min_zone_len: usize,
    pub name_field: usize,
    pub county_field: usize,
    pub latitude_field: usize,
    pub longitude_field: usize,
}

impl Default for PipeLayout {
    fn default() -> Self {
        Self {
            delimiter: '|',
            zone_field: 4,
            min_zone_len: 5,
            name_field: 3,
            county_field: 5,
            latitude_field: 9,
            longitude_field: 10,
        }
    }
}

impl PipeLayout {
    fn required_fields(&self) -> usize {
        [
            self.zone_field,
            self.name_field,
            self.county_field,
            self.latitude_field,
            self.longitude_field,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

pub fn parse(source_name: &str, layout: &PipeLayout, text: &str) -> Normalized {
    let required = layout.required_fields();
    let mut set = RecordSet::new();

    for (offset, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(layout.delimiter).map(str::trim).collect();
        if fields.len() < required {
            tracing::debug!(
                "{source_name}: line {} has {} fields, need {required}",
                offset + 1,
                fields.len()
            );
            set.skip();
            continue;
        }

        let zone = fields[layout.zone_field];
        if zone.chars().count() < layout.min_zone_len {
            set.skip();
            continue;
        }

        let (lat, lon) = match parse_pair(
            fields[layout.latitude_field],
            fields[layout.longitude_field],
            None,
        ) {
            Ok(pair) => pair,
            Err(err) => {
                tracing::debug!("{source_name}: skipping zone {zone}: {err}");
                set.skip();
                continue;
            }
        };

        set.upsert(GeoRecord::new(
            zone,
            fields[layout.name_field],
            fields[layout.county_field],
            lat,
            lon,
        ));
    }

    set.finish()
}
