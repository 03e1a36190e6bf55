use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One normalized location: a radar site, an observation station or a forecast
/// zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub id: String,
    pub name: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    /// Both coordinates, or `None` when either is absent.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Column layout of a persisted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSchema {
    /// `Name, Location, Latitude, Longitude` (radar sites and METAR stations).
    Station,
    /// `Zone, Zone_Name, County, Latitude, Longitude`.
    Zone,
}

impl TableSchema {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            TableSchema::Station => &["Name", "Location", "Latitude", "Longitude"],
            TableSchema::Zone => &["Zone", "Zone_Name", "County", "Latitude", "Longitude"],
        }
    }

    /// Cell text of `record` in `header()` order. Absent coordinates are empty.
    pub fn cells(self, record: &GeoRecord) -> Vec<String> {
        let lat = format_coordinate(record.latitude);
        let lon = format_coordinate(record.longitude);
        match self {
            TableSchema::Station => vec![record.id.clone(), record.location.clone(), lat, lon],
            TableSchema::Zone => vec![
                record.id.clone(),
                record.name.clone(),
                record.location.clone(),
                lat,
                lon,
            ],
        }
    }
}

fn format_coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Accumulates parsed rows keyed by id. A later row with the same id replaces
/// the earlier one.
#[derive(Debug, Default)]
pub struct RecordSet {
    by_id: BTreeMap<String, GeoRecord>,
    skipped: usize,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, record: GeoRecord) {
        self.by_id.insert(record.id.clone(), record);
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn finish(self) -> Normalized {
        Normalized {
            records: self.by_id.into_values().collect(),
            skipped: self.skipped,
        }
    }
}

/// Output of one normalization run. `records` is ordered by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub records: Vec<GeoRecord>,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_duplicate_replaces_earlier() {
        let mut set = RecordSet::new();
        set.upsert(GeoRecord::new("KMKX", "KMKX", "first", 1.0, 2.0));
        set.upsert(GeoRecord::new("KGRB", "KGRB", "other", 3.0, 4.0));
        set.upsert(GeoRecord::new("KMKX", "KMKX", "second", 5.0, 6.0));
        set.skip();

        let out = set.finish();
        assert_eq!(out.skipped, 1);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].id, "KGRB");
        assert_eq!(out.records[1].location, "second");
    }

    #[test]
    fn coordinates_require_both_axes() {
        let mut rec = GeoRecord::new("A", "A", "", 1.0, 2.0);
        assert_eq!(rec.coordinates(), Some((1.0, 2.0)));
        rec.longitude = None;
        assert_eq!(rec.coordinates(), None);
    }
}
