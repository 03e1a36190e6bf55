use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Writer};

use crate::record::{GeoRecord, TableSchema};

#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl StoragePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir: PathBuf = data_dir.into();
        let cache_dir = data_dir.join("cache");
        Self {
            data_dir,
            cache_dir,
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn table_path(&self, output_file: &str) -> PathBuf {
        self.data_dir.join(output_file)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}

pub(crate) fn tmp_path(dest: &Path) -> PathBuf {
    let fname = dest
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("table");
    dest.with_file_name(format!("{fname}.tmp"))
}

/// Writes `records` sorted by id. The file only appears once it is complete.
pub fn write_records(path: &Path, schema: TableSchema, records: &[GeoRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed creating {}", parent.display()))?;
    }

    let mut sorted: Vec<&GeoRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let tmp = tmp_path(path);
    {
        let mut writer = Writer::from_path(&tmp)
            .with_context(|| format!("Failed creating {}", tmp.display()))?;
        writer
            .write_record(schema.header())
            .context("Failed writing table header")?;
        for record in sorted {
            writer
                .write_record(schema.cells(record))
                .with_context(|| format!("Failed writing row for {}", record.id))?;
        }
        writer.flush().context("Failed flushing table writer")?;
    }

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "Failed moving table {} to {}",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

pub fn read_records(path: &Path, schema: TableSchema) -> Result<Vec<GeoRecord>> {
    let file = fs::File::open(path).with_context(|| format!("Failed opening {}", path.display()))?;
    read_records_from_reader(file, schema)
        .with_context(|| format!("Failed reading table {}", path.display()))
}

pub fn read_records_from_reader(input: impl Read, schema: TableSchema) -> Result<Vec<GeoRecord>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(input);
    let headers = reader
        .headers()
        .context("Failed reading table headers")?
        .clone();

    let columns = schema.header();
    let idx = columns
        .iter()
        .map(|name| header_index(&headers, name))
        .collect::<Result<Vec<usize>>>()?;

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.context("Failed reading table row")?;
        let cell = |i: usize| row.get(idx[i]).unwrap_or("").trim();
        let record = match schema {
            TableSchema::Station => GeoRecord {
                id: cell(0).to_string(),
                name: cell(0).to_string(),
                location: cell(1).to_string(),
                latitude: parse_coordinate(cell(2)),
                longitude: parse_coordinate(cell(3)),
            },
            TableSchema::Zone => GeoRecord {
                id: cell(0).to_string(),
                name: cell(1).to_string(),
                location: cell(2).to_string(),
                latitude: parse_coordinate(cell(3)),
                longitude: parse_coordinate(cell(4)),
            },
        };
        out.push(record);
    }
    Ok(out)
}

/// Empty or unparsable cells read as absent; such rows are never matched.
fn parse_coordinate(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    match text.parse::<f64>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!("Ignoring coordinate '{text}': {err}");
            None
        }
    }
}

fn header_index(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .with_context(|| format!("CSV missing required header '{name}'"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn writes_sorted_rows_with_fixed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone.csv");
        let records = vec![
            GeoRecord::new("WIZ066", "Milwaukee", "Milwaukee", 43.0072, -87.9671),
            GeoRecord::new("ILZ014", "Cook", "Cook", 41.8397, -87.8166),
        ];
        write_records(&path, TableSchema::Zone, &records).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Zone,Zone_Name,County,Latitude,Longitude\n\
             ILZ014,Cook,Cook,41.8397,-87.8166\n\
             WIZ066,Milwaukee,Milwaukee,43.0072,-87.9671\n"
        );
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn station_rows_round_trip_with_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metar.csv");
        let records = vec![GeoRecord::new(
            "KMKE",
            "KMKE",
            "Milwaukee, General Mitchell International Airport",
            42.95,
            -87.9,
        )];
        write_records(&path, TableSchema::Station, &records).unwrap();
        assert!(file_present_nonempty(&path));
        assert_eq!(read_records(&path, TableSchema::Station).unwrap(), records);
    }

    #[test]
    fn empty_coordinates_read_back_as_absent() {
        let csv = "Name,Location,Latitude,Longitude\nKXXX,NOWHERE,,\n";
        let got = read_records_from_reader(csv.as_bytes(), TableSchema::Station).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].latitude, None);
        assert_eq!(got[0].coordinates(), None);
    }

    #[test]
    fn unparsable_coordinate_only_drops_its_row() {
        let csv = "Name,Location,Latitude,Longitude\n\
                   KMKE,MKE,42.95,-87.9\n\
                   KBAD,BAD,N/A,-88.0\n";
        let got = read_records_from_reader(csv.as_bytes(), TableSchema::Station).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].id, "KBAD");
        assert_eq!(got[1].latitude, None);
        assert_eq!(got[1].longitude, Some(-88.0));

        let found =
            crate::resolver::find_nearest(crate::resolver::Coordinate::new(42.9, -88.0), 5.0, &got)
                .unwrap();
        assert_eq!(found.record.id, "KMKE");
    }

    #[test]
    fn missing_header_is_an_error() {
        let csv = "Name,Location,Latitude\nKMKE,MKE,42.9\n";
        let err = read_records_from_reader(csv.as_bytes(), TableSchema::Station).unwrap_err();
        assert!(err.to_string().contains("Longitude"), "{err}");
    }

    #[test]
    fn missing_file_is_not_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!file_present_nonempty(&dir.path().join("absent.csv")));
        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "").unwrap();
        assert!(!file_present_nonempty(&empty));
    }
}
