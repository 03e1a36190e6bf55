use serde::{Deserialize, Serialize};

use crate::coords::parse_pair;
use crate::error::IngestError;
use crate::record::{GeoRecord, Normalized, RecordSet};

/// Field map for a fixed-width station table such as the NCEI
/// `nexrad-stations.txt` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedWidthLayout {
    pub id_column: String,
    pub name_column: String,
    /// Tried in order; the first non-empty value is appended to the name.
    pub region_columns: Vec<String>,
    pub latitude_column: String,
    pub longitude_column: String,
    /// Set when the table carries DMS text instead of decimal degrees.
    #[serde(default)]
    pub dms_separator: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Column boundaries read from a header line and the dashed line below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    columns: Vec<Column>,
}

impl ColumnSpec {
    /// A column starts at every position where the separator line is not a
    /// dash. Offsets are in characters. Gaps of blanks between dashed runs
    /// produce empty names and are dropped.
    pub fn derive(header: &str, separator: &str) -> Self {
        let header: Vec<char> = header.chars().collect();
        let separator: Vec<char> = separator.chars().collect();

        let mut columns = Vec::new();
        let mut start = 0;
        for pos in 1..header.len() {
            if separator.get(pos) == Some(&'-') {
                continue;
            }
            push_column(&mut columns, &header, start, pos);
            start = pos;
        }
        push_column(&mut columns, &header, start, header.len());

        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Trimmed field text for each column. Lines shorter than the header give
    /// empty trailing fields; the last column runs to the end of the line.
    pub fn slice(&self, line: &str) -> Vec<String> {
        let chars: Vec<char> = line.chars().collect();
        let last = self.columns.len().saturating_sub(1);
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let end = if idx == last { chars.len() } else { col.end };
                let start = col.start.min(chars.len());
                let end = end.min(chars.len()).max(start);
                chars[start..end].iter().collect::<String>().trim().to_string()
            })
            .collect()
    }
}

fn push_column(columns: &mut Vec<Column>, header: &[char], start: usize, end: usize) {
    let name: String = header[start..end].iter().collect();
    let name = name.trim();
    if !name.is_empty() {
        columns.push(Column {
            name: name.to_string(),
            start,
            end,
        });
    }
}

pub fn parse(
    source_name: &str,
    layout: &FixedWidthLayout,
    text: &str,
) -> Result<Normalized, IngestError> {
    let mut lines = text.lines();
    let (Some(header), Some(separator)) = (lines.next(), lines.next()) else {
        return Err(IngestError::malformed_table(
            source_name,
            "expected a header line and a dashed separator line",
        ));
    };
    if !separator.contains('-') {
        return Err(IngestError::malformed_table(
            source_name,
            "second line is not a dashed separator",
        ));
    }

    let spec = ColumnSpec::derive(header, separator);
    let column = |name: &str| {
        spec.index_of(name).ok_or_else(|| {
            IngestError::malformed_table(source_name, format!("column '{name}' not in header"))
        })
    };
    let id_idx = column(&layout.id_column)?;
    let name_idx = column(&layout.name_column)?;
    let lat_idx = column(&layout.latitude_column)?;
    let lon_idx = column(&layout.longitude_column)?;
    let region_idx = layout
        .region_columns
        .iter()
        .map(|c| column(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut set = RecordSet::new();
    for (offset, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let lineno = offset + 3;
        let fields = spec.slice(line);

        let id = fields[id_idx].as_str();
        if id.is_empty() {
            tracing::debug!("{source_name}: line {lineno} has no {}", layout.id_column);
            set.skip();
            continue;
        }

        let (lat, lon) =
            match parse_pair(&fields[lat_idx], &fields[lon_idx], layout.dms_separator) {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::debug!("{source_name}: skipping {id} (line {lineno}): {err}");
                    set.skip();
                    continue;
                }
            };

        let region = region_idx
            .iter()
            .map(|&i| fields[i].as_str())
            .find(|v| !v.is_empty())
            .unwrap_or("");
        let location = format!("{} {}", fields[name_idx], region)
            .trim()
            .to_string();

        set.upsert(GeoRecord::new(id, id, location, lat, lon));
    }

    Ok(set.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radar_layout() -> FixedWidthLayout {
        FixedWidthLayout {
            id_column: "ICAO".into(),
            name_column: "NAME".into(),
            region_columns: vec!["ST".into(), "COUNTRY".into()],
            latitude_column: "LAT".into(),
            longitude_column: "LON".into(),
            dms_separator: None,
        }
    }

    const RADAR_TABLE: &str = "\
NCDCID   ICAO NAME                 COUNTRY       ST LAT       LON
-------- ---- -------------------- ------------- -- --------- -----------
30001795 KMKX MILWAUKEE            UNITED STATES WI 42.967800 -88.550670
30001796 RKSG CAMP HUMPHREYS       KOREA, REP OF    36.955700 127.021100
30001797 KXXX NOWHERE              UNITED STATES WI
30001798 KGRB GREEN BAY            UNITED STATES WI 44.498330 -88.111110

";

    #[test]
    fn derives_columns_from_dashes() {
        let spec = ColumnSpec::derive("NAME ST  LAT", "---- --  ---");
        let got: Vec<(&str, usize, usize)> = spec
            .columns()
            .iter()
            .map(|c| (c.name.as_str(), c.start, c.end))
            .collect();
        assert_eq!(got, vec![("NAME", 0, 4), ("ST", 4, 7), ("LAT", 8, 12)]);
    }

    #[test]
    fn short_lines_give_empty_trailing_fields() {
        let spec = ColumnSpec::derive("NAME ST  LAT", "---- --  ---");
        assert_eq!(spec.slice("MKE  WI"), vec!["MKE", "WI", ""]);
        assert_eq!(spec.slice("AB"), vec!["AB", "", ""]);
        assert_eq!(spec.slice("MKE  WI  43.0123"), vec!["MKE", "WI", "43.0123"]);
    }

    #[test]
    fn maps_radar_table() {
        let out = parse("radar", &radar_layout(), RADAR_TABLE).unwrap();
        assert_eq!(out.skipped, 1);
        let ids: Vec<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["KGRB", "KMKX", "RKSG"]);

        let mkx = &out.records[1];
        assert_eq!(mkx.name, "KMKX");
        assert_eq!(mkx.location, "MILWAUKEE WI");
        assert_eq!(mkx.coordinates(), Some((42.9678, -88.55067)));

        // No state: falls back to the country column.
        assert_eq!(out.records[2].location, "CAMP HUMPHREYS KOREA, REP OF");
    }

    #[test]
    fn converts_dms_when_flagged() {
        let table = "\
ICAO NAME      ST LAT       LON
---- --------- -- --------- ----------
KABC SOMEWHERE WI 43-00-36N 088-30-00W
";
        let layout = FixedWidthLayout {
            region_columns: vec!["ST".into()],
            dms_separator: Some('-'),
            ..radar_layout()
        };
        let out = parse("radar", &layout, table).unwrap();
        assert_eq!(out.records[0].coordinates(), Some((43.01, -88.5)));
    }

    #[test]
    fn missing_column_fails_the_table() {
        let err = parse("radar", &radar_layout(), "ICAO NAME\n---- ----\n").unwrap_err();
        assert!(matches!(err, IngestError::MalformedTable { .. }));

        let err = parse("radar", &radar_layout(), "ICAO NAME\n").unwrap_err();
        assert!(matches!(err, IngestError::MalformedTable { .. }));
    }
}
