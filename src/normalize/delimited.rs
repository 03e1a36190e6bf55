use std::collections::HashSet;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};

use crate::coords::parse_pair;
use crate::record::{GeoRecord, Normalized, RecordSet};

/// Field map for semicolon-delimited station lists (`nsd_cccc.txt`).
///
/// Upstream has shipped the list with and without a state/province column,
/// which shifts every later position. Each variant describes one shape; the
/// first whose field count matches and whose latitude field looks like DMS
/// text is used for a given line. A new upstream shape that happens to share a
/// field count with a known one will be misread, so keep the state-width check
/// strict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelimitedLayout {
    pub delimiter: char,
    pub dms_separator: char,
    pub variants: Vec<DelimitedVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelimitedVariant {
    pub label: String,
    pub field_count: usize,
    pub id_field: usize,
    pub location_field: usize,
    /// When present, this field must be at most `state_max_len` characters for
    /// the variant to apply.
    #[serde(default)]
    pub state_field: Option<usize>,
    #[serde(default = "default_state_max_len")]
    pub state_max_len: usize,
    pub latitude_field: usize,
    pub longitude_field: usize,
}

fn default_state_max_len() -> usize {
    2
}

impl DelimitedVariant {
    fn max_index(&self) -> usize {
        [
            self.id_field,
            self.location_field,
            self.state_field.unwrap_or(0),
            self.latitude_field,
            self.longitude_field,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// A variant naming a field past its own `field_count` never matches.
    fn matches(&self, fields: &[&str]) -> bool {
        if fields.len() != self.field_count || self.max_index() >= self.field_count {
            return false;
        }
        if let Some(state) = self.state_field {
            if fields[state].trim().chars().count() > self.state_max_len {
                return false;
            }
        }
        fields[self.latitude_field]
            .trim()
            .ends_with(['N', 'S', 'n', 's'])
    }
}

/// Station ids that have a current-observation page upstream.
///
/// Stations missing from this set are dropped even when the main list carries
/// them; this is a data-quality gate, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    /// Collects the text of every `<station_id>` element of an XML station
    /// index. Reading stops at the first malformed construct, keeping the ids
    /// seen so far.
    pub fn from_station_index(xml: &str) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        reader.check_end_names(false);

        let mut ids = Vec::new();
        let mut in_station_id = false;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    in_station_id = e.local_name().as_ref().eq_ignore_ascii_case(b"station_id");
                }
                Ok(Event::End(_)) => in_station_id = false,
                Ok(Event::Text(e)) if in_station_id => match e.unescape() {
                    Ok(id) => ids.push(id.trim().to_string()),
                    Err(err) => tracing::debug!("station index: bad station id: {err}"),
                },
                Ok(Event::CData(e)) if in_station_id => {
                    ids.push(String::from_utf8_lossy(&e.into_inner()).trim().to_string());
                }
                Ok(Event::Eof) => break,
                Err(err) => {
                    tracing::debug!(
                        "station index: unreadable after byte {}: {err}",
                        reader.buffer_position()
                    );
                    break;
                }
                _ => {}
            }
        }
        ids.into_iter().filter(|id| !id.is_empty()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(&id.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter
                .into_iter()
                .map(|id| id.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }
}

/// Parses the station list. With `allow_list` set, only listed ids are kept.
pub fn parse(
    source_name: &str,
    layout: &DelimitedLayout,
    text: &str,
    allow_list: Option<&AllowList>,
) -> Normalized {
    let mut set = RecordSet::new();
    let mut not_listed = 0usize;

    for (offset, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let lineno = offset + 1;
        let fields: Vec<&str> = line.split(layout.delimiter).collect();

        let Some(variant) = layout.variants.iter().find(|v| v.matches(&fields)) else {
            tracing::debug!(
                "{source_name}: line {lineno} matches no known layout ({} fields)",
                fields.len()
            );
            set.skip();
            continue;
        };

        let id = fields[variant.id_field].trim();
        if id.is_empty() {
            set.skip();
            continue;
        }
        if let Some(allowed) = allow_list {
            if !allowed.contains(id) {
                not_listed += 1;
                set.skip();
                continue;
            }
        }

        let (lat, lon) = match parse_pair(
            fields[variant.latitude_field],
            fields[variant.longitude_field],
            Some(layout.dms_separator),
        ) {
            Ok(pair) => pair,
            Err(err) => {
                tracing::debug!("{source_name}: skipping {id} (line {lineno}): {err}");
                set.skip();
                continue;
            }
        };

        let location = fields[variant.location_field].trim();
        set.upsert(GeoRecord::new(id, id, location, lat, lon));
    }

    if not_listed > 0 {
        tracing::debug!("{source_name}: {not_listed} stations absent from the allow-list");
    }
    set.finish()
}
