use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};

use crate::coords::parse_pair;
use crate::error::IngestError;
use crate::record::{GeoRecord, Normalized, RecordSet};

/// Field map for placemark descriptions in the legacy NEXRAD KML/KMZ feed.
/// Each `<description>` holds `Label: value` segments separated by `<BR>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KmlLayout {
    /// Entry to read when the body is a KMZ archive.
    pub archive_entry: String,
    pub id_segment: usize,
    pub location_segment: usize,
    pub latitude_segment: usize,
    pub longitude_segment: usize,
    #[serde(default)]
    pub dms_separator: Option<char>,
}

impl Default for KmlLayout {
    fn default() -> Self {
        Self {
            archive_entry: "doc.kml".to_string(),
            id_segment: 0,
            location_segment: 1,
            latitude_segment: 2,
            longitude_segment: 3,
            dms_separator: None,
        }
    }
}

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

/// Reads `entry` out of a KMZ archive, falling back to the first `.kml` file.
pub fn unpack_kmz(bytes: &[u8], entry: &str) -> Result<String, IngestError> {
    let archive_err = |reason: String| IngestError::Archive {
        entry: entry.to_string(),
        reason,
    };

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| archive_err(e.to_string()))?;

    let mut chosen_index: Option<usize> = None;
    for i in 0..archive.len() {
        let name = archive
            .by_index(i)
            .map_err(|e| archive_err(e.to_string()))?
            .name()
            .to_string();
        if name == entry || name.ends_with(&format!("/{entry}")) {
            chosen_index = Some(i);
            break;
        }
        if chosen_index.is_none() && name.ends_with(".kml") {
            chosen_index = Some(i);
        }
    }
    let idx = chosen_index.ok_or_else(|| archive_err("no .kml file in archive".to_string()))?;

    let mut file = archive
        .by_index(idx)
        .map_err(|e| archive_err(e.to_string()))?;
    let mut text = String::new();
    file.read_to_string(&mut text)
        .map_err(|e| archive_err(e.to_string()))?;
    Ok(text)
}

pub fn parse(source_name: &str, layout: &KmlLayout, text: &str) -> Normalized {
    let mut set = RecordSet::new();
    for description in descriptions(source_name, text) {
        match description {
            Some(html) => read_placemark(source_name, layout, &html, &mut set),
            None => set.skip(),
        }
    }
    set.finish()
}

/// Markup of every `<description>` element, text and CDATA alike. `None`
/// marks a description the document ends inside of.
fn descriptions(source_name: &str, text: &str) -> Vec<Option<String>> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut found = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if is_description(e.local_name().as_ref()) => {
                current = Some(String::new());
            }
            Ok(Event::End(e)) if is_description(e.local_name().as_ref()) => {
                if let Some(html) = current.take() {
                    found.push(Some(html));
                }
            }
            // Unescaped line breaks inside the description.
            Ok(Event::Start(e) | Event::Empty(e))
                if current.is_some() && e.local_name().as_ref().eq_ignore_ascii_case(b"br") =>
            {
                if let Some(html) = current.as_mut() {
                    html.push_str("<br>");
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(html) = current.as_mut() {
                    match e.unescape() {
                        Ok(value) => html.push_str(&value),
                        Err(err) => tracing::debug!("{source_name}: bad text in description: {err}"),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(html) = current.as_mut() {
                    html.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::debug!(
                    "{source_name}: KML unreadable after byte {}: {err}",
                    reader.buffer_position()
                );
                break;
            }
            _ => {}
        }
    }
    if current.is_some() {
        found.push(None);
    }
    found
}

fn is_description(name: &[u8]) -> bool {
    name.eq_ignore_ascii_case(b"description")
}

fn read_placemark(source_name: &str, layout: &KmlLayout, html: &str, set: &mut RecordSet) {
    let needed = [
        layout.id_segment,
        layout.location_segment,
        layout.latitude_segment,
        layout.longitude_segment,
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
        + 1;

    let segments = segments(html);
    if segments.len() < needed {
        tracing::debug!(
            "{source_name}: placemark with {} segments, need {needed}",
            segments.len()
        );
        set.skip();
        return;
    }

    let id = segments[layout.id_segment].as_str();
    if id.is_empty() {
        set.skip();
        return;
    }
    match parse_pair(
        &segments[layout.latitude_segment],
        &segments[layout.longitude_segment],
        layout.dms_separator,
    ) {
        Ok((lat, lon)) => set.upsert(GeoRecord::new(
            id,
            id,
            segments[layout.location_segment].as_str(),
            lat,
            lon,
        )),
        Err(err) => {
            tracing::debug!("{source_name}: skipping {id}: {err}");
            set.skip();
        }
    }
}

/// Splits description markup at `<br>` into the values of its
/// `<b>Label:</b> value` segments.
fn segments(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let mut texts = vec![String::new()];
    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Element(element) if element.name() == "br" => texts.push(String::new()),
            Node::Text(text) => {
                if let Some(current) = texts.last_mut() {
                    current.push_str(text);
                }
            }
            _ => {}
        }
    }
    texts.iter().map(|text| segment_value(text)).collect()
}

fn segment_value(segment: &str) -> String {
    let text = segment.split_whitespace().collect::<Vec<_>>().join(" ");
    match text.split_once(':') {
        Some((_, value)) => value.trim().to_string(),
        None => text,
    }
}
