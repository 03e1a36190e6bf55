//! Source-format strategies. Every strategy turns raw upstream text into the
//! same [`Normalized`] record sequence; which one runs is decided by the
//! source's configured [`SourceFormat`].

pub mod delimited;
pub mod fixed_width;
pub mod kml;
pub mod pipe;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::record::Normalized;

pub use delimited::{AllowList, DelimitedLayout, DelimitedVariant};
pub use fixed_width::{Column, ColumnSpec, FixedWidthLayout};
pub use kml::KmlLayout;
pub use pipe::PipeLayout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFormat {
    FixedWidth(FixedWidthLayout),
    Delimited(DelimitedLayout),
    PipeDelimited(PipeLayout),
    Kml(KmlLayout),
}

impl SourceFormat {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceFormat::FixedWidth(_) => "fixed_width",
            SourceFormat::Delimited(_) => "delimited",
            SourceFormat::PipeDelimited(_) => "pipe_delimited",
            SourceFormat::Kml(_) => "kml",
        }
    }
}

/// Normalizes one retrieved body.
///
/// `allow_list` only applies to delimited sources; other formats ignore it.
/// Per-row problems are counted in [`Normalized::skipped`]; an error means the
/// whole body is unusable.
pub fn normalize(
    source_name: &str,
    format: &SourceFormat,
    body: &[u8],
    allow_list: Option<&AllowList>,
) -> Result<Normalized, IngestError> {
    match format {
        SourceFormat::FixedWidth(layout) => {
            fixed_width::parse(source_name, layout, &decode(body))
        }
        SourceFormat::Delimited(layout) => Ok(delimited::parse(
            source_name,
            layout,
            &decode(body),
            allow_list,
        )),
        SourceFormat::PipeDelimited(layout) => {
            Ok(pipe::parse(source_name, layout, &decode(body)))
        }
        SourceFormat::Kml(layout) => {
            let text = if kml::is_zip(body) {
                Cow::Owned(kml::unpack_kmz(body, &layout.archive_entry)?)
            } else {
                decode(body)
            };
            Ok(kml::parse(source_name, layout, &text))
        }
    }
}

pub(crate) fn decode(body: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_round_trips_through_json_tag() {
        let format = SourceFormat::PipeDelimited(PipeLayout::default());
        let json = serde_json::to_string(&format).unwrap();
        assert!(json.contains(r#""kind":"pipe_delimited""#), "{json}");
        let back: SourceFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, format);
    }

    #[test]
    fn dispatches_by_format() {
        let body = b"WI|066|MKX|Milwaukee|WIZ066|Milwaukee|55079|C|se|43.0072|-87.9671\n";
        let format = SourceFormat::PipeDelimited(PipeLayout::default());
        let out = normalize("zones", &format, body, None).unwrap();
        assert_eq!(out.records.len(), 1);

        let format = SourceFormat::Kml(KmlLayout::default());
        let out = normalize("radar", &format, body, None).unwrap();
        assert!(out.records.is_empty());
    }
}
