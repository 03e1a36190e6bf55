//! Coordinate text handling: degree-minute-second notation with a trailing
//! hemisphere letter (`41-20-15N`) and plain decimal degrees.

use crate::error::IngestError;

/// Converts `dd[-mm[-ss]]H` into decimal-degree text such as `-87.983`.
///
/// The fractional part is truncated, never rounded, to three digits. Existing
/// consumers of the published tables compare these strings directly.
pub fn dms_to_decimal(text: &str, separator: char) -> Result<String, IngestError> {
    let text = text.trim();
    let Some(hemisphere) = text.chars().last() else {
        return Err(IngestError::malformed_coordinate(text, "empty value"));
    };
    let negative = match hemisphere.to_ascii_uppercase() {
        'N' | 'E' => false,
        'S' | 'W' => true,
        _ => {
            return Err(IngestError::malformed_coordinate(
                text,
                "missing hemisphere letter",
            ));
        }
    };

    let body = &text[..text.len() - hemisphere.len_utf8()];
    let parts: Vec<&str> = body.split(separator).map(str::trim).collect();
    if parts.len() > 3 {
        return Err(IngestError::malformed_coordinate(
            text,
            "more than three components",
        ));
    }

    let degrees: u32 = parts[0]
        .parse()
        .map_err(|_| IngestError::malformed_coordinate(text, "degrees are not an integer"))?;
    let minutes = parts
        .get(1)
        .map(|m| {
            parse_sexagesimal(text, m, "minutes are not numeric", "minutes out of range")
        })
        .transpose()?;
    let seconds = parts
        .get(2)
        .map(|s| {
            parse_sexagesimal(text, s, "seconds are not numeric", "seconds out of range")
        })
        .transpose()?;

    let fraction = match minutes {
        Some(m) => m / 60.0 + seconds.map_or(0.0, |s| s / 3600.0),
        None => 0.0,
    };

    let sign = if negative { "-" } else { "" };
    Ok(format!("{sign}{degrees}.{}", truncate_fraction(fraction)))
}

/// Numeric form of [`dms_to_decimal`].
pub fn parse_dms(text: &str, separator: char) -> Result<f64, IngestError> {
    let decimal = dms_to_decimal(text, separator)?;
    decimal
        .parse()
        .map_err(|_| IngestError::malformed_coordinate(text, "conversion produced invalid text"))
}

pub fn parse_decimal(text: &str) -> Result<f64, IngestError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(IngestError::malformed_coordinate(text, "empty value"));
    }
    let value: f64 = text
        .parse()
        .map_err(|_| IngestError::malformed_coordinate(text, "not a decimal number"))?;
    if !value.is_finite() {
        return Err(IngestError::malformed_coordinate(text, "not a finite number"));
    }
    Ok(value)
}

/// Parses a latitude/longitude pair, converting from DMS when `dms_separator`
/// is set and passing decimal text through otherwise.
pub fn parse_pair(
    latitude: &str,
    longitude: &str,
    dms_separator: Option<char>,
) -> Result<(f64, f64), IngestError> {
    let (lat, lon) = match dms_separator {
        Some(sep) => (parse_dms(latitude, sep)?, parse_dms(longitude, sep)?),
        None => (parse_decimal(latitude)?, parse_decimal(longitude)?),
    };
    if !(-90.0..=90.0).contains(&lat) {
        return Err(IngestError::malformed_coordinate(
            latitude,
            "latitude out of range",
        ));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(IngestError::malformed_coordinate(
            longitude,
            "longitude out of range",
        ));
    }
    Ok((lat, lon))
}

fn parse_sexagesimal(
    text: &str,
    part: &str,
    not_numeric: &'static str,
    out_of_range: &'static str,
) -> Result<f64, IngestError> {
    let value: f64 = part
        .parse()
        .map_err(|_| IngestError::malformed_coordinate(text, not_numeric))?;
    if !(0.0..60.0).contains(&value) {
        return Err(IngestError::malformed_coordinate(text, out_of_range));
    }
    Ok(value)
}

// First three digits of the shortest round-trip rendering, zero padded.
fn truncate_fraction(fraction: f64) -> String {
    let rendered = fraction.to_string();
    let digits: String = rendered
        .split_once('.')
        .map(|(_, d)| d)
        .unwrap_or("")
        .chars()
        .take(3)
        .collect();
    format!("{digits:0<3}")
}
