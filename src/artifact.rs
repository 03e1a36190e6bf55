//! Picks the current zone correlation file from the NWS index page, which
//! lists several dated releases (some of them announced ahead of time).

use chrono::NaiveDate;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// How to find dated download links on an index page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactIndex {
    /// Text of every download link, e.g. `Download Text File`.
    pub marker: String,
    /// `chrono` format of the release date cell.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_date_format() -> String {
    "%d %B %Y".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedArtifact {
    pub published: NaiveDate,
    /// Link target as written on the page, with entities decoded.
    pub href: String,
}

/// Collects one candidate per table row whose text contains the marker.
///
/// The link is the last `a[href]` of the row carrying the marker text (any
/// link of the row when none does) and the date is the last cell of the row
/// that parses with the configured format. A row without both is ignored, so
/// a reworded page yields no candidates instead of misread ones.
pub fn scrape_candidates(html: &str, index: &ArtifactIndex) -> Vec<VersionedArtifact> {
    let marker = collapse_whitespace(index.marker.split_whitespace());
    if marker.is_empty() {
        return Vec::new();
    }
    let (Ok(rows), Ok(cells), Ok(links)) = (
        Selector::parse("tr"),
        Selector::parse("td"),
        Selector::parse("a[href]"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&rows)
        // Outer rows of nested tables would see every inner row's text.
        .filter(|row| row.select(&rows).next().is_none())
        .filter(|row| text_of(row).contains(&marker))
        .filter_map(|row| {
            let href = row_link(&row, &links, &marker)?;
            let published = row
                .select(&cells)
                .filter_map(|cell| {
                    NaiveDate::parse_from_str(&text_of(&cell), &index.date_format).ok()
                })
                .last()?;
            Some(VersionedArtifact { published, href })
        })
        .collect()
}

fn row_link(row: &ElementRef<'_>, links: &Selector, marker: &str) -> Option<String> {
    let hrefs: Vec<(bool, &str)> = row
        .select(links)
        .filter_map(|link| {
            let href = link.value().attr("href")?.trim();
            (!href.is_empty()).then(|| (text_of(&link).contains(marker), href))
        })
        .collect();
    hrefs
        .iter()
        .rev()
        .find(|(labelled, _)| *labelled)
        .or_else(|| hrefs.last())
        .map(|(_, href)| href.to_string())
}

fn text_of(element: &ElementRef<'_>) -> String {
    collapse_whitespace(element.text().flat_map(str::split_whitespace))
}

fn collapse_whitespace<'a>(words: impl Iterator<Item = &'a str>) -> String {
    words.collect::<Vec<_>>().join(" ")
}

/// The most recent candidate that is not dated after `today`. Equal dates
/// keep the first one listed.
pub fn select_current(
    candidates: &[VersionedArtifact],
    today: NaiveDate,
) -> Option<&VersionedArtifact> {
    candidates
        .iter()
        .filter(|c| c.published <= today)
        .min_by_key(|c| today - c.published)
}

/// Scrapes `html`, selects the current artifact and resolves its link against
/// `index_url`.
pub fn resolve_current(
    html: &str,
    index_url: &str,
    index: &ArtifactIndex,
    today: NaiveDate,
) -> Result<(VersionedArtifact, String), IngestError> {
    let no_candidate = || IngestError::NoCandidateArtifact {
        index_url: index_url.to_string(),
        marker: index.marker.clone(),
    };

    let candidates = scrape_candidates(html, index);
    tracing::debug!("{} dated candidates on {index_url}", candidates.len());
    let chosen = select_current(&candidates, today).ok_or_else(no_candidate)?;

    let url = Url::parse(index_url)
        .and_then(|base| base.join(&chosen.href))
        .map_err(|_| no_candidate())?;
    Ok((chosen.clone(), url.to_string()))
}
