use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;

use crate::encode::{encode_country, encode_genres};
use crate::error::ParseError;
use crate::model::{CatalogRecord, ContentType, QueueEntry};

static RUNTIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s+mins").unwrap());

const LD_JSON_SELECTOR: &str = r#"script[type="application/ld+json"]"#;
const FOOTER_SELECTOR: &str = "p.text-footer";
const TMDB_SELECTOR: &str = r#"a[data-track-action="TMDB"]"#;

/// Fields pulled from one film page, before categorical encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    pub content_type: ContentType,
    pub release_year: i32,
    pub runtime_minutes: u32,
    pub rating: f64,
    pub rating_count: u64,
    pub genres: Vec<String>,
    pub country: String,
    pub poster_url: String,
}

impl ParsedPage {
    /// Encode genres and country and attach the queue identity.
    pub fn into_record(self, entry: &QueueEntry) -> CatalogRecord {
        CatalogRecord {
            movie_id: entry.movie_id.clone(),
            url: entry.url.clone(),
            genre_bitmask: encode_genres(&self.genres),
            country_code: encode_country(&self.country),
            title: self.title,
            content_type: self.content_type,
            release_year: self.release_year,
            runtime_minutes: self.runtime_minutes,
            rating: self.rating,
            rating_count: self.rating_count,
            poster_url: self.poster_url,
        }
    }
}

// ── Structured data (schema.org Movie) ──

// Every field is lenient: a null or mistyped value reads as absent, so the
// caller reports it by field name instead of rejecting the whole block.

#[derive(Debug, Deserialize)]
struct LdMovie {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    image: Option<String>,
    #[serde(rename = "releasedEvent", default, deserialize_with = "lenient")]
    released_event: Option<Vec<LdEvent>>,
    #[serde(rename = "aggregateRating", default, deserialize_with = "lenient")]
    aggregate_rating: Option<LdRating>,
    #[serde(default, deserialize_with = "lenient")]
    genre: Option<OneOrMany>,
    #[serde(rename = "countryOfOrigin", default, deserialize_with = "lenient")]
    country_of_origin: Option<Vec<LdCountry>>,
}

#[derive(Debug, Deserialize)]
struct LdEvent {
    #[serde(rename = "startDate")]
    start_date: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LdRating {
    #[serde(rename = "ratingValue", default, deserialize_with = "lenient")]
    rating_value: Option<f64>,
    #[serde(rename = "ratingCount", default, deserialize_with = "lenient")]
    rating_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LdCountry {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Parse a film page into its typed fields.
pub fn parse_page(html: &str) -> Result<ParsedPage, ParseError> {
    let document = Html::parse_document(html);

    let ld = parse_structured_data(&document)?;

    let title = ld.name.filter(|n| !n.is_empty()).ok_or(ParseError::MissingField("title"))?;
    let release_year = ld
        .released_event
        .iter()
        .flatten()
        .next()
        .and_then(|e| e.start_date.as_ref())
        .and_then(parse_year)
        .ok_or(ParseError::MissingField("release_year"))?;
    let runtime_minutes = parse_runtime(&document)?;
    let rating = ld.aggregate_rating.as_ref();
    let rating_value = rating
        .and_then(|r| r.rating_value)
        .ok_or(ParseError::MissingField("rating"))?;
    let rating_count = rating
        .and_then(|r| r.rating_count)
        .ok_or(ParseError::MissingField("rating_count"))?;
    let genres = ld
        .genre
        .map(OneOrMany::into_vec)
        .ok_or(ParseError::MissingField("genres"))?;
    let country = ld
        .country_of_origin
        .into_iter()
        .flatten()
        .next()
        .and_then(|c| c.name)
        .ok_or(ParseError::MissingField("country"))?;
    let poster_url = ld.image.ok_or(ParseError::MissingField("poster"))?;
    let content_type = parse_content_type(&document)?;

    Ok(ParsedPage {
        title,
        content_type,
        release_year,
        runtime_minutes,
        rating: rating_value,
        rating_count,
        genres,
        country,
        poster_url,
    })
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::MalformedDocument(e.to_string()))
}

fn parse_structured_data(document: &Html) -> Result<LdMovie, ParseError> {
    let script_sel = selector(LD_JSON_SELECTOR)?;
    let script = document
        .select(&script_sel)
        .next()
        .ok_or_else(|| ParseError::MalformedDocument("no structured-data block".into()))?;
    let raw: String = script.text().collect();
    let json = json_object_span(&raw)
        .ok_or_else(|| ParseError::MalformedDocument("no JSON object in structured-data block".into()))?;
    serde_json::from_str(json).map_err(|e| ParseError::MalformedDocument(e.to_string()))
}

/// Slice from the first `{` to the last `}`, dropping CDATA comment wrappers.
fn json_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn parse_year(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        serde_json::Value::String(s) => s.trim().split('-').next()?.parse().ok(),
        _ => None,
    }
}

fn parse_runtime(document: &Html) -> Result<u32, ParseError> {
    let footer_sel = selector(FOOTER_SELECTOR)?;
    let footer: String = document
        .select(&footer_sel)
        .next()
        .ok_or(ParseError::MissingField("runtime"))?
        .text()
        .collect();
    RUNTIME_RE
        .captures(&footer)
        .and_then(|c| c[1].parse().ok())
        .ok_or(ParseError::MissingField("runtime"))
}

fn parse_content_type(document: &Html) -> Result<ContentType, ParseError> {
    let tmdb_sel = selector(TMDB_SELECTOR)?;
    let href = document
        .select(&tmdb_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or(ParseError::MissingField("content_type"))?;
    Ok(if href.contains("/movie/") {
        ContentType::Movie
    } else {
        ContentType::Tv
    })
}
