//! Search-results page → one [`RawListing`] per job card.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{element_text, PageTransform};
use crate::db::RawListing;
use crate::error::{PipelineError, PipelineResult};

/// Sentinel for an optional card field that was not found.
pub const NOT_AVAILABLE: &str = "N/A";

const PAGE: &str = "search results";

// En dash followed by a zero-width joiner, as rendered between salary bounds.
const SALARY_SEPARATOR: &str = "\u{2013}\u{200d}";
const LOCATION_SEPARATOR: char = '\u{2013}';

static CARD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article.SearchResultCard").unwrap());
static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.SearchResultCard__body").unwrap());
static SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static FOOTER_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("footer").unwrap());
static FOOTER_ITEM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.SearchResultCard__footerItem").unwrap());
static TITLE_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.link-primary.SearchResultCard__titleLink").unwrap());
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2.SearchResultCard__title").unwrap());
static CLASSED_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[class]").unwrap());

static CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+\.?\d*)\s?(Kč|Kc|CZK|EUR)\b").unwrap());
static STATUS_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SearchResultCard__status--[a-z]+").unwrap());
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static LETTERS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z]+").unwrap());

pub struct ListingExtractor {
    load_date: String,
}

impl ListingExtractor {
    pub fn new(load_date: impl Into<String>) -> Self {
        Self {
            load_date: load_date.into(),
        }
    }

    fn extract_card(&self, index: usize, card: ElementRef) -> PipelineResult<RawListing> {
        let missing = |what: &str| PipelineError::structural(PAGE, &format!("card {}: {}", index, what));

        let body = card
            .select(&BODY_SEL)
            .next()
            .ok_or_else(|| missing("div.SearchResultCard__body"))?;
        let signals = classify_body(body);

        let footer = card
            .select(&FOOTER_SEL)
            .next()
            .ok_or_else(|| missing("footer"))?;
        let (rating, info) = classify_footer(footer);
        let company = info.first().ok_or_else(|| missing("company footer item"))?;
        let location = info.get(1).ok_or_else(|| missing("location footer item"))?;
        let (city, district) = split_location(location);

        let anchor = card
            .select(&TITLE_LINK_SEL)
            .next()
            .ok_or_else(|| missing("a.SearchResultCard__titleLink"))?;
        let id = anchor
            .value()
            .attr("data-jobad-id")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| missing("numeric data-jobad-id"))?;
        let link = anchor
            .value()
            .attr("href")
            .ok_or_else(|| missing("title link href"))?
            .to_string();
        let title = card
            .select(&TITLE_SEL)
            .next()
            .map(|h| element_text(&h))
            .ok_or_else(|| missing("h2.SearchResultCard__title"))?;

        let (salary_l, salary_h, salary_currency) = match &signals.salary {
            Some(salary) => {
                let (low, high) = parse_salary(salary);
                (low, high, parse_currency(salary))
            }
            None => (
                NOT_AVAILABLE.to_string(),
                NOT_AVAILABLE.to_string(),
                NOT_AVAILABLE.to_string(),
            ),
        };

        Ok(RawListing {
            id,
            load_date: self.load_date.clone(),
            title,
            link,
            date_added: date_added(card),
            salary_l,
            salary_h,
            salary_currency,
            company: company.clone(),
            city,
            district,
            work_from_home: or_na(signals.work_from_home),
            response_period: or_na(signals.response_period),
            rating: or_na(rating),
            other_details: or_na(signals.other_details),
        })
    }
}

impl PageTransform for ListingExtractor {
    type Record = RawListing;

    fn transform(&self, html: &str) -> PipelineResult<Vec<RawListing>> {
        let document = Html::parse_document(html);
        let rows = document
            .select(&CARD_SEL)
            .enumerate()
            .map(|(i, card)| self.extract_card(i, card))
            .collect::<PipelineResult<Vec<_>>>()?;
        debug!(cards = rows.len(), "Extracted listing cards");
        Ok(rows)
    }
}

#[derive(Debug, Default)]
struct BodySignals {
    salary: Option<String>,
    work_from_home: Option<String>,
    response_period: Option<String>,
    other_details: Option<String>,
}

/// Bucket each body fragment; a later fragment in the same bucket replaces
/// an earlier one, so `other_details` keeps only the last unmatched text.
fn classify_body(body: ElementRef) -> BodySignals {
    let mut signals = BodySignals::default();
    for span in body.select(&SPAN_SEL) {
        let text = element_text(&span);
        if CURRENCY_RE.is_match(&text) {
            signals.salary = Some(text);
        } else if text.contains("home") {
            signals.work_from_home = Some(text);
        } else if text.contains("2 weeks") {
            signals.response_period = Some(text);
        } else {
            signals.other_details = Some(text);
        }
    }
    signals
}

/// Returns the rating item (if any) and the remaining items in order.
fn classify_footer(footer: ElementRef) -> (Option<String>, Vec<String>) {
    let mut rating = None;
    let mut info = Vec::new();
    for item in footer.select(&FOOTER_ITEM_SEL) {
        let text = element_text(&item);
        if text.contains("rating") {
            rating = Some(text);
        } else {
            info.push(text);
        }
    }
    (rating, info)
}

fn split_location(location: &str) -> (String, String) {
    let mut parts = location.split(LOCATION_SEPARATOR);
    let city = parts.next().unwrap_or_default().trim().to_string();
    let district = parts
        .next()
        .map(|d| d.trim().to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    (city, district)
}

/// Digit runs of each salary bound; a single bound yields `(bound, "0")`.
fn parse_salary(salary: &str) -> (String, String) {
    let bounds: Vec<String> = salary
        .split(SALARY_SEPARATOR)
        .map(|part| {
            DIGITS_RE
                .find_iter(part.trim())
                .map(|m| m.as_str())
                .collect::<String>()
        })
        .collect();
    match bounds.as_slice() {
        [low, high, ..] => (low.clone(), high.clone()),
        [only] => (only.clone(), "0".to_string()),
        [] => (String::new(), "0".to_string()),
    }
}

fn parse_currency(salary: &str) -> String {
    LETTERS_RE
        .find(salary)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn date_added(card: ElementRef) -> String {
    card.select(&CLASSED_SEL)
        .find(|el| el.value().classes().any(|c| STATUS_CLASS_RE.is_match(c)))
        .map(|el| element_text(&el))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
