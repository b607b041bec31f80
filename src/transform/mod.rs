pub mod detail;
pub mod listing;
pub mod merge;
pub mod text;

use scraper::ElementRef;

use crate::error::PipelineResult;

pub use detail::DetailExtractor;
pub use listing::ListingExtractor;
pub use merge::merge_listings_with_details;

/// Anything that turns one fetched HTML page into rows.
pub trait PageTransform {
    type Record;

    fn transform(&self, html: &str) -> PipelineResult<Vec<Self::Record>>;
}

/// All descendant text, concatenated as-is and trimmed.
fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Every text fragment trimmed, blanks dropped, joined without separator.
fn stripped_text(el: &ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}
