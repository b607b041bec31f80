//! Job-detail page → exactly one [`RawDetail`].

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::debug;

use super::{stripped_text, PageTransform};
use crate::db::RawDetail;
use crate::error::PipelineResult;

static INTRO_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.mb-1000").unwrap());
static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-jobad="body"]"#).unwrap());
static CANONICAL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:url"]"#).unwrap());
static ID_PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d+)/").unwrap());

#[derive(Debug, Default)]
pub struct DetailExtractor;

impl DetailExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Never fails: absent blocks become empty strings, an unresolvable id becomes `0`.
    pub fn extract(&self, html: &str) -> RawDetail {
        let document = Html::parse_document(html);
        let text_of = |sel: &Selector| {
            document
                .select(sel)
                .next()
                .map(|el| stripped_text(&el))
                .unwrap_or_default()
        };

        let id = document
            .select(&CANONICAL_SEL)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .and_then(job_id_from_url)
            .unwrap_or(0);

        RawDetail {
            id,
            introduction: text_of(&*INTRO_SEL),
            job_descriptions: text_of(&*BODY_SEL),
        }
    }
}

impl PageTransform for DetailExtractor {
    type Record = RawDetail;

    fn transform(&self, html: &str) -> PipelineResult<Vec<RawDetail>> {
        Ok(vec![self.extract(html)])
    }
}

/// First `/<digits>/` segment of the URL path. A run too long for `i64`
/// counts as unresolvable.
fn job_id_from_url(canonical: &str) -> Option<i64> {
    let path = match Url::parse(canonical) {
        Ok(url) => url.path().to_string(),
        Err(_) => canonical.to_string(),
    };
    let caps = ID_PATH_RE.captures(&path)?;
    match caps[1].parse::<i64>() {
        Ok(id) => Some(id),
        Err(e) => {
            debug!(digits = &caps[1], error = %e, "Job id out of range");
            None
        }
    }
}
