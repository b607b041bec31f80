//! Join the day's listing table with its detail table into canonical records.

use std::collections::HashMap;

use itertools::Itertools;
use tracing::debug;

use super::listing::NOT_AVAILABLE;
use super::text::{fix_spacing, strip_description_label, strip_intro_label};
use crate::db::{CanonicalRecord, RawDetail, RawListing};
use crate::error::{PipelineError, PipelineResult};

/// Scraped navigation text that marks a detail page without real content.
pub const ARTIFACT_MARKER: &str = "ApplySave offerSave";

struct CleanDetail {
    id: i64,
    intro: String,
    description: String,
}

/// Dedupe (first occurrence wins), clean details, drop artifact/unresolved
/// rows, inner-join on id and render one record per job.
///
/// Either every record is returned or the first validation error is; callers
/// never see a partially merged batch.
pub fn merge_listings_with_details(
    listings: &[RawListing],
    details: &[RawDetail],
) -> PipelineResult<Vec<CanonicalRecord>> {
    let listings: Vec<&RawListing> = listings.iter().unique_by(|l| l.id).collect();

    let details: HashMap<i64, CleanDetail> = details
        .iter()
        .unique_by(|d| d.id)
        .map(|d| CleanDetail {
            id: d.id,
            intro: strip_intro_label(&d.introduction),
            description: strip_description_label(&d.job_descriptions),
        })
        .filter(|d| !d.intro.contains(ARTIFACT_MARKER) && d.id != 0)
        .map(|d| (d.id, d))
        .collect();

    let records = listings
        .into_iter()
        .filter_map(|listing| details.get(&listing.id).map(|detail| (listing, detail)))
        .map(|(listing, detail)| build_record(listing, detail))
        .collect::<PipelineResult<Vec<_>>>()?;

    debug!(records = records.len(), "Merged listings with details");
    Ok(records)
}

fn build_record(listing: &RawListing, detail: &CleanDetail) -> PipelineResult<CanonicalRecord> {
    let intro = fix_spacing(&detail.intro);
    let description = fix_spacing(&detail.description);
    let salary_l = salary_bound(listing.id, "salary_l", &listing.salary_l)?;
    let salary_h = salary_bound(listing.id, "salary_h", &listing.salary_h)?;

    let job_offer = format!(
        "Job Title: {}\n\nJob Details:\n{}\n{}\n\nSalary: {}-{}\n\nLink: {}",
        listing.title, intro, description, salary_l, salary_h, listing.link
    );

    Ok(CanonicalRecord {
        job_id: listing.id,
        job_offer,
    })
}

/// Absent bounds (empty or the `"N/A"` sentinel) become `"0"`; anything else
/// must be a plain digit run.
fn salary_bound(job_id: i64, field: &str, value: &str) -> PipelineResult<String> {
    let value = value.trim();
    if value.is_empty() || value == NOT_AVAILABLE {
        return Ok("0".to_string());
    }
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(PipelineError::validation(
            job_id,
            format!("{} is not numeric: {:?}", field, value),
        ));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::listing;

    fn detail(id: i64, intro: &str, desc: &str) -> RawDetail {
        RawDetail {
            id,
            introduction: intro.to_string(),
            job_descriptions: desc.to_string(),
        }
    }

    #[test]
    fn end_to_end_record() {
        let records = merge_listings_with_details(
            &[listing(1, "Engineer")],
            &[detail(1, "Introduction Join us", "Job offer Build things")],
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        let offer = &records[0].job_offer;
        assert_eq!(records[0].job_id, 1);
        assert!(offer.contains("Job Title: Engineer"));
        assert!(offer.contains("Join us"));
        assert!(offer.contains("Build things"));
        assert!(offer.contains("Salary: 50-70"));
        assert!(offer.contains("Link: http://x/1"));
        assert_eq!(
            offer,
            "Job Title: Engineer\n\nJob Details:\nJoin us\nBuild things\n\nSalary: 50-70\n\nLink: http://x/1"
        );
    }

    #[test]
    fn unresolved_detail_never_merges() {
        let records = merge_listings_with_details(
            &[listing(0, "Ghost"), listing(1, "Engineer")],
            &[detail(0, "x", "y")],
        )
        .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn first_duplicate_listing_wins() {
        let records = merge_listings_with_details(
            &[listing(1, "First"), listing(1, "Second")],
            &[detail(1, "a", "b")],
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].job_offer.starts_with("Job Title: First"));
    }

    #[test]
    fn first_duplicate_detail_wins_even_if_filtered() {
        let records = merge_listings_with_details(
            &[listing(1, "Engineer")],
            &[
                detail(1, "IntroductionApplySave offerSave", "b"),
                detail(1, "Real intro", "b"),
            ],
        )
        .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn unmatched_listing_dropped() {
        let records = merge_listings_with_details(
            &[listing(1, "Engineer"), listing(2, "Tester")],
            &[detail(1, "a", "b"), detail(3, "c", "d")],
        )
        .unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.job_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn artifact_marker_excluded() {
        let records = merge_listings_with_details(
            &[listing(5, "Engineer")],
            &[detail(5, "Intro ApplySave offerSave more", "desc")],
        )
        .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn join_follows_listing_order() {
        let records = merge_listings_with_details(
            &[listing(3, "C"), listing(1, "A"), listing(2, "B")],
            &[detail(1, "a", "a"), detail(2, "b", "b"), detail(3, "c", "c")],
        )
        .unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.job_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn spacing_fixed_in_offer() {
        let records = merge_listings_with_details(
            &[listing(1, "Engineer")],
            &[detail(1, "IntroductionWe pay 3.5 times more.Really", "Job offerCode,test")],
        )
        .unwrap();
        let offer = &records[0].job_offer;
        assert!(offer.contains("We pay 3.5 times more. Really"));
        assert!(offer.contains("Code, test"));
    }

    #[test]
    fn missing_salary_defaults_to_zero() {
        let mut no_salary = listing(1, "Engineer");
        no_salary.salary_l = NOT_AVAILABLE.to_string();
        no_salary.salary_h = String::new();
        let records =
            merge_listings_with_details(&[no_salary], &[detail(1, "a", "b")]).unwrap();
        assert!(records[0].job_offer.contains("Salary: 0-0"));
    }

    #[test]
    fn malformed_salary_aborts_merge() {
        let mut bad = listing(2, "Broken");
        bad.salary_h = "lots".to_string();
        let err = merge_listings_with_details(
            &[listing(1, "Fine"), bad],
            &[detail(1, "a", "b"), detail(2, "c", "d")],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Validation { job_id: 2, .. }));
    }

    #[test]
    fn empty_inputs() {
        assert!(merge_listings_with_details(&[], &[]).unwrap().is_empty());
        assert!(merge_listings_with_details(&[listing(1, "A")], &[]).unwrap().is_empty());
    }
}
