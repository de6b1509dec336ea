use crate::models::{Listing, ListingDraft, NewListing};
use crate::naming;
use crate::store::{ListingStore, StoreError};
use std::{sync::Arc, time::Instant};
use tracing::info;

const UNIT_SUFFIXES: &[&str] = &["metrekare", "m²", "m2", "tl", "try", "₺"];

/// Commits a completed draft into the listing store.
#[derive(Clone)]
pub struct ListingFinalizer {
    store: Arc<dyn ListingStore>,
}

impl ListingFinalizer {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Single insert; a failed write leaves nothing behind.
    pub async fn finalize(
        &self,
        draft: &ListingDraft,
        photo_links: &[String],
    ) -> Result<Listing, StoreError> {
        let started = Instant::now();
        let record = build_listing(draft, photo_links);
        let listing = self.store.create_listing(record).await?;
        crate::metrics::stage_elapsed("finalize", started.elapsed().as_millis());
        info!(
            target = "listing.store",
            listing_id = listing.id,
            title = %listing.title,
            photos = listing.photo_links.len(),
            "listing stored"
        );
        Ok(listing)
    }
}

pub fn build_listing(draft: &ListingDraft, photo_links: &[String]) -> NewListing {
    NewListing {
        title: naming::draft_title(draft),
        description: draft.description.clone(),
        price: draft.price.filter(|v| v.is_finite() && *v >= 0.0),
        neighborhood: draft.neighborhood.clone().unwrap_or_default(),
        street: draft.street.clone().unwrap_or_default(),
        room_count: draft.room_count.clone().unwrap_or_default(),
        area: draft.area.filter(|v| v.is_finite() && *v >= 0.0),
        drive_link: draft.folder_link.clone(),
        photo_links: photo_links.to_vec(),
    }
}

/// Lenient number parsing for prices and areas written the way people type
/// them (`"4.500.000 TL"`, `"95 m²"`, `"85,5"`). Anything else is `None`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let mut text = raw.trim().to_lowercase();
    while let Some(stripped) = UNIT_SUFFIXES
        .iter()
        .find_map(|suffix| text.strip_suffix(suffix))
    {
        text = stripped.trim_end().to_string();
    }
    let mut text: String = text
        .trim_start_matches('₺')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if text.is_empty() {
        return None;
    }

    let dots = text.matches('.').count();
    let commas = text.matches(',').count();
    if dots > 0 && commas > 0 {
        if text.rfind(',') > text.rfind('.') {
            text = text.replace('.', "").replace(',', ".");
        } else {
            text = text.replace(',', "");
        }
    } else if dots > 1 || (dots == 1 && digits_after_last(&text, '.') == 3) {
        text = text.replace('.', "");
    } else if commas > 1 {
        text = text.replace(',', "");
    } else if commas == 1 {
        text = text.replace(',', ".");
    }

    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

fn digits_after_last(text: &str, separator: char) -> usize {
    text.rsplit(separator)
        .next()
        .map(|tail| tail.chars().filter(char::is_ascii_digit).count())
        .unwrap_or(0)
}
