//! In-memory location store with sphere-aware proximity search.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::info;

use super::{GeoPoint, LocationFilter, LocationOrder, LocationRecord, LocationStore, SortField};
use crate::error::{Result, WhatnextError};

/// Sphere radius used for proximity, in meters.
const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Read-only location documents kept in a vector.
#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    records: Vec<LocationRecord>,
}

impl InMemoryLocationStore {
    pub fn new(records: Vec<LocationRecord>) -> Self {
        Self { records }
    }

    /// Loads a JSON array of location documents.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WhatnextError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let records: Vec<LocationRecord> = serde_json::from_str(&raw).map_err(|e| {
            WhatnextError::Storage(format!("Invalid location data in {}: {}", path.display(), e))
        })?;
        info!(count = records.len(), path = %path.display(), "Loaded location documents");
        Ok(Self::new(records))
    }
}

/// Builds the case-insensitive `(^|, )<category>(,|$)` alternation.
///
/// Stored category entries may be comma-joined strings, so each requested
/// category must match a whole comma-delimited token.
fn category_matcher(categories: &[String]) -> Result<Regex> {
    let pattern = categories
        .iter()
        .map(|c| format!("(^|, ){}(,|$)", regex::escape(c)))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| WhatnextError::QueryFailed(format!("invalid category pattern: {}", e)))
}

fn sort_value(record: &LocationRecord, field: SortField) -> f64 {
    match field {
        SortField::ReviewCount => record.details.review_count as f64,
        SortField::Stars => record.details.stars.unwrap_or(f64::MIN),
    }
}

#[async_trait]
impl LocationStore for InMemoryLocationStore {
    async fn query(
        &self,
        filter: &LocationFilter,
        order: LocationOrder,
        limit: usize,
    ) -> Result<Vec<LocationRecord>> {
        let matcher = match &filter.categories {
            Some(categories) => Some(category_matcher(categories)?),
            None => None,
        };
        let wanted_tags: Option<HashSet<&str>> = filter
            .tags
            .as_ref()
            .map(|tags| tags.iter().map(String::as_str).collect());

        let mut hits: Vec<(f64, &LocationRecord)> = self
            .records
            .iter()
            .filter_map(|record| {
                let distance = haversine_meters(filter.near, record.details.location.as_geo_point());
                (distance <= filter.max_distance_meters).then_some((distance, record))
            })
            .filter(|(_, record)| match &matcher {
                Some(re) => record
                    .details
                    .categories
                    .as_ref()
                    .is_some_and(|cats| cats.iter().any(|c| re.is_match(c))),
                None => true,
            })
            .filter(|(_, record)| match &wanted_tags {
                Some(wanted) => record
                    .details
                    .tag
                    .as_ref()
                    .is_some_and(|tags| tags.iter().any(|t| wanted.contains(t.as_str()))),
                None => true,
            })
            .collect();

        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        if let LocationOrder::Descending(field) = order {
            // Stable, so ties stay nearest first.
            hits.sort_by(|a, b| {
                sort_value(b.1, field)
                    .partial_cmp(&sort_value(a.1, field))
                    .unwrap_or(Ordering::Equal)
            });
        }

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<LocationRecord>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .records
            .iter()
            .filter(|r| wanted.contains(r.details.business_id.as_str()))
            .cloned()
            .collect())
    }

    async fn find_one(&self, business_id: &str) -> Result<Option<LocationRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.details.business_id == business_id)
            .cloned())
    }
}
