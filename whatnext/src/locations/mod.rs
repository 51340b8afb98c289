//! Location records and the geo/attribute query engine.
//!
//! The document store only answers proximity, category and tag predicates.
//! Whether a business is open right now is always computed here, against the
//! caller's clock in the configured time zone, and never written back.

pub mod memory;

pub use memory::InMemoryLocationStore;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WhatnextError};
use crate::hours;

/// Category values meaning "do not filter on category".
pub const MATCH_ANY_CATEGORIES: [&str; 2] = ["any", "all"];
/// Tag value meaning "do not filter on tag".
pub const MATCH_ANY_TAG: &str = "";

/// A WGS84 coordinate used as a query center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// GeoJSON point as stored on each location document (`[longitude, latitude]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl GeoJsonPoint {
    pub fn point(point: GeoPoint) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [point.longitude, point.latitude],
        }
    }

    pub fn as_geo_point(&self) -> GeoPoint {
        GeoPoint::new(self.coordinates[0], self.coordinates[1])
    }
}

/// Weekday name ("Monday") to an optional `[open, close]` pair.
pub type WeeklyHours = BTreeMap<String, Option<Vec<String>>>;

/// Descriptive fields shared by the stored record and the served location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDetails {
    pub business_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub display_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub stars: Option<f64>,
    #[serde(default)]
    pub review_count: u64,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub tag: Option<Vec<String>>,
    #[serde(default)]
    pub hours: Option<WeeklyHours>,
    pub location: GeoJsonPoint,
    #[serde(default)]
    pub price: Option<String>,
}

/// A location document as held by the store.
///
/// The stored `cur_open` field is the permanent "business operates" flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(flatten)]
    pub details: LocationDetails,
    #[serde(rename = "cur_open", default)]
    pub operating: u8,
}

impl LocationRecord {
    pub fn is_operating(&self) -> bool {
        self.operating == 1
    }

    fn hours_on(&self, weekday: &str) -> Option<&[String]> {
        self.details
            .hours
            .as_ref()
            .and_then(|h| h.get(weekday))
            .and_then(|pair| pair.as_deref())
    }

    fn into_location(self, open_now: bool) -> Location {
        Location {
            details: self.details,
            cur_open: u8::from(open_now),
        }
    }
}

/// A location as served to clients, with the computed open-right-now flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(flatten)]
    pub details: LocationDetails,
    pub cur_open: u8,
}

impl Location {
    pub fn business_id(&self) -> &str {
        &self.details.business_id
    }

    pub fn summary(&self) -> LocationSummary {
        LocationSummary {
            business_id: self.details.business_id.clone(),
            name: self.details.name.clone(),
            stars: self.details.stars,
            review_count: self.details.review_count,
            cur_open: self.cur_open,
            categories: self.details.categories.clone(),
            tag: self.details.tag.clone(),
            price: self.details.price.clone(),
        }
    }
}

/// Condensed projection handed to the reasoning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub business_id: String,
    pub name: Option<String>,
    pub stars: Option<f64>,
    pub review_count: u64,
    pub cur_open: u8,
    pub categories: Option<Vec<String>>,
    pub tag: Option<Vec<String>>,
    pub price: Option<String>,
}

/// Numeric fields the store can sort on, descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    ReviewCount,
    Stars,
}

/// Ordering requested from the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    ReviewCount,
    Stars,
    Random,
}

impl SortKey {
    pub const ALL: [SortKey; 3] = [SortKey::ReviewCount, SortKey::Stars, SortKey::Random];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "review_count" => Some(SortKey::ReviewCount),
            "stars" => Some(SortKey::Stars),
            "random" => Some(SortKey::Random),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::ReviewCount => "review_count",
            SortKey::Stars => "stars",
            SortKey::Random => "random",
        }
    }
}

/// Result ordering the store must apply before truncating to `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationOrder {
    /// Nearest first.
    Proximity,
    Descending(SortField),
}

/// Predicates pushed down to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFilter {
    pub near: GeoPoint,
    pub max_distance_meters: f64,
    /// Any-of category tokens; `None` matches every category.
    pub categories: Option<Vec<String>>,
    /// Any-of tag membership; `None` skips the tag predicate.
    pub tags: Option<Vec<String>>,
}

/// Document-store contract for location documents.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn query(
        &self,
        filter: &LocationFilter,
        order: LocationOrder,
        limit: usize,
    ) -> Result<Vec<LocationRecord>>;

    /// Bulk id lookup. Result order is unspecified.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<LocationRecord>>;

    async fn find_one(&self, business_id: &str) -> Result<Option<LocationRecord>>;
}

/// Parameters of a nearby search.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub center: GeoPoint,
    pub limit: usize,
    pub radius_meters: f64,
    pub categories: Vec<String>,
    pub open_only: bool,
    pub tags: Vec<String>,
    pub sort: SortKey,
}

impl NearbyQuery {
    fn category_constraint(&self) -> Option<Vec<String>> {
        let wanted: Vec<String> = self
            .categories
            .iter()
            .filter(|c| !MATCH_ANY_CATEGORIES.contains(&c.as_str()))
            .cloned()
            .collect();
        if wanted.is_empty() || wanted.len() < self.categories.len() {
            None
        } else {
            Some(wanted)
        }
    }

    fn tag_constraint(&self) -> Option<Vec<String>> {
        let wanted: Vec<String> = self
            .tags
            .iter()
            .filter(|t| t.as_str() != MATCH_ANY_TAG)
            .cloned()
            .collect();
        if wanted.is_empty() {
            None
        } else {
            Some(wanted)
        }
    }
}

/// Executes nearby searches and id lookups over a [`LocationStore`].
#[derive(Clone)]
pub struct LocationQueryEngine {
    store: Arc<dyn LocationStore>,
    timezone: Tz,
}

impl LocationQueryEngine {
    pub fn new(store: Arc<dyn LocationStore>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    /// Nearby search with the tag-then-no-tag fallback.
    ///
    /// When `open_only` is set every returned location was verified against
    /// its hours for `now`; otherwise all candidates are returned with the
    /// open flag cleared.
    pub async fn find_nearby(&self, query: &NearbyQuery, now: DateTime<Utc>) -> Result<Vec<Location>> {
        let mut filter = LocationFilter {
            near: query.center,
            max_distance_meters: query.radius_meters,
            categories: query.category_constraint(),
            tags: query.tag_constraint(),
        };

        let located = self.query_and_process(&filter, query, now).await?;
        if !located.is_empty() || filter.tags.is_none() {
            return Ok(located);
        }

        debug!(
            tags = ?filter.tags,
            "Tag-filtered search returned nothing, retrying without tags"
        );
        filter.tags = None;
        self.query_and_process(&filter, query, now).await
    }

    /// [`find_nearby`](Self::find_nearby) projected onto the condensed shape.
    pub async fn find_nearby_condensed(
        &self,
        query: &NearbyQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<LocationSummary>> {
        let located = self.find_nearby(query, now).await?;
        Ok(located.iter().map(Location::summary).collect())
    }

    /// Resolves `ids` preserving their order; unknown ids are dropped.
    ///
    /// `cur_open` is recomputed from the hours for the current instant: the
    /// stored flag only says the business operates, and served locations must
    /// carry the same open-now meaning as [`find_nearby`](Self::find_nearby).
    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Location>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.store.find_by_ids(ids).await.map_err(into_query_failed)?;
        let mut by_id: HashMap<String, LocationRecord> = records
            .into_iter()
            .map(|r| (r.details.business_id.clone(), r))
            .collect();

        let now = Utc::now();
        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            // Duplicate ids resolve once, at their first position.
            if let Some(record) = by_id.remove(id) {
                let open_now = self.open_now(&record, now);
                ordered.push(record.into_location(open_now));
            }
        }
        Ok(ordered)
    }

    /// Single lookup; `cur_open` is recomputed as in [`find_by_ids`](Self::find_by_ids).
    pub async fn find_one_by_id(&self, business_id: &str) -> Result<Option<Location>> {
        let record = self
            .store
            .find_one(business_id)
            .await
            .map_err(into_query_failed)?;
        let now = Utc::now();
        Ok(record.map(|r| {
            let open_now = self.open_now(&r, now);
            r.into_location(open_now)
        }))
    }

    async fn query_and_process(
        &self,
        filter: &LocationFilter,
        query: &NearbyQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<Location>> {
        let order = match query.sort {
            SortKey::ReviewCount => LocationOrder::Descending(SortField::ReviewCount),
            SortKey::Stars => LocationOrder::Descending(SortField::Stars),
            SortKey::Random => LocationOrder::Proximity,
        };
        let mut records = self
            .store
            .query(filter, order, query.limit)
            .await
            .map_err(into_query_failed)?;
        if query.sort == SortKey::Random {
            records.shuffle(&mut rand::thread_rng());
        }

        let mut located = Vec::new();
        for record in records.into_iter().take(query.limit) {
            if query.open_only {
                if self.open_now(&record, now) {
                    located.push(record.into_location(true));
                }
            } else {
                located.push(record.into_location(false));
            }
        }
        Ok(located)
    }

    fn open_now(&self, record: &LocationRecord, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        let weekday = local.format("%A").to_string();
        record.is_operating() && hours::is_open(local.naive_local(), record.hours_on(&weekday))
    }
}

fn into_query_failed(err: WhatnextError) -> WhatnextError {
    match err {
        WhatnextError::QueryFailed(msg) => WhatnextError::QueryFailed(msg),
        other => WhatnextError::QueryFailed(other.to_string()),
    }
}
