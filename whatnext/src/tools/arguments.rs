//! Validation and coercion of location-search tool arguments.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::locations::{GeoPoint, NearbyQuery, SortKey, MATCH_ANY_TAG};
use crate::vocabulary::Vocabulary;

pub const DEFAULT_LIMIT: usize = 10;
pub const LIMIT_RANGE: (usize, usize) = (5, 10);
pub const DEFAULT_RADIUS_METERS: u32 = 10_000;
pub const RADIUS_RANGE: (u32, u32) = (1_000, 100_000);
pub const DEFAULT_OPEN_ONLY: bool = true;
pub const DEFAULT_SORT: SortKey = SortKey::ReviewCount;
pub const DEFAULT_CATEGORY: &str = "all";

/// Sanitized arguments of a nearby-locations call.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbySearchArgs {
    /// Number of ranked results handed back to the user.
    pub limit: usize,
    pub radius_meters: u32,
    pub open_only: bool,
    pub sort: SortKey,
    /// Canonical categories, or `["all"]`.
    pub categories: Vec<String>,
    /// Canonical tags, or `[""]`.
    pub tags: Vec<String>,
}

impl NearbySearchArgs {
    /// Query for the candidate pool. The pool is larger than `limit`; the
    /// ranker truncates afterwards.
    pub fn to_query(&self, center: GeoPoint, pool_size: usize) -> NearbyQuery {
        NearbyQuery {
            center,
            limit: pool_size,
            radius_meters: f64::from(self.radius_meters),
            categories: self.categories.clone(),
            open_only: self.open_only,
            tags: self.tags.clone(),
            sort: self.sort,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentValidator {
    vocab: Arc<Vocabulary>,
}

impl ArgumentValidator {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn validate(&self, raw: &Map<String, Value>) -> NearbySearchArgs {
        let limit = as_integer(raw.get("limit"))
            .map(|n| n.clamp(LIMIT_RANGE.0 as i64, LIMIT_RANGE.1 as i64) as usize)
            .unwrap_or(DEFAULT_LIMIT);
        let radius_meters = as_integer(raw.get("radius"))
            .map(|n| n.clamp(RADIUS_RANGE.0 as i64, RADIUS_RANGE.1 as i64) as u32)
            .unwrap_or(DEFAULT_RADIUS_METERS);
        let open_only = match as_integer(raw.get("cur_open")) {
            Some(0) => false,
            Some(1) => true,
            _ => DEFAULT_OPEN_ONLY,
        };
        let sort = raw
            .get("sort_by")
            .and_then(Value::as_str)
            .and_then(|s| SortKey::parse(s.trim()))
            .unwrap_or(DEFAULT_SORT);

        // Either field may carry either concept, so both are matched
        // against both vocabularies.
        let supplied: BTreeSet<String> = terms(raw.get("categories"))
            .into_iter()
            .chain(terms(raw.get("tag")))
            .collect();
        let categories = reconcile(&supplied, |t| self.vocab.is_category(t), DEFAULT_CATEGORY);
        let tags = reconcile(&supplied, |t| self.vocab.is_tag(t), MATCH_ANY_TAG);

        NearbySearchArgs {
            limit,
            radius_meters,
            open_only,
            sort,
            categories,
            tags,
        }
    }
}

fn reconcile(
    supplied: &BTreeSet<String>,
    known: impl Fn(&str) -> bool,
    sentinel: &str,
) -> Vec<String> {
    let matched: Vec<String> = supplied.iter().filter(|t| known(t.as_str())).cloned().collect();
    if matched.is_empty() {
        vec![sentinel.to_string()]
    } else {
        matched
    }
}

/// Integer from a JSON number or numeric string.
fn as_integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Comma-separated terms from a string, or the strings of an array.
fn terms(value: Option<&Value>) -> Vec<String> {
    let split = |s: &str| -> Vec<String> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    };
    match value {
        Some(Value::String(s)) => split(s),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .flat_map(split)
            .collect(),
        _ => Vec::new(),
    }
}
