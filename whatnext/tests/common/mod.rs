#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use whatnext::agent::TurnSettings;
use whatnext::locations::{
    GeoJsonPoint, GeoPoint, InMemoryLocationStore, LocationDetails, LocationRecord, WeeklyHours,
};
use whatnext::profiles::{InMemoryProfileStore, UserProfile};
use whatnext::reasoning::ScriptedEngine;
use whatnext::session::InMemorySessionStore;
use whatnext::vocabulary::Vocabulary;
use whatnext::{ServiceParts, Services};

pub const CENTER_LON: f64 = -117.2124;
pub const CENTER_LAT: f64 = 32.8723;
pub const ASSISTANT_ID: &str = "asst_fixture";

pub fn center() -> GeoPoint {
    GeoPoint::new(CENTER_LON, CENTER_LAT)
}

/// Hours that make a business open at every instant.
pub fn always_open() -> WeeklyHours {
    [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ]
    .iter()
    .map(|day| (day.to_string(), Some(vec!["0000".to_string(), "0000".to_string()])))
    .collect()
}

pub fn record(
    id: &str,
    offset_deg: f64,
    categories: &str,
    tags: &[&str],
    reviews: u64,
    hours: Option<WeeklyHours>,
) -> LocationRecord {
    let (lon, lat) = (CENTER_LON + offset_deg, CENTER_LAT + offset_deg);
    LocationRecord {
        details: LocationDetails {
            business_id: id.to_string(),
            name: Some(format!("{} name", id)),
            image_url: None,
            phone: None,
            display_phone: None,
            address: None,
            city: Some("La Jolla".to_string()),
            state: Some("CA".to_string()),
            postal_code: None,
            latitude: Some(lat),
            longitude: Some(lon),
            stars: Some(4.0),
            review_count: reviews,
            categories: Some(vec![categories.to_string()]),
            tag: Some(tags.iter().map(|t| t.to_string()).collect()),
            hours,
            location: GeoJsonPoint::point(GeoPoint::new(lon, lat)),
            price: Some("$".to_string()),
        },
        operating: 1,
    }
}

/// Small neighbourhood around [`center`]; every record is always open.
pub fn fixture_records() -> Vec<LocationRecord> {
    vec![
        record("cafes-0001", 0.001, "Coffee & Tea, Cafes", &["coffee", "brunch"], 120, Some(always_open())),
        record("cafes-0002", 0.002, "Cafes", &["coffee"], 480, Some(always_open())),
        record("bars-0001", 0.003, "Bars", &["cocktails"], 300, Some(always_open())),
        record("A", 0.004, "Restaurants", &["tacos"], 10, Some(always_open())),
        record("B", 0.005, "Restaurants", &["tacos"], 20, Some(always_open())),
        record("C", 0.006, "Restaurants", &["tacos"], 30, Some(always_open())),
    ]
}

pub fn vocabulary() -> Vocabulary {
    Vocabulary::new(
        ["cafes", "bars", "restaurants", "museums"],
        ["coffee", "brunch", "cocktails", "tacos", "vegan"],
    )
}

pub fn users() -> Vec<UserProfile> {
    vec![UserProfile {
        user_id: "user-0001".to_string(),
        display_name: Some("Sam".to_string()),
        image_url: None,
        friends: vec![],
        visited: vec![],
        favorites: vec![],
        activities_tag: vec!["hiking".to_string()],
        food_and_drinks_tag: vec!["coffee".to_string()],
        tags: None,
    }]
}

pub fn services(engine: Arc<ScriptedEngine>) -> Services {
    Services::from_parts(ServiceParts {
        engine,
        locations: Arc::new(InMemoryLocationStore::new(fixture_records())),
        profiles: Arc::new(InMemoryProfileStore::new(users())),
        sessions: Arc::new(InMemorySessionStore::new()),
        vocabulary: Arc::new(vocabulary()),
        assistant_id: ASSISTANT_ID.to_string(),
        timezone: chrono_tz::America::Los_Angeles,
        session_ttl: Duration::from_secs(3600),
        ranking_model: Some("gpt-4o".to_string()),
        turn: TurnSettings::default(),
    })
}

pub fn empty_hours() -> WeeklyHours {
    BTreeMap::new()
}
