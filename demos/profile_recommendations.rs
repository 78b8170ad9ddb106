//! Recommendations and nearby listing for a sample campus.
//!
//! Run with: RUST_LOG=debug cargo run --example profile_recommendations

use campus_recommender::{
    nearby, recommend, GeoPoint, MemoryStore, NearbyConfig, NearbyOutcome, RecommendConfig,
    RegistrationStatus, StoredActivity, UserContext,
};
use chrono::{Duration, Utc};

fn main() {
    env_logger::init();

    let now = Utc::now();
    let mut store = MemoryStore::new().at(now);
    store
        .add_activity(
            StoredActivity::new(1, "Orchestra Open Rehearsal", now + Duration::days(2))
                .with_category("Classical Music")
                .with_location("Concert Hall", 31.0252, 121.4337),
        )
        .add_activity(
            StoredActivity::new(2, "Intro to Rust Workshop", now + Duration::days(1))
                .with_category("Programming")
                .with_location("Engineering Building", "31.0221", "121.4290"),
        )
        .add_activity(
            StoredActivity::new(3, "Basketball Friendly", now + Duration::hours(5))
                .with_category("Sports")
                .with_location("East Gym", 31.0345, 121.4420),
        )
        .add_activity(
            StoredActivity::new(4, "Photography Walk", now + Duration::days(3))
                .with_category("Arts")
                .with_location("South Gate", 31.0150, 121.4400),
        )
        .add_activity(
            StoredActivity::new(5, "City Museum Trip", now + Duration::days(4))
                .with_category("Culture")
                .with_location("People's Square", 31.2304, 121.4737),
        )
        .add_activity(
            StoredActivity::new(6, "Broken Venue Meetup", now + Duration::days(1))
                .with_category("Social")
                .with_location("Unknown", "n/a", "121.43"),
        )
        .add_interest(42, "Music")
        .add_interest(42, "Program")
        .register(42, 3, RegistrationStatus::Registered);

    let user = UserContext::new(42).with_location("31.0240", "121.4350");

    println!("Recommendations for user {}\n", user.user_id);
    let result = recommend(&store, &user, &RecommendConfig::default());
    for (i, rec) in result.iter().enumerate() {
        let distance = rec
            .activity
            .distance_km
            .map(|d| format!("{:.2}km", d))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}. [{:?}] {} @ {} ({})",
            i + 1,
            rec.source,
            rec.activity.name,
            rec.activity.location_name.as_deref().unwrap_or("TBA"),
            distance
        );
    }

    let names: Vec<String> = result.into_candidates().into_iter().map(|c| c.name).collect();
    println!("  Render order: {}", names.join(", "));

    println!("\nActivities nearby");
    match nearby(&store, &user, &NearbyConfig::default()) {
        NearbyOutcome::Found { origin, radius_km, activities } => {
            println!(
                "  Within {}km of ({:.4}, {:.4}):",
                radius_km, origin.latitude, origin.longitude
            );
            for activity in &activities {
                let distance = activity.distance_km.unwrap_or_default();
                println!("  - {} ({:.2}km)", activity.name, distance);
            }
        }
        NearbyOutcome::LocationUnknown => {
            println!("  Update your location to see nearby activities.")
        }
    }

    println!("\nLocation update validation");
    let updates = [
        (Some("31.03"), Some("121.44")),
        (Some("north"), Some("121.44")),
        (Some("95"), Some("121.44")),
        (None, Some("121.44")),
    ];
    for (lat, lon) in updates {
        match GeoPoint::parse(lat, lon) {
            Ok(point) => println!("  accepted ({}, {})", point.latitude, point.longitude),
            Err(e) => println!("  rejected: {}", e),
        }
    }
}
