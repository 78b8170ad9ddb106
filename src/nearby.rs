//! Radius filtering and the "activities nearby" listing.
//!
//! [`filter_within_radius`] is the in-process half of every proximity query:
//! storage prefilters to upcoming activities with coordinates, this module
//! computes distances, drops what is unknown or too far, and sorts by
//! distance. The recommendation top-up and the nearby listing share it and
//! differ only in radius.

use log::{debug, info, warn};

use crate::geo_utils;
use crate::store::{ActivityRow, ActivityStore};
use crate::{ActivityCandidate, GeoPoint, UserContext};

/// Search radius of the nearby listing.
pub const NEARBY_RADIUS_KM: f64 = 5.0;

/// Configuration for the nearby listing.
#[derive(Debug, Clone)]
pub struct NearbyConfig {
    /// Maximum distance from the user, in kilometers.
    /// Default: 5.0
    pub radius_km: f64,
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self { radius_km: NEARBY_RADIUS_KM }
    }
}

/// What the nearby view should render.
#[derive(Debug, Clone, PartialEq)]
pub enum NearbyOutcome {
    /// The user has no usable location on record; ask them to update it.
    LocationUnknown,
    /// Activities within `radius_km` of `origin`, closest first.
    Found {
        origin: GeoPoint,
        radius_km: f64,
        activities: Vec<ActivityCandidate>,
    },
}

/// Keep rows within `radius_km` of `origin`, closest first.
///
/// Rows without both coordinates are skipped. Rows whose coordinates cannot
/// be coerced have an unknown distance and are dropped. The sort is stable,
/// so equal distances keep storage order.
///
/// # Example
/// ```
/// use campus_recommender::{filter_within_radius, ActivityRow, Coordinate, GeoPoint};
/// use chrono::Utc;
///
/// let row = |id, lat: f64| ActivityRow {
///     id,
///     name: format!("Activity {}", id),
///     start_time: Utc::now(),
///     location_name: None,
///     latitude: Some(Coordinate::from(lat)),
///     longitude: Some(Coordinate::from(0.0)),
/// };
///
/// // 0.05 degrees of latitude is about 5.6 km, 0.2 degrees about 22 km
/// let origin = GeoPoint::new(0.0, 0.0);
/// let kept = filter_within_radius(vec![row(1, 0.2), row(2, 0.05)], &origin, 10.0);
/// assert_eq!(kept.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2]);
/// ```
pub fn filter_within_radius(
    rows: Vec<ActivityRow>,
    origin: &GeoPoint,
    radius_km: f64,
) -> Vec<ActivityCandidate> {
    let total = rows.len();
    let mut within: Vec<ActivityCandidate> = rows
        .into_iter()
        .filter_map(|row| {
            let (Some(lat), Some(lon)) = (&row.latitude, &row.longitude) else {
                return None;
            };
            let distance = geo_utils::distance_to(origin, lat, lon)?;
            (distance <= radius_km).then(|| ActivityCandidate::from(row).with_distance(distance))
        })
        .collect();

    within.sort_by(|a, b| {
        let da = a.distance_km.unwrap_or(f64::INFINITY);
        let db = b.distance_km.unwrap_or(f64::INFINITY);
        da.total_cmp(&db)
    });

    debug!(
        "[nearby] {} of {} rows within {:.1}km of ({:.4}, {:.4})",
        within.len(),
        total,
        radius_km,
        origin.latitude,
        origin.longitude
    );
    within
}

/// List every upcoming activity near the user, closest first.
///
/// Unlike recommendations, the listing is not capped and includes
/// activities the user is already registered for.
pub fn nearby<S: ActivityStore + ?Sized>(
    store: &S,
    user: &UserContext,
    config: &NearbyConfig,
) -> NearbyOutcome {
    let Some(origin) = user.location() else {
        info!("[nearby] No usable location for user {}", user.user_id);
        return NearbyOutcome::LocationUnknown;
    };

    let rows = store.find_all_upcoming_with_location().unwrap_or_else(|e| {
        warn!("[nearby] Listing query failed for user {}: {}", user.user_id, e);
        Vec::new()
    });

    NearbyOutcome::Found {
        origin,
        radius_km: config.radius_km,
        activities: filter_within_radius(rows, &origin, config.radius_km),
    }
}
