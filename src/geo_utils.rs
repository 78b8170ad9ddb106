//! # Geographic Utilities
//!
//! The distance primitive behind recommendation top-ups and the nearby listing.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_km`] | Great-circle distance between two known points |
//! | [`distance_to`] | Distance from a known point to a raw (uncoerced) coordinate pair |
//! | [`distance_km`] | Distance between two raw coordinate pairs |
//!
//! ## Example
//!
//! ```rust
//! use campus_recommender::{Coordinate, GeoPoint, geo_utils};
//!
//! let library = GeoPoint::new(31.0252, 121.4337);
//! let stadium = GeoPoint::new(31.0310, 121.4420);
//!
//! let km = geo_utils::haversine_km(&library, &stadium);
//! println!("Library to stadium: {:.2}km", km);
//!
//! // Storage rows may carry coordinates as text
//! let km = geo_utils::distance_to(
//!     &library,
//!     &Coordinate::from("31.0310"),
//!     &Coordinate::from("121.4420"),
//! );
//! assert!(km.is_some());
//!
//! // A malformed coordinate yields an unknown distance, never a panic
//! let lat = Coordinate::from("abc");
//! let km = geo_utils::distance_to(&library, &lat, &Coordinate::from(121.4));
//! assert!(km.is_none());
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! a = sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlon/2),
//! c = 2·atan2(√a, √(1−a)), d = R·c, with all angles in radians and
//! R = 6371 km ([`EARTH_RADIUS_KM`]).
//!
//! The central angle comes from `geo`'s [`Haversine`] metric. `geo` multiplies
//! it by the IUGG mean radius (6371.0088 km), so the result is rescaled to
//! 6371 km and rounded to the micrometer. Rounding keeps a point placed
//! exactly on a search radius inside it.
//!
//! ### Unknown Distances
//!
//! Coordinates that cannot be coerced to a finite, in-range number produce
//! `None`. Callers exclude such candidates from distance filtering and
//! sorting; nothing else about the request is affected.

use geo::{Distance, Haversine, Point};
use log::warn;

use crate::{Coordinate, GeoPoint};

/// Earth radius used by the haversine computation, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// Radius `geo::Haversine` multiplies the central angle by, in meters
const GEO_MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

// Kilometers are rounded to nine decimal places (one micrometer)
const KM_ROUNDING: f64 = 1e9;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two points using the Haversine formula.
///
/// Returns the distance in kilometers along the Earth's surface, for a
/// spherical Earth of radius [`EARTH_RADIUS_KM`].
///
/// # Example
///
/// ```rust
/// use campus_recommender::{GeoPoint, geo_utils};
///
/// let a = GeoPoint::new(0.0, 0.0);
/// let b = GeoPoint::new(0.0, 1.0);
///
/// let distance = geo_utils::haversine_km(&a, &b);
/// assert!((distance - 111.195).abs() < 0.001); // one degree of longitude at the equator
/// ```
#[inline]
pub fn haversine_km(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    let meters = Haversine::distance(point1, point2);
    let km = meters / GEO_MEAN_EARTH_RADIUS_M * EARTH_RADIUS_KM;
    (km * KM_ROUNDING).round() / KM_ROUNDING
}

/// Distance in kilometers from a known point to a raw coordinate pair.
///
/// Returns `None` (and logs a warning) when the pair cannot be coerced to a
/// valid location.
pub fn distance_to(
    origin: &GeoPoint,
    latitude: &Coordinate,
    longitude: &Coordinate,
) -> Option<f64> {
    match GeoPoint::from_coordinates(Some(latitude), Some(longitude)) {
        Some(target) => Some(haversine_km(origin, &target)),
        None => {
            warn!(
                "[geo_utils] Cannot compute distance from ({}, {}) to lat={}, lon={}",
                origin.latitude, origin.longitude, latitude, longitude
            );
            None
        }
    }
}

/// Distance in kilometers between two raw coordinate pairs.
///
/// Any coordinate that is missing its numeric meaning (non-numeric text,
/// non-finite, out of range) makes the distance unknown.
pub fn distance_km(
    lat1: &Coordinate,
    lon1: &Coordinate,
    lat2: &Coordinate,
    lon2: &Coordinate,
) -> Option<f64> {
    match GeoPoint::from_coordinates(Some(lat1), Some(lon1)) {
        Some(origin) => distance_to(&origin, lat2, lon2),
        None => {
            warn!(
                "[geo_utils] Cannot compute distance: origin lat={}, lon={} is not a location",
                lat1, lon1
            );
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
