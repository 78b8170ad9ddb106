//! # Campus Recommender
//!
//! Interest and proximity based activity recommendation for a campus event
//! registration system.
//!
//! This library provides:
//! - A haversine distance primitive that tolerates malformed coordinates
//! - A two-stage recommendation pipeline (interest matches, then nearby top-up)
//! - The "activities nearby" listing used by the map view
//!
//! Storage is an external collaborator expressed by the [`ActivityStore`]
//! trait. The pipeline only issues read queries and never fails: a broken
//! query or a bad coordinate degrades the result instead of aborting it.
//!
//! ## Features
//!
//! - **`serde`** - Derive `Serialize`/`Deserialize` for rows, candidates and results
//!
//! ## Quick Start
//!
//! ```rust
//! use campus_recommender::{
//!     recommend, MemoryStore, RecommendConfig, StoredActivity, UserContext,
//! };
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
//! let mut store = MemoryStore::new().at(now);
//! store.add_activity(
//!     StoredActivity::new(1, "Spring Concert", now + Duration::days(2))
//!         .with_category("Music Performance")
//!         .with_location("Main Hall", 31.0252, 121.4337),
//! );
//! store.add_interest(7, "Music");
//!
//! let user = UserContext::new(7).with_location(31.0260, 121.4340);
//! let result = recommend(&store, &user, &RecommendConfig::default());
//!
//! assert_eq!(result.ids(), vec![1]);
//! ```

use chrono::{DateTime, Utc};
use std::fmt;

// Great-circle distance and coordinate coercion
pub mod geo_utils;

// Error types
pub mod error;
pub use error::{LocationError, StoreError};

// Storage contract and in-memory store
pub mod store;
pub use store::{
    ActivityRow, ActivityStatus, ActivityStore, InterestMatch, MemoryStore, RegistrationStatus,
    StoreQuery, StoredActivity,
};

// Two-stage recommendation pipeline
pub mod recommend;
pub use recommend::{
    interest_stage, proximity_stage, recommend, Recommendation, RecommendConfig,
    RecommendationResult, RecommendationSource, RECOMMENDATION_BUDGET, RECOMMENDATION_RADIUS_KM,
};

// Radius filtering and the nearby listing
pub mod nearby;
pub use nearby::{filter_within_radius, nearby, NearbyConfig, NearbyOutcome, NEARBY_RADIUS_KM};

/// Activity primary key.
pub type ActivityId = i64;

/// User primary key.
pub type UserId = i64;

// ============================================================================
// Core Types
// ============================================================================

/// A raw coordinate value as it arrives from storage or a session.
///
/// Database drivers and form posts hand coordinates over either as numbers
/// or as decimal text. Use [`Coordinate::coerce`] to get a real number.
///
/// # Example
/// ```
/// use campus_recommender::Coordinate;
///
/// assert_eq!(Coordinate::from("31.25").coerce(), Some(31.25));
/// assert_eq!(Coordinate::from(121.5).coerce(), Some(121.5));
/// assert_eq!(Coordinate::from("abc").coerce(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    /// Coerce to a finite real number.
    ///
    /// Text is trimmed and parsed as a decimal float. Returns `None` for
    /// anything that does not yield a finite value (including `"NaN"` and
    /// `"inf"`).
    pub fn coerce(&self) -> Option<f64> {
        let value = match self {
            Coordinate::Number(v) => *v,
            Coordinate::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for Coordinate {
    fn from(value: f64) -> Self {
        Coordinate::Number(value)
    }
}

impl From<&str> for Coordinate {
    fn from(value: &str) -> Self {
        Coordinate::Text(value.to_string())
    }
}

impl From<String> for Coordinate {
    fn from(value: String) -> Self {
        Coordinate::Text(value)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coordinate::Number(v) => write!(f, "{}", v),
            Coordinate::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// A known geographic location in WGS84 degrees.
///
/// # Example
/// ```
/// use campus_recommender::GeoPoint;
/// let point = GeoPoint::new(31.0252, 121.4337); // Minhang campus
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Build a point from a pair of raw coordinates.
    ///
    /// Both halves must be present, coercible and in range. A partial or
    /// malformed pair is an unknown location and yields `None`.
    pub fn from_coordinates(
        latitude: Option<&Coordinate>,
        longitude: Option<&Coordinate>,
    ) -> Option<Self> {
        let point = Self::new(latitude?.coerce()?, longitude?.coerce()?);
        point.is_valid().then_some(point)
    }

    /// Parse a location submitted by the user (the profile "update location" form).
    ///
    /// # Example
    /// ```
    /// use campus_recommender::{GeoPoint, LocationError};
    ///
    /// let point = GeoPoint::parse(Some("31.0252"), Some(" 121.4337 ")).unwrap();
    /// assert_eq!(point, GeoPoint::new(31.0252, 121.4337));
    ///
    /// assert_eq!(GeoPoint::parse(None, Some("121.4")), Err(LocationError::Missing));
    /// ```
    pub fn parse(latitude: Option<&str>, longitude: Option<&str>) -> Result<Self, LocationError> {
        let (Some(lat), Some(lon)) = (latitude, longitude) else {
            return Err(LocationError::Missing);
        };

        let parse_one = |raw: &str| {
            Coordinate::from(raw)
                .coerce()
                .ok_or_else(|| LocationError::NotANumber(raw.to_string()))
        };

        let point = Self::new(parse_one(lat)?, parse_one(lon)?);
        if !point.is_valid() {
            return Err(LocationError::OutOfRange {
                latitude: point.latitude,
                longitude: point.longitude,
            });
        }
        Ok(point)
    }
}

/// The session-side view of the user a request is made for.
///
/// The identity layer supplies the id and the user's last-known
/// coordinates, which may be missing, partial or malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct UserContext {
    pub user_id: UserId,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
}

impl UserContext {
    /// A user with no known location.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, latitude: None, longitude: None }
    }

    /// Attach last-known coordinates.
    pub fn with_location(
        mut self,
        latitude: impl Into<Coordinate>,
        longitude: impl Into<Coordinate>,
    ) -> Self {
        self.latitude = Some(latitude.into());
        self.longitude = Some(longitude.into());
        self
    }

    /// The user's location, if both coordinates are known and usable.
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_coordinates(self.latitude.as_ref(), self.longitude.as_ref())
    }
}

/// An activity offered to the user, as rendered by the profile and map views.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivityCandidate {
    /// Unique activity identifier
    pub id: ActivityId,
    /// Display name
    pub name: String,
    /// Scheduled start
    pub start_time: DateTime<Utc>,
    /// Name of the venue, if the activity has one
    pub location_name: Option<String>,
    /// Venue coordinates, if both are known and usable
    pub location: Option<GeoPoint>,
    /// Distance from the user in kilometers, set by the proximity filter
    pub distance_km: Option<f64>,
}

impl ActivityCandidate {
    /// Attach a computed distance from the user.
    pub fn with_distance(mut self, distance_km: f64) -> Self {
        self.distance_km = Some(distance_km);
        self
    }
}

impl From<ActivityRow> for ActivityCandidate {
    fn from(row: ActivityRow) -> Self {
        let location = GeoPoint::from_coordinates(row.latitude.as_ref(), row.longitude.as_ref());
        Self {
            id: row.id,
            name: row.name,
            start_time: row.start_time,
            location_name: row.location_name,
            location,
            distance_km: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
