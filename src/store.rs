//! Storage contract for the recommendation queries.
//!
//! The relational store (activities, locations, categories, interests,
//! registrations) is an external collaborator. [`ActivityStore`] captures the
//! read queries the recommender issues against it; [`MemoryStore`] is an
//! in-process implementation with the same query semantics.
//!
//! Query semantics shared by every implementation:
//! - *Upcoming* means status [`ActivityStatus::NotStarted`] and a start time at
//!   or after the current instant.
//! - Activities the user holds a [`RegistrationStatus::Registered`] or
//!   [`RegistrationStatus::CheckedIn`] registration for are excluded from the
//!   per-user queries.
//! - Rows come back ordered by start time, soonest first.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::StoreError;
use crate::{ActivityId, Coordinate, UserId};

/// A row as returned by the activity queries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivityRow {
    pub id: ActivityId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub location_name: Option<String>,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
}

/// Read queries the recommender needs from storage.
pub trait ActivityStore {
    /// Distinct upcoming activities with a category whose name contains one
    /// of the user's interest names, excluding the user's registrations,
    /// soonest first, at most `limit` rows.
    fn find_interest_matched_upcoming(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ActivityRow>, StoreError>;

    /// Upcoming activities whose venue has both coordinates, excluding the
    /// user's registrations and every id in `exclude`.
    fn find_upcoming_with_location(
        &self,
        user_id: UserId,
        exclude: &[ActivityId],
    ) -> Result<Vec<ActivityRow>, StoreError>;

    /// Every upcoming activity whose venue has both coordinates.
    fn find_all_upcoming_with_location(&self) -> Result<Vec<ActivityRow>, StoreError>;
}

/// Lifecycle status of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActivityStatus {
    NotStarted,
    InProgress,
    Ended,
    Cancelled,
}

/// Status of a user's registration for an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegistrationStatus {
    Registered,
    CheckedIn,
    NoShow,
    Cancelled,
}

impl RegistrationStatus {
    /// Whether this registration keeps the activity out of the user's suggestions.
    pub fn excludes_from_suggestions(self) -> bool {
        matches!(self, RegistrationStatus::Registered | RegistrationStatus::CheckedIn)
    }
}

/// How an interest name is matched against a category name.
///
/// Matching is substring containment of the interest inside the category
/// (`Category LIKE '%interest%'`), never equality or token matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterestMatch {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

impl InterestMatch {
    /// Whether `category` contains `interest` under this mode.
    ///
    /// ```
    /// use campus_recommender::InterestMatch;
    ///
    /// assert!(InterestMatch::CaseSensitive.matches("Outdoor Sports", "Sports"));
    /// assert!(!InterestMatch::CaseSensitive.matches("Outdoor Sports", "sports"));
    /// assert!(InterestMatch::CaseInsensitive.matches("Outdoor Sports", "sports"));
    /// ```
    pub fn matches(self, category: &str, interest: &str) -> bool {
        match self {
            InterestMatch::CaseSensitive => category.contains(interest),
            InterestMatch::CaseInsensitive => {
                category.to_lowercase().contains(&interest.to_lowercase())
            }
        }
    }
}

/// The queries of [`ActivityStore`], used to make a [`MemoryStore`] fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreQuery {
    InterestMatched,
    UpcomingWithLocation,
    AllUpcomingWithLocation,
}

impl StoreQuery {
    fn name(self) -> &'static str {
        match self {
            StoreQuery::InterestMatched => "find_interest_matched_upcoming",
            StoreQuery::UpcomingWithLocation => "find_upcoming_with_location",
            StoreQuery::AllUpcomingWithLocation => "find_all_upcoming_with_location",
        }
    }
}

impl fmt::Display for StoreQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Venue of a stored activity.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLocation {
    pub name: String,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
}

/// An activity held by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredActivity {
    pub id: ActivityId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub status: ActivityStatus,
    pub categories: Vec<String>,
    pub location: Option<StoredLocation>,
}

impl StoredActivity {
    /// A not-yet-started activity with no categories and no venue.
    pub fn new(id: ActivityId, name: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.to_string(),
            start_time,
            status: ActivityStatus::NotStarted,
            categories: Vec::new(),
            location: None,
        }
    }

    pub fn with_status(mut self, status: ActivityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.categories.push(category.to_string());
        self
    }

    pub fn with_location(
        mut self,
        name: &str,
        latitude: impl Into<Coordinate>,
        longitude: impl Into<Coordinate>,
    ) -> Self {
        self.location = Some(StoredLocation {
            name: name.to_string(),
            latitude: Some(latitude.into()),
            longitude: Some(longitude.into()),
        });
        self
    }

    /// A venue with no recorded coordinates.
    pub fn with_unmapped_location(mut self, name: &str) -> Self {
        self.location = Some(StoredLocation {
            name: name.to_string(),
            latitude: None,
            longitude: None,
        });
        self
    }

    fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.status == ActivityStatus::NotStarted && self.start_time >= now
    }

    fn has_coordinates(&self) -> bool {
        self.location
            .as_ref()
            .is_some_and(|l| l.latitude.is_some() && l.longitude.is_some())
    }

    fn to_row(&self) -> ActivityRow {
        let location = self.location.as_ref();
        ActivityRow {
            id: self.id,
            name: self.name.clone(),
            start_time: self.start_time,
            location_name: location.map(|l| l.name.clone()),
            latitude: location.and_then(|l| l.latitude.clone()),
            longitude: location.and_then(|l| l.longitude.clone()),
        }
    }
}

/// In-process [`ActivityStore`].
///
/// Used as the fixture for tests and the demo, and by applications that
/// keep a small activity catalogue in memory.
///
/// # Example
/// ```
/// use campus_recommender::{ActivityStore, MemoryStore, StoredActivity, RegistrationStatus};
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let mut store = MemoryStore::new().at(now);
/// store
///     .add_activity(
///         StoredActivity::new(1, "Chess Night", now + Duration::hours(3))
///             .with_category("Board Games"),
///     )
///     .add_activity(
///         StoredActivity::new(2, "Go Club", now + Duration::hours(5))
///             .with_category("Board Games"),
///     )
///     .add_interest(10, "Games")
///     .register(10, 1, RegistrationStatus::Registered);
///
/// let rows = store.find_interest_matched_upcoming(10, 5).unwrap();
/// assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    activities: Vec<StoredActivity>,
    interests: HashMap<UserId, Vec<String>>,
    registrations: Vec<(UserId, ActivityId, RegistrationStatus)>,
    interest_match: InterestMatch,
    clock: Option<DateTime<Utc>>,
    failing: HashSet<StoreQuery>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate "upcoming" against a fixed instant instead of the wall clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn with_interest_match(mut self, interest_match: InterestMatch) -> Self {
        self.interest_match = interest_match;
        self
    }

    pub fn add_activity(&mut self, activity: StoredActivity) -> &mut Self {
        self.activities.push(activity);
        self
    }

    pub fn add_interest(&mut self, user_id: UserId, interest: &str) -> &mut Self {
        self.interests
            .entry(user_id)
            .or_default()
            .push(interest.to_string());
        self
    }

    pub fn register(
        &mut self,
        user_id: UserId,
        activity_id: ActivityId,
        status: RegistrationStatus,
    ) -> &mut Self {
        self.registrations.push((user_id, activity_id, status));
        self
    }

    /// Make `query` return [`StoreError::Unavailable`] from now on.
    pub fn fail_query(&mut self, query: StoreQuery) -> &mut Self {
        self.failing.insert(query);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn check(&self, query: StoreQuery) -> Result<(), StoreError> {
        if self.failing.contains(&query) {
            return Err(StoreError::Unavailable(format!("{} is disabled", query)));
        }
        Ok(())
    }

    fn excluded_for(&self, user_id: UserId) -> HashSet<ActivityId> {
        self.registrations
            .iter()
            .filter(|(user, _, status)| *user == user_id && status.excludes_from_suggestions())
            .map(|(_, activity, _)| *activity)
            .collect()
    }

    /// Upcoming activities passing `keep`, soonest first.
    fn upcoming_rows<F>(&self, keep: F) -> Vec<ActivityRow>
    where
        F: Fn(&StoredActivity) -> bool,
    {
        let now = self.now();
        let mut matched: Vec<&StoredActivity> = self
            .activities
            .iter()
            .filter(|&a| a.is_upcoming(now) && keep(a))
            .collect();
        matched.sort_by_key(|a| a.start_time);
        matched.into_iter().map(StoredActivity::to_row).collect()
    }
}

impl ActivityStore for MemoryStore {
    fn find_interest_matched_upcoming(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ActivityRow>, StoreError> {
        self.check(StoreQuery::InterestMatched)?;

        let interests: &[String] = self
            .interests
            .get(&user_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let excluded = self.excluded_for(user_id);

        let mut rows = self.upcoming_rows(|a| {
            !excluded.contains(&a.id)
                && a.categories.iter().any(|category| {
                    interests
                        .iter()
                        .any(|interest| self.interest_match.matches(category, interest))
                })
        });
        rows.truncate(limit);

        debug!(
            "[MemoryStore] {} interest-matched rows for user {} ({} interests)",
            rows.len(),
            user_id,
            interests.len()
        );
        Ok(rows)
    }

    fn find_upcoming_with_location(
        &self,
        user_id: UserId,
        exclude: &[ActivityId],
    ) -> Result<Vec<ActivityRow>, StoreError> {
        self.check(StoreQuery::UpcomingWithLocation)?;

        let mut excluded = self.excluded_for(user_id);
        excluded.extend(exclude.iter().copied());

        let rows = self.upcoming_rows(|a| a.has_coordinates() && !excluded.contains(&a.id));
        debug!(
            "[MemoryStore] {} located rows for user {} ({} ids excluded)",
            rows.len(),
            user_id,
            excluded.len()
        );
        Ok(rows)
    }

    fn find_all_upcoming_with_location(&self) -> Result<Vec<ActivityRow>, StoreError> {
        self.check(StoreQuery::AllUpcomingWithLocation)?;
        Ok(self.upcoming_rows(StoredActivity::has_coordinates))
    }
}
