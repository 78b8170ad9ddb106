//! Two-stage activity recommendation.
//!
//! Recommendations are built from two sources, in priority order:
//!
//! 1. **Interest stage** ([`interest_stage`]): upcoming activities whose
//!    category contains one of the user's interests. Matching, exclusion of
//!    the user's registrations, ordering and the row cap are all delegated to
//!    storage.
//! 2. **Proximity stage** ([`proximity_stage`]): only when the budget is not
//!    yet spent and the user's location is known. Storage prefilters to
//!    upcoming, located activities not already registered or selected; the
//!    distance filter and sort happen in process.
//!
//! [`recommend`] runs both stages and merges them into a
//! [`RecommendationResult`]: at most `budget` entries, no repeated ids,
//! interest matches first. A failing query only empties its own stage.

use log::{debug, info, warn};
use std::collections::HashSet;

use crate::nearby::filter_within_radius;
use crate::store::ActivityStore;
use crate::{ActivityCandidate, ActivityId, GeoPoint, UserContext, UserId};

/// Maximum number of recommendations per request.
pub const RECOMMENDATION_BUDGET: usize = 5;

/// Radius used to top up recommendations with nearby activities.
pub const RECOMMENDATION_RADIUS_KM: f64 = 10.0;

/// Configuration for [`recommend`].
#[derive(Debug, Clone)]
pub struct RecommendConfig {
    /// Maximum number of recommendations returned.
    /// Default: 5
    pub budget: usize,

    /// Maximum distance for proximity top-ups, in kilometers.
    /// Default: 10.0 (wider than the 5km nearby listing)
    pub radius_km: f64,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            budget: RECOMMENDATION_BUDGET,
            radius_km: RECOMMENDATION_RADIUS_KM,
        }
    }
}

/// Which stage produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecommendationSource {
    Interest,
    Proximity,
}

/// A single recommended activity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Recommendation {
    pub source: RecommendationSource,
    pub activity: ActivityCandidate,
}

/// Ordered recommendations for one request.
///
/// Render in the order given: interest matches (soonest first), then
/// nearby activities (closest first).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RecommendationResult {
    items: Vec<Recommendation>,
}

impl RecommendationResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recommendation> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Recommendation] {
        &self.items
    }

    /// Activity ids in recommendation order.
    pub fn ids(&self) -> Vec<ActivityId> {
        self.items.iter().map(|r| r.activity.id).collect()
    }

    /// Drop the source tags, keeping recommendation order.
    pub fn into_candidates(self) -> Vec<ActivityCandidate> {
        self.items.into_iter().map(|r| r.activity).collect()
    }
}

impl IntoIterator for RecommendationResult {
    type Item = Recommendation;
    type IntoIter = std::vec::IntoIter<Recommendation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecommendationResult {
    type Item = &'a Recommendation;
    type IntoIter = std::slice::Iter<'a, Recommendation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Accumulates recommendations under the budget, dropping repeated ids.
struct ResultBuilder {
    budget: usize,
    seen: HashSet<ActivityId>,
    items: Vec<Recommendation>,
}

impl ResultBuilder {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            seen: HashSet::new(),
            items: Vec::with_capacity(budget),
        }
    }

    fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.items.len())
    }

    /// Append unless full or already present. Returns whether it was added.
    fn push(&mut self, activity: ActivityCandidate, source: RecommendationSource) -> bool {
        if self.remaining() == 0 || !self.seen.insert(activity.id) {
            return false;
        }
        self.items.push(Recommendation { source, activity });
        true
    }

    fn selected_ids(&self) -> Vec<ActivityId> {
        self.items.iter().map(|r| r.activity.id).collect()
    }

    fn finish(self) -> RecommendationResult {
        RecommendationResult { items: self.items }
    }
}

/// Interest-matched upcoming activities for `user_id`, soonest first, at most `budget`.
///
/// A failing query yields no candidates.
pub fn interest_stage<S: ActivityStore + ?Sized>(
    store: &S,
    user_id: UserId,
    budget: usize,
) -> Vec<ActivityCandidate> {
    match store.find_interest_matched_upcoming(user_id, budget) {
        Ok(rows) => rows
            .into_iter()
            .take(budget)
            .map(ActivityCandidate::from)
            .collect(),
        Err(e) => {
            warn!("[Recommender] Interest query failed for user {}: {}", user_id, e);
            Vec::new()
        }
    }
}

/// Upcoming activities within `radius_km` of `origin`, closest first.
///
/// `exclude` is passed through to storage along with the user's
/// registrations. A failing query yields no candidates.
pub fn proximity_stage<S: ActivityStore + ?Sized>(
    store: &S,
    user_id: UserId,
    origin: &GeoPoint,
    exclude: &[ActivityId],
    radius_km: f64,
) -> Vec<ActivityCandidate> {
    match store.find_upcoming_with_location(user_id, exclude) {
        Ok(rows) => filter_within_radius(rows, origin, radius_km),
        Err(e) => {
            warn!("[Recommender] Proximity query failed for user {}: {}", user_id, e);
            Vec::new()
        }
    }
}

/// Recommend activities for a user.
///
/// Interest matches come first; if fewer than `config.budget` were found and
/// the user's location is known, the rest is filled with the closest
/// activities within `config.radius_km`. The result is never padded with
/// anything else and may be empty.
///
/// # Example
/// ```
/// use campus_recommender::{recommend, MemoryStore, RecommendConfig, StoredActivity, UserContext};
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let mut store = MemoryStore::new().at(now);
/// store
///     .add_activity(
///         StoredActivity::new(1, "Debate Club", now + Duration::days(1))
///             .with_category("Debate"),
///     )
///     .add_activity(
///         StoredActivity::new(2, "Campus Run", now + Duration::days(2))
///             .with_location("Track", 31.030, 121.440),
///     )
///     .add_interest(9, "Debate");
///
/// // Without a location only the interest stage runs
/// let result = recommend(&store, &UserContext::new(9), &RecommendConfig::default());
/// assert_eq!(result.ids(), vec![1]);
///
/// // With one, nearby activities fill the remaining slots
/// let user = UserContext::new(9).with_location(31.031, 121.441);
/// let result = recommend(&store, &user, &RecommendConfig::default());
/// assert_eq!(result.ids(), vec![1, 2]);
/// ```
pub fn recommend<S: ActivityStore + ?Sized>(
    store: &S,
    user: &UserContext,
    config: &RecommendConfig,
) -> RecommendationResult {
    let mut builder = ResultBuilder::new(config.budget);

    if config.budget == 0 {
        return builder.finish();
    }

    for candidate in interest_stage(store, user.user_id, config.budget) {
        builder.push(candidate, RecommendationSource::Interest);
    }
    let from_interests = builder.items.len();

    let needed = builder.remaining();
    if needed == 0 {
        debug!("[Recommender] Budget filled by interests for user {}", user.user_id);
        return builder.finish();
    }

    let Some(origin) = user.location() else {
        debug!(
            "[Recommender] No usable location for user {}, skipping proximity stage",
            user.user_id
        );
        return builder.finish();
    };

    let exclude = builder.selected_ids();
    for candidate in proximity_stage(store, user.user_id, &origin, &exclude, config.radius_km) {
        if builder.remaining() == 0 {
            break;
        }
        builder.push(candidate, RecommendationSource::Proximity);
    }

    let result = builder.finish();
    info!(
        "[Recommender] User {}: {} recommendations ({} by interest, {} nearby)",
        user.user_id,
        result.len(),
        from_interests,
        result.len() - from_interests
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{ActivityRow, MemoryStore, RegistrationStatus, StoreQuery, StoredActivity};
    use crate::geo_utils::EARTH_RADIUS_KM;
    use crate::Coordinate;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::cell::{Cell, RefCell};

    // One kilometer of arc, in degrees
    const KM: f64 = 180.0 / (EARTH_RADIUS_KM * std::f64::consts::PI);
    const HOME: (f64, f64) = (31.0252, 121.4337);
    const USER: UserId = 7;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
    }

    fn north_of_home(km: f64) -> f64 {
        HOME.0 + km * KM
    }

    fn user_at_home() -> UserContext {
        UserContext::new(USER).with_location(HOME.0, HOME.1)
    }

    /// Counts queries and records the exclusion list passed to storage.
    struct SpyStore {
        inner: MemoryStore,
        interest_calls: Cell<u32>,
        proximity_calls: Cell<u32>,
        last_exclude: RefCell<Vec<ActivityId>>,
    }

    impl SpyStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                interest_calls: Cell::new(0),
                proximity_calls: Cell::new(0),
                last_exclude: RefCell::new(Vec::new()),
            }
        }
    }

    impl ActivityStore for SpyStore {
        fn find_interest_matched_upcoming(
            &self,
            user_id: UserId,
            limit: usize,
        ) -> Result<Vec<ActivityRow>, StoreError> {
            self.interest_calls.set(self.interest_calls.get() + 1);
            self.inner.find_interest_matched_upcoming(user_id, limit)
        }

        fn find_upcoming_with_location(
            &self,
            user_id: UserId,
            exclude: &[ActivityId],
        ) -> Result<Vec<ActivityRow>, StoreError> {
            self.proximity_calls.set(self.proximity_calls.get() + 1);
            *self.last_exclude.borrow_mut() = exclude.to_vec();
            self.inner.find_upcoming_with_location(user_id, exclude)
        }

        fn find_all_upcoming_with_location(&self) -> Result<Vec<ActivityRow>, StoreError> {
            self.inner.find_all_upcoming_with_location()
        }
    }

    /// Returns the same rows for every query, duplicates included.
    struct FixedStore {
        interest: Vec<ActivityRow>,
        located: Vec<ActivityRow>,
    }

    impl ActivityStore for FixedStore {
        fn find_interest_matched_upcoming(
            &self,
            _: UserId,
            _: usize,
        ) -> Result<Vec<ActivityRow>, StoreError> {
            Ok(self.interest.clone())
        }

        fn find_upcoming_with_location(
            &self,
            _: UserId,
            _: &[ActivityId],
        ) -> Result<Vec<ActivityRow>, StoreError> {
            Ok(self.located.clone())
        }

        fn find_all_upcoming_with_location(&self) -> Result<Vec<ActivityRow>, StoreError> {
            Ok(self.located.clone())
        }
    }

    fn fixed_row(id: ActivityId, km: f64) -> ActivityRow {
        ActivityRow {
            id,
            name: format!("Activity {}", id),
            start_time: now() + Duration::hours(id),
            location_name: None,
            latitude: Some(Coordinate::from(north_of_home(km))),
            longitude: Some(Coordinate::from(HOME.1)),
        }
    }

    /// `count` interest matches for USER, starting soonest-last so ordering is checked.
    fn interest_activities(store: &mut MemoryStore, count: i64) {
        for i in 0..count {
            let name = format!("Coding Dojo {}", i);
            store.add_activity(
                StoredActivity::new(100 + i, &name, now() + Duration::days(count - i))
                    .with_category("Computer Programming")
                    .with_location("Lab", north_of_home(0.5), HOME.1),
            );
        }
        store.add_interest(USER, "Programming");
    }

    fn located_activity(id: ActivityId, km: f64) -> StoredActivity {
        StoredActivity::new(id, &format!("Nearby {}", id), now() + Duration::hours(id))
            .with_category("Other")
            .with_location("Venue", north_of_home(km), HOME.1)
    }

    fn assert_invariants(result: &RecommendationResult, config: &RecommendConfig) {
        assert!(result.len() <= config.budget);
        let unique: HashSet<ActivityId> = result.ids().into_iter().collect();
        assert_eq!(unique.len(), result.len());
        for rec in result {
            match rec.source {
                RecommendationSource::Interest => {}
                RecommendationSource::Proximity => {
                    let d = rec.activity.distance_km.expect("proximity entries carry a distance");
                    assert!((0.0..=config.radius_km).contains(&d));
                }
            }
        }
    }

    #[test]
    fn test_full_interest_budget_skips_proximity() {
        let mut store = MemoryStore::new().at(now());
        interest_activities(&mut store, 6);
        store.add_activity(located_activity(1, 0.1));
        let spy = SpyStore::new(store);

        let config = RecommendConfig::default();
        let result = recommend(&spy, &user_at_home(), &config);

        // Start times are reversed relative to ids: 105 is soonest
        assert_eq!(result.ids(), vec![105, 104, 103, 102, 101]);
        assert!(result.iter().all(|r| r.source == RecommendationSource::Interest));
        assert_eq!(spy.proximity_calls.get(), 0);
        assert_invariants(&result, &config);
    }

    #[test]
    fn test_interest_only_without_location() {
        let mut store = MemoryStore::new().at(now());
        interest_activities(&mut store, 2);
        store.add_activity(located_activity(1, 0.1));
        let spy = SpyStore::new(store);

        let result = recommend(&spy, &UserContext::new(USER), &RecommendConfig::default());
        assert_eq!(result.ids(), vec![101, 100]);
        assert_eq!(spy.proximity_calls.get(), 0);
    }

    #[test]
    fn test_partial_or_malformed_user_location_skips_proximity() {
        let mut store = MemoryStore::new().at(now());
        store.add_activity(located_activity(1, 0.1));
        let spy = SpyStore::new(store);

        let partial = UserContext {
            latitude: Some(Coordinate::from(HOME.0)),
            ..UserContext::new(USER)
        };
        assert!(recommend(&spy, &partial, &RecommendConfig::default()).is_empty());

        let malformed = UserContext::new(USER).with_location("abc", HOME.1);
        assert!(recommend(&spy, &malformed, &RecommendConfig::default()).is_empty());
        assert_eq!(spy.proximity_calls.get(), 0);
    }

    #[test]
    fn test_proximity_only_ordered_by_distance() {
        let mut store = MemoryStore::new().at(now());
        store
            .add_activity(located_activity(1, 9.0))
            .add_activity(located_activity(2, 15.0))
            .add_activity(located_activity(3, 1.0))
            .add_activity(located_activity(4, 5.0));

        let config = RecommendConfig::default();
        let result = recommend(&store, &user_at_home(), &config);

        assert_eq!(result.ids(), vec![3, 4, 1]);
        let distances: Vec<f64> = result.iter().map(|r| r.activity.distance_km.unwrap()).collect();
        assert!((distances[0] - 1.0).abs() < 0.01);
        assert!((distances[1] - 5.0).abs() < 0.01);
        assert!((distances[2] - 9.0).abs() < 0.01);
        assert!(result.iter().all(|r| r.source == RecommendationSource::Proximity));
        assert_invariants(&result, &config);
    }

    #[test]
    fn test_interest_then_proximity_excludes_selected() {
        let mut store = MemoryStore::new().at(now());
        interest_activities(&mut store, 2);
        store
            .add_activity(located_activity(1, 3.0))
            .add_activity(located_activity(2, 2.0))
            .add_activity(located_activity(3, 8.0))
            .add_activity(located_activity(4, 6.0));
        let spy = SpyStore::new(store);

        let config = RecommendConfig::default();
        let result = recommend(&spy, &user_at_home(), &config);

        // Interest matches sit 0.5km away but must not come back as proximity entries
        assert_eq!(result.ids(), vec![101, 100, 2, 1, 4]);
        assert_eq!(result.as_slice()[2].source, RecommendationSource::Proximity);
        let mut excluded = spy.last_exclude.borrow().clone();
        excluded.sort();
        assert_eq!(excluded, vec![100, 101]);
        assert_invariants(&result, &config);
    }

    #[test]
    fn test_empty_exclusion_list_when_no_interests() {
        let mut store = MemoryStore::new().at(now());
        store.add_activity(located_activity(1, 1.0));
        let spy = SpyStore::new(store);

        recommend(&spy, &user_at_home(), &RecommendConfig::default());
        assert_eq!(spy.proximity_calls.get(), 1);
        assert!(spy.last_exclude.borrow().is_empty());
    }

    #[test]
    fn test_registered_activities_never_recommended() {
        let mut store = MemoryStore::new().at(now());
        interest_activities(&mut store, 2);
        store
            .add_activity(located_activity(1, 1.0))
            .add_activity(located_activity(2, 2.0))
            .register(USER, 100, RegistrationStatus::Registered)
            .register(USER, 1, RegistrationStatus::CheckedIn)
            .register(USER, 2, RegistrationStatus::Cancelled);

        let result = recommend(&store, &user_at_home(), &RecommendConfig::default());
        assert_eq!(result.ids(), vec![101, 2]);
    }

    #[test]
    fn test_interest_query_failure_falls_back_to_proximity() {
        let mut store = MemoryStore::new().at(now());
        interest_activities(&mut store, 3);
        store
            .add_activity(located_activity(1, 4.0))
            .fail_query(StoreQuery::InterestMatched);

        let result = recommend(&store, &user_at_home(), &RecommendConfig::default());
        // Without the interest stage, the 0.5km interest activities are plain nearby ones
        assert_eq!(result.ids(), vec![102, 101, 100, 1]);
        assert!(result.iter().all(|r| r.source == RecommendationSource::Proximity));
    }

    #[test]
    fn test_proximity_query_failure_keeps_interests() {
        let mut store = MemoryStore::new().at(now());
        interest_activities(&mut store, 2);
        store
            .add_activity(located_activity(1, 1.0))
            .fail_query(StoreQuery::UpcomingWithLocation);

        let result = recommend(&store, &user_at_home(), &RecommendConfig::default());
        assert_eq!(result.ids(), vec![101, 100]);
    }

    #[test]
    fn test_empty_when_nothing_matches() {
        let store = MemoryStore::new().at(now());
        assert!(recommend(&store, &user_at_home(), &RecommendConfig::default()).is_empty());
    }

    #[test]
    fn test_duplicate_rows_are_merged() {
        let store = FixedStore {
            interest: vec![fixed_row(1, 20.0), fixed_row(1, 20.0), fixed_row(2, 30.0)],
            located: vec![
                fixed_row(2, 0.5),
                fixed_row(3, 1.0),
                fixed_row(3, 1.0),
                fixed_row(4, 2.0),
            ],
        };

        let config = RecommendConfig::default();
        let result = recommend(&store, &user_at_home(), &config);
        assert_eq!(result.ids(), vec![1, 2, 3, 4]);
        assert_eq!(result.as_slice()[1].source, RecommendationSource::Interest);
        assert_invariants(&result, &config);
    }

    #[test]
    fn test_oversized_sources_are_capped() {
        let store = FixedStore {
            interest: (1..=7).map(|id| fixed_row(id, 50.0)).collect(),
            located: Vec::new(),
        };
        let result = recommend(&store, &user_at_home(), &RecommendConfig::default());
        assert_eq!(result.ids(), vec![1, 2, 3, 4, 5]);

        let store = FixedStore {
            interest: Vec::new(),
            located: (1..=8).map(|id| fixed_row(id, id as f64)).collect(),
        };
        let config = RecommendConfig::default();
        let result = recommend(&store, &user_at_home(), &config);
        assert_eq!(result.ids(), vec![1, 2, 3, 4, 5]);
        assert_invariants(&result, &config);
    }

    #[test]
    fn test_custom_budget_and_radius() {
        let mut store = MemoryStore::new().at(now());
        store
            .add_activity(located_activity(1, 1.0))
            .add_activity(located_activity(2, 12.0))
            .add_activity(located_activity(3, 18.0));

        let config = RecommendConfig { budget: 2, radius_km: 20.0 };
        let result = recommend(&store, &user_at_home(), &config);
        assert_eq!(result.ids(), vec![1, 2]);

        let config = RecommendConfig { budget: 0, ..RecommendConfig::default() };
        assert!(recommend(&store, &user_at_home(), &config).is_empty());
    }

    #[test]
    fn test_activity_exactly_at_radius_is_recommended() {
        let lon = (RECOMMENDATION_RADIUS_KM / EARTH_RADIUS_KM).to_degrees();
        let mut store = MemoryStore::new().at(now());
        store.add_activity(
            StoredActivity::new(1, "Edge Picnic", now() + Duration::hours(1))
                .with_location("East Lawn", 0.0, lon),
        );
        let user = UserContext::new(USER).with_location(0.0, 0.0);

        let result = recommend(&store, &user, &RecommendConfig::default());
        assert_eq!(result.ids(), vec![1]);
        assert_eq!(result.as_slice()[0].activity.distance_km, Some(RECOMMENDATION_RADIUS_KM));
    }

    #[test]
    fn test_into_candidates_keeps_order() {
        let mut store = MemoryStore::new().at(now());
        interest_activities(&mut store, 1);
        store
            .add_activity(located_activity(1, 4.0))
            .add_activity(located_activity(2, 2.0));

        let result = recommend(&store, &user_at_home(), &RecommendConfig::default());
        let ids = result.ids();
        let candidates = result.into_candidates();
        assert_eq!(candidates.iter().map(|c| c.id).collect::<Vec<_>>(), ids);
        assert_eq!(ids, vec![100, 2, 1]);
        assert!(candidates[0].distance_km.is_none());
    }

    #[test]
    fn test_stages_run_independently() {
        let mut store = MemoryStore::new().at(now());
        interest_activities(&mut store, 3);
        store.add_activity(located_activity(1, 2.0));

        let interests = interest_stage(&store, USER, 2);
        assert_eq!(interests.iter().map(|c| c.id).collect::<Vec<_>>(), vec![102, 101]);
        assert!(interests.iter().all(|c| c.distance_km.is_none()));

        let origin = GeoPoint::new(HOME.0, HOME.1);
        let nearby = proximity_stage(&store, USER, &origin, &[100, 101, 102], 10.0);
        assert_eq!(nearby.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialized_result_keeps_order() {
        let mut store = MemoryStore::new().at(now());
        store
            .add_activity(located_activity(1, 3.0))
            .add_activity(located_activity(2, 1.0));

        let result = recommend(&store, &user_at_home(), &RecommendConfig::default());
        let json = serde_json::to_value(&result).unwrap();
        let ids: Vec<i64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["activity"]["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(json[0]["source"], "Proximity");
    }
}
