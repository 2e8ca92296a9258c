//! Daily analytics rollups, pool suggestions and dashboard series.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ride::RideKind;
use crate::types::{PoolSuggestionId, RideId, round_cents};

/// Running totals for one calendar day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalytics {
    /// Calendar date (UTC)
    pub date: NaiveDate,
    /// Completed rides
    pub total_rides: u32,
    /// Sum of completed fares
    pub total_revenue: f64,
    /// Drivers online at the last availability change
    pub active_drivers: u32,
    /// Mean minutes between request and acceptance over completed rides
    pub avg_wait_time: f64,
    /// Mean post-ride rating
    pub avg_rating: f64,
    /// Ratings folded into `avg_rating`
    pub rating_count: u32,
    /// Unrounded sum behind `avg_rating`
    #[serde(skip)]
    pub rating_sum: f64,
    /// Unrounded sum behind `avg_wait_time`
    #[serde(skip)]
    pub wait_sum: f64,
    /// Completions that reported a wait
    #[serde(skip)]
    pub wait_samples: u32,
    /// Completions per hour of day, keyed "00".."23"
    pub peak_hours: BTreeMap<String, u32>,
    /// Share of completed rides that were pooled, in percent
    pub pool_ride_percentage: f64,
    /// Completed pooled rides
    pub pool_rides: u32,
}

impl DailyAnalytics {
    /// Zero-valued row for `date`
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_rides: 0,
            total_revenue: 0.0,
            active_drivers: 0,
            avg_wait_time: 0.0,
            avg_rating: 0.0,
            rating_count: 0,
            rating_sum: 0.0,
            wait_sum: 0.0,
            wait_samples: 0,
            peak_hours: BTreeMap::new(),
            pool_ride_percentage: 0.0,
            pool_rides: 0,
        }
    }

    /// Fold one completed ride into the totals.
    pub fn apply_completion(&mut self, completion: &Completion) {
        self.total_rides += 1;
        let rides = f64::from(self.total_rides);

        self.total_revenue = round_cents(self.total_revenue + completion.fare);

        if let Some(wait) = completion.wait_minutes {
            self.wait_sum += wait;
            self.wait_samples += 1;
            self.avg_wait_time = round_cents(self.wait_sum / f64::from(self.wait_samples));
        }

        if completion.kind == RideKind::Pool {
            self.pool_rides += 1;
        }
        self.pool_ride_percentage = round_cents(f64::from(self.pool_rides) * 100.0 / rides);

        let hour = format!("{:02}", chrono::Timelike::hour(&completion.completed_at));
        *self.peak_hours.entry(hour).or_insert(0) += 1;
    }

    /// Fold one rating into the running average.
    pub fn apply_rating(&mut self, rating: u8) {
        self.rating_sum += f64::from(rating);
        self.rating_count += 1;
        self.avg_rating = round_cents(self.rating_sum / f64::from(self.rating_count));
    }
}

/// Facts about a completed ride that the rollup needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    /// Fare collected
    pub fare: f64,
    /// Minutes the rider waited for a driver
    pub wait_minutes: Option<f64>,
    /// Solo or pool
    pub kind: RideKind,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

/// A suggested pairing of two pool rides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSuggestion {
    /// Identifier
    pub id: PoolSuggestionId,
    /// Ride the suggestion is for
    pub ride_id: RideId,
    /// Ride it could share with
    pub suggested_ride_id: RideId,
    /// Amount saved by sharing
    pub savings: f64,
    /// Compatibility in `[0, 1]`
    pub compatibility_score: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Predicted versus actual demand for the dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandSeries {
    /// Time-of-day labels
    pub labels: Vec<String>,
    /// Predicted ride counts
    pub predicted: Vec<u32>,
    /// Observed ride counts
    pub actual: Vec<u32>,
}

/// Revenue per weekday for the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevenueSeries {
    /// Weekday labels
    pub labels: Vec<String>,
    /// Revenue per label
    pub data: Vec<f64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn completion(fare: f64, wait: f64, kind: RideKind, hour: u32) -> Completion {
        Completion {
            fare,
            wait_minutes: Some(wait),
            kind,
            completed_at: Utc.with_ymd_and_hms(2025, 1, 1, hour, 30, 0).unwrap(),
        }
    }

    #[test]
    fn completion_updates_every_running_total() {
        let mut row = DailyAnalytics::empty(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        row.apply_completion(&completion(45.0, 4.0, RideKind::Solo, 8));
        row.apply_completion(&completion(30.0, 2.0, RideKind::Pool, 8));

        assert_eq!(row.total_rides, 2);
        assert!((row.total_revenue - 75.0).abs() < f64::EPSILON);
        assert!((row.avg_wait_time - 3.0).abs() < f64::EPSILON);
        assert!((row.pool_ride_percentage - 50.0).abs() < f64::EPSILON);
        assert_eq!(row.peak_hours.get("08"), Some(&2));
    }

    #[test]
    fn ratings_average_incrementally() {
        let mut row = DailyAnalytics::empty(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        row.apply_rating(5);
        row.apply_rating(3);
        assert!((row.avg_rating - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn long_rating_runs_do_not_drift() {
        let mut row = DailyAnalytics::empty(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        for rating in [2, 3, 1, 4, 5, 1, 3] {
            row.apply_rating(rating);
        }
        // 19 / 7 = 2.714..., while re-expanding a rounded mean each step lands on 2.72.
        assert!((row.avg_rating - 2.71).abs() < f64::EPSILON);
    }

    #[test]
    fn wait_average_ignores_completions_without_a_wait() {
        let mut row = DailyAnalytics::empty(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        row.apply_completion(&completion(45.0, 4.0, RideKind::Solo, 8));
        row.apply_completion(&Completion {
            wait_minutes: None,
            ..completion(30.0, 0.0, RideKind::Solo, 9)
        });
        assert!((row.avg_wait_time - 4.0).abs() < f64::EPSILON);
        assert_eq!(row.total_rides, 2);
    }
}
