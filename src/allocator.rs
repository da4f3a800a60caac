//! Showtime allocation: spread every movie over the studios for each day of a range.
//!
//! Per date the movies are shuffled, then each movie tries a shuffled set of anchor
//! times, taking the first studio (also shuffled) that is free for
//! `duration + buffer`. Movies still short of their target fall back to a
//! fixed 30-minute grid scanned in order. Studios only carry state within a
//! date; every day starts empty.
//!
//! All randomness comes from the caller's `Rng`, so a seeded generator makes a
//! run reproducible.

use chrono::{Days, NaiveDate, NaiveTime};
use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::conflicts;
use crate::limits::MAX_BUFFER_MINUTES;
use crate::model::*;

#[derive(Debug, Clone)]
pub struct AllocationPolicy {
    /// Target number of showings per movie per day.
    pub showings_per_movie: u32,
    /// Turnaround after each showing before the studio is free again.
    pub buffer_minutes: u32,
    /// Preferred start times, tried in random order.
    pub anchor_slots: Vec<NaiveTime>,
    /// First and last start time of the fallback grid (inclusive).
    pub fallback_first_start: NaiveTime,
    pub fallback_last_start: NaiveTime,
    pub fallback_step_minutes: u32,
    pub price_tiers: Vec<Decimal>,
    /// Upper bound on placements per date across all movies.
    pub max_per_day: Option<usize>,
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            showings_per_movie: 3,
            buffer_minutes: 30,
            anchor_slots: vec![hm(10, 0), hm(12, 0), hm(14, 30), hm(16, 30), hm(19, 0), hm(21, 30)],
            fallback_first_start: hm(9, 0),
            fallback_last_start: hm(22, 30),
            fallback_step_minutes: 30,
            price_tiers: [50_000, 65_000, 75_000, 85_000, 90_000, 100_000]
                .into_iter()
                .map(Decimal::from)
                .collect(),
            max_per_day: None,
        }
    }
}

impl AllocationPolicy {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.buffer_minutes > MAX_BUFFER_MINUTES {
            return Err("buffer too long");
        }
        if self.fallback_step_minutes == 0 {
            return Err("fallback step must be positive");
        }
        if self.fallback_first_start > self.fallback_last_start {
            return Err("fallback window is inverted");
        }
        if self.price_tiers.iter().any(|p| *p <= Decimal::ZERO) {
            return Err("price tiers must be positive");
        }
        Ok(())
    }

    /// Start times of the fallback grid, in scan order.
    fn fallback_grid(&self) -> Vec<NaiveTime> {
        let step = chrono::Duration::minutes(i64::from(self.fallback_step_minutes.max(1)));
        let mut grid = Vec::new();
        let mut t = self.fallback_first_start;
        while t <= self.fallback_last_start {
            grid.push(t);
            let (next, wrapped) = t.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            t = next;
        }
        grid
    }
}

/// A movie that ended a date with fewer showings than its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub date: NaiveDate,
    pub movie_id: Ulid,
    pub placed: u32,
    pub target: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub placements: Vec<Placement>,
    pub shortfalls: Vec<Shortfall>,
}

/// Allocate showings for every date in `[from, to]`.
///
/// Empty movie, studio or price sets produce an empty allocation.
pub fn allocate<R: Rng + ?Sized>(
    movies: &[Movie],
    studios: &[Studio],
    from: NaiveDate,
    to: NaiveDate,
    policy: &AllocationPolicy,
    rng: &mut R,
) -> Allocation {
    let mut out = Allocation::default();
    if movies.is_empty() || studios.is_empty() || policy.price_tiers.is_empty() {
        debug!("nothing to allocate: {} movies, {} studios", movies.len(), studios.len());
        return out;
    }

    let grid = policy.fallback_grid();
    let mut date = from;
    while date <= to {
        let day = allocate_day(movies, studios, date, policy, &grid, rng, &mut out.shortfalls);
        out.placements.extend(day);
        match date.checked_add_days(Days::new(1)) {
            Some(next) => date = next,
            None => break,
        }
    }
    out
}

fn allocate_day<R: Rng + ?Sized>(
    movies: &[Movie],
    studios: &[Studio],
    date: NaiveDate,
    policy: &AllocationPolicy,
    grid: &[NaiveTime],
    rng: &mut R,
    shortfalls: &mut Vec<Shortfall>,
) -> Vec<Placement> {
    let target = policy.showings_per_movie;
    let day_full = |day: &Vec<Placement>| policy.max_per_day.is_some_and(|cap| day.len() >= cap);
    let mut day: Vec<Placement> = Vec::new();

    let mut order: Vec<&Movie> = movies.iter().collect();
    order.shuffle(rng);

    for movie in order {
        let length = (Ms::from(movie.duration_minutes) + Ms::from(policy.buffer_minutes)) * MINUTE_MS;
        let mut placed = 0u32;

        let mut slots = policy.anchor_slots.clone();
        slots.shuffle(rng);
        for slot in slots {
            if placed >= target || day_full(&day) {
                break;
            }
            let start = instant_at(date, slot);
            let span = Span::new(start, start + length);
            let mut rooms: Vec<&Studio> = studios.iter().collect();
            rooms.shuffle(rng);
            if let Some(studio) = rooms.into_iter().find(|s| !conflicts(s.id, &span, &day)) {
                day.push(place(movie, studio, span, date, policy, rng));
                placed += 1;
            }
        }

        if placed < target {
            for &slot in grid {
                if placed >= target || day_full(&day) {
                    break;
                }
                let start = instant_at(date, slot);
                let span = Span::new(start, start + length);
                // Ending on the next calendar day (midnight included) is never accepted.
                if date_of(span.end) != Some(date) {
                    continue;
                }
                if let Some(studio) = studios.iter().find(|s| !conflicts(s.id, &span, &day)) {
                    day.push(place(movie, studio, span, date, policy, rng));
                    placed += 1;
                }
            }
        }

        if placed < target {
            warn!("{date}: movie {} placed {placed}/{target} showings", movie.id);
            shortfalls.push(Shortfall {
                date,
                movie_id: movie.id,
                placed,
                target,
            });
        }
    }

    day
}

fn place<R: Rng + ?Sized>(
    movie: &Movie,
    studio: &Studio,
    span: Span,
    date: NaiveDate,
    policy: &AllocationPolicy,
    rng: &mut R,
) -> Placement {
    Placement {
        movie_id: movie.id,
        studio_id: studio.id,
        span,
        date,
        price: policy.price_tiers.choose(rng).copied().unwrap_or(Decimal::ZERO),
    }
}
