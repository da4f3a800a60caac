use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::allocator::{AllocationPolicy, Shortfall, allocate};
use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_span};
use super::{Engine, EngineError, SeatBook, StudioTimeline};

/// Outcome of committing a batch of placements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub inserted: usize,
    /// Same (movie, studio, start) already committed; skipped.
    pub duplicates: usize,
    /// Overlaps a different committed schedule on the studio; skipped.
    pub conflicts: usize,
}

impl Engine {
    pub async fn create_studio(
        &self,
        id: Ulid,
        name: String,
        seat_capacity: u32,
    ) -> Result<(), EngineError> {
        if self.studios.len() >= MAX_STUDIOS {
            return Err(EngineError::LimitExceeded("too many studios"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("studio name too long"));
        }
        if seat_capacity == 0 || seat_capacity > MAX_SEAT_CAPACITY {
            return Err(EngineError::LimitExceeded("seat capacity out of range"));
        }
        if self.studios.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let studio = Studio { id, name, seat_capacity };
        self.wal_append(&Event::StudioCreated { studio: studio.clone() }).await?;
        self.studios.insert(id, Arc::new(RwLock::new(StudioTimeline::new(studio))));
        Ok(())
    }

    pub async fn create_movie(
        &self,
        id: Ulid,
        title: String,
        duration_minutes: u32,
    ) -> Result<(), EngineError> {
        if self.movies.len() >= MAX_MOVIES {
            return Err(EngineError::LimitExceeded("too many movies"));
        }
        if title.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("movie title too long"));
        }
        if duration_minutes == 0 || duration_minutes > MAX_DURATION_MINUTES {
            return Err(EngineError::LimitExceeded("duration out of range"));
        }
        if self.movies.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let movie = Movie { id, title, duration_minutes };
        self.wal_append(&Event::MovieCreated { movie: movie.clone() }).await?;
        self.movies.insert(id, movie);
        Ok(())
    }

    /// Administrative insertion of a single showing.
    ///
    /// The showing occupies the studio for `duration + buffer_minutes` from `start`.
    pub async fn add_schedule(
        &self,
        movie_id: Ulid,
        studio_id: Ulid,
        start: Ms,
        buffer_minutes: u32,
        price: Decimal,
    ) -> Result<Schedule, EngineError> {
        if price <= Decimal::ZERO {
            return Err(EngineError::LimitExceeded("price must be positive"));
        }
        if buffer_minutes > MAX_BUFFER_MINUTES {
            return Err(EngineError::LimitExceeded("buffer too long"));
        }
        let duration = self
            .movies
            .get(&movie_id)
            .map(|m| m.duration_minutes)
            .ok_or(EngineError::NotFound(movie_id))?;
        let end = (Ms::from(duration) + Ms::from(buffer_minutes))
            .checked_mul(MINUTE_MS)
            .and_then(|length| start.checked_add(length))
            .ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
        let span = Span { start, end };
        validate_span(&span)?;
        let date = date_of(start).ok_or(EngineError::LimitExceeded("timestamp out of range"))?;

        let timeline = self
            .get_timeline(&studio_id)
            .ok_or(EngineError::NotFound(studio_id))?;
        let mut guard = timeline.write().await;

        let schedule = Schedule {
            id: Ulid::new(),
            movie_id,
            studio_id,
            span,
            date,
            price,
        };
        if let Some(existing) = self.schedule_keys.get(&schedule.key()) {
            return Err(EngineError::AlreadyExists(*existing.value()));
        }
        check_no_conflict(&guard, &span)?;
        self.persist_schedule(&mut guard, schedule.clone()).await?;
        Ok(schedule)
    }

    /// Commit allocator output. Re-committing the same placements is a no-op.
    ///
    /// Every placement is checked against durable state under its studio's
    /// write lock: an existing (movie, studio, start) key is a duplicate, any
    /// other overlap on the studio is a conflict. Both are skipped.
    pub async fn commit_placements(
        &self,
        placements: Vec<Placement>,
    ) -> Result<CommitReport, EngineError> {
        let mut by_studio: BTreeMap<Ulid, Vec<Placement>> = BTreeMap::new();
        for p in placements {
            validate_span(&p.span)?;
            if p.price <= Decimal::ZERO {
                return Err(EngineError::LimitExceeded("price must be positive"));
            }
            if !self.movies.contains_key(&p.movie_id) {
                return Err(EngineError::NotFound(p.movie_id));
            }
            by_studio.entry(p.studio_id).or_default().push(p);
        }

        let mut report = CommitReport::default();
        for (studio_id, batch) in by_studio {
            let timeline = self
                .get_timeline(&studio_id)
                .ok_or(EngineError::NotFound(studio_id))?;
            let mut guard = timeline.write().await;

            for p in batch {
                if self.schedule_keys.contains_key(&p.key()) {
                    report.duplicates += 1;
                    continue;
                }
                if let Err(EngineError::Conflict(existing)) = check_no_conflict(&guard, &p.span) {
                    tracing::debug!(
                        "skipping movie {} on studio {studio_id} at {}: overlaps {existing}",
                        p.movie_id,
                        format_instant(p.span.start)
                    );
                    report.conflicts += 1;
                    continue;
                }
                self.persist_schedule(&mut guard, Schedule::from_placement(Ulid::new(), p))
                    .await?;
                report.inserted += 1;
            }
        }

        for (result, n) in [
            ("inserted", report.inserted),
            ("duplicate", report.duplicates),
            ("conflict", report.conflicts),
        ] {
            metrics::counter!(crate::observability::SCHEDULES_COMMITTED_TOTAL, "result" => result)
                .increment(n as u64);
        }
        Ok(report)
    }

    /// Allocate `[from, to]` over every registered movie and studio, then commit.
    pub async fn run_allocation<R: Rng + ?Sized>(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        policy: &AllocationPolicy,
        rng: &mut R,
    ) -> Result<(CommitReport, Vec<Shortfall>), EngineError> {
        policy.validate().map_err(EngineError::LimitExceeded)?;
        if (to - from).num_days() >= MAX_ALLOCATION_DAYS {
            return Err(EngineError::LimitExceeded("allocation range too wide"));
        }

        let mut movies: Vec<Movie> = self.movies.iter().map(|e| e.value().clone()).collect();
        movies.sort_by_key(|m| m.id);
        let timelines: Vec<_> = self.studios.iter().map(|e| e.value().clone()).collect();
        let mut studios = Vec::with_capacity(timelines.len());
        for t in timelines {
            studios.push(t.read().await.studio.clone());
        }
        studios.sort_by_key(|s| s.id);

        let allocation = allocate(&movies, &studios, from, to, policy, rng);
        metrics::counter!(crate::observability::ALLOCATION_SHORTFALL_TOTAL)
            .increment(allocation.shortfalls.len() as u64);
        let report = self.commit_placements(allocation.placements).await?;
        tracing::info!(
            "allocated {from}..={to}: {} inserted, {} duplicates, {} conflicts, {} shortfalls",
            report.inserted,
            report.duplicates,
            report.conflicts,
            allocation.shortfalls.len()
        );
        Ok((report, allocation.shortfalls))
    }

    /// WAL-append then index a schedule. Caller holds the studio's write lock.
    async fn persist_schedule(
        &self,
        timeline: &mut StudioTimeline,
        schedule: Schedule,
    ) -> Result<(), EngineError> {
        self.wal_append(&Event::ScheduleCreated { schedule: schedule.clone() })
            .await?;
        timeline.insert(schedule.span, schedule.id);
        let book = SeatBook::new(schedule.id, timeline.studio.seat_capacity);
        self.seat_books.insert(schedule.id, Arc::new(RwLock::new(book)));
        self.schedule_keys.insert(schedule.key(), schedule.id);
        self.schedules.insert(schedule.id, schedule);
        Ok(())
    }
}
