use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only instant type stored in state.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching spans (`self.end == other.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Combine a calendar date and a wall-clock time (UTC) into unix ms.
pub fn instant_at(date: NaiveDate, time: NaiveTime) -> Ms {
    date.and_time(time).and_utc().timestamp_millis()
}

/// Calendar date (UTC) an instant falls on.
pub fn date_of(ms: Ms) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

/// `YYYY-MM-DD HH:MM:SS`, the format reminders carry.
pub fn format_instant(ms: Ms) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

/// A screening room. Hosts one showing at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Studio {
    pub id: Ulid,
    pub name: String,
    pub seat_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: Ulid,
    pub title: String,
    pub duration_minutes: u32,
}

/// A showing the allocator wants to commit. Becomes a [`Schedule`] once it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub movie_id: Ulid,
    pub studio_id: Ulid,
    pub span: Span,
    pub date: NaiveDate,
    pub price: Decimal,
}

impl Placement {
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey {
            movie_id: self.movie_id,
            studio_id: self.studio_id,
            start: self.span.start,
        }
    }
}

/// A committed showing: movie × studio × `[start, end)` × price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Ulid,
    pub movie_id: Ulid,
    pub studio_id: Ulid,
    /// `end` includes the turnaround buffer.
    pub span: Span,
    pub date: NaiveDate,
    pub price: Decimal,
}

impl Schedule {
    pub fn from_placement(id: Ulid, p: Placement) -> Self {
        Self {
            id,
            movie_id: p.movie_id,
            studio_id: p.studio_id,
            span: p.span,
            date: p.date,
            price: p.price,
        }
    }

    pub fn key(&self) -> ScheduleKey {
        ScheduleKey {
            movie_id: self.movie_id,
            studio_id: self.studio_id,
            start: self.span.start,
        }
    }
}

/// Uniqueness key of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub movie_id: Ulid,
    pub studio_id: Ulid,
    pub start: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// The only transitions a payment can make out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failed,
}

impl From<PaymentOutcome> for PaymentStatus {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Success => PaymentStatus::Success,
            PaymentOutcome::Failed => PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Pending,
    Active,
    Cancelled,
}

impl TicketStatus {
    /// Tickets mirror their transaction's payment status.
    pub fn mirroring(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => TicketStatus::Pending,
            PaymentStatus::Success => TicketStatus::Active,
            PaymentStatus::Failed => TicketStatus::Cancelled,
        }
    }

    pub fn holds_seat(self) -> bool {
        !matches!(self, TicketStatus::Cancelled)
    }
}

/// A customer's booking of one or more seats on one schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub schedule_id: Ulid,
    pub total_amount: Decimal,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub promo_id: Option<Ulid>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Ulid,
    pub transaction_id: Ulid,
    pub schedule_id: Ulid,
    pub seat_number: u32,
    pub status: TicketStatus,
    pub price: Decimal,
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    StudioCreated {
        studio: Studio,
    },
    MovieCreated {
        movie: Movie,
    },
    ScheduleCreated {
        schedule: Schedule,
    },
    /// A transaction and every ticket under it, as one record.
    ReservationCreated {
        transaction: Transaction,
        tickets: Vec<Ticket>,
    },
    PaymentSettled {
        transaction_id: Ulid,
        schedule_id: Ulid,
        status: PaymentStatus,
    },
}
