mod booking;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use booking::{ExpiryTrigger, ReservationRequest};
pub use conflict::{StudioTimeline, conflicts};
pub use error::{DependencyError, EngineError};
pub use mutations::CommitReport;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::jobs::JobQueue;
use crate::model::*;
use crate::notify::Notifier;
use crate::promo::PromoService;
use crate::wal::Wal;

pub type SharedTimeline = Arc<RwLock<StudioTimeline>>;
pub type SharedSeatBook = Arc<RwLock<SeatBook>>;

/// Tickets of one schedule and the seats they hold.
///
/// Every reservation, payment and expiry on a schedule runs under this
/// book's write lock, which is what makes check-then-insert safe.
#[derive(Debug, Clone)]
pub struct SeatBook {
    pub schedule_id: Ulid,
    pub capacity: u32,
    /// Seat → transaction, for tickets that are not cancelled.
    taken: HashMap<u32, Ulid>,
    tickets: Vec<Ticket>,
}

impl SeatBook {
    pub fn new(schedule_id: Ulid, capacity: u32) -> Self {
        Self {
            schedule_id,
            capacity,
            taken: HashMap::new(),
            tickets: Vec::new(),
        }
    }

    pub fn is_taken(&self, seat: u32) -> bool {
        self.taken.contains_key(&seat)
    }

    pub fn taken_seats(&self) -> Vec<u32> {
        let mut seats: Vec<u32> = self.taken.keys().copied().collect();
        seats.sort_unstable();
        seats
    }

    pub fn tickets_of(&self, transaction_id: Ulid) -> impl Iterator<Item = &Ticket> {
        self.tickets
            .iter()
            .filter(move |t| t.transaction_id == transaction_id)
    }

    fn add_tickets(&mut self, tickets: &[Ticket]) {
        for t in tickets {
            if t.status.holds_seat() {
                self.taken.insert(t.seat_number, t.transaction_id);
            }
            self.tickets.push(t.clone());
        }
    }

    fn settle(&mut self, transaction_id: Ulid, status: PaymentStatus) {
        let ticket_status = TicketStatus::mirroring(status);
        for t in self.tickets.iter_mut().filter(|t| t.transaction_id == transaction_id) {
            t.status = ticket_status;
            if !ticket_status.holds_seat() && self.taken.get(&t.seat_number) == Some(&transaction_id) {
                self.taken.remove(&t.seat_number);
            }
        }
    }
}

/// External services the engine calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub promos: Arc<dyn PromoService>,
    pub notifier: Arc<dyn Notifier>,
    pub jobs: Arc<dyn JobQueue>,
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) struct WalAppend {
    event: Event,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first append arrives.
/// 2. Drain every append already queued behind it.
/// 3. One flush + fsync for the batch.
/// 4. Answer every sender with the batch result.
async fn wal_writer_loop(mut wal: Wal<Event>, mut rx: mpsc::Receiver<WalAppend>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        for append in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = append.response.send(r);
        }
    }
    tracing::debug!("WAL writer for {} stopped after {} appends", wal.path().display(), wal.appended());
}

fn flush_batch(wal: &mut Wal<Event>, batch: &[WalAppend]) -> io::Result<()> {
    let mut append_err = None;
    for append in batch {
        if let Err(e) = wal.append_buffered(&append.event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush so partially buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

pub struct Engine {
    pub(super) studios: DashMap<Ulid, SharedTimeline>,
    pub(super) movies: DashMap<Ulid, Movie>,
    pub(super) schedules: DashMap<Ulid, Schedule>,
    pub(super) schedule_keys: DashMap<ScheduleKey, Ulid>,
    pub(super) seat_books: DashMap<Ulid, SharedSeatBook>,
    /// Mutated only while holding the owning schedule's seat book write lock.
    pub(super) transactions: DashMap<Ulid, Transaction>,
    /// Owner → their transaction still awaiting payment.
    pub(super) pending_by_owner: DashMap<Ulid, Ulid>,
    wal_tx: mpsc::Sender<WalAppend>,
    pub(super) collaborators: Collaborators,
    pub(super) payment_timeout: Option<Duration>,
}

/// State rebuilt from the WAL before it is shared.
#[derive(Default)]
struct Replay {
    studios: HashMap<Ulid, StudioTimeline>,
    movies: HashMap<Ulid, Movie>,
    schedules: HashMap<Ulid, Schedule>,
    books: HashMap<Ulid, SeatBook>,
    transactions: HashMap<Ulid, Transaction>,
}

impl Replay {
    fn apply(&mut self, event: Event) {
        match event {
            Event::StudioCreated { studio } => {
                self.studios.insert(studio.id, StudioTimeline::new(studio));
            }
            Event::MovieCreated { movie } => {
                self.movies.insert(movie.id, movie);
            }
            Event::ScheduleCreated { schedule } => {
                let Some(timeline) = self.studios.get_mut(&schedule.studio_id) else {
                    tracing::warn!("replay: schedule {} references unknown studio", schedule.id);
                    return;
                };
                timeline.insert(schedule.span, schedule.id);
                self.books
                    .insert(schedule.id, SeatBook::new(schedule.id, timeline.studio.seat_capacity));
                self.schedules.insert(schedule.id, schedule);
            }
            Event::ReservationCreated { transaction, tickets } => {
                if let Some(book) = self.books.get_mut(&transaction.schedule_id) {
                    book.add_tickets(&tickets);
                }
                self.transactions.insert(transaction.id, transaction);
            }
            Event::PaymentSettled {
                transaction_id,
                schedule_id,
                status,
            } => {
                if let Some(book) = self.books.get_mut(&schedule_id) {
                    book.settle(transaction_id, status);
                }
                if let Some(t) = self.transactions.get_mut(&transaction_id) {
                    t.payment_status = status;
                }
            }
        }
    }
}

impl Engine {
    /// Open the engine, replaying `wal_path`. Must be called inside a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        collaborators: Collaborators,
        payment_timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let events = Wal::<Event>::replay(&wal_path)?;
        let replayed = events.len();
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut replay = Replay::default();
        for event in events {
            replay.apply(event);
        }

        let engine = Self {
            studios: DashMap::new(),
            movies: replay.movies.into_iter().collect(),
            schedules: DashMap::new(),
            schedule_keys: DashMap::new(),
            seat_books: DashMap::new(),
            transactions: DashMap::new(),
            pending_by_owner: DashMap::new(),
            wal_tx,
            collaborators,
            payment_timeout,
        };
        for (id, timeline) in replay.studios {
            engine.studios.insert(id, Arc::new(RwLock::new(timeline)));
        }
        for (id, schedule) in replay.schedules {
            engine.schedule_keys.insert(schedule.key(), id);
            engine.schedules.insert(id, schedule);
        }
        for (id, book) in replay.books {
            engine.seat_books.insert(id, Arc::new(RwLock::new(book)));
        }
        for (id, transaction) in replay.transactions {
            if transaction.payment_status == PaymentStatus::Pending {
                engine.pending_by_owner.insert(transaction.owner_id, id);
            }
            engine.transactions.insert(id, transaction);
        }

        if replayed > 0 {
            tracing::info!(
                "replayed {replayed} events: {} studios, {} schedules, {} transactions ({} pending)",
                engine.studios.len(),
                engine.schedules.len(),
                engine.transactions.len(),
                engine.pending_by_owner.len()
            );
        }
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalAppend {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn get_timeline(&self, studio_id: &Ulid) -> Option<SharedTimeline> {
        self.studios.get(studio_id).map(|e| e.value().clone())
    }

    pub(super) fn get_seat_book(&self, schedule_id: &Ulid) -> Option<SharedSeatBook> {
        self.seat_books.get(schedule_id).map(|e| e.value().clone())
    }
}
