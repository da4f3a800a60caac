use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub fn schedule(&self, id: &Ulid) -> Option<Schedule> {
        self.schedules.get(id).map(|e| e.value().clone())
    }

    pub fn movie(&self, id: &Ulid) -> Option<Movie> {
        self.movies.get(id).map(|e| e.value().clone())
    }

    pub async fn studio(&self, id: &Ulid) -> Option<Studio> {
        let timeline = self.get_timeline(id)?;
        let guard = timeline.read().await;
        Some(guard.studio.clone())
    }

    /// Showings on a calendar date, ordered by start then studio.
    pub fn schedules_on(&self, date: NaiveDate) -> Vec<Schedule> {
        let mut found: Vec<Schedule> = self
            .schedules
            .iter()
            .filter(|e| e.date == date)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|s| (s.span.start, s.studio_id));
        found
    }

    /// Seats held by pending or active tickets, ascending.
    pub async fn booked_seats(&self, schedule_id: &Ulid) -> Result<Vec<u32>, EngineError> {
        let book = self
            .get_seat_book(schedule_id)
            .ok_or(EngineError::NotFound(*schedule_id))?;
        let guard = book.read().await;
        Ok(guard.taken_seats())
    }

    pub fn transaction(&self, id: &Ulid) -> Option<Transaction> {
        self.transactions.get(id).map(|e| e.value().clone())
    }

    /// A transaction as seen by its owner. Someone else's is reported as missing.
    pub fn transaction_for_owner(&self, id: &Ulid, owner_id: &Ulid) -> Result<Transaction, EngineError> {
        self.transaction(id)
            .filter(|t| t.owner_id == *owner_id)
            .ok_or(EngineError::NotFound(*id))
    }

    /// Newest first.
    pub fn transactions_for_owner(&self, owner_id: &Ulid) -> Vec<Transaction> {
        let mut found: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|e| e.owner_id == *owner_id)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        found
    }

    /// Every owner's transactions, newest first, skipping `offset` and returning at most `limit`.
    pub fn all_transactions(&self, offset: usize, limit: usize) -> Vec<Transaction> {
        let mut found: Vec<Transaction> = self.transactions.iter().map(|e| e.value().clone()).collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        found.into_iter().skip(offset).take(limit).collect()
    }

    pub(super) fn pending_transaction_of(&self, owner_id: &Ulid) -> Option<Ulid> {
        self.pending_by_owner.get(owner_id).map(|e| *e.value())
    }

    pub async fn tickets_for(&self, transaction_id: &Ulid) -> Result<Vec<Ticket>, EngineError> {
        let schedule_id = self
            .transactions
            .get(transaction_id)
            .map(|t| t.schedule_id)
            .ok_or(EngineError::NotFound(*transaction_id))?;
        let book = self
            .get_seat_book(&schedule_id)
            .ok_or(EngineError::NotFound(schedule_id))?;
        let guard = book.read().await;
        let mut tickets: Vec<Ticket> = guard.tickets_of(*transaction_id).cloned().collect();
        tickets.sort_by_key(|t| t.seat_number);
        Ok(tickets)
    }

    /// Pending transactions whose showing has started by `now`.
    pub fn collect_overdue(&self, now: Ms) -> Vec<Ulid> {
        let pending: Vec<(Ulid, Ulid)> = self
            .transactions
            .iter()
            .filter(|e| e.payment_status == PaymentStatus::Pending)
            .map(|e| (e.id, e.schedule_id))
            .collect();

        pending
            .into_iter()
            .filter(|(_, schedule_id)| {
                self.schedules
                    .get(schedule_id)
                    .is_some_and(|s| s.span.start <= now)
            })
            .map(|(id, _)| id)
            .collect()
    }
}
