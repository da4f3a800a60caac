use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::jobs::payment_timeout_key;
use crate::limits::*;
use crate::model::*;
use crate::observability as obs;

use super::conflict::now_ms;
use super::{Engine, EngineError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub owner_id: Ulid,
    pub schedule_id: Ulid,
    pub seat_numbers: Vec<u32>,
    pub payment_method: String,
    pub promo_code: Option<String>,
}

/// What forced a pending transaction to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryTrigger {
    /// The one-shot job registered at creation.
    Deferred,
    /// The periodic sweep found the showing already started.
    Sweep,
}

impl ExpiryTrigger {
    pub fn label(self) -> &'static str {
        match self {
            ExpiryTrigger::Deferred => "deferred",
            ExpiryTrigger::Sweep => "sweep",
        }
    }
}

fn outcome_label(result: &Result<Transaction, EngineError>) -> &'static str {
    match result {
        Ok(_) => "created",
        Err(EngineError::NotFound(_)) => "not_found",
        Err(EngineError::CapacityExceeded { .. }) => "capacity_exceeded",
        Err(EngineError::SeatConflict(_)) => "seat_conflict",
        Err(EngineError::InvalidSeat(_)) => "invalid_seat",
        Err(EngineError::PromoInvalid(_)) => "promo_invalid",
        Err(EngineError::PendingExists(_)) => "pending_exists",
        Err(_) => "error",
    }
}

impl Engine {
    /// Reserve seats on a schedule. The transaction and its tickets start `Pending`.
    ///
    /// Checks run in order, each with its own error: the owner has no other
    /// pending transaction, the schedule exists, the seat count fits the studio,
    /// no seat is taken, every seat is within `1..=capacity`, the promo (if any)
    /// is valid. Nothing is written unless all pass.
    pub async fn create_reservation(
        &self,
        req: ReservationRequest,
    ) -> Result<Transaction, EngineError> {
        let result = self.try_create_reservation(req).await;
        metrics::counter!(obs::RESERVATIONS_TOTAL, "outcome" => outcome_label(&result)).increment(1);
        let transaction = result?;
        self.register_timeout(&transaction).await;
        Ok(transaction)
    }

    async fn try_create_reservation(
        &self,
        req: ReservationRequest,
    ) -> Result<Transaction, EngineError> {
        if req.seat_numbers.is_empty() {
            return Err(EngineError::LimitExceeded("no seats requested"));
        }
        if req.payment_method.len() > MAX_PAYMENT_METHOD_LEN {
            return Err(EngineError::LimitExceeded("payment method too long"));
        }
        let promo_code = req
            .promo_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if promo_code.is_some_and(|c| c.len() > MAX_PROMO_CODE_LEN) {
            return Err(EngineError::LimitExceeded("promo code too long"));
        }

        if let Some(existing) = self.pending_transaction_of(&req.owner_id) {
            return Err(EngineError::PendingExists(existing));
        }
        let schedule = self
            .schedule(&req.schedule_id)
            .ok_or(EngineError::NotFound(req.schedule_id))?;
        let book = self
            .get_seat_book(&req.schedule_id)
            .ok_or(EngineError::NotFound(req.schedule_id))?;
        let mut guard = book.write().await;

        let capacity = guard.capacity;
        if req.seat_numbers.len() > capacity as usize {
            return Err(EngineError::CapacityExceeded {
                requested: req.seat_numbers.len(),
                capacity,
            });
        }
        let mut requested = HashSet::with_capacity(req.seat_numbers.len());
        for &seat in &req.seat_numbers {
            if guard.is_taken(seat) || !requested.insert(seat) {
                return Err(EngineError::SeatConflict(seat));
            }
        }
        if let Some(&seat) = req.seat_numbers.iter().find(|&&s| s < 1 || s > capacity) {
            return Err(EngineError::InvalidSeat(seat));
        }

        let seat_count = Decimal::from(req.seat_numbers.len() as u64);
        let original_amount = schedule
            .price
            .checked_mul(seat_count)
            .ok_or(EngineError::LimitExceeded("amount out of range"))?;
        let (discount_amount, total_amount, promo_id) = match promo_code {
            Some(code) => {
                self.apply_promo(req.owner_id, code, original_amount, &schedule, &req.seat_numbers)
                    .await?
            }
            None => (Decimal::ZERO, original_amount, None),
        };

        let transaction = Transaction {
            id: Ulid::new(),
            owner_id: req.owner_id,
            schedule_id: schedule.id,
            total_amount,
            original_amount,
            discount_amount,
            payment_method: req.payment_method,
            payment_status: PaymentStatus::Pending,
            promo_id,
            created_at: now_ms(),
        };
        let tickets: Vec<Ticket> = req
            .seat_numbers
            .iter()
            .map(|&seat_number| Ticket {
                id: Ulid::new(),
                transaction_id: transaction.id,
                schedule_id: schedule.id,
                seat_number,
                status: TicketStatus::Pending,
                price: schedule.price,
            })
            .collect();

        // Claim the owner's single pending slot; a racing creation on another schedule loses here.
        match self.pending_by_owner.entry(req.owner_id) {
            Entry::Occupied(e) => return Err(EngineError::PendingExists(*e.get())),
            Entry::Vacant(e) => {
                e.insert(transaction.id);
            }
        }

        let event = Event::ReservationCreated {
            transaction: transaction.clone(),
            tickets: tickets.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.pending_by_owner
                .remove_if(&req.owner_id, |_, v| *v == transaction.id);
            return Err(e);
        }
        guard.add_tickets(&tickets);
        self.transactions.insert(transaction.id, transaction.clone());
        drop(guard);

        info!(
            "transaction {} reserved seats {:?} on schedule {} for {}",
            transaction.id, req.seat_numbers, schedule.id, transaction.total_amount
        );
        Ok(transaction)
    }

    async fn apply_promo(
        &self,
        owner_id: Ulid,
        code: &str,
        original_amount: Decimal,
        schedule: &Schedule,
        seats: &[u32],
    ) -> Result<(Decimal, Decimal, Option<Ulid>), EngineError> {
        let promos = &self.collaborators.promos;
        let validation = promos
            .validate_promo(owner_id, code, original_amount, &[schedule.movie_id], seats)
            .await?;
        if !validation.is_valid {
            return Err(EngineError::PromoInvalid(validation.message));
        }
        let promo_id = match promos.promo_by_code(code).await {
            Ok(found) => found.map(|p| p.id),
            Err(e) => {
                warn!("promo {code} validated but lookup failed: {e}");
                None
            }
        };
        Ok((validation.discount_amount, validation.final_amount, promo_id))
    }

    /// Register the one-shot payment timeout. Without a configured delay the
    /// transaction is left to the periodic sweep.
    async fn register_timeout(&self, transaction: &Transaction) {
        let Some(delay) = self.payment_timeout else {
            debug!("payment timeout disabled; {} relies on the sweep", transaction.id);
            return;
        };
        let key = payment_timeout_key(transaction.id);
        if let Err(e) = self
            .collaborators
            .jobs
            .schedule_once(&key, delay, transaction.id)
            .await
        {
            warn!("failed to schedule payment timeout for {}: {e}", transaction.id);
            metrics::counter!(obs::DEPENDENCY_FAILURES_TOTAL, "service" => "jobs").increment(1);
        }
    }

    /// Settle a pending transaction. A transaction settles exactly once;
    /// later calls get `AlreadyFinalized` and change nothing.
    pub async fn process_payment(
        &self,
        transaction_id: Ulid,
        outcome: PaymentOutcome,
    ) -> Result<Transaction, EngineError> {
        let transaction = self.settle(transaction_id, outcome.into()).await?;
        metrics::counter!(obs::PAYMENTS_TOTAL, "status" => transaction.payment_status.label())
            .increment(1);
        info!("transaction {transaction_id} settled: {}", transaction.payment_status.label());
        if outcome == PaymentOutcome::Success {
            self.dispatch_notifications(&transaction);
        }
        Ok(transaction)
    }

    /// Force-fail a transaction if it is still pending.
    ///
    /// Returns `Ok(false)` when it is missing or already settled. Safe to race
    /// with itself and with [`Engine::process_payment`].
    pub async fn expire_reservation(
        &self,
        transaction_id: Ulid,
        trigger: ExpiryTrigger,
    ) -> Result<bool, EngineError> {
        match self.settle(transaction_id, PaymentStatus::Failed).await {
            Ok(_) => {
                metrics::counter!(obs::RESERVATIONS_EXPIRED_TOTAL, "trigger" => trigger.label())
                    .increment(1);
                info!("transaction {transaction_id} expired ({}), seats released", trigger.label());
                Ok(true)
            }
            Err(EngineError::NotFound(_)) | Err(EngineError::AlreadyFinalized(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The single Pending → terminal transition, under the schedule's seat lock.
    async fn settle(
        &self,
        transaction_id: Ulid,
        status: PaymentStatus,
    ) -> Result<Transaction, EngineError> {
        let schedule_id = self
            .transactions
            .get(&transaction_id)
            .map(|t| t.schedule_id)
            .ok_or(EngineError::NotFound(transaction_id))?;
        let book = self
            .get_seat_book(&schedule_id)
            .ok_or(EngineError::NotFound(schedule_id))?;
        let mut guard = book.write().await;

        let current = self
            .transaction(&transaction_id)
            .ok_or(EngineError::NotFound(transaction_id))?;
        if current.payment_status.is_terminal() {
            return Err(EngineError::AlreadyFinalized(transaction_id));
        }

        let event = Event::PaymentSettled {
            transaction_id,
            schedule_id,
            status,
        };
        self.wal_append(&event).await?;
        guard.settle(transaction_id, status);
        let updated = Transaction {
            payment_status: status,
            ..current
        };
        self.transactions.insert(transaction_id, updated.clone());
        self.pending_by_owner
            .remove_if(&updated.owner_id, |_, v| *v == transaction_id);
        Ok(updated)
    }

    /// Booking confirmation and showtime reminder, fire-and-forget.
    fn dispatch_notifications(&self, transaction: &Transaction) {
        let Some(schedule) = self.schedule(&transaction.schedule_id) else {
            warn!("no schedule for transaction {}, skipping notifications", transaction.id);
            return;
        };
        let title = self
            .movies
            .get(&schedule.movie_id)
            .map(|m| m.title.clone())
            .unwrap_or_default();
        let owner_id = transaction.owner_id;
        let transaction_id = transaction.id;
        let amount = transaction.total_amount;

        let notifier = self.collaborators.notifier.clone();
        let confirm_title = title.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .booking_confirmation(owner_id, transaction_id, &confirm_title, amount)
                .await
            {
                warn!("failed to create booking confirmation for {transaction_id}: {e}");
                metrics::counter!(obs::DEPENDENCY_FAILURES_TOTAL, "service" => "notifications")
                    .increment(1);
            }
        });

        let notifier = self.collaborators.notifier.clone();
        let starts_at = format_instant(schedule.span.start);
        tokio::spawn(async move {
            if let Err(e) = notifier
                .reminder(owner_id, &title, &starts_at, schedule.movie_id)
                .await
            {
                warn!("failed to create reminder for {transaction_id}: {e}");
                metrics::counter!(obs::DEPENDENCY_FAILURES_TOTAL, "service" => "notifications")
                    .increment(1);
            }
        });
    }
}
