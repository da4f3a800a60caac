use super::*;
use crate::allocator::AllocationPolicy;
use crate::jobs::{JobQueue, TimeoutQueue};
use crate::notify::{Notification, Notifier, NotifyHub};
use crate::promo::{Discount, Promo, PromoService, PromoValidation, StaticPromos};
use async_trait::async_trait;
use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use std::path::PathBuf;

const START: Ms = 1_900_000_000_000;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("showtime_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

struct BrokenPromos;

#[async_trait]
impl PromoService for BrokenPromos {
    async fn validate_promo(
        &self,
        _owner_id: Ulid,
        _code: &str,
        _total_amount: Decimal,
        _movie_ids: &[Ulid],
        _seat_numbers: &[u32],
    ) -> Result<PromoValidation, DependencyError> {
        Err(DependencyError::new("promos", "connection refused"))
    }

    async fn promo_by_code(&self, _code: &str) -> Result<Option<Promo>, DependencyError> {
        Err(DependencyError::new("promos", "connection refused"))
    }
}

struct BrokenJobs;

#[async_trait]
impl JobQueue for BrokenJobs {
    async fn schedule_once(
        &self,
        _key: &str,
        _delay: Duration,
        _transaction_id: Ulid,
    ) -> Result<(), DependencyError> {
        Err(DependencyError::new("jobs", "queue full"))
    }
}

struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn booking_confirmation(
        &self,
        _owner_id: Ulid,
        _transaction_id: Ulid,
        _movie_title: &str,
        _amount: Decimal,
    ) -> Result<(), DependencyError> {
        Err(DependencyError::new("notifications", "smtp down"))
    }

    async fn reminder(
        &self,
        _owner_id: Ulid,
        _movie_title: &str,
        _starts_at: &str,
        _movie_id: Ulid,
    ) -> Result<(), DependencyError> {
        Err(DependencyError::new("notifications", "smtp down"))
    }
}

struct Fixture {
    engine: Arc<Engine>,
    hub: Arc<NotifyHub>,
    schedule: Schedule,
}

fn collaborators(promos: Arc<dyn PromoService>, jobs: Arc<dyn JobQueue>, hub: Arc<NotifyHub>) -> Collaborators {
    Collaborators {
        promos,
        notifier: hub,
        jobs,
    }
}

/// One studio of `capacity` seats, one 120 min movie, one showing at `START` priced 50000.
async fn fixture_with(
    name: &str,
    capacity: u32,
    promos: Arc<dyn PromoService>,
    jobs: Arc<dyn JobQueue>,
    timeout: Option<Duration>,
) -> Fixture {
    let hub = Arc::new(NotifyHub::new());
    let engine = Arc::new(
        Engine::new(test_wal_path(name), collaborators(promos, jobs, hub.clone()), timeout).unwrap(),
    );
    let studio = Ulid::new();
    let movie = Ulid::new();
    engine.create_studio(studio, "Studio 1".into(), capacity).await.unwrap();
    engine.create_movie(movie, "Heat".into(), 120).await.unwrap();
    let schedule = engine
        .add_schedule(movie, studio, START, 30, Decimal::from(50_000))
        .await
        .unwrap();
    Fixture { engine, hub, schedule }
}

async fn fixture(name: &str, capacity: u32) -> Fixture {
    let (jobs, _rx) = TimeoutQueue::new();
    fixture_with(name, capacity, Arc::new(StaticPromos::default()), Arc::new(jobs), None).await
}

fn request(owner_id: Ulid, schedule_id: Ulid, seats: &[u32]) -> ReservationRequest {
    ReservationRequest {
        owner_id,
        schedule_id,
        seat_numbers: seats.to_vec(),
        payment_method: "card".into(),
        promo_code: None,
    }
}

// ── Catalog and schedules ────────────────────────────────

#[tokio::test]
async fn studio_and_movie_validation() {
    let path = test_wal_path("catalog_limits.wal");
    let (jobs, _rx) = TimeoutQueue::new();
    let engine = Engine::new(
        path,
        collaborators(Arc::new(StaticPromos::default()), Arc::new(jobs), Arc::new(NotifyHub::new())),
        None,
    )
    .unwrap();

    let id = Ulid::new();
    engine.create_studio(id, "A".into(), 10).await.unwrap();
    assert!(matches!(
        engine.create_studio(id, "A".into(), 10).await,
        Err(EngineError::AlreadyExists(dup)) if dup == id
    ));
    assert!(matches!(
        engine.create_studio(Ulid::new(), "B".into(), 0).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        engine.create_movie(Ulid::new(), "Long".into(), 0).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert_eq!(engine.studio(&id).await.unwrap().seat_capacity, 10);
}

#[tokio::test]
async fn add_schedule_rejects_overlap_and_duplicates() {
    let f = fixture("schedule_overlap.wal", 10).await;
    let (movie, studio) = (f.schedule.movie_id, f.schedule.studio_id);
    let price = Decimal::from(50_000);

    // Occupies START .. START+150min
    assert_eq!(f.schedule.span.end, START + 150 * MINUTE_MS);

    assert!(matches!(
        f.engine.add_schedule(movie, studio, START, 30, price).await,
        Err(EngineError::AlreadyExists(id)) if id == f.schedule.id
    ));
    let other_movie = Ulid::new();
    f.engine.create_movie(other_movie, "Ran".into(), 90).await.unwrap();
    assert!(matches!(
        f.engine
            .add_schedule(other_movie, studio, START + 60 * MINUTE_MS, 30, price)
            .await,
        Err(EngineError::Conflict(id)) if id == f.schedule.id
    ));
    // Starting exactly when the buffer ends is fine
    f.engine
        .add_schedule(other_movie, studio, START + 150 * MINUTE_MS, 30, price)
        .await
        .unwrap();
    assert!(matches!(
        f.engine.add_schedule(movie, Ulid::new(), START, 30, price).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn add_schedule_out_of_range_end_is_an_error() {
    let f = fixture("schedule_overflow.wal", 10).await;
    let (movie, studio) = (f.schedule.movie_id, f.schedule.studio_id);
    assert!(matches!(
        f.engine.add_schedule(movie, studio, Ms::MAX - 1, 30, Decimal::ONE).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        f.engine
            .add_schedule(movie, studio, START + 600 * MINUTE_MS, u32::MAX, Decimal::ONE)
            .await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert_eq!(f.engine.schedules_on(f.schedule.date).len(), 1);
}

#[tokio::test]
async fn schedules_on_lists_one_date() {
    let f = fixture("schedules_on.wal", 10).await;
    let date = date_of(START).unwrap();
    let listed = f.engine.schedules_on(date);
    assert_eq!(listed, vec![f.schedule.clone()]);
    assert!(f.engine.schedules_on(date.succ_opt().unwrap()).is_empty());
}

#[tokio::test]
async fn allocation_commit_is_idempotent() {
    let path = test_wal_path("allocation_idempotent.wal");
    let (jobs, _rx) = TimeoutQueue::new();
    let engine = Engine::new(
        path,
        collaborators(Arc::new(StaticPromos::default()), Arc::new(jobs), Arc::new(NotifyHub::new())),
        None,
    )
    .unwrap();
    for i in 0..4 {
        engine
            .create_studio(Ulid::new(), format!("Studio {i}"), 40)
            .await
            .unwrap();
    }
    for (title, minutes) in [("Heat", 120), ("Ran", 95), ("Alien", 110)] {
        engine.create_movie(Ulid::new(), title.into(), minutes).await.unwrap();
    }

    let from = NaiveDate::from_ymd_opt(2030, 3, 1).unwrap();
    let to = NaiveDate::from_ymd_opt(2030, 3, 3).unwrap();
    let policy = AllocationPolicy::default();

    let (first, shortfalls) = engine
        .run_allocation(from, to, &policy, &mut StdRng::seed_from_u64(7))
        .await
        .unwrap();
    assert!(shortfalls.is_empty());
    assert_eq!(first.inserted, 3 * 3 * 3);
    assert_eq!(first.conflicts, 0);

    let (second, _) = engine
        .run_allocation(from, to, &policy, &mut StdRng::seed_from_u64(7))
        .await
        .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, first.inserted);

    // No two showings on a studio overlap
    let mut all: Vec<Schedule> = engine.schedules.iter().map(|e| e.value().clone()).collect();
    all.sort_by_key(|s| (s.studio_id, s.span.start));
    for pair in all.windows(2) {
        if pair[0].studio_id == pair[1].studio_id {
            assert!(pair[0].span.end <= pair[1].span.start);
        }
    }
}

// ── Reservations ─────────────────────────────────────────

#[tokio::test]
async fn reservation_holds_seats_as_pending() {
    let f = fixture("reserve_pending.wal", 10).await;
    let owner = Ulid::new();
    let txn = f
        .engine
        .create_reservation(request(owner, f.schedule.id, &[1, 5, 10]))
        .await
        .unwrap();

    assert_eq!(txn.payment_status, PaymentStatus::Pending);
    assert_eq!(txn.original_amount, Decimal::from(150_000));
    assert_eq!(txn.total_amount, Decimal::from(150_000));
    assert_eq!(txn.discount_amount, Decimal::ZERO);
    assert_eq!(txn.promo_id, None);

    let tickets = f.engine.tickets_for(&txn.id).await.unwrap();
    assert_eq!(
        tickets.iter().map(|t| t.seat_number).collect::<Vec<_>>(),
        vec![1, 5, 10]
    );
    assert!(tickets.iter().all(|t| t.status == TicketStatus::Pending));
    assert_eq!(f.engine.booked_seats(&f.schedule.id).await.unwrap(), vec![1, 5, 10]);
}

#[tokio::test]
async fn second_pending_reservation_is_refused() {
    let f = fixture("pending_exists.wal", 10).await;
    let owner = Ulid::new();
    let first = f
        .engine
        .create_reservation(request(owner, f.schedule.id, &[1]))
        .await
        .unwrap();
    assert!(matches!(
        f.engine.create_reservation(request(owner, f.schedule.id, &[2])).await,
        Err(EngineError::PendingExists(id)) if id == first.id
    ));

    // Once settled the owner can book again
    f.engine
        .process_payment(first.id, PaymentOutcome::Failed)
        .await
        .unwrap();
    f.engine
        .create_reservation(request(owner, f.schedule.id, &[2]))
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_schedule_is_not_found() {
    let f = fixture("reserve_not_found.wal", 10).await;
    let missing = Ulid::new();
    assert!(matches!(
        f.engine.create_reservation(request(Ulid::new(), missing, &[1])).await,
        Err(EngineError::NotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn more_seats_than_capacity() {
    let f = fixture("capacity.wal", 3).await;
    assert!(matches!(
        f.engine
            .create_reservation(request(Ulid::new(), f.schedule.id, &[1, 2, 3, 4]))
            .await,
        Err(EngineError::CapacityExceeded { requested: 4, capacity: 3 })
    ));
}

#[tokio::test]
async fn taken_or_repeated_seat_conflicts() {
    let f = fixture("seat_conflict.wal", 10).await;
    f.engine
        .create_reservation(request(Ulid::new(), f.schedule.id, &[3, 4]))
        .await
        .unwrap();
    assert!(matches!(
        f.engine
            .create_reservation(request(Ulid::new(), f.schedule.id, &[5, 4]))
            .await,
        Err(EngineError::SeatConflict(4))
    ));
    assert!(matches!(
        f.engine
            .create_reservation(request(Ulid::new(), f.schedule.id, &[6, 6]))
            .await,
        Err(EngineError::SeatConflict(6))
    ));
    // A taken seat is reported before an invalid one
    assert!(matches!(
        f.engine
            .create_reservation(request(Ulid::new(), f.schedule.id, &[0, 3]))
            .await,
        Err(EngineError::SeatConflict(3))
    ));
    assert_eq!(f.engine.booked_seats(&f.schedule.id).await.unwrap(), vec![3, 4]);
}

#[tokio::test]
async fn out_of_range_seat_writes_nothing() {
    let f = fixture("invalid_seat.wal", 10).await;
    let owner = Ulid::new();
    for seat in [0, 11] {
        assert!(matches!(
            f.engine
                .create_reservation(request(owner, f.schedule.id, &[2, seat]))
                .await,
            Err(EngineError::InvalidSeat(s)) if s == seat
        ));
    }
    assert!(f.engine.transactions_for_owner(&owner).is_empty());
    assert!(f.engine.booked_seats(&f.schedule.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_request_hits_limit() {
    let f = fixture("seat_limits.wal", 100).await;
    assert!(matches!(
        f.engine.create_reservation(request(Ulid::new(), f.schedule.id, &[])).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn large_reservation_is_bounded_only_by_capacity() {
    let f = fixture("large_reservation.wal", 200).await;
    let hundred: Vec<u32> = (1..=100).collect();

    let missing = Ulid::new();
    assert!(matches!(
        f.engine.create_reservation(request(Ulid::new(), missing, &hundred)).await,
        Err(EngineError::NotFound(id)) if id == missing
    ));

    let txn = f
        .engine
        .create_reservation(request(Ulid::new(), f.schedule.id, &hundred))
        .await
        .unwrap();
    assert_eq!(txn.original_amount, Decimal::from(5_000_000));
    assert_eq!(f.engine.booked_seats(&f.schedule.id).await.unwrap(), hundred);

    let too_many: Vec<u32> = (1..=201).collect();
    assert!(matches!(
        f.engine.create_reservation(request(Ulid::new(), f.schedule.id, &too_many)).await,
        Err(EngineError::CapacityExceeded { requested: 201, capacity: 200 })
    ));
}

#[tokio::test]
async fn amount_overflow_is_refused() {
    let f = fixture("amount_overflow.wal", 10).await;
    let pricey = f
        .engine
        .add_schedule(f.schedule.movie_id, f.schedule.studio_id, START + 300 * MINUTE_MS, 30, Decimal::MAX)
        .await
        .unwrap();
    let owner = Ulid::new();
    assert!(matches!(
        f.engine.create_reservation(request(owner, pricey.id, &[1, 2])).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(f.engine.booked_seats(&pricey.id).await.unwrap().is_empty());
    // Nothing was claimed for the owner
    f.engine
        .create_reservation(request(owner, f.schedule.id, &[1]))
        .await
        .unwrap();
}

// ── Payment and expiry ───────────────────────────────────

#[tokio::test]
async fn successful_payment_activates_and_notifies() {
    let f = fixture("pay_success.wal", 10).await;
    let owner = Ulid::new();
    let mut inbox = f.hub.subscribe(owner);
    let txn = f
        .engine
        .create_reservation(request(owner, f.schedule.id, &[1, 5, 10]))
        .await
        .unwrap();

    let paid = f
        .engine
        .process_payment(txn.id, PaymentOutcome::Success)
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Success);
    let tickets = f.engine.tickets_for(&txn.id).await.unwrap();
    assert!(tickets.iter().all(|t| t.status == TicketStatus::Active));
    assert_eq!(f.engine.booked_seats(&f.schedule.id).await.unwrap(), vec![1, 5, 10]);

    let mut got = Vec::new();
    for _ in 0..2 {
        got.push(
            tokio::time::timeout(Duration::from_secs(5), inbox.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert!(got.contains(&Notification::BookingConfirmed {
        transaction_id: txn.id,
        movie_title: "Heat".into(),
        amount: Decimal::from(150_000),
    }));
    assert!(got.contains(&Notification::Reminder {
        movie_id: f.schedule.movie_id,
        movie_title: "Heat".into(),
        starts_at: format_instant(START),
    }));

    // Settled once; expiry is a no-op
    assert!(matches!(
        f.engine.process_payment(txn.id, PaymentOutcome::Failed).await,
        Err(EngineError::AlreadyFinalized(id)) if id == txn.id
    ));
    assert!(
        !f.engine
            .expire_reservation(txn.id, ExpiryTrigger::Deferred)
            .await
            .unwrap()
    );
    assert_eq!(f.engine.booked_seats(&f.schedule.id).await.unwrap(), vec![1, 5, 10]);
}

#[tokio::test]
async fn notification_failure_keeps_payment() {
    let (jobs, _rx) = TimeoutQueue::new();
    let engine = Engine::new(
        test_wal_path("notify_broken.wal"),
        Collaborators {
            promos: Arc::new(StaticPromos::default()),
            notifier: Arc::new(BrokenNotifier),
            jobs: Arc::new(jobs),
        },
        None,
    )
    .unwrap();
    let (studio, movie) = (Ulid::new(), Ulid::new());
    engine.create_studio(studio, "Studio 1".into(), 10).await.unwrap();
    engine.create_movie(movie, "Heat".into(), 120).await.unwrap();
    let schedule = engine
        .add_schedule(movie, studio, START, 30, Decimal::from(50_000))
        .await
        .unwrap();
    let txn = engine
        .create_reservation(request(Ulid::new(), schedule.id, &[4, 5]))
        .await
        .unwrap();

    let paid = engine
        .process_payment(txn.id, PaymentOutcome::Success)
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Success);

    // Let the spawned deliveries fail
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.transaction(&txn.id).unwrap().payment_status,
        PaymentStatus::Success
    );
    let tickets = engine.tickets_for(&txn.id).await.unwrap();
    assert!(tickets.iter().all(|t| t.status == TicketStatus::Active));
    assert_eq!(engine.booked_seats(&schedule.id).await.unwrap(), vec![4, 5]);
}

#[tokio::test]
async fn failed_payment_releases_seats() {
    let f = fixture("pay_failed.wal", 10).await;
    let txn = f
        .engine
        .create_reservation(request(Ulid::new(), f.schedule.id, &[2, 3]))
        .await
        .unwrap();
    f.engine
        .process_payment(txn.id, PaymentOutcome::Failed)
        .await
        .unwrap();
    let tickets = f.engine.tickets_for(&txn.id).await.unwrap();
    assert!(tickets.iter().all(|t| t.status == TicketStatus::Cancelled));
    assert!(f.engine.booked_seats(&f.schedule.id).await.unwrap().is_empty());

    // The seats can be booked again
    f.engine
        .create_reservation(request(Ulid::new(), f.schedule.id, &[2, 3]))
        .await
        .unwrap();
}

#[tokio::test]
async fn payment_for_unknown_transaction() {
    let f = fixture("pay_unknown.wal", 10).await;
    let id = Ulid::new();
    assert!(matches!(
        f.engine.process_payment(id, PaymentOutcome::Success).await,
        Err(EngineError::NotFound(missing)) if missing == id
    ));
    assert!(!f.engine.expire_reservation(id, ExpiryTrigger::Sweep).await.unwrap());
}

#[tokio::test]
async fn expiry_racing_payment_settles_once() {
    let f = fixture("expiry_race.wal", 10).await;
    let txn = f
        .engine
        .create_reservation(request(Ulid::new(), f.schedule.id, &[1]))
        .await
        .unwrap();

    let (a, b) = (f.engine.clone(), f.engine.clone());
    let id = txn.id;
    let expire = tokio::spawn(async move { a.expire_reservation(id, ExpiryTrigger::Deferred).await });
    let pay = tokio::spawn(async move { b.process_payment(id, PaymentOutcome::Success).await });
    let expired = expire.await.unwrap().unwrap();
    let paid = pay.await.unwrap();

    match f.engine.transaction(&id).unwrap().payment_status {
        PaymentStatus::Failed => {
            assert!(expired);
            assert!(matches!(paid, Err(EngineError::AlreadyFinalized(_))));
        }
        PaymentStatus::Success => {
            assert!(!expired);
            assert!(paid.is_ok());
        }
        PaymentStatus::Pending => panic!("transaction left pending"),
    }
}

// ── Read side ────────────────────────────────────────────

#[tokio::test]
async fn owners_only_see_their_transactions() {
    let f = fixture("owner_reads.wal", 10).await;
    let (alice, bob) = (Ulid::new(), Ulid::new());
    let first = f
        .engine
        .create_reservation(request(alice, f.schedule.id, &[1]))
        .await
        .unwrap();
    f.engine
        .process_payment(first.id, PaymentOutcome::Success)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = f
        .engine
        .create_reservation(request(alice, f.schedule.id, &[2]))
        .await
        .unwrap();

    assert!(f.engine.transaction_for_owner(&first.id, &alice).is_ok());
    assert!(matches!(
        f.engine.transaction_for_owner(&first.id, &bob),
        Err(EngineError::NotFound(_))
    ));
    let listed: Vec<Ulid> = f
        .engine
        .transactions_for_owner(&alice)
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(listed, vec![second.id, first.id]);
    assert!(f.engine.transactions_for_owner(&bob).is_empty());
}

#[tokio::test]
async fn all_transactions_pages_newest_first() {
    let f = fixture("all_transactions.wal", 10).await;
    let mut ids = Vec::new();
    for seat in 1..=3 {
        let txn = f
            .engine
            .create_reservation(request(Ulid::new(), f.schedule.id, &[seat]))
            .await
            .unwrap();
        ids.push(txn.id);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    ids.reverse();

    let page = |offset, limit| -> Vec<Ulid> {
        f.engine.all_transactions(offset, limit).iter().map(|t| t.id).collect()
    };
    assert_eq!(page(0, 2), ids[..2].to_vec());
    assert_eq!(page(2, 2), ids[2..].to_vec());
    assert!(page(3, 10).is_empty());
    assert!(page(0, 0).is_empty());
}

// ── Replay ───────────────────────────────────────────────

#[tokio::test]
async fn restart_restores_bookings_and_pending_guard() {
    let path = test_wal_path("replay.wal");
    let hub = Arc::new(NotifyHub::new());
    let (jobs, _rx) = TimeoutQueue::new();
    let jobs: Arc<dyn JobQueue> = Arc::new(jobs);
    let promos: Arc<dyn PromoService> = Arc::new(StaticPromos::default());

    let (schedule, paid, pending, pending_owner) = {
        let engine = Engine::new(
            path.clone(),
            collaborators(promos.clone(), jobs.clone(), hub.clone()),
            None,
        )
        .unwrap();
        let (studio, movie) = (Ulid::new(), Ulid::new());
        engine.create_studio(studio, "Studio 1".into(), 20).await.unwrap();
        engine.create_movie(movie, "Heat".into(), 120).await.unwrap();
        let schedule = engine
            .add_schedule(movie, studio, START, 30, Decimal::from(75_000))
            .await
            .unwrap();

        let paid = engine
            .create_reservation(request(Ulid::new(), schedule.id, &[1, 2]))
            .await
            .unwrap();
        engine.process_payment(paid.id, PaymentOutcome::Success).await.unwrap();
        let failed = engine
            .create_reservation(request(Ulid::new(), schedule.id, &[3]))
            .await
            .unwrap();
        engine.process_payment(failed.id, PaymentOutcome::Failed).await.unwrap();
        let owner = Ulid::new();
        let pending = engine
            .create_reservation(request(owner, schedule.id, &[4]))
            .await
            .unwrap();
        (schedule, paid, pending, owner)
    };

    let engine = Engine::new(path, collaborators(promos, jobs, hub), None).unwrap();
    assert_eq!(engine.schedule(&schedule.id), Some(schedule.clone()));
    assert_eq!(engine.booked_seats(&schedule.id).await.unwrap(), vec![1, 2, 4]);
    assert_eq!(
        engine.transaction(&paid.id).unwrap().payment_status,
        PaymentStatus::Success
    );
    assert!(matches!(
        engine.create_reservation(request(pending_owner, schedule.id, &[5])).await,
        Err(EngineError::PendingExists(id)) if id == pending.id
    ));
    assert!(matches!(
        engine
            .add_schedule(schedule.movie_id, schedule.studio_id, START, 30, Decimal::ONE)
            .await,
        Err(EngineError::AlreadyExists(_))
    ));
}
