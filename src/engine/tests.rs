use std::time::Duration;

use async_trait::async_trait;
use ulid::Ulid;

use super::*;
use crate::model::*;
use crate::store::{MemoryStore, NewBooking, NewRoom, StoreError, WalStore};

const DATE: &str = "2024-01-01";

fn engine() -> Engine {
    Engine::with_store(Arc::new(MemoryStore::new()))
}

async fn room(engine: &Engine) -> Room {
    engine
        .create_room(4, vec!["projector".into()], 10.0)
        .await
        .unwrap()
}

/// MemoryStore whose day lookup sleeps, widening the window between the
/// conflict check and the insert.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl RoomRepository for SlowStore {
    async fn create(&self, fields: NewRoom) -> Result<Room, StoreError> {
        RoomRepository::create(&self.inner, fields).await
    }

    async fn get_by_id(&self, id: Ulid) -> Result<Option<Room>, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn list_all(&self) -> Result<Vec<Room>, StoreError> {
        RoomRepository::list_all(&self.inner).await
    }

    async fn find_by_display_name(&self, name: &str) -> Result<Option<Room>, StoreError> {
        self.inner.find_by_display_name(name).await
    }
}

#[async_trait]
impl BookingRepository for SlowStore {
    async fn create(&self, fields: NewBooking) -> Result<Booking, StoreError> {
        tokio::time::sleep(self.delay).await;
        BookingRepository::create(&self.inner, fields).await
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        BookingRepository::list_all(&self.inner).await
    }

    async fn find_by_room_and_date(&self, room_id: Ulid, date: &str) -> Result<Vec<Booking>, StoreError> {
        let found = self.inner.find_by_room_and_date(room_id, date).await;
        tokio::time::sleep(self.delay).await;
        found
    }

    async fn find_by_customer_and_room(
        &self,
        customer_name: &str,
        room_id: Ulid,
    ) -> Result<Vec<Booking>, StoreError> {
        self.inner.find_by_customer_and_room(customer_name, room_id).await
    }
}

/// Bookings that can never be written.
struct BrokenBookings;

#[async_trait]
impl BookingRepository for BrokenBookings {
    async fn create(&self, _fields: NewBooking) -> Result<Booking, StoreError> {
        Err(StoreError::Wal("disk full".into()))
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        Err(StoreError::Wal("disk full".into()))
    }

    async fn find_by_room_and_date(&self, _room_id: Ulid, _date: &str) -> Result<Vec<Booking>, StoreError> {
        Ok(Vec::new())
    }

    async fn find_by_customer_and_room(
        &self,
        _customer_name: &str,
        _room_id: Ulid,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(Vec::new())
    }
}

fn assert_pairwise_disjoint(bookings: &[Booking]) {
    for (i, a) in bookings.iter().enumerate() {
        for b in &bookings[i + 1..] {
            if a.room_id == b.room_id && a.date == b.date {
                assert!(
                    !a.overlaps(&b.span()),
                    "double booking: [{}, {}) and [{}, {})",
                    a.start_time,
                    a.end_time,
                    b.start_time,
                    b.end_time
                );
            }
        }
    }
}

// ── Admission scenarios ──────────────────────────────────

#[tokio::test]
async fn admit_succeeds_on_empty_room() {
    let engine = engine();
    let room = room(&engine).await;

    let booking = engine
        .admit(room.id, "Alice", DATE, "10:00", "11:00")
        .await
        .unwrap();
    assert_eq!(booking.room_id, room.id);
    assert_eq!(booking.customer_name, "Alice");
    assert_eq!(booking.date, DATE);
    assert_eq!(booking.start_time, "10:00");
    assert_eq!(booking.end_time, "11:00");
}

#[tokio::test]
async fn admit_overlap_is_slot_conflict() {
    let engine = engine();
    let room = room(&engine).await;

    let alice = engine.admit(room.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
    let result = engine.admit(room.id, "Bob", DATE, "10:30", "10:45").await;
    match result {
        Err(EngineError::SlotConflict(id)) => assert_eq!(id, alice.id),
        other => panic!("expected SlotConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn admit_unknown_room() {
    let engine = engine();
    let result = engine.admit(Ulid::new(), "Alice", DATE, "10:00", "11:00").await;
    assert!(matches!(result, Err(EngineError::RoomNotFound(_))));
}

#[tokio::test]
async fn admit_reversed_interval() {
    let engine = engine();
    let room = room(&engine).await;
    let result = engine.admit(room.id, "Alice", DATE, "11:00", "10:00").await;
    assert!(matches!(result, Err(EngineError::InvalidInterval(_))));
}

#[tokio::test]
async fn admit_validates_before_room_lookup() {
    let engine = engine();
    let result = engine.admit(Ulid::new(), "", DATE, "10:00", "11:00").await;
    assert!(matches!(result, Err(EngineError::InvalidInterval(_))));
}

#[tokio::test]
async fn admit_same_slot_different_date() {
    let engine = engine();
    let room = room(&engine).await;

    engine.admit(room.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
    let next_day = engine
        .admit(room.id, "Alice", "2024-01-02", "10:00", "11:00")
        .await
        .unwrap();
    assert_eq!(next_day.date, "2024-01-02");
}

#[tokio::test]
async fn admit_same_slot_different_room() {
    let engine = engine();
    let a = room(&engine).await;
    let b = room(&engine).await;

    engine.admit(a.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
    engine.admit(b.id, "Bob", DATE, "10:00", "11:00").await.unwrap();
}

#[tokio::test]
async fn admit_adjacent_slots() {
    let engine = engine();
    let room = room(&engine).await;

    engine.admit(room.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
    engine.admit(room.id, "Bob", DATE, "11:00", "12:00").await.unwrap();
    engine.admit(room.id, "Carol", DATE, "09:00", "10:00").await.unwrap();

    // Fully inside the now-booked 09:00–12:00 stretch
    let result = engine.admit(room.id, "Dave", DATE, "09:30", "11:30").await;
    assert!(matches!(result, Err(EngineError::SlotConflict(_))));
}

#[tokio::test]
async fn admit_enclosing_existing_booking() {
    let engine = engine();
    let room = room(&engine).await;

    let inner = engine.admit(room.id, "Alice", DATE, "10:30", "10:45").await.unwrap();
    let result = engine.admit(room.id, "Bob", DATE, "10:00", "11:00").await;
    match result {
        Err(EngineError::SlotConflict(id)) => assert_eq!(id, inner.id),
        other => panic!("expected SlotConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn admit_storage_failure_passed_through() {
    let rooms = Arc::new(MemoryStore::new());
    let engine = Engine::new(rooms, Arc::new(BrokenBookings));
    let room = room(&engine).await;

    let result = engine.admit(room.id, "Alice", DATE, "10:00", "11:00").await;
    match result {
        Err(EngineError::StorageFailure(msg)) => assert!(msg.contains("disk full")),
        other => panic!("expected StorageFailure, got {other:?}"),
    }
    assert!(matches!(
        engine.rooms_with_bookings().await,
        Err(EngineError::StorageFailure(_))
    ));
}

#[tokio::test]
async fn admit_releases_lock_entries() {
    let engine = engine();
    let room = room(&engine).await;

    engine.admit(room.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
    let _ = engine.admit(room.id, "Bob", DATE, "10:00", "11:00").await;
    assert!(engine.locks.is_empty());
}

// ── Room creation ────────────────────────────────────────

#[tokio::test]
async fn create_room_validates_fields() {
    let engine = engine();
    assert!(matches!(
        engine.create_room(0, vec![], 10.0).await,
        Err(EngineError::InvalidRoom(_))
    ));
    assert!(matches!(
        engine.create_room(4, vec![], -5.0).await,
        Err(EngineError::InvalidRoom(_))
    ));

    let room = engine
        .create_room(8, vec!["projector".into(), "whiteboard".into()], 0.0)
        .await
        .unwrap();
    assert_eq!(room.number_of_seats, 8);
    assert_eq!(room.amenities, vec!["projector".to_string(), "whiteboard".to_string()]);
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_admits_admit_exactly_one() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(5),
    });
    let engine = Arc::new(Engine::with_store(store));
    let room_id = room(&engine).await.id;

    let mut handles = Vec::new();
    for i in 0..32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .admit(room_id, &format!("customer-{i}"), DATE, "10:00", "11:00")
                .await
        }));
    }

    let mut admitted = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(EngineError::SlotConflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(conflicts, 31);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mixed_admits_never_overlap() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(1),
    });
    let engine = Arc::new(Engine::with_store(store));
    let rooms = [room(&engine).await, room(&engine).await];

    // Half-hour and hour-long requests at staggered starts; many overlap.
    let mut handles = Vec::new();
    for i in 0..96u32 {
        let engine = engine.clone();
        let room_id = rooms[(i % 2) as usize].id;
        let date = if i % 3 == 0 { "2024-01-02" } else { DATE };
        let start_min = (i * 17) % 600;
        let len = if i % 2 == 0 { 30 } else { 60 };
        let start = format!("{:02}:{:02}", 8 + start_min / 60, start_min % 60);
        let end_min = start_min + len;
        let end = format!("{:02}:{:02}", 8 + end_min / 60, end_min % 60);
        handles.push(tokio::spawn(async move {
            engine.admit(room_id, "Alice", date, &start, &end).await
        }));
    }

    let mut admitted = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(b) => admitted.push(b),
            Err(EngineError::SlotConflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(!admitted.is_empty());
    assert_pairwise_disjoint(&admitted);

    let stored = engine.rooms_with_bookings().await.unwrap();
    let all: Vec<Booking> = stored.into_iter().flat_map(|r| r.bookings).collect();
    assert_eq!(all.len(), admitted.len());
    assert_pairwise_disjoint(&all);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_dates_do_not_wait_on_each_other() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(200),
    });
    let engine = Arc::new(Engine::with_store(store));
    let room_id = room(&engine).await.id;

    let started = std::time::Instant::now();
    let mut handles = Vec::new();
    for day in 1..=8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .admit(room_id, "Alice", &format!("2024-01-{day:02}"), "10:00", "11:00")
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    // Each admit sleeps ~400ms; serialized would take over 3s.
    assert!(started.elapsed() < Duration::from_secs(2));
}

// ── Query views ──────────────────────────────────────────

#[tokio::test]
async fn rooms_with_bookings_groups_by_room() {
    let engine = engine();
    let a = room(&engine).await;
    let b = room(&engine).await;
    let empty = room(&engine).await;

    let a1 = engine.admit(a.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
    let b1 = engine.admit(b.id, "Bob", DATE, "10:00", "11:00").await.unwrap();
    let a2 = engine.admit(a.id, "Carol", DATE, "08:00", "09:00").await.unwrap();

    let view = engine.rooms_with_bookings().await.unwrap();
    assert_eq!(view.len(), 3);
    assert_eq!(view[0].room, a);
    assert_eq!(view[0].bookings, vec![a1, a2]);
    assert_eq!(view[1].room, b);
    assert_eq!(view[1].bookings, vec![b1]);
    assert_eq!(view[2].room, empty);
    assert!(view[2].bookings.is_empty());
}

#[tokio::test]
async fn rooms_with_bookings_is_idempotent() {
    let engine = engine();
    let r = room(&engine).await;
    engine.admit(r.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
    engine.admit(r.id, "Bob", DATE, "12:00", "13:00").await.unwrap();

    let first = engine.rooms_with_bookings().await.unwrap();
    let second = engine.rooms_with_bookings().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn customers_with_bookings_labels_rooms() {
    let engine = engine();
    let r = room(&engine).await;
    let booking = engine.admit(r.id, "Alice", DATE, "10:00", "11:00").await.unwrap();

    let view = engine.customers_with_bookings().await.unwrap();
    assert_eq!(
        view,
        vec![CustomerBooking {
            booking_id: booking.id,
            customer_name: "Alice".into(),
            room_name: r.display_name(),
            date: DATE.into(),
            start_time: "10:00".into(),
            end_time: "11:00".into(),
        }]
    );
}

#[tokio::test]
async fn customers_with_bookings_unknown_room() {
    let rooms = Arc::new(MemoryStore::new());
    let bookings = Arc::new(MemoryStore::new());
    let engine = Engine::new(rooms, bookings.clone());

    // Booking referencing a room the room repository has never seen
    BookingRepository::create(
        bookings.as_ref(),
        NewBooking {
            room_id: Ulid::new(),
            customer_name: "Ghost".into(),
            date: DATE.into(),
            start_time: "10:00".into(),
            end_time: "11:00".into(),
        },
    )
    .await
    .unwrap();

    let view = engine.customers_with_bookings().await.unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].room_name, "Unknown");
    assert_eq!(view[0].customer_name, "Ghost");
}

#[tokio::test]
async fn customer_room_history_confirmed_entries() {
    let engine = engine();
    let r = room(&engine).await;
    let booking = engine.admit(r.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
    engine.admit(r.id, "Bob", DATE, "11:00", "12:00").await.unwrap();

    let history = engine
        .customer_room_history("Alice", &format!("Room {}", r.id))
        .await
        .unwrap();
    assert_eq!(history.customer_name, "Alice");
    assert_eq!(history.room_name, r.display_name());
    assert_eq!(history.bookings.len(), 1);

    let entry = &history.bookings[0];
    assert_eq!(entry.booking_id, booking.id);
    assert_eq!(entry.status, BookingStatus::Confirmed);
    assert_eq!(entry.status.as_str(), "Confirmed");
    assert_eq!(entry.date, DATE);
    assert_eq!(entry.start_time, "10:00");
    assert_eq!(entry.end_time, "11:00");
    assert_eq!(entry.booked_at, booking.id.timestamp_ms() as Ms);
}

#[tokio::test]
async fn customer_room_history_unknown_room() {
    let engine = engine();
    room(&engine).await;
    let result = engine.customer_room_history("Alice", "Room 01ARZ3NDEKTSV4RRFFQ69G5FAV").await;
    assert!(matches!(result, Err(EngineError::RoomNotFound(_))));
    let result = engine.customer_room_history("Alice", "Conference A").await;
    assert!(matches!(result, Err(EngineError::RoomNotFound(_))));
}

#[tokio::test]
async fn customer_room_history_no_bookings() {
    let engine = engine();
    let r = room(&engine).await;
    let history = engine
        .customer_room_history("Nobody", &r.display_name())
        .await
        .unwrap();
    assert!(history.bookings.is_empty());
}

// ── Durable store ────────────────────────────────────────

fn test_wal_path(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join("roombook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

#[tokio::test]
async fn conflicts_survive_restart() {
    let path = test_wal_path("conflicts_survive_restart.wal");

    let room_id = {
        let engine = Engine::with_store(Arc::new(WalStore::open(&path).unwrap()));
        let r = room(&engine).await;
        engine.admit(r.id, "Alice", DATE, "10:00", "11:00").await.unwrap();
        r.id
    };

    let engine = Engine::with_store(Arc::new(WalStore::open(&path).unwrap()));
    let result = engine.admit(room_id, "Bob", DATE, "10:30", "10:45").await;
    assert!(matches!(result, Err(EngineError::SlotConflict(_))));
    engine.admit(room_id, "Bob", DATE, "11:00", "12:00").await.unwrap();

    let history = engine
        .customer_room_history("Alice", &format!("Room {room_id}"))
        .await
        .unwrap();
    assert_eq!(history.bookings.len(), 1);
}
