use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::wal::{LogFile, Wal};

use super::{BookingRepository, MemoryStore, NewBooking, NewRoom, RoomRepository, StoreError};

struct AppendRequest {
    event: Event,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop<F: LogFile>(mut wal: Wal<F>, mut rx: mpsc::Receiver<AppendRequest>) {
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
        respond_batch(batch, &result);
    }
}

fn flush_batch<F: LogFile>(wal: &mut Wal<F>, batch: &[AppendRequest]) -> io::Result<()> {
    for req in batch {
        if let Err(e) = wal.append_buffered(&req.event) {
            // The whole batch fails together, so none of it may reach disk
            wal.rollback();
            return Err(e);
        }
    }
    wal.flush_sync()
}

fn respond_batch(batch: Vec<AppendRequest>, result: &io::Result<()>) {
    for req in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = req.response.send(r);
    }
}

/// A [`MemoryStore`] made durable by a write-ahead log.
///
/// Every create is appended to the WAL and fsynced before it becomes visible
/// in memory. A create that fails leaves nothing in the WAL either. Opening
/// replays the log and cuts off a torn tail. Must be opened inside a Tokio
/// runtime since it spawns the writer task.
pub struct WalStore {
    mem: MemoryStore,
    wal_tx: mpsc::Sender<AppendRequest>,
}

impl WalStore {
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::recover(wal_path)?;
        info!("replaying {} WAL events from {}", events.len(), wal.path().display());
        Ok(Self::start(wal, events))
    }

    fn start<F: LogFile>(wal: Wal<F>, events: Vec<Event>) -> Self {
        let mem = MemoryStore::new();
        for event in events {
            mem.apply_event(event);
        }

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Self { mem, wal_tx }
    }

    pub fn room_count(&self) -> usize {
        self.mem.room_count()
    }

    pub fn booking_count(&self) -> usize {
        self.mem.booking_count()
    }

    async fn wal_append(&self, event: Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(AppendRequest { event, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }
}

#[async_trait]
impl RoomRepository for WalStore {
    async fn create(&self, fields: NewRoom) -> Result<Room, StoreError> {
        let room = self.mem.build_room(fields)?;
        self.wal_append(Event::from(&room)).await?;
        self.mem.insert_room(room.clone());
        Ok(room)
    }

    async fn get_by_id(&self, id: Ulid) -> Result<Option<Room>, StoreError> {
        Ok(self.mem.room(&id))
    }

    async fn list_all(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.mem.rooms_in_order())
    }

    async fn find_by_display_name(&self, name: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.mem.room_by_display_name(name))
    }
}

#[async_trait]
impl BookingRepository for WalStore {
    async fn create(&self, fields: NewBooking) -> Result<Booking, StoreError> {
        let booking = self.mem.build_booking(fields)?;
        self.wal_append(Event::from(&booking)).await?;
        self.mem.insert_booking(booking.clone());
        Ok(booking)
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.mem.bookings_in_order())
    }

    async fn find_by_room_and_date(&self, room_id: Ulid, date: &str) -> Result<Vec<Booking>, StoreError> {
        Ok(self.mem.day(room_id, date))
    }

    async fn find_by_customer_and_room(
        &self,
        customer_name: &str,
        room_id: Ulid,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.mem.customer_bookings(customer_name, room_id))
    }
}
