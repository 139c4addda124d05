use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::Event;

/// Largest payload replay will allocate for. Anything bigger is a corrupt
/// length prefix.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// The byte sink under a [`Wal`]. Must append: writes land at the current end
/// of the file, including after a `truncate`.
pub trait LogFile: Write + Send + 'static {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Events recovered from disk, plus the length of the valid prefix.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    pub valid_len: u64,
    pub file_len: u64,
}

impl Replay {
    /// Bytes after the last valid record (a torn or corrupt tail).
    pub fn discarded(&self) -> u64 {
        self.file_len - self.valid_len
    }
}

/// Append-only Write-Ahead Log of room and booking creations.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - Truncated last entry (crash) is safely discarded via length-prefix + CRC check.
///
/// Appends are buffered in memory until `flush_sync`. A failed flush cuts the
/// file back to the last synced length, so nothing a caller was told failed
/// can come back on replay. If that cut fails too, the log refuses all
/// further writes.
pub struct Wal<F = File> {
    file: F,
    pending: Vec<u8>,
    committed_len: u64,
    path: PathBuf,
    appends: u64,
    poisoned: bool,
}

impl Wal<File> {
    /// Open (or create) the WAL file at `path`, appending after its current end.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::from_parts(file, path, len))
    }

    /// Replay `path`, cut off any torn tail, and open it for appending.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        if replay.discarded() > 0 {
            warn!(
                "discarding {} bytes of torn WAL tail in {}",
                replay.discarded(),
                path.display()
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        Ok((Self::open(path)?, replay.events))
    }

    /// Replay the WAL from disk, returning all valid events.
    /// Truncated/corrupt trailing entries are discarded and reported through
    /// [`Replay::discarded`].
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let remaining = file_len.saturating_sub(offset + 4);
            if len > MAX_RECORD_LEN || len as u64 + 4 > remaining {
                break;
            }

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
            offset += 4 + len as u64 + 4;
        }

        Ok(Replay {
            events,
            valid_len: offset,
            file_len,
        })
    }
}

impl<F: LogFile> Wal<F> {
    /// Wrap an already-open log whose first `len` bytes are valid records.
    pub fn from_parts(file: F, path: &Path, len: u64) -> Self {
        Self {
            file,
            pending: Vec::new(),
            committed_len: len,
            path: path.to_path_buf(),
            appends: 0,
            poisoned: false,
        }
    }

    /// Append a single event and fsync. Production code batches with
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Encode into the pending buffer. Nothing touches the file until
    /// `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        let mark = self.pending.len();
        if let Err(e) = encode_event(&mut self.pending, event) {
            self.pending.truncate(mark);
            return Err(e);
        }
        self.appends += 1;
        Ok(())
    }

    /// Write the pending buffer and fsync. On failure the file is cut back to
    /// its last synced length and the pending buffer is dropped.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        let result = self.write_pending();
        if result.is_err() {
            self.rollback();
        }
        result
    }

    fn write_pending(&mut self) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other(
                "WAL is read-only after a failed rollback",
            ));
        }
        self.file.write_all(&self.pending)?;
        self.file.flush()?;
        self.file.sync()?;
        self.committed_len += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }

    /// Drop everything not yet synced, both buffered and already written.
    pub fn rollback(&mut self) {
        self.pending.clear();
        if self.poisoned {
            return;
        }
        let cut = self
            .file
            .truncate(self.committed_len)
            .and_then(|()| self.file.sync());
        if let Err(e) = cut {
            error!(
                "cannot roll back {} to {} bytes, refusing further writes: {e}",
                self.path.display(),
                self.committed_len
            );
            self.poisoned = true;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Events appended through this handle since it was opened.
    pub fn appends(&self) -> u64 {
        self.appends
    }

    /// Length of the synced prefix of the file.
    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}
