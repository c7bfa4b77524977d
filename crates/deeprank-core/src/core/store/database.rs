use super::error::StoreError;
use super::frame::{self, FILE_HEADER_LEN, FRAME_HEADER_LEN, FrameRead};
use crate::core::models::conformation::ConformationRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Deserialize)]
enum Entry {
    Put {
        name: String,
        record: ConformationRecord,
    },
    Delete {
        name: String,
    },
}

/// Borrowed mirror of [`Entry`]; encodes to the same bytes.
#[derive(Serialize)]
enum EntryRef<'a> {
    Put {
        name: &'a str,
        record: &'a ConformationRecord,
    },
    Delete {
        name: &'a str,
    },
}

impl EntryRef<'_> {
    fn name(&self) -> &str {
        match self {
            EntryRef::Put { name, .. } | EntryRef::Delete { name } => name,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Offset of the frame header.
    offset: u64,
    payload_len: u64,
}

impl Slot {
    fn frame_len(&self) -> u64 {
        FRAME_HEADER_LEN + self.payload_len
    }
}

fn bincode_config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// A persisted collection of named conformation records.
///
/// The file is an append-only log of put/delete frames; the latest frame for
/// a name wins. Mutation takes `&mut self`, so one handle is the only writer
/// it knows about. [`Database::rewrite`] builds a compacted copy beside the
/// file and renames it into place only once it is complete.
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    file: File,
    index: BTreeMap<String, Slot>,
    end: u64,
    stale: u64,
    read_only: bool,
}

impl Database {
    /// Creates an empty collection. Fails if anything exists at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(StoreError::AlreadyExists(path));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.clone()),
                _ => StoreError::Io(e),
            })?;
        frame::write_file_header(&mut file)?;
        file.flush()?;
        debug!(path = %path.display(), "Created collection");
        Ok(Self {
            path,
            file,
            index: BTreeMap::new(),
            end: FILE_HEADER_LEN,
            stale: 0,
            read_only: false,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with(path.as_ref(), false)
    }

    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with(path.as_ref(), true)
    }

    fn open_with(path: &Path, read_only: bool) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(&file);
        if !frame::read_file_header(&mut reader)? {
            return Err(StoreError::BadHeader(path.to_path_buf()));
        }

        let mut index = BTreeMap::new();
        let mut stale = 0;
        let mut offset = FILE_HEADER_LEN;
        loop {
            match frame::read_frame(&mut reader, offset, file_len)? {
                FrameRead::Frame(payload) => {
                    let (entry, _): (Entry, usize) =
                        bincode::serde::decode_from_slice(&payload, bincode_config())
                            .map_err(|source| StoreError::Decode { offset, source })?;
                    let slot = Slot {
                        offset,
                        payload_len: payload.len() as u64,
                    };
                    let previous = match entry {
                        Entry::Put { name, .. } => index.insert(name, slot),
                        Entry::Delete { name } => {
                            stale += slot.frame_len();
                            index.remove(&name)
                        }
                    };
                    if let Some(old) = previous {
                        stale += old.frame_len();
                    }
                    offset += slot.frame_len();
                }
                FrameRead::End => break,
                FrameRead::Torn => {
                    warn!(
                        path = %path.display(),
                        offset,
                        dropped_bytes = file_len - offset,
                        "Ignoring incomplete trailing frame"
                    );
                    if !read_only {
                        file.set_len(offset)?;
                    }
                    break;
                }
            }
        }
        drop(reader);

        debug!(path = %path.display(), records = index.len(), "Opened collection");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
            end: offset,
            stale,
            read_only,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Record names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes occupied by superseded or deleted frames.
    pub fn stale_bytes(&self) -> u64 {
        self.stale
    }

    pub fn get(&self, name: &str) -> Result<Option<ConformationRecord>, StoreError> {
        let Some(slot) = self.index.get(name) else {
            return Ok(None);
        };
        let mut file = &self.file;
        file.seek(SeekFrom::Start(slot.offset + FRAME_HEADER_LEN))?;
        let mut payload = vec![0u8; slot.payload_len as usize];
        file.read_exact(&mut payload)?;
        let (entry, _): (Entry, usize) =
            bincode::serde::decode_from_slice(&payload, bincode_config()).map_err(|source| {
                StoreError::Decode {
                    offset: slot.offset,
                    source,
                }
            })?;
        match entry {
            Entry::Put { record, .. } => Ok(Some(record)),
            Entry::Delete { .. } => Err(StoreError::Corrupt {
                offset: slot.offset,
                reason: format!("index entry for '{name}' points at a delete frame"),
            }),
        }
    }

    /// Inserts or replaces the record stored under `name`.
    pub fn put(&mut self, name: &str, record: &ConformationRecord) -> Result<(), StoreError> {
        let slot = self.append(&EntryRef::Put { name, record })?;
        if let Some(old) = self.index.insert(name.to_string(), slot) {
            self.stale += old.frame_len();
        }
        Ok(())
    }

    /// Removes `name`, returning whether it was present.
    pub fn delete(&mut self, name: &str) -> Result<bool, StoreError> {
        if !self.index.contains_key(name) {
            return Ok(false);
        }
        let slot = self.append(&EntryRef::Delete { name })?;
        self.stale += slot.frame_len();
        if let Some(old) = self.index.remove(name) {
            self.stale += old.frame_len();
        }
        Ok(true)
    }

    fn append(&mut self, entry: &EntryRef<'_>) -> Result<Slot, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly(self.path.clone()));
        }
        let payload = bincode::serde::encode_to_vec(entry, bincode_config()).map_err(|source| {
            StoreError::Encode {
                name: entry.name().to_string(),
                source,
            }
        })?;
        let bytes = frame::encode_frame(&payload)?;
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&bytes)?;
        self.file.flush()?;
        let slot = Slot {
            offset: self.end,
            payload_len: payload.len() as u64,
        };
        self.end += bytes.len() as u64;
        Ok(slot)
    }

    /// Rebuilds the collection from its live records.
    ///
    /// `f` sees every record in name order and returns the record to keep
    /// (possibly modified) or `None` to drop it. The new file is written
    /// next to the old one and renamed over it only after `f` has accepted
    /// every record; on error the collection on disk is unchanged.
    pub fn rewrite<F, E>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&str, ConformationRecord) -> Result<Option<ConformationRecord>, E>,
        E: From<StoreError>,
    {
        if self.read_only {
            return Err(StoreError::ReadOnly(self.path.clone()).into());
        }
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(StoreError::from)?;
        frame::write_file_header(tmp.as_file_mut()).map_err(StoreError::from)?;

        let names: Vec<String> = self.index.keys().cloned().collect();
        let mut kept = 0usize;
        for name in &names {
            let Some(record) = self.get(name)? else {
                continue;
            };
            if let Some(record) = f(name, record)? {
                let payload = bincode::serde::encode_to_vec(
                    EntryRef::Put {
                        name,
                        record: &record,
                    },
                    bincode_config(),
                )
                .map_err(|source| StoreError::Encode {
                    name: name.clone(),
                    source,
                })?;
                let bytes = frame::encode_frame(&payload).map_err(StoreError::from)?;
                tmp.as_file_mut()
                    .write_all(&bytes)
                    .map_err(StoreError::from)?;
                kept += 1;
            }
        }
        tmp.as_file().sync_all().map_err(StoreError::from)?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Io(e.error))?;

        *self = Self::open(&self.path)?;
        debug!(path = %self.path.display(), kept, dropped = names.len() - kept, "Rewrote collection");
        Ok(())
    }

    /// Drops superseded frames. Returns the number of bytes reclaimed.
    pub fn repack(&mut self) -> Result<u64, StoreError> {
        let before = self.end;
        self.rewrite(|_, record| Ok::<_, StoreError>(Some(record)))?;
        Ok(before.saturating_sub(self.end))
    }
}
