//! Write-ahead journals for the in-memory stores
//!
//! Every store mutation is appended here before it is applied in memory, and
//! the journal is replayed when the store is reopened. Embeddings and
//! documents each get their own file.
//!
//! File format:
//! - Magic bytes: "BSJL" (4 bytes)
//! - Version: u32 (4 bytes)
//! - Frames: [Frame]*
//!
//! Each frame:
//! - Length: u32 - length of the serialized entry
//! - Data: msgpack-encoded [`JournalEntry`]
//! - CRC32: u32 - checksum of length + data

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::types::{Document, DocumentId, EmbeddingId, EmbeddingRecord};
use crate::{Error, Result};

const JOURNAL_MAGIC: &[u8; 4] = b"BSJL";
const JOURNAL_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// Frames larger than this are treated as corruption
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// Operations a journal file holds
pub trait JournalRecord: Serialize + DeserializeOwned + Send {
    /// File name inside the data directory
    const FILE_NAME: &'static str;
}

/// An embedding store mutation. Records carry their assigned ids so replay
/// reproduces the same state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JournalOp {
    Upsert {
        record: EmbeddingRecord,
    },
    ReplaceDocument {
        document_id: DocumentId,
        records: Vec<EmbeddingRecord>,
    },
    Delete {
        id: EmbeddingId,
    },
    DeleteDocument {
        document_id: DocumentId,
    },
    /// Full store contents, written by compaction
    Snapshot {
        records: Vec<EmbeddingRecord>,
        next_id: EmbeddingId,
    },
}

impl JournalRecord for JournalOp {
    const FILE_NAME: &'static str = "embeddings.journal";
}

/// A document repository mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DocumentOp {
    Put {
        document: Document,
    },
    Remove {
        id: DocumentId,
    },
    /// Full repository contents, written by compaction
    Snapshot {
        documents: Vec<Document>,
    },
}

impl JournalRecord for DocumentOp {
    const FILE_NAME: &'static str = "documents.journal";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry<Op> {
    pub sequence: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub op: Op,
}

/// Append-only journal file of `Op` entries
pub struct Journal<Op> {
    path: PathBuf,
    file: File,
    next_sequence: u64,
    _op: PhantomData<fn() -> Op>,
}

pub type EmbeddingJournal = Journal<JournalOp>;
pub type DocumentJournal = Journal<DocumentOp>;

impl<Op: JournalRecord> Journal<Op> {
    /// Open or create the journal in `dir`, returning it with every intact
    /// entry already on disk.
    ///
    /// Frames with a bad checksum are skipped. A truncated tail is cut off so
    /// new frames start on a clean boundary.
    pub async fn open(dir: impl AsRef<Path>) -> Result<(Self, Vec<JournalEntry<Op>>)> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::journal(format!("failed to create {}: {}", dir.display(), e)))?;
        let path = dir.join(Op::FILE_NAME);

        let (entries, valid_len) = match tokio::fs::read(&path).await {
            Ok(data) if !data.is_empty() => Self::decode(&data)?,
            Ok(_) => (Vec::new(), 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), 0),
            Err(e) => return Err(Error::journal(format!("failed to read journal: {}", e))),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::journal(format!("failed to open journal: {}", e)))?;

        if valid_len == 0 {
            file.set_len(0).await?;
            Self::write_header(&mut file).await?;
        } else if (valid_len as u64) < file.metadata().await?.len() {
            file.set_len(valid_len as u64).await?;
        }

        let next_sequence = entries.last().map(|e| e.sequence + 1).unwrap_or(0);
        tracing::info!(
            path = %path.display(),
            entries = entries.len(),
            "Opened journal"
        );

        Ok((
            Self {
                path,
                file,
                next_sequence,
                _op: PhantomData,
            },
            entries,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an operation and flush it. Returns the entry's sequence number.
    pub async fn append(&mut self, op: Op) -> Result<u64> {
        let entry = JournalEntry {
            sequence: self.next_sequence,
            timestamp: chrono::Utc::now(),
            op,
        };

        let frame = encode_frame(&entry)?;
        self.file
            .write_all(&frame)
            .await
            .map_err(|e| Error::journal(format!("failed to write journal frame: {}", e)))?;
        self.file
            .flush()
            .await
            .map_err(|e| Error::journal(format!("failed to flush journal: {}", e)))?;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Force written frames to stable storage.
    pub async fn sync(&mut self) -> Result<()> {
        self.file
            .sync_all()
            .await
            .map_err(|e| Error::journal(format!("failed to sync journal: {}", e)))
    }

    /// Replace the journal with a single snapshot operation.
    ///
    /// The snapshot is written to a sibling file and renamed over the journal,
    /// so a crash leaves either the old or the new journal intact.
    pub async fn compact(&mut self, snapshot: Op) -> Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        let entry = JournalEntry {
            sequence: 0,
            timestamp: chrono::Utc::now(),
            op: snapshot,
        };

        let mut tmp = File::create(&tmp_path)
            .await
            .map_err(|e| Error::journal(format!("failed to create snapshot: {}", e)))?;
        Self::write_header(&mut tmp).await?;
        tmp.write_all(&encode_frame(&entry)?).await?;
        tmp.sync_all().await?;
        drop(tmp);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| Error::journal(format!("failed to install snapshot: {}", e)))?;

        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::journal(format!("failed to reopen journal: {}", e)))?;
        self.next_sequence = 1;
        Ok(())
    }

    async fn write_header(file: &mut File) -> Result<()> {
        let mut header = BytesMut::with_capacity(HEADER_LEN);
        header.put_slice(JOURNAL_MAGIC);
        header.put_u32(JOURNAL_VERSION);
        file.write_all(&header)
            .await
            .map_err(|e| Error::journal(format!("failed to write journal header: {}", e)))?;
        file.flush().await?;
        Ok(())
    }

    /// Decode a journal image into its intact entries and the byte length of
    /// the readable prefix.
    fn decode(data: &[u8]) -> Result<(Vec<JournalEntry<Op>>, usize)> {
        if data.len() < HEADER_LEN {
            tracing::warn!(len = data.len(), "Journal header truncated, starting empty");
            return Ok((Vec::new(), 0));
        }

        if &data[..4] != JOURNAL_MAGIC {
            return Err(Error::journal("invalid journal file: bad magic bytes"));
        }
        let version = (&data[4..HEADER_LEN]).get_u32();
        if version != JOURNAL_VERSION {
            return Err(Error::journal(format!(
                "unsupported journal version: {}",
                version
            )));
        }

        let mut entries = Vec::new();
        let mut frame_index = 0usize;
        let mut corrupted = 0usize;
        let mut pos = HEADER_LEN;

        while pos < data.len() {
            let rest = &data[pos..];
            if rest.len() < 4 {
                tracing::warn!(frame = frame_index, "Journal frame length truncated, stopping replay");
                break;
            }
            let length = (&rest[..4]).get_u32();
            if length > MAX_FRAME_LEN {
                tracing::warn!(frame = frame_index, length, "Journal frame has unreasonable length, stopping replay");
                break;
            }
            let body_end = 4 + length as usize;
            let frame_len = body_end + 4;
            if rest.len() < frame_len {
                tracing::warn!(frame = frame_index, "Journal frame truncated, stopping replay");
                break;
            }

            let stored_crc = (&rest[body_end..frame_len]).get_u32();
            let calculated_crc = crc32fast::hash(&rest[..body_end]);
            pos += frame_len;

            if calculated_crc != stored_crc {
                tracing::warn!(
                    frame = frame_index,
                    expected = stored_crc,
                    actual = calculated_crc,
                    "Journal frame CRC mismatch, skipping"
                );
                corrupted += 1;
                frame_index += 1;
                continue;
            }

            match rmp_serde::from_slice::<JournalEntry<Op>>(&rest[4..body_end]) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(frame = frame_index, error = %e, "Journal frame failed to decode, skipping");
                    corrupted += 1;
                }
            }
            frame_index += 1;
        }

        if corrupted > 0 {
            tracing::warn!(
                recovered = entries.len(),
                corrupted,
                "Journal replay skipped corrupted frames"
            );
        }

        Ok((entries, pos))
    }
}

fn encode_frame<Op: Serialize>(entry: &JournalEntry<Op>) -> Result<BytesMut> {
    let data = rmp_serde::to_vec(entry)
        .map_err(|e| Error::journal(format!("failed to serialize journal entry: {}", e)))?;
    let length = u32::try_from(data.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| Error::journal(format!("journal entry too large: {} bytes", data.len())))?;

    let mut buffer = BytesMut::with_capacity(4 + data.len() + 4);
    buffer.put_u32(length);
    buffer.put_slice(&data);
    let crc = crc32fast::hash(&buffer);
    buffer.put_u32(crc);
    Ok(buffer)
}
