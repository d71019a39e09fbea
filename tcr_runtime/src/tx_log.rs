//! Append-only transaction log: binary protobuf frames.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Strict append only
//!   - fsync after every write
//!   - Sequence strictly increasing (validated on append and on load)
//!   - Only transactions the engine accepted are appended

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::debug;

use tcr_engine::Transaction;

use crate::errors::{RuntimeError, RuntimeResult};
use crate::proto_bridge::{proto_to_transaction, transaction_to_proto};
use crate::proto_types::ProtoTransaction;

/// Frames larger than this are treated as corruption.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Append-only transaction log backed by a binary file.
#[derive(Debug)]
pub struct TxLog {
    path: PathBuf,
    last_sequence: u64,
}

impl TxLog {
    /// Open or create a log at the given path. Existing frames are read
    /// and checked to find the last sequence number.
    pub fn open(path: &Path) -> RuntimeResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_sequence = if path.exists() {
            let frames = read_frames(path)?;
            check_sequence(&frames)?;
            frames.last().map(|f| f.sequence).unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Append one transaction. Writes a length-prefixed frame and fsyncs.
    pub fn append(&mut self, tx: &Transaction) -> RuntimeResult<()> {
        let expected = self.last_sequence + 1;
        if tx.sequence != expected {
            return Err(RuntimeError::LogSequence {
                expected,
                got: tx.sequence,
            });
        }

        let buf = transaction_to_proto(tx)?.encode_to_vec();
        if buf.len() > MAX_FRAME_LEN {
            return Err(RuntimeError::Frame(format!(
                "sequence {}: frame of {} bytes",
                tx.sequence,
                buf.len()
            )));
        }
        let len = buf.len() as u32;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        debug!(sequence = tx.sequence, bytes = buf.len(), "appended transaction");
        self.last_sequence = tx.sequence;
        Ok(())
    }

    /// Load every transaction in sequence order.
    pub fn load_all(&self) -> RuntimeResult<Vec<Transaction>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let frames = read_frames(&self.path)?;
        check_sequence(&frames)?;
        frames.iter().map(proto_to_transaction).collect()
    }
}

fn check_sequence(frames: &[ProtoTransaction]) -> RuntimeResult<()> {
    for (i, frame) in frames.iter().enumerate() {
        let expected = i as u64 + 1;
        if frame.sequence != expected {
            return Err(RuntimeError::LogSequence {
                expected,
                got: frame.sequence,
            });
        }
    }
    Ok(())
}

/// Read all frames from a file, validating frame integrity.
fn read_frames(path: &Path) -> RuntimeResult<Vec<ProtoTransaction>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut frames = Vec::new();
    let mut len_buf = [0u8; 4];

    loop {
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(RuntimeError::Frame(format!(
                "invalid frame length {len} after {} frames",
                frames.len()
            )));
        }

        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).map_err(|e| {
            RuntimeError::Frame(format!("truncated frame after {} frames: {e}", frames.len()))
        })?;

        frames.push(ProtoTransaction::decode(frame.as_slice())?);
    }

    Ok(frames)
}
