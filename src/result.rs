//! The result envelope delivered by a future.

use bytes::Bytes;
use prost::Message;

use crate::error::Result;
use crate::proto;
use crate::registry::{MutatorHandle, ScannerHandle};
use crate::types::{Cell, CellAsArray};

/// The handle that produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Producer {
    Mutator(MutatorHandle),
    Scanner(ScannerHandle),
}

impl Producer {
    pub fn id(self) -> u64 {
        match self {
            Producer::Mutator(handle) => handle.id(),
            Producer::Scanner(handle) => handle.id(),
        }
    }
}

/// One completion delivered by [`future_get_result`](crate::HypertableClient::future_get_result).
///
/// `C` is the scan payload: materialized cells by default, an encoded buffer
/// for [`SerializedResult`], or string arrays for [`ArraysResult`].
#[derive(Clone, Debug, PartialEq)]
pub enum FutureResult<C = Vec<Cell>> {
    /// A mutator flush was applied.
    WriteAck { mutator: MutatorHandle },
    /// A batch of cells from a scanner.
    ScanBatch { scanner: ScannerHandle, cells: C },
    /// A write or scan failed on the service.
    Error { producer: Producer, message: String },
    /// No further results will ever arrive for this future.
    Empty,
}

/// A result whose scan payload is an encoded cell buffer.
pub type SerializedResult = FutureResult<Bytes>;

/// A result whose scan payload is flattened to string arrays.
pub type ArraysResult = FutureResult<Vec<CellAsArray>>;

impl<C> FutureResult<C> {
    /// `true` only for the terminal sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self, FutureResult::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FutureResult::Error { .. })
    }

    pub fn is_scan(&self) -> bool {
        matches!(self, FutureResult::ScanBatch { .. })
    }

    pub fn producer(&self) -> Option<Producer> {
        match self {
            FutureResult::WriteAck { mutator } => Some(Producer::Mutator(*mutator)),
            FutureResult::ScanBatch { scanner, .. } => Some(Producer::Scanner(*scanner)),
            FutureResult::Error { producer, .. } => Some(*producer),
            FutureResult::Empty => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            FutureResult::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Converts the scan payload, leaving every other kind unchanged.
    pub fn map_cells<D>(self, f: impl FnOnce(C) -> D) -> FutureResult<D> {
        match self {
            FutureResult::WriteAck { mutator } => FutureResult::WriteAck { mutator },
            FutureResult::ScanBatch { scanner, cells } => FutureResult::ScanBatch {
                scanner,
                cells: f(cells),
            },
            FutureResult::Error { producer, message } => FutureResult::Error { producer, message },
            FutureResult::Empty => FutureResult::Empty,
        }
    }
}

impl FutureResult {
    /// Cells of a scan batch; empty for every other kind.
    pub fn cells(&self) -> &[Cell] {
        match self {
            FutureResult::ScanBatch { cells, .. } => cells,
            _ => &[],
        }
    }

    pub fn into_serialized(self) -> SerializedResult {
        self.map_cells(encode_cells)
    }

    pub fn into_arrays(self) -> ArraysResult {
        self.map_cells(|cells| cells.iter().map(Cell::to_array).collect())
    }
}

/// Encodes cells into the serialized buffer format.
pub fn encode_cells(cells: Vec<Cell>) -> Bytes {
    let batch = proto::CellBatch {
        cells: cells.into_iter().map(Into::into).collect(),
    };
    Bytes::from(batch.encode_to_vec())
}

/// Decodes a buffer produced by [`encode_cells`].
pub fn decode_cells(buf: &[u8]) -> Result<Vec<Cell>> {
    let batch = proto::CellBatch::decode(buf)?;
    Ok(batch.cells.into_iter().map(Into::into).collect())
}
