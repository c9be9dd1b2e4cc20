use super::codec::{CodecError, Reader, Writer};
use super::ids::{BlockId, Id, TxId, ID_LEN};
use super::transaction::{Transaction, MAX_TX_BYTES, MIN_TX_BYTES};
use bytes::Bytes;
use std::sync::Arc;

pub const BLOCK_VERSION: u8 = 0;
pub const MAX_BLOCK_TXS: usize = 65_536;
pub const MAX_BLOCK_BYTES: usize = 16 * 1024 * 1024;

/// version + parent + timestamp + height + tx count
const HEADER_BYTES: usize = 1 + ID_LEN + 8 + 8 + 4;
const TX_FRAME_PREFIX: usize = 4;

/// Immutable block header and body. The id is the SHA-256 of the encoded body and is
/// appended to the encoding so parsers can check it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionBlock {
    parent: BlockId,
    timestamp: i64,
    height: u64,
    txs: Vec<Arc<Transaction>>,
    id: BlockId,
    bytes: Bytes,
}

impl ExecutionBlock {
    pub fn new(parent: BlockId, timestamp: i64, height: u64, txs: Vec<Arc<Transaction>>) -> Self {
        let body_len = txs.iter().fold(HEADER_BYTES, |acc, tx| {
            acc.saturating_add(TX_FRAME_PREFIX + tx.size())
        });
        let mut writer = Writer::with_capacity(body_len + ID_LEN);
        writer
            .u8(BLOCK_VERSION)
            .id(&parent)
            .i64(timestamp)
            .u64(height)
            .u32(txs.len() as u32);
        for tx in &txs {
            writer.long_bytes(tx.bytes());
        }
        let id = Id::digest(writer.as_slice());
        writer.id(&id);

        Self {
            parent,
            timestamp,
            height,
            txs,
            id,
            bytes: writer.finish(),
        }
    }

    /// Height-zero block with no transactions and an empty parent.
    pub fn genesis(timestamp: i64) -> Self {
        Self::new(Id::EMPTY, timestamp, 0, Vec::new())
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn parent(&self) -> BlockId {
        self.parent
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn txs(&self) -> &[Arc<Transaction>] {
        &self.txs
    }

    pub fn tx_ids(&self) -> impl Iterator<Item = TxId> + '_ {
        self.txs.iter().map(|tx| tx.id())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn decode(input: &[u8]) -> Result<Self, CodecError> {
        if input.len() > MAX_BLOCK_BYTES {
            return Err(CodecError::TooLong {
                field: "block",
                len: input.len(),
                max: MAX_BLOCK_BYTES,
            });
        }
        if input.len() < HEADER_BYTES + ID_LEN {
            return Err(CodecError::Truncated {
                field: "block header",
                needed: HEADER_BYTES + ID_LEN,
                remaining: input.len(),
            });
        }

        let (body, declared) = input.split_at(input.len() - ID_LEN);
        let mut reader = Reader::new(body);
        let version = reader.u8("block version")?;
        if version != BLOCK_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let parent = reader.id("parent")?;
        let timestamp = reader.i64("timestamp")?;
        let height = reader.u64("height")?;
        let count = reader.u32("tx count")? as usize;
        let max_fit = reader.remaining() / (TX_FRAME_PREFIX + MIN_TX_BYTES);
        if count > MAX_BLOCK_TXS || count > max_fit {
            return Err(CodecError::CountOutOfRange {
                field: "block txs",
                count,
                min: 0,
                max: MAX_BLOCK_TXS.min(max_fit),
            });
        }

        let mut txs = Vec::with_capacity(count);
        for _ in 0..count {
            let frame = reader.long_bytes("tx", MAX_TX_BYTES)?;
            txs.push(Arc::new(Transaction::decode(frame)?));
        }
        reader.finish()?;

        let computed = Id::digest(body);
        let mut declared_bytes = [0u8; ID_LEN];
        declared_bytes.copy_from_slice(declared);
        let declared = Id::from_bytes(declared_bytes);
        if declared != computed {
            return Err(CodecError::HashMismatch { declared, computed });
        }

        Ok(Self {
            parent,
            timestamp,
            height,
            txs,
            id: computed,
            bytes: Bytes::copy_from_slice(input),
        })
    }
}
