use super::block::ExecutionBlock;
use super::codec::Writer;
use super::ids::BlockId;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Outcome of one included transaction.
///
/// A failed action leaves `success` false and the transaction's action writes rolled back,
/// but the fee stays charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxResult {
    pub success: bool,
    pub error: Option<String>,
    #[serde(serialize_with = "hex_list")]
    pub outputs: Vec<Vec<u8>>,
    pub units: u64,
    pub fee: u64,
    /// State keys written by the actions, counting overwrites.
    pub writes: u32,
}

fn hex_list<S: Serializer>(outputs: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(outputs.iter().map(hex::encode))
}

/// A block together with per-transaction results and the fee totals it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedBlock {
    block: Arc<ExecutionBlock>,
    results: Vec<TxResult>,
    unit_price: u64,
    units_consumed: u64,
    fees_paid: u64,
}

impl ExecutedBlock {
    pub(crate) fn new(block: Arc<ExecutionBlock>, results: Vec<TxResult>, unit_price: u64) -> Self {
        let units_consumed = results
            .iter()
            .fold(0u64, |acc, result| acc.saturating_add(result.units));
        let fees_paid = results
            .iter()
            .fold(0u64, |acc, result| acc.saturating_add(result.fee));
        Self {
            block,
            results,
            unit_price,
            units_consumed,
            fees_paid,
        }
    }

    pub fn block(&self) -> &Arc<ExecutionBlock> {
        &self.block
    }

    pub fn id(&self) -> BlockId {
        self.block.id()
    }

    pub fn height(&self) -> u64 {
        self.block.height()
    }

    pub fn results(&self) -> &[TxResult] {
        &self.results
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn units_consumed(&self) -> u64 {
        self.units_consumed
    }

    pub fn fees_paid(&self) -> u64 {
        self.fees_paid
    }

    /// Canonical encoding of the execution outcome. Two nodes that executed the same block
    /// over the same parent state produce identical bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(64 + self.results.len() * 48);
        writer
            .id(&self.block.id())
            .u64(self.unit_price)
            .u64(self.units_consumed)
            .u64(self.fees_paid)
            .u32(self.results.len() as u32);
        for result in &self.results {
            writer.bool(result.success);
            match &result.error {
                Some(error) => writer.bool(true).long_bytes(error.as_bytes()),
                None => writer.bool(false),
            };
            writer.u16(result.outputs.len() as u16);
            for output in &result.outputs {
                writer.long_bytes(output);
            }
            writer.u64(result.units).u64(result.fee).u32(result.writes);
        }
        writer.finish().to_vec()
    }
}

impl Serialize for ExecutedBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExecutedBlock", 7)?;
        state.serialize_field("id", &self.block.id())?;
        state.serialize_field("height", &self.block.height())?;
        state.serialize_field("timestamp", &self.block.timestamp())?;
        state.serialize_field("unit_price", &self.unit_price)?;
        state.serialize_field("units_consumed", &self.units_consumed)?;
        state.serialize_field("fees_paid", &self.fees_paid)?;
        state.serialize_field("results", &self.results)?;
        state.end()
    }
}
