use crate::chain::block::ExecutionBlock;
use crate::error::ChainError;

/// Decodes a block received from elsewhere.
///
/// Every length and count is checked against the remaining input before anything is
/// allocated, and the trailing id must match the recomputed hash of the body.
pub fn parse_block(bytes: &[u8]) -> Result<ExecutionBlock, ChainError> {
    let block = ExecutionBlock::decode(bytes).map_err(|err| {
        tracing::debug!(len = bytes.len(), error = %err, "rejected malformed block");
        ChainError::MalformedBlock(err)
    })?;
    tracing::trace!(
        height = block.height(),
        id = %block.id().short(),
        txs = block.txs().len(),
        "parsed block"
    );
    Ok(block)
}
