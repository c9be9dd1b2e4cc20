/// State keys under which the pipeline keeps chain metadata.
pub trait MetadataManager: Send + Sync + 'static {
    fn height_key(&self) -> &[u8];
    fn timestamp_key(&self) -> &[u8];
    fn fee_key(&self) -> &[u8];
    /// Id of the block whose post-state the view holds.
    fn block_id_key(&self) -> &[u8];
}

/// Single-byte prefixes reserved for metadata; application keys must not start with them.
#[derive(Debug, Clone, Default)]
pub struct PrefixMetadata;

const HEIGHT_KEY: &[u8] = &[0x00];
const TIMESTAMP_KEY: &[u8] = &[0x01];
const FEE_KEY: &[u8] = &[0x02];
const BLOCK_ID_KEY: &[u8] = &[0x03];

impl MetadataManager for PrefixMetadata {
    fn height_key(&self) -> &[u8] {
        HEIGHT_KEY
    }

    fn timestamp_key(&self) -> &[u8] {
        TIMESTAMP_KEY
    }

    fn fee_key(&self) -> &[u8] {
        FEE_KEY
    }

    fn block_id_key(&self) -> &[u8] {
        BLOCK_ID_KEY
    }
}
