use super::codec::{CodecError, Reader, Writer};
use super::ids::{Address, ID_LEN};

pub const MAX_MEMO_BYTES: usize = 256;
pub const MAX_STORE_KEY_BYTES: usize = 64;
pub const MAX_STORE_VALUE_BYTES: usize = 1024;

const TRANSFER_TAG: u8 = 0;
const STORE_TAG: u8 = 1;

/// Operation carried by a transaction. Actions run in order after the fee is paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Moves `amount` from the transaction sponsor to `to`.
    Transfer {
        to: Address,
        amount: u64,
        memo: Vec<u8>,
    },
    /// Writes `value` under the sponsor's namespace; an empty value deletes the key.
    Store { key: Vec<u8>, value: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Transfer,
    Store,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Transfer { .. } => ActionKind::Transfer,
            Action::Store { .. } => ActionKind::Store,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), CodecError> {
        match self {
            Action::Transfer { memo, .. } if memo.len() > MAX_MEMO_BYTES => {
                Err(CodecError::TooLong {
                    field: "memo",
                    len: memo.len(),
                    max: MAX_MEMO_BYTES,
                })
            }
            Action::Store { key, .. } if key.is_empty() || key.len() > MAX_STORE_KEY_BYTES => {
                Err(CodecError::CountOutOfRange {
                    field: "store key",
                    count: key.len(),
                    min: 1,
                    max: MAX_STORE_KEY_BYTES,
                })
            }
            Action::Store { value, .. } if value.len() > MAX_STORE_VALUE_BYTES => {
                Err(CodecError::TooLong {
                    field: "store value",
                    len: value.len(),
                    max: MAX_STORE_VALUE_BYTES,
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn encode(&self, writer: &mut Writer) {
        match self {
            Action::Transfer { to, amount, memo } => {
                writer
                    .u8(TRANSFER_TAG)
                    .raw(to.as_bytes())
                    .u64(*amount)
                    .short_bytes(memo);
            }
            Action::Store { key, value } => {
                writer.u8(STORE_TAG).short_bytes(key).short_bytes(value);
            }
        }
    }

    pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let action = match reader.u8("action tag")? {
            TRANSFER_TAG => {
                let mut to = [0u8; ID_LEN];
                to.copy_from_slice(reader.raw("transfer recipient", ID_LEN)?);
                let amount = reader.u64("transfer amount")?;
                let memo = reader.short_bytes("memo", MAX_MEMO_BYTES)?.to_vec();
                Action::Transfer {
                    to: Address::from_bytes(to),
                    amount,
                    memo,
                }
            }
            STORE_TAG => {
                let key = reader.short_bytes("store key", MAX_STORE_KEY_BYTES)?.to_vec();
                let value = reader
                    .short_bytes("store value", MAX_STORE_VALUE_BYTES)?
                    .to_vec();
                Action::Store { key, value }
            }
            tag => {
                return Err(CodecError::UnknownTag {
                    field: "action",
                    tag,
                })
            }
        };
        action.validate()?;
        Ok(action)
    }
}
