use super::action::Action;
use super::codec::{CodecError, Reader, Writer};
use super::ids::{Address, Id, TxId};
use bytes::Bytes;

pub const MAX_ACTIONS: usize = 16;
pub const MAX_SIGNER_BYTES: usize = 128;
pub const MAX_SIGNATURE_BYTES: usize = 256;
/// Upper bound on one encoded transaction; also bounds the per-transaction frame in blocks.
pub const MAX_TX_BYTES: usize = 32 * 1024;
/// expiry, action count, the smallest store action, and an auth with empty fields.
pub(crate) const MIN_TX_BYTES: usize = 8 + 1 + 6 + 5;

/// Credential proving the sponsor authorized the transaction's actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub scheme: u8,
    pub signer: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Auth {
    /// Account that pays the fee and acts in every action.
    pub fn sponsor(&self) -> Address {
        Address::from_signer(self.scheme, &self.signer)
    }

    fn validate(&self) -> Result<(), CodecError> {
        if self.signer.len() > MAX_SIGNER_BYTES {
            return Err(CodecError::TooLong {
                field: "signer",
                len: self.signer.len(),
                max: MAX_SIGNER_BYTES,
            });
        }
        if self.signature.len() > MAX_SIGNATURE_BYTES {
            return Err(CodecError::TooLong {
                field: "signature",
                len: self.signature.len(),
                max: MAX_SIGNATURE_BYTES,
            });
        }
        Ok(())
    }
}

/// Transaction body before a credential is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    expiry: i64,
    actions: Vec<Action>,
}

impl UnsignedTransaction {
    pub fn new(expiry: i64, actions: Vec<Action>) -> Self {
        Self { expiry, actions }
    }

    /// Digest the credential must sign.
    pub fn digest(&self) -> Id {
        let mut writer = Writer::with_capacity(64);
        self.encode(&mut writer);
        Id::digest(writer.as_slice())
    }

    pub fn with_auth(self, auth: Auth) -> Result<Transaction, CodecError> {
        if self.actions.is_empty() || self.actions.len() > MAX_ACTIONS {
            return Err(CodecError::CountOutOfRange {
                field: "actions",
                count: self.actions.len(),
                min: 1,
                max: MAX_ACTIONS,
            });
        }
        for action in &self.actions {
            action.validate()?;
        }
        auth.validate()?;

        let mut writer = Writer::with_capacity(128);
        self.encode(&mut writer);
        let digest = Id::digest(writer.as_slice());
        writer
            .u8(auth.scheme)
            .short_bytes(&auth.signer)
            .short_bytes(&auth.signature);
        if writer.len() > MAX_TX_BYTES {
            return Err(CodecError::TooLong {
                field: "transaction",
                len: writer.len(),
                max: MAX_TX_BYTES,
            });
        }
        let bytes = writer.finish();

        Ok(Transaction {
            id: Id::digest(&bytes),
            digest,
            expiry: self.expiry,
            actions: self.actions,
            auth,
            bytes,
        })
    }

    fn encode(&self, writer: &mut Writer) {
        writer.i64(self.expiry).u8(self.actions.len() as u8);
        for action in &self.actions {
            action.encode(writer);
        }
    }
}

/// Immutable signed transaction. Identity is the hash of its full encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TxId,
    digest: Id,
    expiry: i64,
    actions: Vec<Action>,
    auth: Auth,
    bytes: Bytes,
}

impl Transaction {
    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn digest(&self) -> &Id {
        &self.digest
    }

    /// Unix milliseconds after which the transaction may no longer be included.
    pub fn expiry(&self) -> i64 {
        self.expiry
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn sponsor(&self) -> Address {
        self.auth.sponsor()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn decode(input: &[u8]) -> Result<Self, CodecError> {
        if input.len() > MAX_TX_BYTES {
            return Err(CodecError::TooLong {
                field: "transaction",
                len: input.len(),
                max: MAX_TX_BYTES,
            });
        }

        let mut reader = Reader::new(input);
        let expiry = reader.i64("expiry")?;
        let count = usize::from(reader.u8("action count")?);
        if count == 0 || count > MAX_ACTIONS {
            return Err(CodecError::CountOutOfRange {
                field: "actions",
                count,
                min: 1,
                max: MAX_ACTIONS,
            });
        }
        let mut actions = Vec::with_capacity(count);
        for _ in 0..count {
            actions.push(Action::decode(&mut reader)?);
        }
        let unsigned_len = input.len() - reader.remaining();

        let auth = Auth {
            scheme: reader.u8("auth scheme")?,
            signer: reader.short_bytes("signer", MAX_SIGNER_BYTES)?.to_vec(),
            signature: reader
                .short_bytes("signature", MAX_SIGNATURE_BYTES)?
                .to_vec(),
        };
        reader.finish()?;

        Ok(Self {
            id: Id::digest(input),
            digest: Id::digest(&input[..unsigned_len]),
            expiry,
            actions,
            auth,
            bytes: Bytes::copy_from_slice(input),
        })
    }
}
