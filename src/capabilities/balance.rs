use crate::chain::ids::Address;
use crate::state::View;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("account {account} holds {available}, needs {required}")]
    Insufficient {
        account: Address,
        required: u64,
        available: u64,
    },
    #[error("crediting {amount} to {account} overflows its balance")]
    Overflow { account: Address, amount: u64 },
    #[error("balance entry for {account} is corrupt ({len} bytes)")]
    Corrupt { account: Address, len: usize },
}

/// Reads and moves account balances inside a view.
pub trait BalanceHandler: Send + Sync + 'static {
    fn balance(&self, view: &View, account: &Address) -> Result<u64, BalanceError>;

    fn can_deduct(&self, view: &View, account: &Address, amount: u64) -> Result<(), BalanceError> {
        let available = self.balance(view, account)?;
        if available < amount {
            return Err(BalanceError::Insufficient {
                account: *account,
                required: amount,
                available,
            });
        }
        Ok(())
    }

    fn deduct(&self, view: &mut View, account: &Address, amount: u64) -> Result<(), BalanceError>;

    fn credit(&self, view: &mut View, account: &Address, amount: u64) -> Result<(), BalanceError>;
}

const BALANCE_PREFIX: u8 = 0x10;

/// Balances stored as big-endian `u64` under `0x10 || address`. Zero balances are deleted.
#[derive(Debug, Clone, Default)]
pub struct StateBalances;

impl StateBalances {
    fn key(account: &Address) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + account.as_bytes().len());
        key.push(BALANCE_PREFIX);
        key.extend_from_slice(account.as_bytes());
        key
    }

    fn store(view: &mut View, account: &Address, amount: u64) {
        let key = Self::key(account);
        if amount == 0 {
            view.remove(&key);
        } else {
            view.insert(key, amount.to_be_bytes().to_vec());
        }
    }
}

impl BalanceHandler for StateBalances {
    fn balance(&self, view: &View, account: &Address) -> Result<u64, BalanceError> {
        match view.get(&Self::key(account)) {
            None => Ok(0),
            Some(raw) => {
                let bytes: [u8; 8] = raw.try_into().map_err(|_| BalanceError::Corrupt {
                    account: *account,
                    len: raw.len(),
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
        }
    }

    fn deduct(&self, view: &mut View, account: &Address, amount: u64) -> Result<(), BalanceError> {
        let available = self.balance(view, account)?;
        let remaining = available
            .checked_sub(amount)
            .ok_or(BalanceError::Insufficient {
                account: *account,
                required: amount,
                available,
            })?;
        Self::store(view, account, remaining);
        Ok(())
    }

    fn credit(&self, view: &mut View, account: &Address, amount: u64) -> Result<(), BalanceError> {
        let current = self.balance(view, account)?;
        let updated = current
            .checked_add(amount)
            .ok_or(BalanceError::Overflow {
                account: *account,
                amount,
            })?;
        Self::store(view, account, updated);
        Ok(())
    }
}
