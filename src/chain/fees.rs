use crate::capabilities::rules::Rules;

const FEE_STATE_BYTES: usize = 16;

/// Unit price in force for a block plus the units its parent consumed.
///
/// The price moves by an eighth per block towards the target utilization and never drops
/// below the rule set's minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeState {
    pub unit_price: u64,
    pub last_units: u64,
}

impl FeeState {
    pub fn genesis(rules: &Rules) -> Self {
        Self {
            unit_price: rules.min_unit_price,
            last_units: 0,
        }
    }

    /// Price for the block following the one this state was recorded for.
    pub fn next_price(&self, rules: &Rules) -> u64 {
        let price = self.unit_price.max(rules.min_unit_price);
        let step = (price / 8).max(1);
        let next = match self.last_units.cmp(&rules.target_block_units) {
            std::cmp::Ordering::Greater => price.saturating_add(step),
            std::cmp::Ordering::Less => price.saturating_sub(step),
            std::cmp::Ordering::Equal => price,
        };
        next.max(rules.min_unit_price)
    }

    pub fn to_bytes(self) -> [u8; FEE_STATE_BYTES] {
        let mut out = [0u8; FEE_STATE_BYTES];
        out[..8].copy_from_slice(&self.unit_price.to_be_bytes());
        out[8..].copy_from_slice(&self.last_units.to_be_bytes());
        out
    }

    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() != FEE_STATE_BYTES {
            return None;
        }
        let (price, units) = raw.split_at(8);
        Some(Self {
            unit_price: u64::from_be_bytes(price.try_into().ok()?),
            last_units: u64::from_be_bytes(units.try_into().ok()?),
        })
    }

    pub(crate) const fn encoded_len() -> usize {
        FEE_STATE_BYTES
    }
}

/// Fee for `units` at `unit_price`; saturates so an overflowing fee is simply unaffordable.
pub fn fee_for(units: u64, unit_price: u64) -> u64 {
    units.saturating_mul(unit_price)
}
