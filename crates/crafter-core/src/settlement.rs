//! Settlement: per-crafter shop balances, the owner pointer, the tax
//! authority, and the policy-dependent payout split. Balances mutate only
//! here, never from negotiation code, and each settlement applies its
//! full split or none of it.

use std::collections::BTreeMap;
use std::fmt;

use contracts::{CrafterConfig, CreatureId, PaymentPolicy};

use crate::pricing::round_half_up;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The counterparty's stake does not cover the committed price.
    /// Re-checked at commit time, never trusted from negotiation.
    InsufficientFunds { required: i64, offered: i64 },
    /// No shop registered for this crafter.
    UnknownShop(CreatureId),
}

impl fmt::Display for SettlementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientFunds { required, offered } => {
                write!(f, "insufficient funds: {offered} offered, {required} required")
            }
            Self::UnknownShop(crafter) => write!(f, "no shop for crafter {crafter}"),
        }
    }
}

impl std::error::Error for SettlementError {}

/// One crafter's shop: its owner and accumulated balance in irons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopAccount {
    pub owner: CreatureId,
    pub balance: i64,
}

/// How one settled price was split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutSplit {
    pub to_owner: i64,
    pub to_tax: i64,
    /// Withheld upkeep, consumed — credited nowhere further.
    pub upkeep_withheld: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutRecord {
    pub tick: u64,
    pub crafter: CreatureId,
    pub price: i64,
    pub split: PayoutSplit,
}

#[derive(Debug, Clone, Default)]
pub struct SettlementLedger {
    shops: BTreeMap<CreatureId, ShopAccount>,
    tax_balance: i64,
    upkeep_consumed: i64,
    payouts: Vec<PayoutRecord>,
}

impl SettlementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_shop(&mut self, crafter: CreatureId, owner: CreatureId) {
        self.shops
            .entry(crafter)
            .or_insert(ShopAccount { owner, balance: 0 });
    }

    /// Re-create a shop from persisted state, balance included.
    /// Overwrites any existing account for the crafter.
    pub fn restore_shop(&mut self, crafter: CreatureId, owner: CreatureId, balance: i64) {
        self.shops.insert(crafter, ShopAccount { owner, balance });
    }

    /// Re-seed the authority sinks from persisted state.
    pub fn restore_authority(&mut self, tax_balance: i64, upkeep_consumed: i64) {
        self.tax_balance = tax_balance;
        self.upkeep_consumed = upkeep_consumed;
    }

    pub fn remove_shop(&mut self, crafter: CreatureId) -> Option<ShopAccount> {
        self.shops.remove(&crafter)
    }

    pub fn owner_of(&self, crafter: CreatureId) -> Option<CreatureId> {
        self.shops.get(&crafter).map(|shop| shop.owner)
    }

    pub fn balance_of(&self, crafter: CreatureId) -> Option<i64> {
        self.shops.get(&crafter).map(|shop| shop.balance)
    }

    pub fn tax_balance(&self) -> i64 {
        self.tax_balance
    }

    pub fn upkeep_consumed(&self) -> i64 {
        self.upkeep_consumed
    }

    pub fn payouts(&self) -> &[PayoutRecord] {
        &self.payouts
    }

    /// Rewrite the owner pointer. Out-of-band administrative operation:
    /// independent of any open session and touches nothing else.
    pub fn set_owner(
        &mut self,
        crafter: CreatureId,
        new_owner: CreatureId,
    ) -> Result<CreatureId, SettlementError> {
        let shop = self
            .shops
            .get_mut(&crafter)
            .ok_or(SettlementError::UnknownShop(crafter))?;
        let previous = shop.owner;
        shop.owner = new_owner;
        Ok(previous)
    }

    /// Compute the split for a price under the configured policy. Pure.
    pub fn split_for(price: i64, config: &CrafterConfig) -> PayoutSplit {
        match config.payment {
            PaymentPolicy::ForOwner => PayoutSplit {
                to_owner: price,
                to_tax: 0,
                upkeep_withheld: 0,
            },
            PaymentPolicy::TaxAndUpkeep => {
                let to_owner =
                    round_half_up(price as f64 * (1.0 - config.upkeep_fraction())).clamp(0, price);
                PayoutSplit {
                    to_owner,
                    to_tax: 0,
                    upkeep_withheld: price - to_owner,
                }
            }
            PaymentPolicy::AllTax => PayoutSplit {
                to_owner: 0,
                to_tax: price,
                upkeep_withheld: 0,
            },
        }
    }

    /// Settle an accepted session: re-check the stake, then apply the
    /// whole split. The split is computed in full before any balance
    /// mutates, so a failure leaves the ledger untouched.
    pub fn settle(
        &mut self,
        crafter: CreatureId,
        price: i64,
        offered: i64,
        config: &CrafterConfig,
        tick: u64,
    ) -> Result<PayoutSplit, SettlementError> {
        if offered < price {
            return Err(SettlementError::InsufficientFunds {
                required: price,
                offered,
            });
        }
        if !self.shops.contains_key(&crafter) {
            return Err(SettlementError::UnknownShop(crafter));
        }

        let split = Self::split_for(price, config);

        let shop = self.shops.get_mut(&crafter).expect("shop checked above");
        shop.balance += split.to_owner;
        self.tax_balance += split.to_tax;
        self.upkeep_consumed += split.upkeep_withheld;
        self.payouts.push(PayoutRecord {
            tick,
            crafter,
            price,
            split,
        });

        Ok(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(policy: PaymentPolicy) -> CrafterConfig {
        CrafterConfig {
            payment: policy,
            ..CrafterConfig::default()
        }
    }

    fn ledger() -> SettlementLedger {
        let mut ledger = SettlementLedger::new();
        ledger.register_shop(100, 500);
        ledger
    }

    #[test]
    fn for_owner_credits_the_full_price() {
        let mut ledger = ledger();
        let config = config_with(PaymentPolicy::ForOwner);
        let split = ledger.settle(100, 300, 300, &config, 1).expect("settle");
        assert_eq!(split.to_owner, 300);
        assert_eq!(ledger.balance_of(100), Some(300));
        assert_eq!(ledger.tax_balance(), 0);
        assert_eq!(ledger.upkeep_consumed(), 0);
    }

    #[test]
    fn all_tax_credits_the_authority_and_nothing_to_owner() {
        let mut ledger = ledger();
        let config = config_with(PaymentPolicy::AllTax);
        let split = ledger.settle(100, 300, 300, &config, 1).expect("settle");
        assert_eq!(split.to_owner, 0);
        assert_eq!(split.to_tax, 300);
        assert_eq!(ledger.balance_of(100), Some(0));
        assert_eq!(ledger.tax_balance(), 300);
    }

    #[test]
    fn upkeep_share_is_withheld_and_consumed() {
        let mut ledger = ledger();
        // 25% upkeep on 301 irons: owner gets round_half_up(225.75) = 226.
        let config = config_with(PaymentPolicy::TaxAndUpkeep);
        let split = ledger.settle(100, 301, 301, &config, 1).expect("settle");
        assert_eq!(split.to_owner, 226);
        assert_eq!(split.upkeep_withheld, 75);
        assert_eq!(split.to_tax, 0);
        assert_eq!(ledger.balance_of(100), Some(226));
        assert_eq!(ledger.upkeep_consumed(), 75);
        // Nothing credited anywhere further.
        assert_eq!(ledger.tax_balance(), 0);
    }

    #[test]
    fn short_stake_fails_and_leaves_balances_untouched() {
        let mut ledger = ledger();
        let config = config_with(PaymentPolicy::ForOwner);
        let err = ledger.settle(100, 300, 299, &config, 1).unwrap_err();
        assert_eq!(
            err,
            SettlementError::InsufficientFunds {
                required: 300,
                offered: 299
            }
        );
        assert_eq!(ledger.balance_of(100), Some(0));
        assert!(ledger.payouts().is_empty());
    }

    #[test]
    fn unknown_shop_is_an_error() {
        let mut ledger = SettlementLedger::new();
        let config = config_with(PaymentPolicy::ForOwner);
        let err = ledger.settle(9, 10, 10, &config, 1).unwrap_err();
        assert_eq!(err, SettlementError::UnknownShop(9));
    }

    #[test]
    fn set_owner_is_independent_of_balances() {
        let mut ledger = ledger();
        let config = config_with(PaymentPolicy::ForOwner);
        ledger.settle(100, 50, 50, &config, 1).expect("settle");
        let previous = ledger.set_owner(100, 600).expect("transfer");
        assert_eq!(previous, 500);
        assert_eq!(ledger.owner_of(100), Some(600));
        assert_eq!(ledger.balance_of(100), Some(50));
    }

    #[test]
    fn restore_shop_keeps_the_persisted_balance() {
        let mut ledger = SettlementLedger::new();
        ledger.restore_shop(100, 500, 226);
        ledger.restore_authority(40, 75);
        assert_eq!(ledger.balance_of(100), Some(226));
        assert_eq!(ledger.owner_of(100), Some(500));
        assert_eq!(ledger.tax_balance(), 40);
        assert_eq!(ledger.upkeep_consumed(), 75);
        // A later register call must not reset the restored account.
        ledger.register_shop(100, 500);
        assert_eq!(ledger.balance_of(100), Some(226));
    }

    #[test]
    fn zero_price_settles_cleanly() {
        let mut ledger = ledger();
        let config = config_with(PaymentPolicy::TaxAndUpkeep);
        let split = ledger.settle(100, 0, 0, &config, 1).expect("settle");
        assert_eq!(split, PayoutSplit { to_owner: 0, to_tax: 0, upkeep_withheld: 0 });
    }
}
