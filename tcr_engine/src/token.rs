//! Ledger Engine: Fungible Balances
//!
//! `TokenLedger` is a fixed-supply token with allowances. `NativeLedger`
//! holds the native currency attached to payable calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arithmetic::{checked_add, checked_sub};
use crate::contracts::ContractKind;
use crate::domain::{Address, Amount};
use crate::errors::{EngineError, EngineResult};

/// Fixed-supply token. The whole supply is credited to the deployer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenLedger {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Amount,
    pub balances: BTreeMap<Address, Amount>,
    /// owner -> spender -> remaining allowance
    pub allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
}

impl TokenLedger {
    pub fn issue(
        address: Address,
        issuer: Address,
        supply: Amount,
        name: &str,
        decimals: u8,
        symbol: &str,
    ) -> Self {
        let mut balances = BTreeMap::new();
        if supply > 0 {
            balances.insert(issuer, supply);
        }
        Self {
            address,
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            total_supply: supply,
            balances,
            allowances: BTreeMap::new(),
        }
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> EngineResult<()> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(EngineError::InsufficientBalance { have, need: amount });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        set_balance(&mut self.balances, from, checked_sub(have, amount)?);
        let credited = checked_add(self.balance_of(to), amount)?;
        set_balance(&mut self.balances, to, credited);
        Ok(())
    }

    /// Sets (not adds to) the spender's allowance.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) {
        let per_owner = self.allowances.entry(*owner).or_default();
        if amount == 0 {
            per_owner.remove(spender);
        } else {
            per_owner.insert(*spender, amount);
        }
        if per_owner.is_empty() {
            self.allowances.remove(owner);
        }
    }

    /// Spender-driven transfer that consumes allowance.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> EngineResult<()> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(EngineError::InsufficientApproval {
                allowance,
                need: amount,
            });
        }
        self.transfer(from, to, amount)?;
        self.approve(from, spender, allowance - amount);
        Ok(())
    }

    pub fn circulating(&self) -> EngineResult<Amount> {
        crate::arithmetic::checked_sum(self.balances.values().copied())
    }
}

/// Native currency balances. Supply is fixed at genesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeLedger {
    pub supply: Amount,
    pub balances: BTreeMap<Address, Amount>,
}

impl NativeLedger {
    pub fn credit_genesis(&mut self, account: &Address, amount: Amount) -> EngineResult<()> {
        self.supply = checked_add(self.supply, amount)?;
        let credited = checked_add(self.balance_of(account), amount)?;
        set_balance(&mut self.balances, account, credited);
        Ok(())
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> EngineResult<()> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(EngineError::InsufficientBalance { have, need: amount });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        set_balance(&mut self.balances, from, checked_sub(have, amount)?);
        let credited = checked_add(self.balance_of(to), amount)?;
        set_balance(&mut self.balances, to, credited);
        Ok(())
    }
}

/// Token ledger deployed at `address`.
pub fn ledger_mut<'a>(
    tokens: &'a mut BTreeMap<Address, TokenLedger>,
    address: &Address,
) -> EngineResult<&'a mut TokenLedger> {
    tokens.get_mut(address).ok_or(EngineError::UnknownContract {
        address: *address,
        expected: ContractKind::UtilityToken,
    })
}

/// Zero balances are removed so equal ledgers serialize identically.
fn set_balance(balances: &mut BTreeMap<Address, Amount>, account: &Address, amount: Amount) {
    if amount == 0 {
        balances.remove(account);
    } else {
        balances.insert(*account, amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::account_address;

    fn vtx() -> (TokenLedger, Address) {
        let root = account_address("root");
        let token = TokenLedger::issue(Address([1; 20]), root, 10_000, "VetX", 18, "VTX");
        (token, root)
    }

    #[test]
    fn issue_credits_deployer() {
        let (token, root) = vtx();
        assert_eq!(token.balance_of(&root), 10_000);
        assert_eq!(token.circulating(), Ok(10_000));
    }

    #[test]
    fn transfer_moves_balance() {
        let (mut token, root) = vtx();
        let user = account_address("user1");
        token.transfer(&root, &user, 1000).unwrap();
        assert_eq!(token.balance_of(&user), 1000);
        assert_eq!(token.balance_of(&root), 9000);
        assert_eq!(
            token.transfer(&user, &root, 1001),
            Err(EngineError::InsufficientBalance { have: 1000, need: 1001 })
        );
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let (mut token, root) = vtx();
        let spender = account_address("forum");
        let dest = account_address("dest");
        token.approve(&root, &spender, 100);
        assert_eq!(
            token.transfer_from(&spender, &root, &dest, 101),
            Err(EngineError::InsufficientApproval { allowance: 100, need: 101 })
        );
        token.transfer_from(&spender, &root, &dest, 60).unwrap();
        assert_eq!(token.allowance(&root, &spender), 40);
        assert_eq!(token.balance_of(&dest), 60);
    }

    #[test]
    fn approve_zero_clears_entry() {
        let (mut token, root) = vtx();
        let spender = account_address("registry");
        token.approve(&root, &spender, 5);
        token.approve(&root, &spender, 0);
        assert!(token.allowances.is_empty());
    }

    #[test]
    fn native_transfer_conserves_supply() {
        let mut native = NativeLedger::default();
        let a = account_address("a");
        let b = account_address("b");
        native.credit_genesis(&a, 500).unwrap();
        native.transfer(&a, &b, 200).unwrap();
        assert_eq!(native.balance_of(&a) + native.balance_of(&b), native.supply);
        assert!(native.transfer(&b, &a, 201).is_err());
    }
}
