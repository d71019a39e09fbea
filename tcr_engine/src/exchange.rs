//! Reputation Exchange: sells reputation for utility tokens and pays
//! batches of beneficiaries out of its own balance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::acl::AccessControlTable;
use crate::arithmetic::checked_sum;
use crate::directory::ContractAddressDirectory;
use crate::domain::{Address, Amount};
use crate::errors::{EngineError, EngineResult};
use crate::identifiers::{reputation_exchange_id, selector, BATCH_EXCHANGE_SIGNATURE};
use crate::kernel::Kernel;
use crate::token::{ledger_mut, TokenLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReputationExchange {
    pub address: Address,
    pub kernel: Address,
    pub token: Address,
}

impl ReputationExchange {
    pub fn new(address: Address, kernel: Address, token: Address) -> Self {
        Self {
            address,
            kernel,
            token,
        }
    }

    /// Pulls `value` tokens from `sender` on behalf of `purchaser`.
    pub fn purchase_reputation(
        &self,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        sender: Address,
        value: Amount,
    ) -> EngineResult<()> {
        if value == 0 {
            return Err(EngineError::InvalidAmount("purchase must be positive".to_string()));
        }
        ledger_mut(tokens, &self.token)?.transfer_from(&self.address, &sender, &self.address, value)
    }

    /// Pays `values[i]` to `beneficiaries[i]`. The sender must hold a
    /// permit for the batch-exchange selector on this module.
    #[allow(clippy::too_many_arguments)]
    pub fn batch_exchange(
        &self,
        kernel: &Kernel,
        directory: &ContractAddressDirectory,
        acl: &AccessControlTable,
        tokens: &mut BTreeMap<Address, TokenLedger>,
        sender: &Address,
        beneficiaries: &[Address],
        values: &[Amount],
    ) -> EngineResult<Amount> {
        if kernel.address != self.kernel {
            return Err(EngineError::NotAuthorized(format!(
                "exchange {} is bound to kernel {}",
                self.address, self.kernel
            )));
        }
        kernel.authorize(
            directory,
            acl,
            sender,
            &reputation_exchange_id(),
            &selector(BATCH_EXCHANGE_SIGNATURE),
        )?;
        if beneficiaries.len() != values.len() {
            return Err(EngineError::InvalidAmount(format!(
                "{} beneficiaries but {} values",
                beneficiaries.len(),
                values.len()
            )));
        }
        let total = checked_sum(values.iter().copied())?;
        let token = ledger_mut(tokens, &self.token)?;
        let have = token.balance_of(&self.address);
        if have < total {
            return Err(EngineError::InsufficientBalance { have, need: total });
        }
        for (beneficiary, value) in beneficiaries.iter().zip(values) {
            token.transfer(&self.address, beneficiary, *value)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::hashing::account_address;
    use crate::identifiers::root_id;

    struct Fixture {
        kernel: Kernel,
        directory: ContractAddressDirectory,
        acl: AccessControlTable,
        tokens: BTreeMap<Address, TokenLedger>,
        exchange: ReputationExchange,
        root: Address,
    }

    fn fixture(permit: bool) -> Fixture {
        let root = account_address("root");
        let kernel = Kernel::new(Address([1; 20]), root);
        let auth = kernel.authority(&root).unwrap();
        let mut directory = ContractAddressDirectory::new(Address([2; 20]), kernel.address);
        let mut acl = AccessControlTable::new(Address([3; 20]), kernel.address);
        let token_addr = Address([4; 20]);
        let exchange = ReputationExchange::new(Address([5; 20]), kernel.address, token_addr);
        directory.register(&auth, root_id(), root);
        directory.register(&auth, reputation_exchange_id(), exchange.address);
        if permit {
            acl.permit(
                &auth,
                root_id(),
                reputation_exchange_id(),
                BTreeSet::from([selector(BATCH_EXCHANGE_SIGNATURE)]),
            );
        }
        let mut token = TokenLedger::issue(token_addr, root, 10_000, "VetX", 18, "VTX");
        token.transfer(&root, &exchange.address, 450).unwrap();
        Fixture {
            kernel,
            directory,
            acl,
            tokens: BTreeMap::from([(token_addr, token)]),
            exchange,
            root,
        }
    }

    #[test]
    fn purchase_pulls_from_sender() {
        let mut f = fixture(true);
        let purchaser = account_address("purchaser");
        let token = ledger_mut(&mut f.tokens, &f.exchange.token).unwrap();
        token.transfer(&f.root, &purchaser, 100).unwrap();
        token.approve(&purchaser, &f.exchange.address, 100);
        f.exchange.purchase_reputation(&mut f.tokens, purchaser, 100).unwrap();
        assert_eq!(f.tokens[&f.exchange.token].balance_of(&f.exchange.address), 550);
        assert_eq!(f.tokens[&f.exchange.token].balance_of(&purchaser), 0);
    }

    #[test]
    fn batch_pays_each_beneficiary() {
        let mut f = fixture(true);
        let users = [account_address("user1"), account_address("user2"), account_address("user3")];
        let total = f
            .exchange
            .batch_exchange(&f.kernel, &f.directory, &f.acl, &mut f.tokens, &f.root, &users, &[100, 150, 200])
            .unwrap();
        assert_eq!(total, 450);
        let token = &f.tokens[&f.exchange.token];
        assert_eq!(token.balance_of(&f.exchange.address), 0);
        assert_eq!(token.balance_of(&users[1]), 150);
    }

    #[test]
    fn batch_requires_permit() {
        let mut f = fixture(false);
        let users = [account_address("user1")];
        assert!(matches!(
            f.exchange
                .batch_exchange(&f.kernel, &f.directory, &f.acl, &mut f.tokens, &f.root, &users, &[1]),
            Err(EngineError::NotAuthorized(_))
        ));
    }

    #[test]
    fn batch_length_mismatch() {
        let mut f = fixture(true);
        let users = [account_address("user1")];
        assert!(matches!(
            f.exchange
                .batch_exchange(&f.kernel, &f.directory, &f.acl, &mut f.tokens, &f.root, &users, &[1, 2]),
            Err(EngineError::InvalidAmount(_))
        ));
    }
}
