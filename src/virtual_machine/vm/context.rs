use crate::core::ty::Type;
use crate::core::value::Value;
use crate::micheline::Node;
use crate::storage::storage_trait::LazyStorage;
use crate::types::address::{Address, ContractHash};
use crate::types::keys::{ChainId, KeyHash};
use crate::virtual_machine::program::Program;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Facts about the chain and the current call that instructions can observe.
#[derive(Clone, Debug)]
pub struct ChainContext {
    /// Amount transferred with the call, in mumav.
    pub amount: i64,
    /// Balance of the running contract, `amount` included.
    pub balance: i64,
    /// Immediate caller.
    pub sender: Address,
    /// Implicit account that signed the originating operation.
    pub source: Address,
    pub self_address: Address,
    pub level: u64,
    /// Timestamp of the block, in seconds since the epoch.
    pub now: i64,
    pub chain_id: ChainId,
    pub voting_powers: BTreeMap<KeyHash, u64>,
    pub total_voting_power: u64,
    pub min_block_time: u64,
    /// Parameter types of the contracts `CONTRACT` can resolve.
    pub contracts: BTreeMap<Address, Node>,
}

impl Default for ChainContext {
    fn default() -> Self {
        let account = Address::Implicit(KeyHash::Ed25519([0x11; 20]));
        Self {
            amount: 0,
            balance: 0,
            sender: account,
            source: account,
            self_address: Address::Originated(ContractHash([0; 20])),
            level: 1,
            now: 0,
            chain_id: ChainId([0x7a, 0x06, 0xa7, 0x70]),
            voting_powers: BTreeMap::new(),
            total_voting_power: 0,
            min_block_time: 1,
            contracts: BTreeMap::new(),
        }
    }
}

/// Sections replaced by `parameter`, `storage` and `code` used as instructions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramSlots {
    pub parameter: Option<Node>,
    pub storage: Option<Node>,
    pub code: Option<Node>,
}

/// State of one interpretation besides the stack.
///
/// Borrowed collaborators live for `'a`; everything the run produces is
/// owned here and dropped with it on failure.
pub struct ExecContext<'a> {
    pub chain: &'a ChainContext,
    /// Read-only lazy storage the run observes.
    pub storage: &'a dyn LazyStorage,
    /// Parameter type `SELF` refers to; `None` outside a contract.
    pub self_type: Option<Arc<Type>>,
    /// Running contract, used to serve its own views.
    pub program: Option<&'a Program>,
    /// Storage as committed when the run started.
    pub initial_storage: Option<Value>,
    pub slots: ProgramSlots,
    nonce: u32,
}

impl<'a> ExecContext<'a> {
    pub fn new(chain: &'a ChainContext, storage: &'a dyn LazyStorage) -> Self {
        Self {
            chain,
            storage,
            self_type: None,
            program: None,
            initial_storage: None,
            slots: ProgramSlots::default(),
            nonce: 0,
        }
    }

    /// Context of a contract call: `SELF` and views resolve against `program`.
    pub fn for_program(
        chain: &'a ChainContext,
        storage: &'a dyn LazyStorage,
        program: &'a Program,
        initial_storage: Value,
    ) -> Self {
        Self {
            self_type: Some(program.parameter.clone()),
            program: Some(program),
            initial_storage: Some(initial_storage),
            ..Self::new(chain, storage)
        }
    }

    /// Nonce of the next emitted operation.
    pub(crate) fn next_nonce(&mut self) -> u32 {
        let nonce = self.nonce;
        self.nonce = self.nonce.wrapping_add(1);
        nonce
    }
}
