//! Chain facts, emitted operations, views, tickets and sapling states.

use super::Interpreter;
use super::stack::expected;
use crate::core::ty::{Type, structurally_equal};
use crate::core::unparse::{Mode, unparse};
use crate::core::value::{Operation, Ticket, Value};
use crate::micheline::Node;
use crate::types::address::{Address, ContractHash, DEFAULT_ENTRYPOINT, Destination};
use crate::types::encoding::Encode;
use crate::types::hash::blake2b_160;
use crate::virtual_machine::entrypoints;
use crate::virtual_machine::errors::VMError;
use num_bigint::BigInt;
use num_traits::Zero;
use std::sync::Arc;

/// Address of the contract originated by `origin` with operation `nonce`.
pub(crate) fn originated_address(origin: &Address, nonce: u32) -> Address {
    let mut preimage = origin.to_bytes();
    preimage.extend_from_slice(&nonce.to_be_bytes());
    Address::Originated(ContractHash(blake2b_160(&preimage)))
}

fn address_value(address: Address) -> Value {
    Value::Address(Destination::from(address))
}

impl Interpreter<'_> {
    fn push_operation(&mut self, operation: Operation) {
        self.stack.push(Value::Operation(Box::new(operation)));
    }

    /// Parameter type of the contract at `address`, if it is known.
    fn parameter_of(&mut self, address: &Address) -> Result<Option<Arc<Type>>, VMError> {
        if *address == self.ctx.chain.self_address {
            if let Some(param) = &self.ctx.self_type {
                return Ok(Some(param.clone()));
            }
        }
        match self.ctx.chain.contracts.get(address) {
            Some(node) => self.interner.resolve(node).map(Some),
            None => Ok(None),
        }
    }

    // ==================== Chain ====================

    pub(super) fn op_self(&mut self, instr: &'static str, entrypoint: Option<&str>) -> Result<(), VMError> {
        let param = self
            .ctx
            .self_type
            .clone()
            .ok_or_else(|| VMError::Unsupported(format!("{} outside a contract", instr)))?;
        let target = entrypoints::find(&param, entrypoint)?;
        self.stack.push(Value::Contract {
            destination: Destination::new(self.ctx.chain.self_address, entrypoint.map(str::to_string)),
            param_type: target.ty,
        });
        Ok(())
    }

    pub(super) fn op_self_address(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(address_value(self.ctx.chain.self_address));
        Ok(())
    }

    /// `None` when the contract is unknown, the entrypoint is missing or its type differs.
    pub(super) fn op_contract(
        &mut self,
        instr: &'static str,
        ty: &Arc<Type>,
        entrypoint: Option<&str>,
    ) -> Result<(), VMError> {
        let target = self.stack.pop_address(instr)?;
        let entrypoint = entrypoint.filter(|e| *e != DEFAULT_ENTRYPOINT);
        let entrypoint = match (entrypoint, target.entrypoint.as_deref()) {
            (Some(_), Some(_)) => {
                self.stack.push(Value::none());
                return Ok(());
            }
            (a, b) => a.or(b).map(str::to_string),
        };

        let contract = if target.address.is_implicit() {
            (entrypoint.is_none() && structurally_equal(ty, &Type::unit()).is_ok()).then(|| Value::Contract {
                destination: Destination::from(target.address),
                param_type: Type::unit(),
            })
        } else {
            match self.parameter_of(&target.address)? {
                Some(param) => entrypoints::find(&param, entrypoint.as_deref())
                    .ok()
                    .filter(|found| structurally_equal(&found.ty, ty).is_ok())
                    .map(|_| Value::Contract {
                        destination: Destination::new(target.address, entrypoint),
                        param_type: ty.clone(),
                    }),
                None => None,
            }
        };
        self.stack.push(Value::Option(contract.map(Box::new)));
        Ok(())
    }

    pub(super) fn op_transfer_tokens(&mut self, instr: &'static str, ty: &Arc<Type>) -> Result<(), VMError> {
        let arg = self.stack.pop(instr)?;
        let amount = self.stack.pop_mumav(instr)?;
        let destination = match self.stack.pop(instr)? {
            Value::Contract { destination, .. } => destination,
            other => return Err(expected(instr, "contract", &other)),
        };
        let parameter = unparse(&arg, ty, Mode::Optimized)?;
        let nonce = self.ctx.next_nonce();
        self.push_operation(Operation::Transfer {
            destination,
            parameter,
            amount,
            nonce,
        });
        Ok(())
    }

    pub(super) fn op_set_delegate(&mut self, instr: &'static str) -> Result<(), VMError> {
        let delegate = match self.stack.pop_option(instr)? {
            None => None,
            Some(Value::KeyHash(kh)) => Some(kh),
            Some(other) => return Err(expected(instr, "key_hash", &other)),
        };
        let nonce = self.ctx.next_nonce();
        self.push_operation(Operation::SetDelegate { delegate, nonce });
        Ok(())
    }

    pub(super) fn op_create_contract(
        &mut self,
        instr: &'static str,
        storage_type: &Arc<Type>,
        script: &Node,
    ) -> Result<(), VMError> {
        let delegate = match self.stack.pop_option(instr)? {
            None => None,
            Some(Value::KeyHash(kh)) => Some(kh),
            Some(other) => return Err(expected(instr, "key_hash", &other)),
        };
        let balance = self.stack.pop_mumav(instr)?;
        let storage = self.stack.pop(instr)?;
        let storage = unparse(&storage, storage_type, Mode::Optimized)?;
        let nonce = self.ctx.next_nonce();
        let address = originated_address(&self.ctx.chain.self_address, nonce);
        self.stack.push(address_value(address));
        self.push_operation(Operation::CreateContract {
            address,
            delegate,
            balance,
            script: script.clone(),
            storage,
            nonce,
        });
        Ok(())
    }

    pub(super) fn op_implicit_account(&mut self, instr: &'static str) -> Result<(), VMError> {
        let kh = match self.stack.pop(instr)? {
            Value::KeyHash(kh) => kh,
            other => return Err(expected(instr, "key_hash", &other)),
        };
        self.stack.push(Value::Contract {
            destination: Destination::from(Address::Implicit(kh)),
            param_type: Type::unit(),
        });
        Ok(())
    }

    pub(super) fn op_voting_power(&mut self, instr: &'static str) -> Result<(), VMError> {
        let power = match self.stack.pop(instr)? {
            Value::KeyHash(kh) => self.ctx.chain.voting_powers.get(&kh).copied().unwrap_or(0),
            other => return Err(expected(instr, "key_hash", &other)),
        };
        self.stack.push(Value::nat(power));
        Ok(())
    }

    pub(super) fn op_total_voting_power(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::nat(self.ctx.chain.total_voting_power));
        Ok(())
    }

    pub(super) fn op_now(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::Timestamp(BigInt::from(self.ctx.chain.now)));
        Ok(())
    }

    pub(super) fn op_level(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::nat(self.ctx.chain.level));
        Ok(())
    }

    pub(super) fn op_amount(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::Mumav(self.ctx.chain.amount));
        Ok(())
    }

    pub(super) fn op_balance(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::Mumav(self.ctx.chain.balance));
        Ok(())
    }

    pub(super) fn op_sender(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(address_value(self.ctx.chain.sender));
        Ok(())
    }

    pub(super) fn op_source(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(address_value(self.ctx.chain.source));
        Ok(())
    }

    pub(super) fn op_chain_id(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::ChainId(self.ctx.chain.chain_id));
        Ok(())
    }

    pub(super) fn op_address(&mut self, instr: &'static str) -> Result<(), VMError> {
        match self.stack.pop(instr)? {
            Value::Contract { destination, .. } => self.stack.push(Value::Address(destination)),
            other => return Err(expected(instr, "contract", &other)),
        }
        Ok(())
    }

    pub(super) fn op_min_block_time(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::nat(self.ctx.chain.min_block_time));
        Ok(())
    }

    /// Runs a view of the current contract against its storage as of the
    /// start of the call. Views of other contracts are not reachable.
    pub(super) fn op_view(&mut self, instr: &'static str, name: &String, ret: &Arc<Type>) -> Result<(), VMError> {
        let arg = self.stack.pop(instr)?;
        let target = self.stack.pop_address(instr)?;
        let view = match self.ctx.program {
            Some(program) if target.address == self.ctx.chain.self_address => program
                .views
                .get(name)
                .filter(|view| arg.matches(&view.input) && structurally_equal(&view.output, ret).is_ok()),
            _ => None,
        };
        let result = match (view, self.ctx.initial_storage.clone()) {
            (Some(view), Some(storage)) => {
                Some(self.run_nested(instr, &view.code, vec![Value::pair(arg, storage)])?)
            }
            _ => None,
        };
        self.stack.push(Value::Option(result.map(Box::new)));
        Ok(())
    }

    pub(super) fn op_emit(&mut self, instr: &'static str, tag: &Option<String>, ty: &Arc<Type>) -> Result<(), VMError> {
        let payload = self.stack.pop(instr)?;
        let payload = unparse(&payload, ty, Mode::Optimized)?;
        let nonce = self.ctx.next_nonce();
        self.push_operation(Operation::Emit {
            tag: tag.clone(),
            ty: ty.to_node(),
            payload,
            nonce,
        });
        Ok(())
    }

    // ==================== Tickets ====================

    pub(super) fn op_ticket(&mut self, instr: &'static str, ty: &Arc<Type>) -> Result<(), VMError> {
        let content = self.stack.pop(instr)?;
        let amount = self.stack.pop_nat(instr)?;
        let ticket = (!amount.is_zero()).then(|| {
            Box::new(Value::Ticket(Box::new(Ticket {
                ticketer: self.ctx.chain.self_address,
                content_type: ty.clone(),
                content: Box::new(content),
                amount,
            })))
        });
        self.stack.push(Value::Option(ticket));
        Ok(())
    }

    /// Leaves the ticket in place and pushes `(ticketer, (content, amount))` above it.
    pub(super) fn op_read_ticket(&mut self, instr: &'static str) -> Result<(), VMError> {
        let ticket = self.stack.pop_ticket(instr)?;
        let info = Value::pair(
            address_value(ticket.ticketer),
            Value::pair((*ticket.content).clone(), Value::Nat(ticket.amount.clone())),
        );
        self.stack.push(Value::Ticket(Box::new(ticket)));
        self.stack.push(info);
        Ok(())
    }

    pub(super) fn op_split_ticket(&mut self, instr: &'static str) -> Result<(), VMError> {
        let ticket = self.stack.pop_ticket(instr)?;
        let (n1, n2) = match self.stack.pop_pair(instr)? {
            (Value::Nat(a), Value::Nat(b)) => (a, b),
            (other, _) => return Err(expected(instr, "pair nat nat", &other)),
        };
        let valid = !n1.is_zero() && !n2.is_zero() && &n1 + &n2 == ticket.amount;
        let result = valid.then(|| {
            let part = |amount: BigInt| {
                Value::Ticket(Box::new(Ticket {
                    amount,
                    ..ticket.clone()
                }))
            };
            Box::new(Value::pair(part(n1), part(n2)))
        });
        self.stack.push(Value::Option(result));
        Ok(())
    }

    /// `None` unless both tickets share their ticketer and content.
    pub(super) fn op_join_tickets(&mut self, instr: &'static str) -> Result<(), VMError> {
        let (a, b) = match self.stack.pop_pair(instr)? {
            (Value::Ticket(a), Value::Ticket(b)) => (a, b),
            (other, _) => return Err(expected(instr, "pair of tickets", &other)),
        };
        let joined = (a.ticketer == b.ticketer && a.content == b.content).then(|| {
            Box::new(Value::Ticket(Box::new(Ticket {
                amount: &a.amount + &b.amount,
                ..*a
            })))
        });
        self.stack.push(Value::Option(joined));
        Ok(())
    }

    // ==================== Sapling and chests ====================

    pub(super) fn op_sapling_empty_state(&mut self, _instr: &'static str, memo_size: u16) -> Result<(), VMError> {
        self.stack.push(Value::SaplingState { id: None, memo_size });
        Ok(())
    }

    pub(super) fn op_unsupported(&mut self, instr: &'static str) -> Result<(), VMError> {
        Err(VMError::Unsupported(format!("{} cannot be executed off-chain", instr)))
    }
}
