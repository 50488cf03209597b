//! Chain, crypto, ticket, sapling and chest instructions.

use super::{Checker, Step, StackType, arity, ill_typed, int_arg, pop, require};
use crate::core::ty::{Type, TypeKind, structurally_equal};
use crate::micheline::{Node, Prim};
use crate::virtual_machine::entrypoints;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::instr::Instr;
use crate::virtual_machine::program::Program;
use std::sync::Arc;

fn field(annots: &[String]) -> Option<String> {
    annots
        .iter()
        .find_map(|a| a.strip_prefix('%'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn expect(prim: Prim, ty: &Arc<Type>, kind: TypeKind) -> Result<(), VMError> {
    if ty.kind != kind {
        return Err(ill_typed(prim, &[ty]));
    }
    Ok(())
}

fn ticket_content(prim: Prim, ty: &Arc<Type>) -> Result<Arc<Type>, VMError> {
    match &ty.kind {
        TypeKind::Ticket(t) => Ok(t.clone()),
        _ => Err(ill_typed(prim, &[ty])),
    }
}

/// Instructions that only push a fact about the chain.
fn chain_constant(prim: Prim) -> Option<(Instr, Arc<Type>)> {
    Some(match prim {
        Prim::SELF_ADDRESS => (Instr::SelfAddress, Type::address()),
        Prim::TOTAL_VOTING_POWER => (Instr::TotalVotingPower, Type::nat()),
        Prim::NOW => (Instr::Now, Type::timestamp()),
        Prim::LEVEL => (Instr::Level, Type::nat()),
        Prim::AMOUNT => (Instr::Amount, Type::mumav()),
        Prim::BALANCE => (Instr::Balance, Type::mumav()),
        Prim::SENDER => (Instr::Sender, Type::address()),
        Prim::SOURCE => (Instr::Source, Type::address()),
        Prim::CHAIN_ID => (Instr::ChainId, Type::chain_id()),
        Prim::MIN_BLOCK_TIME => (Instr::MinBlockTime, Type::nat()),
        _ => return None,
    })
}

fn digest(prim: Prim) -> Option<Instr> {
    Some(match prim {
        Prim::BLAKE2B => Instr::Blake2b,
        Prim::SHA256 => Instr::Sha256,
        Prim::SHA512 => Instr::Sha512,
        Prim::SHA3 => Instr::Sha3,
        Prim::KECCAK => Instr::Keccak,
        _ => return None,
    })
}

impl Checker<'_> {
    pub(super) fn check_domain(
        &mut self,
        prim: Prim,
        args: &[Node],
        annots: &[String],
        mut stack: StackType,
    ) -> Result<Step, VMError> {
        let s = &mut stack;
        if let Some((instr, ty)) = chain_constant(prim) {
            arity(prim, args, 0)?;
            s.push(ty);
            return Ok((instr, Some(stack)));
        }
        if let Some(instr) = digest(prim) {
            arity(prim, args, 0)?;
            let top = pop(s, prim)?;
            expect(prim, &top, TypeKind::Bytes)?;
            s.push(Type::bytes());
            return Ok((instr, Some(stack)));
        }
        let instr = match prim {
            // ==================== Chain ====================
            Prim::SELF => {
                arity(prim, args, 0)?;
                let Some(param) = self.self_type.clone() else {
                    return Err(VMError::type_mismatch("SELF is not available here"));
                };
                let entrypoint = field(annots);
                let target = entrypoints::find(&param, entrypoint.as_deref())?;
                s.push(Type::contract(target.ty));
                Instr::SelfContract(entrypoint)
            }
            Prim::CONTRACT => {
                arity(prim, args, 1)?;
                let ty = self.resolve(&args[0])?;
                if !ty.is_passable() {
                    return Err(VMError::TypeMismatch(format!("{} cannot be a parameter", ty)));
                }
                let top = pop(s, prim)?;
                expect(prim, &top, TypeKind::Address)?;
                s.push(Type::option(Type::contract(ty.clone())));
                Instr::Contract(ty, field(annots))
            }
            Prim::TRANSFER_TOKENS => {
                arity(prim, args, 0)?;
                let arg = pop(s, prim)?;
                let amount = pop(s, prim)?;
                let contract = pop(s, prim)?;
                let ok = amount.kind == TypeKind::Mumav
                    && matches!(&contract.kind, TypeKind::Contract(t) if **t == *arg);
                if !ok {
                    return Err(ill_typed(prim, &[&arg, &amount, &contract]));
                }
                s.push(Type::operation());
                Instr::TransferTokens(arg)
            }
            Prim::SET_DELEGATE => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                expect(prim, &top, TypeKind::Option(Type::key_hash()))?;
                s.push(Type::operation());
                Instr::SetDelegate
            }
            Prim::CREATE_CONTRACT => {
                arity(prim, args, 1)?;
                let remaining = self.max_depth.saturating_sub(self.depth);
                let script = Program::from_node(&args[0], self.interner, remaining)?;
                let delegate = pop(s, prim)?;
                let balance = pop(s, prim)?;
                let storage = pop(s, prim)?;
                expect(prim, &delegate, TypeKind::Option(Type::key_hash()))?;
                expect(prim, &balance, TypeKind::Mumav)?;
                structurally_equal(&storage, &script.storage)?;
                s.push(Type::address());
                s.push(Type::operation());
                Instr::CreateContract {
                    storage_type: script.storage.clone(),
                    script: args[0].clone(),
                }
            }
            Prim::IMPLICIT_ACCOUNT => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                expect(prim, &top, TypeKind::KeyHash)?;
                s.push(Type::contract(Type::unit()));
                Instr::ImplicitAccount
            }
            Prim::VOTING_POWER => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                expect(prim, &top, TypeKind::KeyHash)?;
                s.push(Type::nat());
                Instr::VotingPower
            }
            Prim::ADDRESS => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                if !matches!(top.kind, TypeKind::Contract(_)) {
                    return Err(ill_typed(prim, &[&top]));
                }
                s.push(Type::address());
                Instr::Address
            }
            Prim::VIEW => {
                arity(prim, args, 2)?;
                let Node::String(name) = &args[0] else {
                    return Err(VMError::type_mismatch("VIEW expects a view name"));
                };
                let ret = self.resolve(&args[1])?;
                if !ret.is_pushable() {
                    return Err(VMError::TypeMismatch(format!("{} cannot be returned by a view", ret)));
                }
                let _arg = pop(s, prim)?;
                let target = pop(s, prim)?;
                expect(prim, &target, TypeKind::Address)?;
                s.push(Type::option(ret.clone()));
                Instr::View(name.clone(), ret)
            }
            Prim::EMIT => {
                let payload = pop(s, prim)?;
                let ty = match args {
                    [] => payload,
                    [node] => {
                        let declared = self.resolve(node)?;
                        structurally_equal(&payload, &declared)?;
                        declared
                    }
                    _ => return Err(VMError::type_mismatch("EMIT expects at most one type")),
                };
                if !ty.is_packable() {
                    return Err(VMError::TypeMismatch(format!("cannot emit {}", ty)));
                }
                s.push(Type::operation());
                Instr::Emit(field(annots), ty)
            }

            // ==================== Crypto ====================
            Prim::CHECK_SIGNATURE => {
                arity(prim, args, 0)?;
                let key = pop(s, prim)?;
                let sig = pop(s, prim)?;
                let msg = pop(s, prim)?;
                if key.kind != TypeKind::Key || sig.kind != TypeKind::Signature || msg.kind != TypeKind::Bytes {
                    return Err(ill_typed(prim, &[&key, &sig, &msg]));
                }
                s.push(Type::bool());
                Instr::CheckSignature
            }
            Prim::HASH_KEY => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                expect(prim, &top, TypeKind::Key)?;
                s.push(Type::key_hash());
                Instr::HashKey
            }
            Prim::PAIRING_CHECK => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                let expected = TypeKind::List(Type::pair(Type::bls12_381_g1(), Type::bls12_381_g2()));
                expect(prim, &top, expected)?;
                s.push(Type::bool());
                Instr::PairingCheck
            }

            // ==================== Tickets ====================
            Prim::TICKET => {
                arity(prim, args, 0)?;
                let content = pop(s, prim)?;
                let amount = pop(s, prim)?;
                if !content.is_comparable() || amount.kind != TypeKind::Nat {
                    return Err(ill_typed(prim, &[&content, &amount]));
                }
                s.push(Type::option(Type::ticket(content.clone())));
                Instr::Ticket(content)
            }
            Prim::READ_TICKET => {
                arity(prim, args, 0)?;
                require(s, 1, prim)?;
                let ticket = s[s.len() - 1].clone();
                let content = ticket_content(prim, &ticket)?;
                s.push(Type::pair(Type::address(), Type::pair(content, Type::nat())));
                Instr::ReadTicket
            }
            Prim::SPLIT_TICKET => {
                arity(prim, args, 0)?;
                let ticket = pop(s, prim)?;
                let amounts = pop(s, prim)?;
                ticket_content(prim, &ticket)?;
                expect(prim, &amounts, TypeKind::Pair(Type::nat(), Type::nat()))?;
                s.push(Type::option(Type::pair(ticket.clone(), ticket)));
                Instr::SplitTicket
            }
            Prim::JOIN_TICKETS => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                let ticket = match &top.kind {
                    TypeKind::Pair(a, b) if a == b && matches!(a.kind, TypeKind::Ticket(_)) => a.clone(),
                    _ => return Err(ill_typed(prim, &[&top])),
                };
                s.push(Type::option(ticket));
                Instr::JoinTickets
            }

            // ==================== Sapling and chests ====================
            Prim::SAPLING_EMPTY_STATE => {
                arity(prim, args, 1)?;
                let memo = int_arg(prim, &args[0])?;
                let memo = u16::try_from(memo).map_err(|_| VMError::type_mismatch("memo size out of range"))?;
                s.push(Type::arc(TypeKind::SaplingState(memo)));
                Instr::SaplingEmptyState(memo)
            }
            Prim::SAPLING_VERIFY_UPDATE => {
                arity(prim, args, 0)?;
                let tx = pop(s, prim)?;
                let state = pop(s, prim)?;
                let memo = match (&tx.kind, &state.kind) {
                    (TypeKind::SaplingTransaction(a), TypeKind::SaplingState(b)) if a == b => *a,
                    _ => return Err(ill_typed(prim, &[&tx, &state])),
                };
                let result = Type::pair(
                    Type::bytes(),
                    Type::pair(Type::int(), Type::arc(TypeKind::SaplingState(memo))),
                );
                s.push(Type::option(result));
                Instr::SaplingVerifyUpdate
            }
            Prim::OPEN_CHEST => {
                arity(prim, args, 0)?;
                let key = pop(s, prim)?;
                let chest = pop(s, prim)?;
                let time = pop(s, prim)?;
                if key.kind != TypeKind::ChestKey || chest.kind != TypeKind::Chest || time.kind != TypeKind::Nat {
                    return Err(ill_typed(prim, &[&key, &chest, &time]));
                }
                s.push(Type::option(Type::bytes()));
                Instr::OpenChest
            }
            _ => return Err(VMError::UnknownPrimitive(format!("{} has no typing rule", prim))),
        };
        Ok((instr, Some(stack)))
    }
}
