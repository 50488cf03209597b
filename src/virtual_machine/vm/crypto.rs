use super::Interpreter;
use super::stack::expected;
use crate::core::value::Value;
use crate::crypto::{bls, signature};
use crate::virtual_machine::errors::VMError;

impl Interpreter<'_> {
    pub(super) fn op_digest(&mut self, instr: &'static str, digest: fn(&[u8]) -> Vec<u8>) -> Result<(), VMError> {
        let bytes = self.stack.pop_bytes(instr)?;
        self.stack.push(Value::Bytes(digest(&bytes)));
        Ok(())
    }

    /// `CHECK_SIGNATURE key signature message`: a malformed or mismatched signature yields `False`.
    pub(super) fn op_check_signature(&mut self, instr: &'static str) -> Result<(), VMError> {
        let key = match self.stack.pop(instr)? {
            Value::Key(key) => key,
            other => return Err(expected(instr, "key", &other)),
        };
        let sig = match self.stack.pop(instr)? {
            Value::Signature(sig) => sig,
            other => return Err(expected(instr, "signature", &other)),
        };
        let message = self.stack.pop_bytes(instr)?;
        let valid = signature::check_signature(&key, &sig, &message);
        self.stack.push(Value::Bool(valid));
        Ok(())
    }

    pub(super) fn op_hash_key(&mut self, instr: &'static str) -> Result<(), VMError> {
        match self.stack.pop(instr)? {
            Value::Key(key) => self.stack.push(Value::KeyHash(key.hash())),
            other => return Err(expected(instr, "key", &other)),
        }
        Ok(())
    }

    pub(super) fn op_pairing_check(&mut self, instr: &'static str) -> Result<(), VMError> {
        let mut pairs = Vec::new();
        for item in self.stack.pop_list(instr)? {
            match item {
                Value::Pair(a, b) => match (*a, *b) {
                    (Value::Bls12381G1(g1), Value::Bls12381G2(g2)) => pairs.push((g1, g2)),
                    (other, _) => return Err(expected(instr, "pair bls12_381_g1 bls12_381_g2", &other)),
                },
                other => return Err(expected(instr, "pair bls12_381_g1 bls12_381_g2", &other)),
            }
        }
        self.stack.push(Value::Bool(bls::pairing_check(&pairs)));
        Ok(())
    }
}
