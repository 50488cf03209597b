//! Entrypoints declared by `%name` annotations on the parameter type.
//!
//! Every `or` node reachable from the root through other `or` nodes may carry
//! a field annotation naming an entrypoint. `default` resolves to an explicit
//! `%default` when one exists and to the whole parameter otherwise.

use crate::core::ty::{Type, TypeKind};
use crate::core::value::Value;
use crate::types::address::DEFAULT_ENTRYPOINT;
use crate::virtual_machine::errors::VMError;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entrypoint {
    /// Branches taken from the root to reach the entrypoint.
    pub path: Vec<Side>,
    pub ty: Arc<Type>,
}

fn walk(ty: &Arc<Type>, path: &mut Vec<Side>, out: &mut BTreeMap<String, Entrypoint>) -> Result<(), VMError> {
    if let Some(name) = &ty.field {
        if out.contains_key(name) {
            return Err(VMError::TypeMismatch(format!("duplicate entrypoint %{}", name)));
        }
        out.insert(
            name.clone(),
            Entrypoint {
                path: path.clone(),
                ty: ty.clone(),
            },
        );
    }
    if let TypeKind::Or(left, right) = &ty.kind {
        for (side, branch) in [(Side::Left, left), (Side::Right, right)] {
            path.push(side);
            walk(branch, path, out)?;
            path.pop();
        }
    }
    Ok(())
}

/// All named entrypoints of a parameter type, plus `default`.
pub fn collect(param: &Arc<Type>) -> Result<BTreeMap<String, Entrypoint>, VMError> {
    let mut out = BTreeMap::new();
    walk(param, &mut Vec::new(), &mut out)?;
    out.entry(DEFAULT_ENTRYPOINT.to_string()).or_insert_with(|| Entrypoint {
        path: Vec::new(),
        ty: param.clone(),
    });
    Ok(out)
}

/// Resolves `name` (`None` meaning `default`) against a parameter type.
pub fn find(param: &Arc<Type>, name: Option<&str>) -> Result<Entrypoint, VMError> {
    let name = name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_ENTRYPOINT);
    collect(param)?
        .remove(name)
        .ok_or_else(|| VMError::UnknownEntrypoint(name.to_string()))
}

/// Wraps an entrypoint argument into the full parameter value.
pub fn wrap(value: Value, path: &[Side]) -> Value {
    path.iter().rev().fold(value, |acc, side| match side {
        Side::Left => Value::left(acc),
        Side::Right => Value::right(acc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ty::resolve;
    use crate::micheline::parse;

    fn param(src: &str) -> Arc<Type> {
        Arc::new(resolve(&parse(src).unwrap()).unwrap())
    }

    #[test]
    fn named_branches_are_entrypoints() {
        let ty = param("or (nat %add) (or (unit %reset) (string %rename))");
        let eps = collect(&ty).unwrap();
        assert_eq!(eps.len(), 4);
        assert_eq!(eps["reset"].path, vec![Side::Right, Side::Left]);
        assert_eq!(*eps["rename"].ty, *Type::string());
        assert!(eps["default"].path.is_empty());
    }

    #[test]
    fn explicit_default_wins() {
        let ty = param("or (nat %default) (unit %other)");
        assert_eq!(find(&ty, None).unwrap().path, vec![Side::Left]);
        assert!(matches!(find(&ty, Some("missing")), Err(VMError::UnknownEntrypoint(_))));
    }

    #[test]
    fn wrap_follows_the_path() {
        let v = wrap(Value::Unit, &[Side::Right, Side::Left]);
        assert_eq!(v, Value::right(Value::left(Value::Unit)));
    }

    #[test]
    fn duplicates_are_rejected() {
        assert!(collect(&param("or (nat %a) (int %a)")).is_err());
    }
}
