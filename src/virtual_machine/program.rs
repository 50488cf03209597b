//! Contracts: checked scripts and their top-level runs.
//!
//! A script is a sequence of sections: exactly one each of `parameter`,
//! `storage` and `code`, plus any number of `view "name" arg ret { ... }`.
//! [`Program::from_node`] checks every section once; [`Program::run`] then
//! executes calls against it. A run is atomic: storage is only ever read,
//! and everything the call produced is returned in the [`RunResult`] or
//! dropped with the error.

use crate::config::InterpreterConfig;
use crate::core::data::parse_data;
use crate::core::ty::{Type, TypeInterner, structurally_equal};
use crate::core::unparse::{Mode, unparse};
use crate::core::value::{LazyKind, Operation, Value};
use crate::micheline::{MAX_NESTING, Node, Prim};
use crate::storage::lazy_diff::{IdAllocator, LazyDiff, extract};
use crate::storage::storage_trait::LazyStorage;
use crate::types::address::MAX_ENTRYPOINT_LEN;
use crate::virtual_machine::entrypoints::{self, Entrypoint};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::instr::Block;
use crate::virtual_machine::typecheck::{Checker, show};
use crate::virtual_machine::vm::Interpreter;
use crate::virtual_machine::vm::context::{ChainContext, ExecContext};
use crate::virtual_machine::vm::gas::GasProfile;
use crate::virtual_machine::vm::trace::TraceEntry;
use crate::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named, side-effect free entry returning a value computed from the storage.
#[derive(Clone, Debug)]
pub struct View {
    pub name: String,
    pub input: Arc<Type>,
    pub output: Arc<Type>,
    pub code: Block,
}

/// A checked script.
#[derive(Clone, Debug)]
pub struct Program {
    pub parameter: Arc<Type>,
    pub storage: Arc<Type>,
    pub code: Block,
    /// The `code` section as written.
    pub code_node: Node,
    pub views: BTreeMap<String, View>,
    pub entrypoints: BTreeMap<String, Entrypoint>,
}

/// Outcome of a successful call.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// New storage in readable form.
    pub storage: Node,
    pub operations: Vec<Operation>,
    pub lazy_diff: LazyDiff,
    /// Empty unless tracing was enabled.
    pub trace: Vec<TraceEntry>,
    pub gas: GasProfile,
}

/// Sections collected from a script before checking.
#[derive(Default)]
struct Sections<'n> {
    parameter: Option<&'n Node>,
    storage: Option<&'n Node>,
    code: Option<&'n Node>,
    views: Vec<&'n [Node]>,
}

fn section<'n>(slot: &mut Option<&'n Node>, prim: Prim, args: &'n [Node]) -> Result<(), VMError> {
    let [node] = args else {
        return Err(VMError::TypeMismatch(format!("{} section takes one argument", prim)));
    };
    if slot.replace(node).is_some() {
        return Err(VMError::TypeMismatch(format!("duplicate {} section", prim)));
    }
    Ok(())
}

fn collect_sections(node: &Node) -> Result<Sections<'_>, VMError> {
    let Node::Seq(items) = node else {
        return Err(VMError::TypeMismatch(format!("expected a script, got {}", node)));
    };
    let mut sections = Sections::default();
    for item in items {
        let Node::Prim { prim, args, .. } = item else {
            return Err(VMError::TypeMismatch(format!("expected a script section, got {}", item)));
        };
        match prim {
            Prim::parameter => section(&mut sections.parameter, *prim, args)?,
            Prim::storage => section(&mut sections.storage, *prim, args)?,
            Prim::code => section(&mut sections.code, *prim, args)?,
            Prim::view => sections.views.push(args),
            other => return Err(VMError::UnknownPrimitive(format!("{} is not a script section", other))),
        }
    }
    Ok(sections)
}

fn required<'n>(slot: Option<&'n Node>, name: &str) -> Result<&'n Node, VMError> {
    slot.ok_or_else(|| VMError::TypeMismatch(format!("missing {} section", name)))
}

fn valid_view_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ENTRYPOINT_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'%' | b'@'))
}

/// Accepts `[expected]`, or no output at all for code that always fails.
fn check_output(what: &str, output: Option<Vec<Arc<Type>>>, expected: &Arc<Type>) -> Result<(), VMError> {
    match output {
        None => Ok(()),
        Some(stack) if stack.len() == 1 && structurally_equal(&stack[0], expected).is_ok() => Ok(()),
        Some(stack) => Err(VMError::TypeMismatch(format!(
            "{} must end with [{}], got {}",
            what,
            expected,
            show(&stack)
        ))),
    }
}

/// Fails with `StorageResolution` for any identifier `storage` does not know.
fn check_lazy_ids(value: &Value, storage: &dyn LazyStorage) -> Result<(), VMError> {
    let mut ids = Vec::new();
    value.for_each_lazy(&mut |v| match v {
        Value::BigMap(map) => ids.extend(map.id.map(|id| (LazyKind::BigMap, id))),
        Value::SaplingState { id: Some(id), .. } => ids.push((LazyKind::SaplingState, *id)),
        _ => {}
    });
    for (kind, id) in ids {
        match kind {
            LazyKind::BigMap => {
                storage.snapshot(id)?;
            }
            LazyKind::SaplingState => {
                storage.memo_size(id)?;
            }
        }
    }
    Ok(())
}

impl Program {
    /// Checks a script tree, with code nested at most `max_depth` deep.
    pub fn from_node(node: &Node, interner: &mut TypeInterner, max_depth: usize) -> Result<Program, VMError> {
        let sections = collect_sections(node)?;

        let parameter = interner.resolve(required(sections.parameter, "parameter")?)?;
        if !parameter.is_passable() {
            return Err(VMError::TypeMismatch(format!("{} cannot be a parameter", parameter)));
        }
        let entrypoints = entrypoints::collect(&parameter)?;

        let storage = interner.resolve(required(sections.storage, "storage")?)?;
        if !storage.is_storable() {
            return Err(VMError::TypeMismatch(format!("{} cannot be stored", storage)));
        }

        let code_node = required(sections.code, "code")?.clone();
        let input = vec![Type::pair(parameter.clone(), storage.clone())];
        let (code, output) = Checker::new(interner, Some(parameter.clone()), max_depth).check_block(&code_node, input)?;
        let result = Type::pair(Type::list(Type::operation()), storage.clone());
        check_output("code", output, &result)?;

        let mut views = BTreeMap::new();
        for args in sections.views {
            let [Node::String(name), input, output, body] = args else {
                return Err(VMError::type_mismatch("view sections take a name, two types and code"));
            };
            if !valid_view_name(name) {
                return Err(VMError::TypeMismatch(format!("invalid view name {:?}", name)));
            }
            if views.contains_key(name) {
                return Err(VMError::TypeMismatch(format!("duplicate view {:?}", name)));
            }
            let input = interner.resolve(input)?;
            let output = interner.resolve(output)?;
            if !input.is_pushable() || !output.is_pushable() {
                return Err(VMError::TypeMismatch(format!(
                    "view {:?} must take and return pushable types",
                    name
                )));
            }
            let stack = vec![Type::pair(input.clone(), storage.clone())];
            let (code, out) = Checker::new(interner, None, max_depth).check_block(body, stack)?;
            check_output(&format!("view {:?}", name), out, &output)?;
            views.insert(
                name.clone(),
                View {
                    name: name.clone(),
                    input,
                    output,
                    code,
                },
            );
        }

        Ok(Program {
            parameter,
            storage,
            code,
            code_node,
            views,
            entrypoints,
        })
    }

    /// Parses and checks script source text.
    pub fn parse(source: &str) -> Result<Program, VMError> {
        let node = crate::micheline::parse(source)?;
        Program::from_node(&node, &mut TypeInterner::new(), MAX_NESTING)
    }

    /// Calls `entrypoint` (`None` for the default one) with `parameter` on `storage`.
    ///
    /// `lazy` is only read; the returned diff describes what the call did to
    /// its big maps and sapling states and is meant to be applied by the caller.
    pub fn run(
        &self,
        entrypoint: Option<&str>,
        parameter: &Node,
        storage: &Node,
        lazy: &dyn LazyStorage,
        chain: &ChainContext,
        config: &InterpreterConfig,
    ) -> Result<RunResult, VMError> {
        let mut interner = TypeInterner::new();
        let target = entrypoints::find(&self.parameter, entrypoint)?;
        let argument = parse_data(parameter, &target.ty, &mut interner)?;
        let argument = entrypoints::wrap(argument, &target.path);
        let initial = parse_data(storage, &self.storage, &mut interner)?;
        check_lazy_ids(&argument, lazy)?;
        check_lazy_ids(&initial, lazy)?;

        let mut trace: Vec<TraceEntry> = Vec::new();
        let ctx = ExecContext::for_program(chain, lazy, self, initial.clone());
        let mut interpreter = Interpreter::new(ctx, config);
        if config.trace {
            interpreter = interpreter.with_trace(&mut trace);
        }
        let outcome = interpreter.run(&self.code, vec![Value::pair(argument, initial.clone())]);
        let gas = interpreter.into_gas_profile();
        let mut stack = match outcome {
            Ok(stack) => stack,
            Err(err) => {
                warn!("call to {} failed after {} gas: {}", chain.self_address, gas.total(), err);
                return Err(err);
            }
        };

        let (operations, mut new_storage) = match (stack.pop(), stack.is_empty()) {
            (Some(Value::Pair(ops, new_storage)), true) => match *ops {
                Value::List(ops) => (ops, *new_storage),
                other => return Err(VMError::TypeMismatch(format!("expected operations, got {}", other.kind_name()))),
            },
            _ => return Err(VMError::type_mismatch("code must leave exactly one pair")),
        };
        let operations = operations
            .into_iter()
            .map(|op| match op {
                Value::Operation(op) => Ok(*op),
                other => Err(VMError::TypeMismatch(format!("expected an operation, got {}", other.kind_name()))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut allocator = IdAllocator::from_storage(lazy);
        let lazy_diff = extract(&initial, &mut new_storage, &mut allocator)?;
        let storage = unparse(&new_storage, &self.storage, Mode::Readable)?;

        info!(
            "call to {} used {} gas, emitted {} operations and {} lazy storage changes",
            chain.self_address,
            gas.total(),
            operations.len(),
            lazy_diff.len()
        );
        Ok(RunResult {
            storage,
            operations,
            lazy_diff,
            trace,
            gas,
        })
    }

    /// Runs view `name` directly on `storage` and returns its result in readable form.
    pub fn run_view(
        &self,
        name: &str,
        argument: &Node,
        storage: &Node,
        lazy: &dyn LazyStorage,
        chain: &ChainContext,
        config: &InterpreterConfig,
    ) -> Result<Node, VMError> {
        let view = self
            .views
            .get(name)
            .ok_or_else(|| VMError::Unsupported(format!("no view named {:?}", name)))?;
        let mut interner = TypeInterner::new();
        let argument = parse_data(argument, &view.input, &mut interner)?;
        let initial = parse_data(storage, &self.storage, &mut interner)?;
        check_lazy_ids(&initial, lazy)?;

        let ctx = ExecContext::for_program(chain, lazy, self, initial.clone());
        let mut interpreter = Interpreter::new(ctx, config);
        let mut stack = interpreter.run(&view.code, vec![Value::pair(argument, initial)])?;
        match (stack.pop(), stack.is_empty()) {
            (Some(result), true) => unparse(&result, &view.output, Mode::Readable),
            _ => Err(VMError::TypeMismatch(format!("view {:?} must leave exactly one item", name))),
        }
    }
}
