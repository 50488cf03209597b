use super::*;
use crate::core::data::parse_data;
use crate::core::unparse::key_hash;
use crate::core::value::Operation;
use crate::crypto::hashing::blake2b_256;
use crate::micheline::parse;
use crate::storage::lazy_diff::DiffAction;
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::storage_trait::{BigMapSnapshot, LazyStorage};
use crate::types::address::{Address, ContractHash};
use crate::types::keys::{KeyHash, PublicKey, Signature, SignatureKind};
use crate::virtual_machine::program::{Program, RunResult};
use crate::virtual_machine::typecheck::typecheck;
use context::ChainContext;

/// Runs `code` on `input`, written top-first as `(type, data)` pairs, and
/// returns the resulting stack top-first.
fn run_with(
    code: &str,
    input: &[(&str, &str)],
    chain: &ChainContext,
    storage: &dyn LazyStorage,
    config: &InterpreterConfig,
) -> Result<Vec<Value>, VMError> {
    let mut interner = TypeInterner::new();
    let mut types = Vec::new();
    let mut values = Vec::new();
    for (ty, data) in input.iter().rev() {
        let ty = interner.resolve(&parse(ty)?)?;
        values.push(parse_data(&parse(data)?, &ty, &mut interner)?);
        types.push(ty);
    }
    let (block, _) = typecheck(&parse(code)?, types, &mut interner)?;
    let mut interpreter = Interpreter::new(ExecContext::new(chain, storage), config);
    let mut out = interpreter.run(&block, values)?;
    out.reverse();
    Ok(out)
}

fn run_code(code: &str, input: &[(&str, &str)]) -> Vec<String> {
    run_with(code, input, &ChainContext::default(), &MemoryStorage::new(), &InterpreterConfig::default())
        .expect("run failed")
        .iter()
        .map(Value::to_string)
        .collect()
}

fn run_single(code: &str, input: &[(&str, &str)]) -> String {
    let out = run_code(code, input);
    assert_eq!(out.len(), 1, "expected one result, got {:?}", out);
    out[0].clone()
}

fn run_expect_err(code: &str, input: &[(&str, &str)]) -> VMError {
    run_with(code, input, &ChainContext::default(), &MemoryStorage::new(), &InterpreterConfig::default())
        .expect_err("expected error")
}

fn call(program: &Program, parameter: &str, storage: &str, lazy: &dyn LazyStorage) -> Result<RunResult, VMError> {
    program.run(
        None,
        &parse(parameter).unwrap(),
        &parse(storage).unwrap(),
        lazy,
        &ChainContext::default(),
        &InterpreterConfig::default(),
    )
}

// ==================== Stack ====================

#[test]
fn stack_shuffles() {
    assert_eq!(run_code("{ SWAP }", &[("int", "1"), ("nat", "2")]), vec!["2", "1"]);
    assert_eq!(run_code("{ DUP 2 }", &[("int", "1"), ("nat", "2")]), vec!["2", "1", "2"]);
    assert_eq!(
        run_code("{ DIG 2 }", &[("int", "1"), ("int", "2"), ("int", "3")]),
        vec!["3", "1", "2"]
    );
    assert_eq!(
        run_code("{ DUG 2 }", &[("int", "1"), ("int", "2"), ("int", "3")]),
        vec!["2", "3", "1"]
    );
    assert_eq!(run_code("{ DROP 2 }", &[("int", "1"), ("int", "2"), ("int", "3")]), vec!["3"]);
}

#[test]
fn dip_protects_the_top() {
    assert_eq!(
        run_code("{ DIP 2 { ADD } }", &[("int", "1"), ("int", "2"), ("int", "3"), ("int", "4")]),
        vec!["1", "2", "7"]
    );
}

#[test]
fn push_and_unit() {
    assert_eq!(run_code("{ PUSH nat 7 ; UNIT }", &[]), vec!["Unit", "7"]);
    assert_eq!(run_single("{ PUSH (pair nat string) (Pair 1 \"a\") }", &[]), "(Pair 1 \"a\")");
}

// ==================== Control Flow ====================

#[test]
fn branches() {
    let code = "{ IF { PUSH nat 1 } { PUSH nat 2 } }";
    assert_eq!(run_single(code, &[("bool", "True")]), "1");
    assert_eq!(run_single(code, &[("bool", "False")]), "2");
    let code = "{ IF_NONE { PUSH int 0 } { INT } }";
    assert_eq!(run_single(code, &[("option nat", "None")]), "0");
    assert_eq!(run_single(code, &[("option nat", "(Some 5)")]), "5");
    let code = "{ IF_LEFT { INT } { NEG } }";
    assert_eq!(run_single(code, &[("or nat int", "(Left 3)")]), "3");
    assert_eq!(run_single(code, &[("or nat int", "(Right 3)")]), "-3");
    let code = "{ IF_CONS { DIP { DROP } } { PUSH int 0 } }";
    assert_eq!(run_single(code, &[("list int", "{ 4 ; 5 }")]), "4");
    assert_eq!(run_single(code, &[("list int", "{}")]), "0");
}

#[test]
fn loop_sums_down_to_zero() {
    let code = "{ PUSH nat 0 ; SWAP ; DUP ; INT ; GT ;
                 LOOP { DUP ; DIP { ADD } ; PUSH nat 1 ; SWAP ; SUB ; ABS ; DUP ; INT ; GT } ;
                 DROP }";
    assert_eq!(run_single(code, &[("nat", "4")]), "10");
    assert_eq!(run_single(code, &[("nat", "0")]), "0");
}

#[test]
fn loop_left_until_right() {
    let code = "{ LEFT nat ;
                 LOOP_LEFT { DUP ; PUSH nat 10 ; COMPARE ; LE ;
                             IF { RIGHT nat } { PUSH nat 3 ; ADD ; LEFT nat } } }";
    assert_eq!(run_single(code, &[("nat", "1")]), "10");
}

#[test]
fn iter_and_map() {
    assert_eq!(run_single("{ PUSH int 0 ; SWAP ; ITER { ADD } }", &[("list int", "{ 1 ; 2 ; 3 }")]), "6");
    assert_eq!(run_single("{ PUSH nat 0 ; SWAP ; ITER { ADD } }", &[("set nat", "{ 1 ; 5 }")]), "6");
    assert_eq!(
        run_single("{ MAP { PUSH int 1 ; ADD } }", &[("list int", "{ 1 ; 2 }")]),
        "{ 2 ; 3 }"
    );
    assert_eq!(
        run_single("{ MAP { CDR ; PUSH nat 1 ; ADD } }", &[("map string nat", "{ Elt \"a\" 1 ; Elt \"b\" 2 }")]),
        "{ Elt \"a\" 2 ; Elt \"b\" 3 }"
    );
}

#[test]
fn failwith_carries_the_value() {
    let err = run_expect_err("{ PUSH string \"boom\" ; FAILWITH }", &[]);
    assert_eq!(err, VMError::ScriptFailed(Node::string("boom")));
    assert_eq!(err.culprit(), Some(&Node::string("boom")));
}

#[test]
fn never_cannot_be_reached_from_valid_code() {
    assert!(matches!(run_expect_err("{ NEVER }", &[("int", "1")]), VMError::TypeMismatch(_)));
}

#[test]
fn macros_run_as_their_expansions() {
    assert_eq!(run_single("{ CMPLT }", &[("nat", "1"), ("nat", "2")]), "True");
    assert_eq!(
        run_single("{ IFCMPGT { PUSH string \"gt\" } { PUSH string \"le\" } }", &[("int", "5"), ("int", "3")]),
        "\"gt\""
    );
    assert_eq!(run_single("{ ASSERT_SOME }", &[("option nat", "(Some 4)")]), "4");
    assert_eq!(
        run_expect_err("{ ASSERT_SOME }", &[("option nat", "None")]),
        VMError::ScriptFailed(Node::prim(Prim::Unit))
    );
    assert_eq!(run_code("{ DUUP }", &[("int", "1"), ("int", "2")]), vec!["2", "1", "2"]);
    assert_eq!(run_code("{ DIIP { DROP } }", &[("int", "1"), ("int", "2"), ("int", "3")]), vec!["1", "2"]);
    assert_eq!(run_single("{ CDAR }", &[("pair int (pair nat string)", "(Pair 1 2 \"x\")")]), "2");
    assert_eq!(run_single("{ SET_CDR }", &[("pair int int", "(Pair 1 2)"), ("int", "9")]), "(Pair 1 9)");
    assert_eq!(
        run_single("{ MAP_CAR { PUSH int 10 ; ADD } }", &[("pair int nat", "(Pair 1 2)")]),
        "(Pair 11 2)"
    );
    let three = [("int", "1"), ("int", "2"), ("int", "3")];
    assert_eq!(run_single("{ PAPAIR }", &three), "(Pair 1 (Pair 2 3))");
    assert_eq!(run_code("{ PAPAIR ; UNPAPAIR }", &three), vec!["1", "2", "3"]);
}

// ==================== Lambdas ====================

#[test]
fn exec_runs_the_body() {
    assert_eq!(
        run_single("{ LAMBDA int int { PUSH int 2 ; MUL } ; SWAP ; EXEC }", &[("int", "21")]),
        "42"
    );
}

#[test]
fn apply_captures_the_first_component() {
    let code = "{ LAMBDA (pair int int) int { UNPAIR ; SUB } ; SWAP ; APPLY ; PUSH int 2 ; EXEC }";
    assert_eq!(run_single(code, &[("int", "10")]), "8");
}

#[test]
fn recursive_lambda_computes_factorial() {
    let code = "{ LAMBDA_REC int int
                    { DUP ; EQ ;
                      IF { DROP 2 ; PUSH int 1 }
                         { DUP ; DUP 3 ; PUSH int 1 ; DUP 3 ; SUB ; EXEC ; MUL ; DIP { DROP 2 } } } ;
                  SWAP ; EXEC }";
    assert_eq!(run_single(code, &[("int", "5")]), "120");
    assert_eq!(run_single(code, &[("int", "0")]), "1");
}

// ==================== Structures ====================

#[test]
fn combs() {
    assert_eq!(
        run_single("{ PAIR 3 ; GET 3 }", &[("int", "1"), ("int", "2"), ("int", "3")]),
        "2"
    );
    assert_eq!(
        run_code("{ PAIR 3 ; UNPAIR 3 }", &[("int", "1"), ("int", "2"), ("int", "3")]),
        vec!["1", "2", "3"]
    );
    assert_eq!(
        run_single("{ PAIR 3 ; PUSH int 9 ; UPDATE 4 }", &[("int", "1"), ("int", "2"), ("int", "3")]),
        "(Pair 1 (Pair 2 9))"
    );
    assert_eq!(run_single("{ PAIR ; CDR }", &[("int", "1"), ("nat", "2")]), "2");
}

#[test]
fn lists_and_sets() {
    assert_eq!(run_single("{ CONS }", &[("int", "0"), ("list int", "{ 1 }")]), "{ 0 ; 1 }");
    assert_eq!(run_single("{ SIZE }", &[("list int", "{ 1 ; 2 }")]), "2");
    let code = "{ EMPTY_SET nat ; PUSH bool True ; PUSH nat 3 ; UPDATE ; PUSH nat 3 ; MEM }";
    assert_eq!(run_single(code, &[]), "True");
}

#[test]
fn maps() {
    let code = "{ EMPTY_MAP string nat ; PUSH (option nat) (Some 1) ; PUSH string \"a\" ; UPDATE ;
                  PUSH string \"a\" ; GET }";
    assert_eq!(run_single(code, &[]), "(Some 1)");
    let code = "{ PUSH (option nat) None ; PUSH string \"a\" ; GET_AND_UPDATE ; PAIR }";
    assert_eq!(
        run_single(code, &[("map string nat", "{ Elt \"a\" 1 }")]),
        "(Pair (Some 1) { })"
    );
}

#[test]
fn strings_and_bytes() {
    assert_eq!(run_single("{ CONCAT }", &[("string", "\"ab\""), ("string", "\"cd\"")]), "\"abcd\"");
    assert_eq!(run_single("{ CONCAT }", &[("list string", "{ \"a\" ; \"b\" }")]), "\"ab\"");
    assert_eq!(run_single("{ CONCAT }", &[("list bytes", "{}")]), "0x");
    assert_eq!(run_single("{ CONCAT }", &[("bytes", "0x01"), ("bytes", "0x02")]), "0x0102");
    let slice = "{ SLICE }";
    assert_eq!(
        run_single(slice, &[("nat", "1"), ("nat", "2"), ("string", "\"abcd\"")]),
        "(Some \"bc\")"
    );
    assert_eq!(run_single(slice, &[("nat", "3"), ("nat", "2"), ("string", "\"abcd\"")]), "None");
}

#[test]
fn pack_and_unpack() {
    assert_eq!(run_single("{ PACK }", &[("nat", "1")]), "0x050001");
    assert_eq!(
        run_single("{ PACK ; UNPACK (pair nat string) }", &[("pair nat string", "(Pair 7 \"x\")")]),
        "(Some (Pair 7 \"x\"))"
    );
    assert_eq!(run_single("{ UNPACK nat }", &[("bytes", "0x0501")]), "None");
}

// ==================== Arithmetic ====================

#[test]
fn integer_arithmetic() {
    assert_eq!(run_single("{ ADD }", &[("nat", "2"), ("nat", "3")]), "5");
    assert_eq!(run_single("{ SUB }", &[("nat", "2"), ("nat", "3")]), "-1");
    assert_eq!(run_single("{ MUL }", &[("int", "-4"), ("nat", "3")]), "-12");
    assert_eq!(run_single("{ ABS }", &[("int", "-4")]), "4");
    assert_eq!(run_single("{ ISNAT }", &[("int", "-4")]), "None");
    assert_eq!(run_single("{ NEG }", &[("nat", "4")]), "-4");
}

#[test]
fn ediv_by_zero_is_none() {
    assert_eq!(run_single("{ EDIV }", &[("nat", "7"), ("nat", "0")]), "None");
    assert_eq!(run_single("{ EDIV }", &[("mumav", "7"), ("mumav", "0")]), "None");
}

#[test]
fn ediv_is_euclidean() {
    assert_eq!(run_single("{ EDIV }", &[("int", "-7"), ("nat", "2")]), "(Some (Pair -4 1))");
    assert_eq!(run_single("{ EDIV }", &[("mumav", "7"), ("nat", "2")]), "(Some (Pair 3 1))");
    assert_eq!(run_single("{ EDIV }", &[("mumav", "7"), ("mumav", "2")]), "(Some (Pair 3 1))");
}

#[test]
fn mumav_bounds() {
    assert_eq!(
        run_expect_err("{ ADD }", &[("mumav", "9223372036854775807"), ("mumav", "1")]),
        VMError::MumavOverflow
    );
    assert_eq!(run_single("{ SUB }", &[("mumav", "5"), ("mumav", "2")]), "3");
    assert_eq!(run_single("{ SUB }", &[("mumav", "2"), ("mumav", "2")]), "0");
    assert_eq!(run_expect_err("{ SUB }", &[("mumav", "0"), ("mumav", "1")]), VMError::MumavUnderflow);
    assert_eq!(run_single("{ SUB_MUMAV }", &[("mumav", "1"), ("mumav", "2")]), "None");
    assert_eq!(run_single("{ SUB_MUMAV }", &[("mumav", "5"), ("mumav", "2")]), "(Some 3)");
    assert_eq!(run_single("{ MUL }", &[("mumav", "5"), ("nat", "2")]), "10");
}

#[test]
fn timestamps() {
    assert_eq!(run_single("{ ADD }", &[("timestamp", "100"), ("int", "20")]), "\"1970-01-01T00:02:00Z\"");
    assert_eq!(run_single("{ SUB }", &[("timestamp", "100"), ("timestamp", "40")]), "60");
}

#[test]
fn shifts() {
    assert_eq!(run_single("{ LSL }", &[("nat", "3"), ("nat", "2")]), "12");
    assert_eq!(run_single("{ LSR }", &[("nat", "13"), ("nat", "2")]), "3");
    assert!(matches!(
        run_expect_err("{ LSL }", &[("nat", "1"), ("nat", "257")]),
        VMError::GeneralOverflow(_)
    ));
    assert_eq!(run_single("{ LSL }", &[("bytes", "0x06"), ("nat", "1")]), "0x000c");
    assert_eq!(run_single("{ LSR }", &[("bytes", "0x0006"), ("nat", "1")]), "0x0003");
    assert_eq!(run_single("{ LSR }", &[("bytes", "0x1234"), ("nat", "8")]), "0x12");
}

#[test]
fn bitwise() {
    assert_eq!(run_single("{ AND }", &[("int", "-1"), ("nat", "5")]), "5");
    assert_eq!(run_single("{ OR }", &[("nat", "4"), ("nat", "1")]), "5");
    assert_eq!(run_single("{ XOR }", &[("bool", "True"), ("bool", "True")]), "False");
    assert_eq!(run_single("{ NOT }", &[("int", "5")]), "-6");
    assert_eq!(run_single("{ OR }", &[("bytes", "0x0100"), ("bytes", "0x0f")]), "0x010f");
    assert_eq!(run_single("{ AND }", &[("bytes", "0xff0f"), ("bytes", "0x03")]), "0x03");
    assert_eq!(run_single("{ NOT }", &[("bytes", "0x0f")]), "0xf0");
}

#[test]
fn byte_conversions() {
    assert_eq!(run_single("{ BYTES }", &[("nat", "0")]), "0x");
    assert_eq!(run_single("{ BYTES }", &[("nat", "256")]), "0x0100");
    assert_eq!(run_single("{ BYTES }", &[("int", "-1")]), "0xff");
    assert_eq!(run_single("{ NAT }", &[("bytes", "0x")]), "0");
    assert_eq!(run_single("{ INT }", &[("bytes", "0xff")]), "-1");
    assert_eq!(run_single("{ NAT }", &[("bytes", "0x0100")]), "256");
}

// ==================== Comparison ====================

#[test]
fn comparisons() {
    assert_eq!(run_single("{ COMPARE }", &[("string", "\"a\""), ("string", "\"b\"")]), "-1");
    assert_eq!(run_single("{ COMPARE ; LT }", &[("string", "\"a\""), ("string", "\"b\"")]), "True");
    assert_eq!(run_single("{ COMPARE ; EQ }", &[("nat", "3"), ("nat", "3")]), "True");
    assert_eq!(run_single("{ GE }", &[("int", "-2")]), "False");
    assert_eq!(run_single("{ NEQ }", &[("int", "7")]), "True");
}

// ==================== Crypto ====================

#[test]
fn digests() {
    assert_eq!(
        run_single("{ BLAKE2B }", &[("bytes", "0x")]),
        "0x0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
    );
    assert_eq!(
        run_single("{ SHA256 }", &[("bytes", "0x")]),
        "0xe3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn empty_pairing_check_is_true() {
    assert_eq!(
        run_single("{ PAIRING_CHECK }", &[("list (pair bls12_381_g1 bls12_381_g2)", "{}")]),
        "True"
    );
}

fn signer() -> (ed25519_dalek::SigningKey, PublicKey) {
    let sk = ed25519_dalek::SigningKey::from_bytes(&[7; 32]);
    let pk = PublicKey::Ed25519(sk.verifying_key().to_bytes());
    (sk, pk)
}

#[test]
fn invalid_signature_is_false() {
    let (_, pk) = signer();
    let key = format!("\"{}\"", pk);
    let sig = format!("\"{}\"", Signature::generic([0; 64]));
    assert_eq!(
        run_single("{ CHECK_SIGNATURE }", &[("key", key.as_str()), ("signature", sig.as_str()), ("bytes", "0x01")]),
        "False"
    );
}

#[test]
fn valid_signature_is_true() {
    use ed25519_dalek::Signer;
    let (sk, pk) = signer();
    let sig = Signature {
        kind: SignatureKind::Ed25519,
        bytes: sk.sign(&blake2b_256(&[1])).to_bytes(),
    };
    let key = format!("\"{}\"", pk);
    let sig = format!("\"{}\"", sig);
    let input = [("key", key.as_str()), ("signature", sig.as_str()), ("bytes", "0x01")];
    assert_eq!(run_single("{ CHECK_SIGNATURE }", &input), "True");
    let input = [("key", key.as_str()), ("signature", sig.as_str()), ("bytes", "0x02")];
    assert_eq!(run_single("{ CHECK_SIGNATURE }", &input), "False");
}

#[test]
fn hash_key_matches_the_key_hash() {
    let (_, pk) = signer();
    let key = format!("\"{}\"", pk);
    assert_eq!(run_single("{ HASH_KEY }", &[("key", key.as_str())]), format!("\"{}\"", pk.hash()));
}

// ==================== Chain ====================

#[test]
fn chain_facts() {
    let chain = ChainContext {
        amount: 5,
        balance: 100,
        level: 42,
        now: 60,
        ..ChainContext::default()
    };
    let out = run_with(
        "{ AMOUNT ; BALANCE ; LEVEL ; NOW ; SELF_ADDRESS }",
        &[],
        &chain,
        &MemoryStorage::new(),
        &InterpreterConfig::default(),
    )
    .unwrap();
    let shown: Vec<String> = out.iter().map(Value::to_string).collect();
    assert_eq!(
        shown,
        vec![
            format!("\"{}\"", chain.self_address),
            "\"1970-01-01T00:01:00Z\"".to_string(),
            "42".to_string(),
            "100".to_string(),
            "5".to_string(),
        ]
    );
}

#[test]
fn voting_power_defaults_to_zero() {
    let kh = KeyHash::Ed25519([3; 20]);
    let mut chain = ChainContext::default();
    chain.voting_powers.insert(kh, 9);
    chain.total_voting_power = 20;
    let arg = format!("\"{}\"", kh);
    let out = run_with(
        "{ VOTING_POWER ; TOTAL_VOTING_POWER }",
        &[("key_hash", arg.as_str())],
        &chain,
        &MemoryStorage::new(),
        &InterpreterConfig::default(),
    )
    .unwrap();
    assert_eq!(out, vec![Value::nat(20), Value::nat(9)]);
    let other = format!("\"{}\"", KeyHash::Ed25519([4; 20]));
    assert_eq!(run_single("{ VOTING_POWER }", &[("key_hash", other.as_str())]), "0");
}

#[test]
fn contract_lookup() {
    let target = Address::Originated(ContractHash([9; 20]));
    let mut chain = ChainContext::default();
    chain
        .contracts
        .insert(target, parse("(or (nat %a) (unit %b))").unwrap());
    let addr = format!("\"{}\"", target);
    let lookup = |code: &str| {
        run_with(code, &[("address", addr.as_str())], &chain, &MemoryStorage::new(), &InterpreterConfig::default())
            .unwrap()
            .remove(0)
    };
    assert!(matches!(lookup("{ CONTRACT %a nat }"), Value::Option(Some(_))));
    assert_eq!(lookup("{ CONTRACT %a int }"), Value::none());
    assert_eq!(lookup("{ CONTRACT %c nat }"), Value::none());
    assert!(matches!(lookup("{ CONTRACT (or nat unit) }"), Value::Option(Some(_))));

    let implicit = format!("\"{}\"", Address::Implicit(KeyHash::Ed25519([1; 20])));
    assert!(run_single("{ CONTRACT unit }", &[("address", implicit.as_str())]).starts_with("(Some"));
    assert_eq!(run_single("{ CONTRACT nat }", &[("address", implicit.as_str())]), "None");
    let unknown = format!("\"{}\"", Address::Originated(ContractHash([8; 20])));
    assert_eq!(run_single("{ CONTRACT unit }", &[("address", unknown.as_str())]), "None");
}

#[test]
fn deprecated_and_offchain_only_instructions() {
    assert!(matches!(
        run_expect_err(
            "{ OPEN_CHEST }",
            &[("chest_key", "0x00"), ("chest", "0x00"), ("nat", "1")]
        ),
        VMError::Unsupported(_)
    ));
    assert!(matches!(run_expect_err("{ STEPS_TO_QUOTA }", &[]), VMError::Unsupported(_)));
}

#[test]
fn sapling_empty_state() {
    assert_eq!(run_single("{ SAPLING_EMPTY_STATE 8 }", &[]), "{}");
}

// ==================== Tickets ====================

#[test]
fn ticket_read() {
    let code = "{ TICKET ; IF_NONE { PUSH nat 0 ; FAILWITH } { READ_TICKET ; DIP { DROP } } }";
    let ticketer = ChainContext::default().self_address;
    assert_eq!(
        run_single(code, &[("string", "\"x\""), ("nat", "5")]),
        format!("(Pair \"{}\" (Pair \"x\" 5))", ticketer)
    );
}

#[test]
fn zero_amount_ticket_is_none() {
    let code = "{ TICKET ; IF_NONE { PUSH bool True } { DROP ; PUSH bool False } }";
    assert_eq!(run_single(code, &[("string", "\"x\""), ("nat", "0")]), "True");
}

#[test]
fn split_then_join() {
    let code = "{ TICKET ; IF_NONE { PUSH nat 0 ; FAILWITH } {} ;
                  SPLIT_TICKET ; IF_NONE { PUSH nat 1 ; FAILWITH } {} ;
                  UNPAIR ; PAIR ; JOIN_TICKETS ; IF_NONE { PUSH nat 2 ; FAILWITH } {} ;
                  READ_TICKET ; CDR ; CDR ; DIP { DROP } }";
    let input = [("string", "\"x\""), ("nat", "5"), ("pair nat nat", "(Pair 2 3)")];
    assert_eq!(run_single(code, &input), "5");
    let input = [("string", "\"x\""), ("nat", "5"), ("pair nat nat", "(Pair 2 2)")];
    assert_eq!(run_expect_err(code, &input), VMError::ScriptFailed(Node::int(1)));
}

// ==================== Limits ====================

#[test]
fn gas_limit_stops_loops() {
    let config = InterpreterConfig::default().with_gas_limit(200);
    let err = run_with(
        "{ PUSH bool True ; LOOP { PUSH bool True } }",
        &[],
        &ChainContext::default(),
        &MemoryStorage::new(),
        &config,
    )
    .unwrap_err();
    assert!(matches!(err, VMError::OutOfGas { limit: 200, .. }));
}

#[test]
fn nesting_is_bounded() {
    let config = InterpreterConfig {
        max_depth: 3,
        ..InterpreterConfig::default()
    };
    let run = |code: &str| run_with(code, &[], &ChainContext::default(), &MemoryStorage::new(), &config);
    assert!(run("{ { { UNIT ; DROP } } }").is_ok());
    assert_eq!(run("{ { { { UNIT ; DROP } } } }"), Err(VMError::MaxDepthExceeded(3)));
}

#[test]
fn deepest_accepted_script_runs_on_a_small_thread() {
    use crate::micheline::{MAX_NESTING, decode_binary, encode_binary, from_text, to_text};

    let worker = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let source = format!("{}UNIT{}", "{ ".repeat(MAX_NESTING), " }".repeat(MAX_NESTING));
            let code = parse(&source).unwrap();
            assert_eq!(code.depth(), MAX_NESTING);
            assert_eq!(decode_binary(&encode_binary(&code)).unwrap(), code);
            assert_eq!(from_text(&to_text(&code)).unwrap(), code);

            let mut interner = TypeInterner::new();
            let (block, output) = typecheck(&code, Vec::new(), &mut interner).unwrap();
            assert_eq!(output.map(|stack| stack.len()), Some(1));

            let chain = ChainContext::default();
            let storage = MemoryStorage::new();
            let config = InterpreterConfig::default();
            let mut interpreter = Interpreter::new(ExecContext::new(&chain, &storage), &config);
            assert_eq!(interpreter.run(&block, Vec::new()).unwrap(), vec![Value::Unit]);

            let deeper = format!("{{ {} }}", source);
            assert!(matches!(parse(&deeper), Err(VMError::SyntaxError { .. })));
        })
        .unwrap();
    worker.join().unwrap();
}

#[test]
fn stack_delta_holds_across_families() {
    // Every step checks its declared delta in debug builds.
    let (_, pk) = signer();
    let key = format!("\"{}\"", pk);
    let sig = format!("\"{}\"", Signature::generic([1; 64]));
    let cases: Vec<(&str, Vec<(&str, &str)>)> = vec![
        ("{ DUP ; DROP ; UNIT ; DROP }", vec![("int", "1")]),
        ("{ PAIR 3 ; UNPAIR 3 ; DROP 3 }", vec![("int", "1"), ("int", "2"), ("int", "3")]),
        ("{ GET_AND_UPDATE ; DROP 2 }", vec![("nat", "1"), ("option nat", "None"), ("map nat nat", "{}")]),
        ("{ SLICE ; DROP }", vec![("nat", "0"), ("nat", "1"), ("bytes", "0x00")]),
        ("{ CHECK_SIGNATURE ; DROP }", vec![("key", key.as_str()), ("signature", sig.as_str()), ("bytes", "0x")]),
        ("{ LEFT unit ; IF_LEFT { DROP } { DROP } }", vec![("nat", "1")]),
    ];
    for (code, input) in &cases {
        assert!(run_code(code, input).is_empty(), "{} left items behind", code);
    }
}

#[test]
fn trace_records_each_step() {
    let mut sink: Vec<TraceEntry> = Vec::new();
    let mut interner = TypeInterner::new();
    let (block, _) = typecheck(&parse("{ PUSH int 1 ; ADD }").unwrap(), vec![Type::int()], &mut interner).unwrap();
    let chain = ChainContext::default();
    let storage = MemoryStorage::new();
    let config = InterpreterConfig::default();
    let mut interpreter = Interpreter::new(ExecContext::new(&chain, &storage), &config).with_trace(&mut sink);
    let out = interpreter.run(&block, vec![Value::int(2)]).unwrap();
    assert_eq!(out, vec![Value::int(3)]);
    assert!(interpreter.gas_used() > 0);
    drop(interpreter);
    let lines: Vec<String> = sink.iter().map(TraceEntry::to_string).collect();
    assert_eq!(lines, vec!["PUSH /  => 1", "ADD / 1 : 2 => 3"]);
}

// ==================== Contracts ====================

const COUNTER: &str = r#"
    parameter (or (int %add) (unit %reset));
    storage int;
    code { UNPAIR ; IF_LEFT { ADD } { DROP 2 ; PUSH int 0 } ; NIL operation ; PAIR };
    view "double" unit int { CDR ; PUSH int 2 ; MUL }
"#;

#[test]
fn entrypoints_select_the_branch() {
    let program = Program::parse(COUNTER).unwrap();
    let storage = MemoryStorage::new();
    let run = |entrypoint: Option<&str>, param: &str| {
        program.run(
            entrypoint,
            &parse(param).unwrap(),
            &Node::int(10),
            &storage,
            &ChainContext::default(),
            &InterpreterConfig::default(),
        )
    };
    assert_eq!(run(Some("add"), "5").unwrap().storage, Node::int(15));
    assert_eq!(run(Some("reset"), "Unit").unwrap().storage, Node::int(0));
    assert_eq!(run(None, "(Left -3)").unwrap().storage, Node::int(7));
    assert_eq!(run(Some("nope"), "Unit").unwrap_err(), VMError::UnknownEntrypoint("nope".into()));
}

#[test]
fn views_run_against_the_initial_storage() {
    let source = r#"
        parameter unit;
        storage int;
        code { CDR ; SELF_ADDRESS ; UNIT ; VIEW "double" int ;
               IF_NONE { PUSH int 0 } {} ; SWAP ; DROP ; NIL operation ; PAIR };
        view "double" unit int { CDR ; PUSH int 2 ; MUL }
    "#;
    let program = Program::parse(source).unwrap();
    let result = call(&program, "Unit", "21", &MemoryStorage::new()).unwrap();
    assert_eq!(result.storage, Node::int(42));

    let direct = program
        .run_view(
            "double",
            &Node::prim(Prim::Unit),
            &Node::int(4),
            &MemoryStorage::new(),
            &ChainContext::default(),
            &InterpreterConfig::default(),
        )
        .unwrap();
    assert_eq!(direct, Node::int(8));
}

#[test]
fn unknown_views_yield_none() {
    let source = r#"
        parameter unit;
        storage (option int);
        code { DROP ; SELF_ADDRESS ; UNIT ; VIEW "missing" int ; NIL operation ; PAIR }
    "#;
    let program = Program::parse(source).unwrap();
    let result = call(&program, "Unit", "None", &MemoryStorage::new()).unwrap();
    assert_eq!(result.storage, Node::prim(Prim::None));
}

#[test]
fn operations_are_emitted_in_order() {
    let source = r#"
        parameter unit;
        storage unit;
        code { DROP ;
               NIL operation ;
               NONE key_hash ; SET_DELEGATE ; CONS ;
               PUSH nat 3 ; EMIT %tick ; CONS ;
               SENDER ; CONTRACT unit ; IF_NONE { PUSH nat 0 ; FAILWITH } {} ;
               PUSH mumav 10 ; UNIT ; TRANSFER_TOKENS ; CONS ;
               UNIT ; SWAP ; PAIR }
    "#;
    let program = Program::parse(source).unwrap();
    let result = call(&program, "Unit", "Unit", &MemoryStorage::new()).unwrap();
    let nonces: Vec<u32> = result.operations.iter().map(Operation::nonce).collect();
    assert_eq!(nonces, vec![2, 1, 0]);
    assert!(matches!(&result.operations[0], Operation::Transfer { amount: 10, .. }));
    assert!(matches!(&result.operations[1], Operation::Emit { tag: Some(tag), .. } if tag == "tick"));
    assert!(matches!(&result.operations[2], Operation::SetDelegate { delegate: None, .. }));
}

#[test]
fn create_contract_derives_the_address() {
    let source = r#"
        parameter unit;
        storage (option address);
        code { DROP ; UNIT ; PUSH mumav 0 ; NONE key_hash ;
               CREATE_CONTRACT { parameter unit ; storage unit ; code { CDR ; NIL operation ; PAIR } } ;
               DIP { SOME ; NIL operation } ; CONS ; PAIR }
    "#;
    let program = Program::parse(source).unwrap();
    let result = call(&program, "Unit", "None", &MemoryStorage::new()).unwrap();
    let expected = domain::originated_address(&ChainContext::default().self_address, 0);
    match &result.operations[..] {
        [Operation::CreateContract { address, balance: 0, .. }] => assert_eq!(*address, expected),
        other => panic!("unexpected operations {:?}", other),
    }
    assert_eq!(
        result.storage,
        Node::prim_args(Prim::Some, vec![Node::string(expected.to_base58())])
    );
}

#[test]
fn program_slots_are_recorded() {
    let mut interner = TypeInterner::new();
    let (block, _) = typecheck(&parse("{ storage nat }").unwrap(), vec![], &mut interner).unwrap();
    let chain = ChainContext::default();
    let storage = MemoryStorage::new();
    let config = InterpreterConfig::default();
    let mut interpreter = Interpreter::new(ExecContext::new(&chain, &storage), &config);
    assert!(interpreter.run(&block, vec![]).unwrap().is_empty());
    assert_eq!(interpreter.context().slots.storage, Some(Node::prim(Prim::nat)));
}

// ==================== Big Maps ====================

const BIG_MAP_SETTER: &str = r#"
    parameter (or (pair %set nat nat) (nat %remove));
    storage (big_map nat nat);
    code { UNPAIR ;
           IF_LEFT { UNPAIR ; DIP { SOME } ; UPDATE } { DIP { NONE nat } ; UPDATE } ;
           NIL operation ; PAIR }
"#;

fn big_map_call(program: &Program, entrypoint: &str, param: &str, storage_node: &Node, lazy: &MemoryStorage) -> RunResult {
    program
        .run(
            Some(entrypoint),
            &parse(param).unwrap(),
            storage_node,
            lazy,
            &ChainContext::default(),
            &InterpreterConfig::default(),
        )
        .unwrap()
}

#[test]
fn big_map_update_then_remove_leaves_key_absent() {
    let program = Program::parse(BIG_MAP_SETTER).unwrap();
    let mut lazy = MemoryStorage::new();

    let first = big_map_call(&program, "set", "(Pair 7 1)", &Node::Seq(vec![]), &lazy);
    assert!(matches!(first.lazy_diff[0].action, DiffAction::Copy { source: None, .. }));
    lazy.apply(&first.lazy_diff).unwrap();
    assert_eq!(first.storage, Node::int(0));

    let hash = key_hash(&Value::nat(7), &Type::nat()).unwrap();
    assert!(lazy.big_map(0).unwrap().get(&hash).is_some());

    let second = big_map_call(&program, "remove", "7", &first.storage, &lazy);
    lazy.apply(&second.lazy_diff).unwrap();
    assert!(lazy.big_map(0).unwrap().get(&hash).is_none());
    assert_eq!(lazy.next_free_id(), 1);
}

#[test]
fn big_map_reads_go_through_storage() {
    let mut lazy = MemoryStorage::new();
    let mut snapshot = BigMapSnapshot::new(Node::prim(Prim::nat), Node::prim(Prim::nat));
    let hash = key_hash(&Value::nat(7), &Type::nat()).unwrap();
    snapshot.entries.insert(hash, (Node::int(7), Node::int(42)));
    lazy.insert_big_map(0, snapshot);

    let source = r#"
        parameter nat;
        storage (pair (big_map nat nat) (option nat));
        code { UNPAIR ; DIP { CAR ; DUP } ; GET ; SWAP ; PAIR ; NIL operation ; PAIR }
    "#;
    let program = Program::parse(source).unwrap();
    let result = call(&program, "7", "(Pair 0 None)", &lazy).unwrap();
    assert_eq!(
        result.storage,
        Node::prim_args(Prim::Pair, vec![Node::int(0), Node::prim_args(Prim::Some, vec![Node::int(42)])])
    );
    assert!(result.gas.get(gas::GasCategory::StorageRead) > 0);
    assert!(result.lazy_diff.is_empty());
}

#[test]
fn unknown_big_map_ids_are_rejected() {
    let program = Program::parse(BIG_MAP_SETTER).unwrap();
    let err = program
        .run(
            Some("remove"),
            &Node::int(1),
            &Node::int(5),
            &MemoryStorage::new(),
            &ChainContext::default(),
            &InterpreterConfig::default(),
        )
        .unwrap_err();
    assert_eq!(err, VMError::StorageResolution { kind: "big_map", id: 5 });
}

#[test]
fn failed_runs_leave_storage_untouched() {
    let source = r#"
        parameter nat;
        storage (big_map nat nat);
        code { UNPAIR ; DIP { PUSH (option nat) (Some 1) } ; UPDATE ; DROP ; PUSH string "no" ; FAILWITH }
    "#;
    let program = Program::parse(source).unwrap();
    let mut lazy = MemoryStorage::new();
    lazy.insert_big_map(0, BigMapSnapshot::new(Node::prim(Prim::nat), Node::prim(Prim::nat)));
    let err = call(&program, "3", "0", &lazy).unwrap_err();
    assert_eq!(err.culprit(), Some(&Node::string("no")));
    assert!(lazy.big_map(0).unwrap().entries.is_empty());
    assert_eq!(lazy.next_free_id(), 1);
}
