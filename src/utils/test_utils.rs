//! Test utilities shared across modules.

#[cfg(test)]
pub mod utils {
    use crate::micheline::Node;
    use crate::virtual_machine::isa::Prim;
    use proptest::prelude::*;

    /// Decodes a hex string, panicking on malformed input.
    pub fn hex(s: &str) -> Vec<u8> {
        assert!(s.len() % 2 == 0, "odd hex length");
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("invalid hex"))
            .collect()
    }

    pub fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Small Micheline trees: every literal kind, every primitive, sequences
    /// and annotated applications.
    pub fn any_node() -> impl Strategy<Value = Node> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(Node::int),
            "[ -~]{0,8}".prop_map(Node::string),
            proptest::collection::vec(any::<u8>(), 0..6).prop_map(Node::Bytes),
            proptest::sample::select(Prim::ALL).prop_map(Node::prim),
        ];
        leaf.prop_recursive(3, 24, 3, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Node::Seq),
                (
                    proptest::sample::select(Prim::ALL),
                    proptest::collection::vec(inner, 0..4),
                    proptest::collection::vec("%[a-z]{1,4}", 0..2),
                )
                    .prop_map(|(prim, args, annots)| Node::Prim { prim, args, annots }),
            ]
        })
    }
}
