#[cfg(test)]
mod tests {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    const EXPECTED_PRIM_TABLE_HASH: u64 = 10505348094880925360;

    fn fnv1a64(mut h: u64, bytes: &[u8]) -> u64 {
        for b in bytes {
            h ^= *b as u64;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }

    macro_rules! hash_prims {
        (
            $( $name:ident = $code:expr, $kind:ident, $gas:expr ),* $(,)?
        ) => {{
            let mut h = FNV_OFFSET;
            $(
                h = fnv1a64(h, stringify!($name).as_bytes());
                h = fnv1a64(h, &[crate::virtual_machine::isa::Prim::$name as u8]);
                h = fnv1a64(h, stringify!($kind).as_bytes());
                h = fnv1a64(h, &($gas as u64).to_le_bytes());
            )*
            h
        }};
    }

    fn current_prim_table_hash() -> u64 {
        crate::for_each_prim!(hash_prims)
    }

    #[test]
    #[ignore]
    fn print_prim_table_hash() {
        println!("PRIM_TABLE_HASH={}", current_prim_table_hash());
    }

    /// Binary codes are part of the wire format and must never move.
    #[test]
    fn prim_table_hash_unchanged() {
        assert_eq!(current_prim_table_hash(), EXPECTED_PRIM_TABLE_HASH);
    }
}
