//! Types, values and the conversions between them and Micheline.
//!
//! - [`ty`]: the type tree and its interner
//! - [`value`]: runtime values and emitted operations
//! - [`data`]: typed parsing of data nodes
//! - [`unparse`]: values back to nodes, PACK and big-map key hashes
//! - [`compare`]: the total order over comparable values

pub mod compare;
pub mod data;
pub mod ty;
pub mod unparse;
pub mod value;
