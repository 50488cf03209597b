//! Native stack growth for the recursive passes.
//!
//! The parser, decoder, type checker and interpreter recurse once per
//! nesting level. Each recursive step runs through [`grow`], so a tree at
//! [`MAX_NESTING`](crate::micheline::MAX_NESTING) fits on a small thread.

/// Remaining stack below which a new segment is allocated.
const STACK_RED_ZONE: usize = 512 * 1024;
/// Size of each new segment.
const STACK_GROW_SIZE: usize = 8 * 1024 * 1024;

/// Runs `f`, switching to a fresh stack segment if the current one is low.
#[inline]
pub fn grow<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, f)
}
