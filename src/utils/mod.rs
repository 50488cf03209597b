//! Logging, calendar helpers, stack growth and shared test fixtures.

pub mod log;
pub mod stack;
pub mod test_utils;
pub mod time;
