//! LexOps CLI library — the command implementations behind the `lexops`
//! binary, exposed so integration tests can drive them directly.

pub mod commands;
