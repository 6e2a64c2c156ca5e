pub mod commands;
pub mod invocation;
