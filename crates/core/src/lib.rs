#[macro_use]
extern crate log;

pub mod accounts;
pub mod builder;
pub mod coder;
pub mod error;
pub mod estimate;
pub mod idl;
pub mod pda;
pub mod programs;
pub mod replay;
pub mod rpc;
pub mod trace;
pub mod wallet;

pub use error::{EngineError, EngineResult};

#[cfg(test)]
mod tests;
