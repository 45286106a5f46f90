#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

// Must go first so the other modules see its macros
pub(crate) mod fmt;

pub(crate) mod buffer;
pub(crate) mod commands;
pub(crate) mod ingress;

pub mod engine;
pub mod error;
#[cfg(feature = "examples")]
pub mod example;
pub mod io;
pub mod mqtt;
pub mod responses;
pub mod state;
pub mod tcp;
pub mod time;
pub mod wifi;

#[cfg(test)]
mod tests;
