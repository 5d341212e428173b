//! pantheon core library.
//!
//! `pantheon-core` holds the host registry, run settings, CLI definition and logging
//! setup shared by the workflow crate and the installer binary.

pub mod cli;
pub mod hosts;
pub mod logging;
pub mod settings;

#[cfg(test)]
pub mod test_env;
