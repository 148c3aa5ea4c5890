//! The demonstration "host" around [`stepcore`]: configuration loading,
//! a logging stand-in for the transport collaborator, and the CLI that
//! wires them to the compression core (spec.md §1's named external
//! collaborators, made concrete enough to run end-to-end).

pub mod cli;
pub mod config;
pub mod transport;
