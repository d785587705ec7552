//! smartdrive - safety and recovery core of an encrypted external-drive appliance
//!
//! - `safety`: refuses destructive setup against the wrong disk
//! - `paths`: one explicit root for every runtime file
//! - `persistence`: crash-safe writes of configuration and containers
//! - `recovery`: one-time emergency access through a 24-word phrase

pub mod cli;
pub mod config;
pub mod external;
pub mod identity;
pub mod modes;
pub mod observability;
pub mod paths;
pub mod persistence;
pub mod recovery;
pub mod safety;

mod digest;
