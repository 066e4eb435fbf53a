//! baudsim library crate.
//!
//! Runs a shell whose output is paced to the speed of a simulated serial
//! line. This exposes the internal modules for testing and library usage.

pub mod config;
pub mod forwarder;
pub mod io;
pub mod pacer;
pub mod session;
