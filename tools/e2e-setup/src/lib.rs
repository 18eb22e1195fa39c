#![allow(clippy::too_many_arguments)]
#![doc = include_str!("../README.md")]

//!
//! ## Overview
//!
//! The entry point is
//! [`standard_two_chain_environment`](bootstrap::two_chain::standard_two_chain_environment).
//! It does little by itself: the chains, relayer and network are reached
//! through the [`Infrastructure`](infra::Infrastructure),
//! [`ChainHandle`](chain::handle::ChainHandle) and
//! [`Relayer`](relayer::Relayer) traits, and the order in which they are
//! driven is decided by the
//! [`Interchain`](framework::interchain::Interchain) topology builder.
//!
//! The test itself is represented by a [`TestContext`](types::context::TestContext),
//! which provides the test name, temporary directories and the cleanups
//! that tear the environment down.
//!
//! [`DockerInfrastructure`](infra::DockerInfrastructure) is the
//! implementation used by real tests. It runs every node and relayer
//! command in containers through the Docker Engine API.

pub mod bootstrap;
pub mod chain;
pub mod docker;
pub mod error;
pub mod framework;
pub mod infra;
pub mod prelude;
pub mod relayer;
pub mod types;
pub mod util;

#[cfg(test)]
mod tests;
