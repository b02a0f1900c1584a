//! Polling and verification core of the software-template end-to-end
//! harness. The `tssc-e2e` binary drives it one check at a time; test
//! scenarios can call the same resolver, verifier and providers directly.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod output;
pub mod poll;
pub mod providers;
pub mod resolver;
pub mod verdict;
pub mod verify;

pub use error::{E2eError, Result};
