//! Shared test utilities for logriver integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file. Harnesses that drive the in-process broker and index
//! get a fully provisioned client from [`builders::memory_client`].

#![allow(dead_code)]

pub mod assertions;
pub mod builders;
pub mod fake_index_api;
pub mod fixtures;

pub use builders::*;
pub use fixtures::*;
