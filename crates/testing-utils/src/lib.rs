//! # ModelOps Testing Utils
//!
//! Shared testing utilities for the workspace:
//!
//! - **Database setup**: in-memory SQLite with migrations and every repository wired up
//! - **Mock worker client**: records each call and injects failures per operation
//! - **Recording collaborators**: validator/analyzer doubles that log invocation order
//! - **Test data builders**: modeling parameters, tasks, devices
//!
//! ```toml
//! [dev-dependencies]
//! modelops-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
