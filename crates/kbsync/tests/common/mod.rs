//! Shared test utilities for kbsync integration tests.
//!
//! - In-memory fakes for the document and quota endpoints (`FakeApi`)
//! - A scripted event transport for the telemetry client
//! - Builders for records, configs and wired-up components

#![allow(dead_code)]

pub mod builders;
pub mod fakes;

#[allow(unused_imports)]
pub use builders::*;
#[allow(unused_imports)]
pub use fakes::*;
