//! Test infrastructure for the document repository.
//!
//! - [`fixtures`] - a sample item type and in-memory contexts
//! - [`fake_service`] - an HTTP stand-in for the document service

#![allow(dead_code)]

pub mod fake_service;
pub mod fixtures;

pub use fake_service::*;
pub use fixtures::*;
