//! Core domain types and utilities for expense-desk.
//!
//! This crate provides the identifier types and the error handling
//! foundation shared by the session coordinator and its consumers.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{MembershipId, OrganizationId, ParseIdError, UserId};
