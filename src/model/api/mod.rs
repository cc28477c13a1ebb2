//! API-compatible types.
//!
//! The types in this module are what the routes exchange with the outside
//! world: the page documents they render, the forms they accept, and the
//! request guards that identify the visitor.

pub mod account;
pub mod auth;
pub mod forms;
pub mod page;
pub mod polls;
pub mod slogan;
