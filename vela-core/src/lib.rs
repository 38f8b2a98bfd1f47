//! Vela Core
//!
//! Core contracts for an infrastructure management tool that treats side
//! effects as values. Providers implement the [`provider::Provider`] trait;
//! the runtime feeds them [`resource::Resource`] declarations validated
//! through the [`schema`] layer and persists the returned
//! [`resource::State`].

pub mod provider;
pub mod resource;
pub mod schema;
