//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area.
//! Routers are assembled into the application by [`crate::app`].

pub mod requests;
pub mod transitions;
