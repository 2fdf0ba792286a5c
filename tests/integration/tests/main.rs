//! End-to-End Integration Tests
//!
//! These tests drive the query executor against an in-process directory,
//! and the real `ldap3` connector up to the point where it would touch the
//! network.

mod common;
mod errors;
mod mutual_tls;
mod resource_safety;
