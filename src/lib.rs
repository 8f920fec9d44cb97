//! Kavach: a multi-tenant secrets-management backend.
//!
//! Module layout mirrors the component table: `crypto` (C1), `policy` (C2),
//! `authz` (C3), `resource` (C4), `iam` (C5), `secret` (C6), `provider`
//! (C7), `http` (C8 plus the HTTP surface), `service` (C9).

pub mod auth;
pub mod authz;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod http;
pub mod iam;
pub mod observability;
pub mod policy;
pub mod provider;
pub mod resource;
pub mod secret;
pub mod service;
