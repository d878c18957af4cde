//! Core of a peer-to-peer sports gear marketplace: live catalog
//! reconciliation, filtering, listing drafts and generative assist.
pub mod assist;
pub mod catalog;
pub mod config;
pub mod draft;
pub mod filter;
pub mod model;
pub mod reconcile;
pub mod seed;
pub mod store;
