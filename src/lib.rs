//! voxgate library: credential vault, tool catalog, authorization store,
//! refresh scheduler, call sessions, function binding.

pub mod binder;
pub mod config;
pub mod oauth;
pub mod refresher;
pub mod session;
pub mod store;
pub mod tools;
pub mod vault;
