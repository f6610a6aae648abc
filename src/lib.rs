//! Account provisioning and login for the school results sidecar.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod db;
pub mod ipc;
pub mod password;
pub mod provisioning;
pub mod registry;
pub mod role;
pub mod school;
