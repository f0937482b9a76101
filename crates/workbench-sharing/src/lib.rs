//! Workbench Sharing
//!
//! Readiness-gated client for dataset metadata held by remote clusters.

#![allow(dead_code)]

pub mod gateway;

pub use gateway::{ReadmeContent, RemoteSharingGateway};
