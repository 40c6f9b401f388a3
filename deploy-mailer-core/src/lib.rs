#![doc = "deploy-mailer-core: core logic library for deploy-mailer."]

//! Domain types, HTTP clients and pipelines behind the `deploy-mailer` CLI:
//! pushing local folders to a GitHub repository, managing the user's
//! repositories, generating job-application emails and sending them through Gmail.
//!
//! # Usage
//! Everything talks to the network through [`contract::ApiTransport`]; build the
//! clients over [`transport::ReqwestTransport`] in production and over a mock or
//! [`test_utils::FakeGitHub`] in tests.

pub mod archive;
pub mod config;
pub mod consent;
pub mod contract;
pub mod credentials;
pub mod error;
pub mod generator;
pub mod github;
pub mod gmail;
pub mod mail_log;
pub mod session;
pub mod synchronise;
pub mod transport;
pub mod validation;

#[cfg(any(test, feature = "test-export-mocks"))]
pub mod test_utils;

pub use error::{CoreError, Result};
