// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The HTTP glue backend of Sites: triggers the publishing job for an
//! on-chain site object and validates create-site payloads.

pub mod config;
pub mod error;
pub mod job_runner;
pub mod request_handler;
pub mod validation;

#[cfg(test)]
mod tests;
