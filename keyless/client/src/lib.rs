// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The zkLogin client: starts logins against an OpenID provider, resolves
//! the provider's callback into a ledger account, and waits for on-chain
//! state to settle after a transaction.

pub mod callback;
pub mod config;
pub mod error;
pub mod ledger;
pub mod login_client;
pub mod oauth;
pub mod prover_client;
pub mod salt_client;
pub mod session_store;
pub mod state_poller;

#[cfg(test)]
mod tests;

pub use callback::{CallbackResolver, ResolvedLogin, ZkLoginAccount};
pub use config::ClientConfig;
pub use error::{LedgerError, LoginError};
pub use login_client::ZkLoginClient;
pub use oauth::{BrowserNavigator, Navigator, OAuthNonceFlow, OAuthProvider};
pub use state_poller::{PollOutcome, StatePoller};
