// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sites_keyless_client::{
    state_poller::{member_state_matches, site_id_assigned},
    BrowserNavigator, ClientConfig, OAuthProvider, ZkLoginClient,
};
use sites_keyless_common::PollingConfig;
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = LoginCliArgs::parse();
    let config = ClientConfig::load(args.config.as_deref()).context("Failed to load config")?;
    init_logging(args.log_json || config.log_json);
    args.command.run(&config).await
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[derive(Debug, Parser)]
#[clap(name = "sites-login", author, version)]
pub struct LoginCliArgs {
    /// YAML config file. Values can also be set with SITES_LOGIN_* env vars.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[clap(long, global = true)]
    log_json: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a login and open the provider's sign-in page.
    Start {
        #[clap(long, default_value = "google")]
        provider: OAuthProvider,
    },

    /// Complete a login from the URL the provider redirected to.
    Callback {
        /// The full redirect URL, including the fragment.
        url: String,

        /// Sign these base64 transaction bytes with the new account and print
        /// the signature.
        #[clap(long)]
        sign_tx: Option<String>,
    },

    /// Print the address of the last completed login.
    Address,

    /// Forget the stored address, token and any pending login.
    Logout,

    /// Wait until an on-chain object reaches the given state.
    Wait {
        object_id: String,

        /// Wait for a site id to be assigned.
        #[clap(long, conflicts_with = "member")]
        site_id: bool,

        /// Wait for the member list to equal this value.
        #[clap(long)]
        member: Option<String>,

        /// Polling budget. Defaults to the one in the config.
        #[clap(long, value_enum)]
        preset: Option<Preset>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    Quick,
    Standard,
    Default,
}

impl Preset {
    fn polling_config(self) -> PollingConfig {
        match self {
            Preset::Quick => PollingConfig::QUICK,
            Preset::Standard => PollingConfig::STANDARD,
            Preset::Default => PollingConfig::DEFAULT,
        }
    }
}

impl Command {
    async fn run(self, config: &ClientConfig) -> Result<()> {
        let client = ZkLoginClient::new(config, Arc::new(BrowserNavigator))
            .context("Failed to build the login client")?;

        match self {
            Command::Start { provider } => {
                let session_id = client
                    .start_login(provider)
                    .await
                    .with_context(|| format!("Failed to start the {} login", provider))?;
                info!(session_id = %session_id, "Waiting for the provider callback");
            },
            Command::Callback { url, sign_tx } => {
                let resolved = client
                    .resolve_callback(&url)
                    .await
                    .context("Failed to complete the login")?;
                println!("{}", resolved.address);

                if let Some(tx) = sign_tx {
                    let tx_bytes = base64::decode(tx.trim())
                        .context("Transaction bytes are not valid base64")?;
                    let signature = resolved.account.sign_transaction(&tx_bytes);
                    println!("{}", signature.to_base64());
                }
            },
            Command::Address => match client.address()? {
                Some(address) => println!("{}", address),
                None => bail!("No login has completed yet"),
            },
            Command::Logout => {
                client.logout()?;
                info!("Logged out");
            },
            Command::Wait {
                object_id,
                site_id,
                member,
                preset,
            } => {
                let polling = preset
                    .map(Preset::polling_config)
                    .unwrap_or(config.polling);
                let poller = client.state_poller();

                let cancel = CancellationToken::new();
                let ctrl_c = {
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            cancel.cancel();
                        }
                    })
                };

                let outcome = match (site_id, member) {
                    (_, Some(member)) => {
                        poller
                            .wait_for_state_update_with_cancel(
                                &object_id,
                                member_state_matches(&member),
                                &polling,
                                &cancel,
                            )
                            .await
                    },
                    (true, None) => {
                        poller
                            .wait_for_state_update_with_cancel(
                                &object_id,
                                site_id_assigned(),
                                &polling,
                                &cancel,
                            )
                            .await
                    },
                    (false, None) => {
                        poller
                            .wait_for_state_update_with_cancel(
                                &object_id,
                                |_| true,
                                &polling,
                                &cancel,
                            )
                            .await
                    },
                };
                ctrl_c.abort();

                if !outcome.is_matched() {
                    warn!(object_id = %object_id, outcome = ?outcome, "Object did not reach the state");
                    bail!("Object {} did not reach the state: {:?}", object_id, outcome);
                }
                println!("{}", object_id);
            },
        }
        Ok(())
    }
}
