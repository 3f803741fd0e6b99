// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::Parser;
use hyper::{
    service::{make_service_fn, service_fn},
    Server,
};
use sites_job_service::{
    config::JobServiceConfig,
    job_runner::{CloudRunJobRunner, JobRunner},
    request_handler::handle_request,
};
use std::{convert::Infallible, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(name = "sites-job-service", author, version)]
struct Args {
    /// YAML config file. Values can also be set with SITES_JOB_* env vars.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[clap(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config =
        JobServiceConfig::load(args.config.as_deref()).context("Failed to load config")?;
    init_logging(args.log_json || config.log_json);

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build the HTTP client")?;
    let job_runner: Arc<dyn JobRunner> = Arc::new(
        CloudRunJobRunner::new(client, &config).context("Failed to set up the job runner")?,
    );

    let make_service = make_service_fn(move |_conn| {
        let job_runner = job_runner.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                handle_request(request, job_runner.clone())
            }))
        }
    });

    let socket_address = config.socket_address();
    let server = Server::try_bind(&socket_address)
        .with_context(|| format!("Failed to bind {}", socket_address))?
        .serve(make_service);
    info!("Job service listening on {}", socket_address);

    server
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down the job service");
        })
        .await
        .context("Job service failed")
}
