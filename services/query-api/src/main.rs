// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::sync::Arc;

use finops_core::provider::LlmClient;
use finops_core::AppConfig;
use finops_datasource::{AthenaDriver, DataSource};
use finops_orchestrator::AutoDrillDown;
use finops_presentation::Entrypoint;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn llm_client(config: &finops_core::config::LlmConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match config.provider.as_str() {
        "anthropic" => {
            let mut client = finops_providers::AnthropicClient::from_env()?;
            if let Some(model) = &config.model {
                client = client.with_model(model.clone());
            }
            Arc::new(client)
        }
        _ => {
            let mut client = finops_providers::OpenAiClient::from_env()?;
            if let Some(model) = &config.model {
                client = client.with_model(model.clone());
            }
            Arc::new(client)
        }
    };
    Ok(client)
}

async fn build_entrypoint(config: &AppConfig) -> anyhow::Result<Entrypoint> {
    let llm = llm_client(&config.llm)?;

    let region = aws_sdk_athena::config::Region::new(config.aws_region.clone());
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region).load().await;
    let athena_client = aws_sdk_athena::Client::new(&sdk_config);
    let driver = Arc::new(AthenaDriver::new(athena_client, config.athena.database.clone(), config.athena.cur_table.clone(), config.athena.output_location.clone()));

    let drill_down_source: Arc<dyn DataSource> = driver.clone();
    let drill_down = AutoDrillDown::new(drill_down_source, config.athena.database.clone(), config.athena.cur_table.clone());

    Ok(Entrypoint::new(llm, config.athena.cur_table.clone(), driver, None, Some(drill_down)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "query_api=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting query-api");

    let config = AppConfig::load()?;
    let prometheus_handle = query_api::setup_metrics_recorder()?;
    let entrypoint = build_entrypoint(&config).await?;
    let state = query_api::models::app_state(entrypoint);

    let app = query_api::build_router(state, prometheus_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "query-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
