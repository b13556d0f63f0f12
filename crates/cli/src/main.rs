// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! `finops`: a one-shot query command and an interactive REPL over the
//! same pipeline the HTTP service exposes.

use std::io::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use finops_core::provider::LlmClient;
use finops_core::{AppConfig, ConversationContext};
use finops_datasource::{AthenaDriver, DataSource};
use finops_orchestrator::AutoDrillDown;
use finops_presentation::Entrypoint;

/// FinOps natural-language cost query engine.
#[derive(Parser, Debug)]
#[command(name = "finops", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single query and print the formatted response.
    Query {
        /// The natural-language question to ask.
        text: String,
    },
    /// Start an interactive session, keeping conversation context across turns.
    Repl,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("finops=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

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

fn print_response(response: &finops_core::UnifiedResponse) {
    println!("{}", response.message);
    if !response.suggestions.is_empty() {
        println!();
        println!("{}", "Suggestions:".bold());
        for suggestion in &response.suggestions {
            println!("  {} {}", "-".dimmed(), suggestion);
        }
    }
}

async fn run_query(entrypoint: &Entrypoint, text: &str, history: &[(String, String)], context: Option<&ConversationContext>) -> finops_core::UnifiedResponse {
    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_message("running query...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let tz = chrono::FixedOffset::east_opt(0).expect("zero offset is always valid");
    let response = entrypoint.execute(text, history, context, None, &tz).await;

    spinner.finish_and_clear();
    response
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load()?;
    let cli = Cli::parse();
    let entrypoint = build_entrypoint(&config).await?;

    match cli.command {
        Command::Query { text } => {
            let response = run_query(&entrypoint, &text, &[], None).await;
            print_response(&response);
        }
        Command::Repl => {
            println!("{}", "FinOps query REPL. Type a question, or 'exit' to quit.".bold());
            let mut history: Vec<(String, String)> = Vec::new();
            let mut context: Option<ConversationContext> = None;
            let stdin = std::io::stdin();
            loop {
                print!("{} ", ">".green().bold());
                std::io::stdout().flush()?;
                let mut line = String::new();
                if stdin.read_line(&mut line)? == 0 {
                    break;
                }
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }

                let response = run_query(&entrypoint, line, &history, context.as_ref()).await;
                print_response(&response);
                history.push((line.to_string(), response.message.clone()));
                context = Some(response.context.clone());
            }
        }
    }

    Ok(())
}
