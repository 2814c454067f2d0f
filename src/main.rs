//! fnord command line entry point
//!
//! Administrative commands over the active box. The interactive chat UI
//! lives elsewhere and drives [`fnord::ChatSession`] directly.

use std::sync::Arc;

use anyhow::{bail, Context};
use fnord::logging::LoggingSystem;
use fnord::search::SearchResult;
use fnord::{AppConfig, LanguageModel, OfflineModel, OpenAiClient, Workspace};

const USAGE: &str = "\
usage: fnord <command>

commands:
  list-boxes                                   list boxes with stored conversations
  list-projects                                list project roots that have been indexed
  facts                                        list every fact in the active box
  search <conversations|facts|files> <query>   search the active box

environment:
  FNORD_HOME, FNORD_BOX, FNORD_PROJECT, FNORD_OPENAI_API_KEY, FNORD_TESTING, FNORD_LOG";

const SEARCH_RESULTS: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };
    if !matches!(command, "list-boxes" | "list-projects" | "facts" | "search") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if !needs_project_index(command, &args[1..]) {
        config.settings.indexer.enabled = false;
    }

    // Logging stays alive for the whole process
    let _logging = match LoggingSystem::init(config.logging_config()) {
        Ok(system) => Some(system),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Starting fnord {} (box: {})", env!("CARGO_PKG_VERSION"), config.box_name);

    let llm: Arc<dyn LanguageModel> = match config.openai_config() {
        Some(openai) => Arc::new(OpenAiClient::new(openai).context("Failed to create OpenAI client")?),
        None => {
            tracing::warn!("No OpenAI key configured; using the offline model");
            Arc::new(OfflineModel::default())
        }
    };

    let mut workspace = Workspace::open(config, llm).await.context("Failed to open workspace")?;
    let outcome = match workspace.wait_for_project_index().await {
        Ok(()) => run(&workspace, command, &args[1..]).await,
        Err(e) => Err(anyhow::Error::from(e).context("Project scan did not finish")),
    };
    workspace.shutdown().await;
    outcome
}

/// Only a project file search needs the indexer running
fn needs_project_index(command: &str, rest: &[String]) -> bool {
    command == "search" && rest.first().map(String::as_str) == Some("files")
}

async fn run(workspace: &Workspace, command: &str, rest: &[String]) -> anyhow::Result<()> {
    match command {
        "list-boxes" => {
            for name in workspace.list_boxes().await? {
                println!("{}", name);
            }
        }
        "list-projects" => {
            for name in workspace.list_projects().await? {
                println!("{}", name);
            }
        }
        "facts" => {
            for fact in workspace.facts().list().await {
                println!("{}  {}  {}", fact.id, fact.updated, fact.content);
            }
        }
        "search" => {
            let (Some(target), query) = (rest.first(), rest[1.min(rest.len())..].join(" ")) else {
                bail!("{}", USAGE);
            };
            if query.trim().is_empty() {
                bail!("{}", USAGE);
            }

            let gateway = workspace.gateway();
            let (results, render): (Vec<SearchResult>, fn(&SearchResult) -> String) = match target.as_str() {
                "conversations" => (
                    gateway.search_conversations(&query, SEARCH_RESULTS).await?,
                    SearchResult::conversation_string,
                ),
                "facts" => (
                    gateway.search_facts(&query, SEARCH_RESULTS).await?,
                    SearchResult::fact_string,
                ),
                "files" => (
                    gateway.search_project_files(&query, SEARCH_RESULTS).await?,
                    SearchResult::project_file_string,
                ),
                other => bail!("unknown search target '{}'\n\n{}", other, USAGE),
            };

            for result in &results {
                print!("[{:.3}] {}", result.score, render(result));
            }
        }
        _ => println!("{}", USAGE),
    }
    Ok(())
}
