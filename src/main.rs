// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use concierge_rs::engine::builder::Builder;
use concierge_rs::engine::builtin::register_builtins;
use concierge_rs::engine::{
    EngineConfig, Presentation, SessionRegistry, ToolRegistry, WorkflowRegistry,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that a workflow file builds
    Validate {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,
    },
    /// Run a workflow, reading one JSON action per line
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// File of JSON actions; stdin when omitted
        #[arg(short, long)]
        actions: Option<String>,

        /// Session id to use instead of a generated one
        #[arg(short, long)]
        session: Option<String>,

        /// Reply format: standard, brief or comprehensive
        #[arg(short, long)]
        presentation: Option<Presentation>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = EngineConfig::from_env()?;

    let registry = ToolRegistry::new();
    register_builtins(&registry).await;
    let builder = Builder::new(registry);

    match args.command {
        Commands::Validate { file } => {
            let workflow = builder
                .build_workflow(&file)
                .await
                .with_context(|| format!("Invalid workflow file {}", file))?;
            println!(
                "Workflow '{}' is valid ({} stages: {})",
                workflow.name(),
                workflow.len(),
                workflow.stage_names().join(", ")
            );
        }
        Commands::Run {
            file,
            actions,
            session,
            presentation,
        } => {
            let workflow = builder
                .build_workflow(&file)
                .await
                .with_context(|| format!("Invalid workflow file {}", file))?;
            let name = workflow.name().to_string();

            let workflows = WorkflowRegistry::new();
            workflows.register(workflow).await;
            let config = match presentation {
                Some(presentation) => config.with_presentation(presentation),
                None => config,
            };
            let sessions = SessionRegistry::new(workflows, config);

            let session = sessions.create_session(&name, session).await?;
            let id = session.lock().await.id().to_string();
            let engine = sessions
                .engine(&id)
                .await
                .context("Session disappeared after creation")?;

            println!("{}", engine.describe().await);

            match actions {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Cannot open actions file {}", path))?;
                    feed(BufReader::new(file), &engine).await?;
                }
                None => feed(BufReader::new(tokio::io::stdin()), &engine).await?,
            }

            let info = session.lock().await.session_info();
            log::info!("Session finished: {}", serde_json::to_string(&info)?);
            sessions.shutdown().await;
        }
    }

    Ok(())
}

/// Send every non-blank line to the engine and print the replies
async fn feed<R>(reader: R, engine: &concierge_rs::engine::LanguageEngine) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        println!("\n> {}\n{}", line, engine.process_str(line).await);
    }
    Ok(())
}
