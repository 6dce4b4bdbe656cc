use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use futures::StreamExt;
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::error;

use ragpipe_core::{ChatMessage, PipelineConfig};
use ragpipe_openai::OpenAIConfig;
use ragpipe_rag::{AssembledContext, GenerationOverrides, PipeOutput, RagPipeline};
use ragpipe_cli::{
    ConfigOverrides, build_pipeline, display_banner, handle_input_with_history, load_config,
    logging, print_error, print_help, print_indexing_result, print_sources, redacted_settings,
};

#[derive(Parser)]
#[command(name = "ragpipe")]
#[command(about = "Answer questions from your own documents", long_about = None)]
struct Cli {
    /// Number of passages retrieved per question
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Chat model to generate answers with
    #[arg(long, global = true)]
    model: Option<String>,

    /// Directory of documents to index at startup
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        question: String,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// Interactive question answering
    Chat {
        /// Print answers as they are generated
        #[arg(long)]
        stream: bool,
    },
    /// Index the data directory without answering anything
    Index,
    /// Print the resolved configuration
    Config,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            top_k: self.top_k,
            model: self.model.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = load_config(&cli.overrides())?;

    match cli.command {
        Commands::Config => {
            let openai = OpenAIConfig::from_env_unchecked();
            println!("{}", serde_json::to_string_pretty(&redacted_settings(&config, &openai))?);
        }
        Commands::Index => run_index(config).await?,
        Commands::Ask { question, stream } => {
            let pipeline = start(config).await?;
            ask(&pipeline, &question, stream).await?;
            pipeline.on_shutdown().await?;
        }
        Commands::Chat { stream } => {
            let pipeline = start(config).await?;
            chat(&pipeline, stream).await?;
            pipeline.on_shutdown().await?;
        }
    }

    Ok(())
}

async fn start(config: PipelineConfig) -> Result<RagPipeline> {
    let pipeline = build_pipeline(config, OpenAIConfig::from_env()?)?;
    if let Err(e) = pipeline.on_startup().await {
        print_error(&e.user_message());
        bail!(e);
    }
    Ok(pipeline)
}

async fn run_index(config: PipelineConfig) -> Result<()> {
    let Some(dir) = config.data_dir.clone() else {
        bail!("No data directory configured; pass --data-dir or set RAG_DATA_DIR");
    };

    let pipeline = build_pipeline(config, OpenAIConfig::from_env()?)?;
    let result = pipeline.ingest(&dir).await?;
    print_indexing_result(&result);
    Ok(())
}

/// Print an answer, chunk by chunk when streamed, and return its full text
async fn print_output(output: PipeOutput) -> Result<String> {
    match output {
        PipeOutput::Text(text) => {
            println!("{}", text);
            Ok(text)
        }
        PipeOutput::Stream(mut stream) => {
            let mut stdout = io::stdout();
            let mut full = String::new();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(text) => {
                        print!("{}", text);
                        stdout.flush()?;
                        full.push_str(&text);
                    }
                    Err(e) => {
                        error!("Stream ended with error: {}", e);
                        break;
                    }
                }
            }
            println!();
            Ok(full)
        }
    }
}

async fn ask(pipeline: &RagPipeline, question: &str, stream: bool) -> Result<()> {
    let body = json!({ "stream": stream });
    let output = pipeline
        .pipe(question, &pipeline.config().llm_model, &[], &body)
        .await;
    print_output(output).await?;
    Ok(())
}

async fn chat(pipeline: &RagPipeline, stream: bool) -> Result<()> {
    let records = pipeline.on_startup().await?.records;
    display_banner(&pipeline.config().llm_model, records);

    let mut input_history = Vec::new();
    let mut conversation: Vec<ChatMessage> = Vec::new();
    let mut last_context: Option<AssembledContext> = None;

    while let Some(input) = handle_input_with_history(&mut input_history).await? {
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" => {
                println!("{}", "👋 Goodbye!".green());
                break;
            }
            "help" => {
                print_help();
                continue;
            }
            "reset" => {
                conversation.clear();
                last_context = None;
                println!("{}", "Conversation cleared.".dimmed());
                continue;
            }
            "sources" => {
                match &last_context {
                    Some(context) => print_sources(context),
                    None => println!("{}", "Nothing asked yet.".dimmed()),
                }
                continue;
            }
            _ => {}
        }

        let answer_text = if stream {
            let body = json!({ "stream": true });
            let output = pipeline
                .pipe(&input, &pipeline.config().llm_model, &conversation, &body)
                .await;
            last_context = None;
            print_output(output).await?
        } else {
            match pipeline
                .answer(&input, &conversation, GenerationOverrides::default())
                .await
            {
                Ok(answer) => {
                    println!("{}", answer.text);
                    last_context = Some(answer.context);
                    answer.text
                }
                Err(e) => {
                    error!("Query failed: {}", e);
                    print_error(&e.user_message());
                    continue;
                }
            }
        };

        conversation.push(ChatMessage::user(input));
        conversation.push(ChatMessage::assistant(answer_text));
        println!();
    }

    Ok(())
}
