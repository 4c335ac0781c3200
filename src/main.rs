use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use pdf_rag::core::config::validation::validate_config;
use pdf_rag::core::config::{AppPaths, ConfigService, RagConfig};
use pdf_rag::core::errors::RagError;
use pdf_rag::core::logging;
use pdf_rag::documents::CompositeExtractor;
use pdf_rag::llm::{Completer, OpenAiCompatibleCompleter, OpenAiCompatibleEmbedder};
use pdf_rag::rag::{
    DocumentStatus, IndexStats, QueryAnswer, RagPipeline, RetrievedChunk, TrainingReport,
    VectorIndex,
};

#[derive(Parser, Debug)]
#[command(
    name = "pdf-rag",
    version,
    about = "Index a folder of PDFs and ask questions about them"
)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build or extend the vector index from a document folder
    Train(TrainArgs),
    /// Show index statistics
    Info(StoreArgs),
    /// Show the first chunks stored in the index
    Preview(PreviewArgs),
    /// Ask questions, interactively or with --query
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Index store file
    #[arg(long)]
    vector_db: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Folder containing the documents to index
    #[arg(long)]
    pdf_dir: Option<PathBuf>,

    #[command(flatten)]
    store: StoreArgs,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Re-index every document and replace the existing store
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Only show chunks of this document
    #[arg(long)]
    filename: Option<String>,

    #[arg(long, default_value_t = 3)]
    max_chunks: usize,
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Chunks retrieved per question
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    num_results: Option<u64>,

    /// Answer one question and exit
    #[arg(long, short)]
    query: Option<String>,

    /// Print the retrieved chunks along with the answer
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Debug, PartialEq)]
enum ChatInput {
    Empty,
    Quit,
    Info,
    Debug(String),
    Ask(String),
}

fn parse_chat_input(line: &str) -> ChatInput {
    let line = line.trim();
    let lower = line.to_lowercase();
    match lower.as_str() {
        "" => ChatInput::Empty,
        "quit" | "exit" | "q" => ChatInput::Quit,
        "info" => ChatInput::Info,
        _ if lower.starts_with("debug ") => {
            let question = line.get("debug ".len()..).unwrap_or_default().trim();
            if question.is_empty() {
                ChatInput::Empty
            } else {
                ChatInput::Debug(question.to_string())
            }
        }
        _ => ChatInput::Ask(line.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths, cli.verbose);

    let config = ConfigService::new(paths)
        .load_config()
        .context("Failed to load configuration")?;

    let result = match cli.command {
        Command::Train(args) => train(config, args).await,
        Command::Info(args) => info(config, args).await,
        Command::Preview(args) => preview(config, args).await,
        Command::Chat(args) => chat(config, args).await,
    };

    if let Err(err) = &result {
        if let Some(RagError::EmptyIndex(detail)) = err.downcast_ref::<RagError>() {
            eprintln!("No database found ({}).", detail);
            eprintln!("Run `pdf-rag train` first.");
            std::process::exit(1);
        }
    }
    result
}

fn apply_store(config: &mut RagConfig, store: StoreArgs) {
    if let Some(path) = store.vector_db {
        config.index_store_path = path;
    }
}

fn build_pipeline(config: RagConfig) -> anyhow::Result<RagPipeline> {
    validate_config(&config)?;
    let embedder = Arc::new(OpenAiCompatibleEmbedder::from_config(&config));
    let extractor = Arc::new(CompositeExtractor::detect());
    Ok(RagPipeline::new(config, embedder, extractor)?)
}

async fn train(mut config: RagConfig, args: TrainArgs) -> anyhow::Result<()> {
    apply_store(&mut config, args.store);
    if let Some(dir) = args.pdf_dir {
        config.document_source_path = dir;
    }
    if let Some(size) = args.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.chunk_overlap = overlap;
    }
    config.force_rebuild |= args.force;

    let pipeline = build_pipeline(config)?;
    let report = pipeline.train().await.context("Training failed")?;
    print_report(&report);
    Ok(())
}

async fn info(mut config: RagConfig, args: StoreArgs) -> anyhow::Result<()> {
    apply_store(&mut config, args);
    let pipeline = build_pipeline(config)?;
    let stats = pipeline.info().await?;
    print_stats(&stats);
    Ok(())
}

async fn preview(mut config: RagConfig, args: PreviewArgs) -> anyhow::Result<()> {
    apply_store(&mut config, args.store);
    let pipeline = build_pipeline(config)?;
    let index = VectorIndex::load(pipeline.store_path()).await?;

    let previews = pipeline.preview(&index, args.filename.as_deref(), args.max_chunks);
    if previews.is_empty() {
        println!("No chunks to preview.");
    }
    for (n, p) in previews.iter().enumerate() {
        let page = p.page.map(|pg| format!(", page {}", pg)).unwrap_or_default();
        println!("Chunk {} [{}{}] {} chars", n + 1, p.document, page, p.chars);
        println!("{}\n", p.preview);
    }
    Ok(())
}

async fn chat(mut config: RagConfig, args: ChatArgs) -> anyhow::Result<()> {
    apply_store(&mut config, args.store);
    let k = args.num_results.map_or(config.top_k, |n| n as usize);
    let completer = OpenAiCompatibleCompleter::from_config(&config);
    if !completer.has_api_key() {
        tracing::warn!("OPENAI_API_KEY is not set; requests are sent without authorization");
    }

    let pipeline = build_pipeline(config)?;
    let index = pipeline.open_index().await?;

    if let Some(question) = args.query {
        if args.debug {
            print_retrieved(&pipeline.retrieve(&index, &question, k).await?);
        }
        let answer = pipeline.query(&index, &completer, &question, k).await?;
        print_answer(&answer);
        return Ok(());
    }

    interactive(&pipeline, &index, &completer, k).await
}

async fn interactive(
    pipeline: &RagPipeline,
    index: &VectorIndex,
    completer: &dyn Completer,
    k: usize,
) -> anyhow::Result<()> {
    let stats = index.stats(Some(pipeline.store_path().to_path_buf()));
    println!(
        "Loaded {} documents with {} chunks.",
        stats.total_documents, stats.total_chunks
    );
    println!("Commands: 'quit' or 'exit' to leave, 'info' for statistics, 'debug <question>' to inspect retrieval.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nQuestion> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let outcome = match parse_chat_input(&line) {
            ChatInput::Empty => continue,
            ChatInput::Quit => break,
            ChatInput::Info => {
                print_stats(&stats);
                continue;
            }
            ChatInput::Debug(question) => pipeline
                .retrieve(index, &question, k)
                .await
                .map(|hits| print_retrieved(&hits)),
            ChatInput::Ask(question) => pipeline
                .query(index, completer, &question, k)
                .await
                .map(|answer| print_answer(&answer)),
        };

        if let Err(e) = outcome {
            if e.is_fatal() {
                return Err(e.into());
            }
            eprintln!("Error: {}", e);
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn print_report(report: &TrainingReport) {
    for outcome in &report.outcomes {
        match &outcome.status {
            DocumentStatus::Indexed { chunks } => {
                println!("  indexed  {} ({} chunks)", outcome.document, chunks)
            }
            DocumentStatus::AlreadyIndexed => println!("  kept     {}", outcome.document),
            DocumentStatus::Empty => println!("  empty    {}", outcome.document),
            DocumentStatus::Failed { reason } => {
                println!("  failed   {}: {}", outcome.document, reason)
            }
        }
    }
    println!(
        "\n{} {} new chunks from {} documents ({} failed).",
        if report.rebuilt { "Rebuilt index with" } else { "Added" },
        report.new_chunks(),
        report.indexed_count(),
        report.failed_count()
    );
    print_stats(&report.stats);
}

fn print_stats(stats: &IndexStats) {
    println!("Index statistics");
    println!("  documents:        {}", stats.total_documents);
    println!("  chunks:           {}", stats.total_chunks);
    println!("  embedding model:  {}", stats.embedding_model);
    println!("  dimension:        {}", stats.embedding_dimension);
    println!("  chunk size:       {}", stats.chunk_size);
    println!("  chunk overlap:    {}", stats.chunk_overlap);
    println!("  created:          {}", stats.created_at.to_rfc3339());
    println!("  updated:          {}", stats.updated_at.to_rfc3339());
    if let Some(path) = &stats.store_path {
        println!("  store:            {}", path.display());
    }
}

fn print_retrieved(hits: &[RetrievedChunk]) {
    if hits.is_empty() {
        println!("No relevant chunks found.");
        return;
    }
    for hit in hits {
        println!(
            "#{} {} (score {:.4}, {} chars)",
            hit.rank,
            hit.chunk.chunk_id,
            hit.score,
            hit.chunk.char_len()
        );
        println!("{}\n", hit.chunk.text);
    }
}

fn print_answer(answer: &QueryAnswer) {
    println!("\n{}\n", answer.answer);
    let per_source = answer.chunks_per_source();
    if !per_source.is_empty() {
        println!("Sources:");
        for (name, chunks) in &per_source {
            println!("  {} ({} chunks used)", name, chunks);
        }
    }
    if let Some(usage) = answer.usage {
        println!(
            "Tokens: {} prompt, {} completion, {} total",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }
    if answer.context.truncated {
        println!("(the best match alone exceeded the context budget)");
    } else if answer.context.omitted > 0 {
        println!(
            "({} retrieved chunks did not fit in the context budget)",
            answer.context.omitted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_commands_are_recognized() {
        assert_eq!(parse_chat_input("  "), ChatInput::Empty);
        assert_eq!(parse_chat_input("EXIT"), ChatInput::Quit);
        assert_eq!(parse_chat_input("q"), ChatInput::Quit);
        assert_eq!(parse_chat_input("info"), ChatInput::Info);
        assert_eq!(
            parse_chat_input("debug What is grace?"),
            ChatInput::Debug("What is grace?".to_string())
        );
        assert_eq!(parse_chat_input("debug   "), ChatInput::Empty);
        assert_eq!(
            parse_chat_input("what is in chapter 2?"),
            ChatInput::Ask("what is in chapter 2?".to_string())
        );
    }

    #[test]
    fn cli_parses_train_flags() {
        let cli = Cli::try_parse_from([
            "pdf-rag",
            "train",
            "--pdf-dir",
            "docs",
            "--chunk-size",
            "800",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Command::Train(args) => {
                assert_eq!(args.pdf_dir, Some(PathBuf::from("docs")));
                assert_eq!(args.chunk_size, Some(800));
                assert!(args.force);
                assert!(args.store.vector_db.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn chat_accepts_short_query_flag() {
        let cli = Cli::try_parse_from(["pdf-rag", "chat", "-q", "hello", "--num-results", "2"]).unwrap();
        match cli.command {
            Command::Chat(args) => {
                assert_eq!(args.query.as_deref(), Some("hello"));
                assert_eq!(args.num_results, Some(2));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn zero_results_per_question_is_rejected() {
        let err = Cli::try_parse_from(["pdf-rag", "chat", "--num-results", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
