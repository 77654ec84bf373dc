use clap::{Args, Parser, Subcommand};
use llmhost::{EchoAdapter, GenerationOptions, LoadOptions, Orchestrator, OrchestratorConfig};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "llmhost")]
#[command(version = "0.5.0")]
#[command(about = "Load models and run generations through an inference adapter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a completion and print it once finished
    Generate(GenerateArgs),
    /// Generate a completion, printing text as it arrives
    Stream(GenerateArgs),
    /// List model files in a directory
    #[command(alias = "ls")]
    Discover {
        directory: Option<PathBuf>,
    },
}

#[derive(Args)]
struct GenerateArgs {
    model: String,
    prompt: String,
    #[arg(long, default_value_t = llmhost::core::options::DEFAULT_MAX_TOKENS)]
    max_tokens: i64,
    #[arg(long, default_value_t = llmhost::core::options::DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long)]
    model_id: Option<String>,
    #[arg(long)]
    context_size: Option<usize>,
}

impl GenerateArgs {
    fn load_options(&self) -> LoadOptions {
        let mut options = LoadOptions::new();
        if let Some(id) = &self.model_id {
            options = options.model_id(id.clone());
        }
        if let Some(size) = self.context_size {
            options = options.context_size(size);
        }
        options
    }

    fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::new()
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
    }
}

fn init_tracing(config: &OrchestratorConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn generate(orchestrator: &Orchestrator, args: GenerateArgs) -> anyhow::Result<()> {
    let model = orchestrator.load(&args.model, &args.load_options()).await?;
    let text = orchestrator
        .generate(&model, &args.prompt, &args.generation_options())
        .await?;
    println!("{}", text);
    orchestrator.unload(model.id()).await;
    Ok(())
}

async fn stream(orchestrator: &Orchestrator, args: GenerateArgs) -> anyhow::Result<()> {
    let model = orchestrator.load(&args.model, &args.load_options()).await?;
    let mut stdout = std::io::stdout();
    orchestrator
        .stream_generate(&model, &args.prompt, &args.generation_options(), |text, done| {
            let _ = stdout.write_all(text.as_bytes());
            if done {
                let _ = stdout.write_all(b"\n");
            }
            let _ = stdout.flush();
        })
        .await?;
    orchestrator.unload(model.id()).await;
    Ok(())
}

async fn discover(orchestrator: &Orchestrator, directory: Option<PathBuf>) -> anyhow::Result<()> {
    let found = orchestrator.discover_models(directory.as_deref()).await?;
    if found.is_empty() {
        println!("No models found");
        return Ok(());
    }
    println!("{:<40} {:<12} {:>14}", "NAME", "FORMAT", "SIZE");
    for model in found {
        println!(
            "{:<40} {:<12} {:>14}",
            model.name,
            model.format.as_deref().unwrap_or("-"),
            model.size_bytes
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = OrchestratorConfig::from_env();
    init_tracing(&config);

    let orchestrator = Orchestrator::builder()
        .config(config)
        .adapter(Arc::new(EchoAdapter::new()))
        .build();

    let result = match cli.command {
        Commands::Generate(args) => generate(&orchestrator, args).await,
        Commands::Stream(args) => stream(&orchestrator, args).await,
        Commands::Discover { directory } => discover(&orchestrator, directory).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
