use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vxml::{
    config::InterpreterConfig,
    error::PlatformError,
    model::PromptQueue,
    platform::{
        CollectRequest, CollectResult, Collector, Platform, Player, ScriptedCollector,
        TracingPlayer,
    },
    Interpreter, InterpreterError, StatusCode, Value, XmlDocumentParser,
};

#[derive(Parser)]
#[command(author, version, about = "Run a VoiceXML document against scripted input", long_about = None)]
struct Cli {
    /// Path or file:// URI of the document
    document: String,

    /// Scripted caller input, consumed one per collect:
    /// `noinput`, `nomatch`, `hangup`, `event:<name>` or recognized text
    #[arg(short, long = "input")]
    inputs: Vec<String>,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn scripted_input(input: &str) -> CollectResult {
    match input {
        "noinput" => CollectResult::NoInput,
        "nomatch" => CollectResult::NoMatch,
        "hangup" => CollectResult::Hangup,
        _ => match input.strip_prefix("event:") {
            Some(name) => CollectResult::Event {
                name: name.to_string(),
                message: None,
            },
            None => CollectResult::Recognized(Value::from(input)),
        },
    }
}

/// Prints each collect's prompts as it is issued, so the transcript follows
/// playback order.
struct Transcript<T> {
    inner: T,
}

fn print_prompts(prompts: &PromptQueue) {
    for prompt in prompts.iter() {
        println!("{}", prompt);
    }
}

#[async_trait]
impl Collector for Transcript<ScriptedCollector> {
    async fn begin_collect(&self, request: CollectRequest) -> Result<CollectResult, PlatformError> {
        print_prompts(&request.prompts);
        println!("[{}]", request.item);
        self.inner.begin_collect(request).await
    }
}

#[async_trait]
impl Player for Transcript<TracingPlayer> {
    async fn play(&self, prompts: &PromptQueue) -> Result<(), PlatformError> {
        print_prompts(prompts);
        self.inner.play(prompts).await
    }
}

async fn run(cli: &Cli) -> Result<StatusCode, InterpreterError> {
    let config = match &cli.config {
        Some(path) => InterpreterConfig::from_file(path)?,
        None => InterpreterConfig::default(),
    };
    debug!("config: {:?}", config);

    let collector = Transcript {
        inner: ScriptedCollector::new(cli.inputs.iter().map(|input| scripted_input(input))),
    };
    let player = Transcript {
        inner: TracingPlayer::new(),
    };
    let mut interpreter = Interpreter::new(
        Arc::new(XmlDocumentParser::new()),
        Platform::new(Arc::new(collector), Arc::new(player)),
    )
    .with_config(config);

    interpreter.load_document(&cli.document).await?;
    interpreter.initialize()?;
    let status = interpreter.run().await?;

    info!(state = %interpreter.state(), %status, "finished");
    Ok(status)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli).await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.status_code().exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_scripted_input_keywords() {
        assert_eq!(scripted_input("noinput"), CollectResult::NoInput);
        assert_eq!(scripted_input("hangup"), CollectResult::Hangup);
        assert_eq!(
            scripted_input("event:help"),
            CollectResult::Event {
                name: "help".to_string(),
                message: None
            }
        );
        assert_eq!(scripted_input("tea"), CollectResult::Recognized(Value::from("tea")));
    }

    #[tokio::test]
    async fn test_transcript_forwards_to_wrapped_adapters() {
        let collector = Transcript {
            inner: ScriptedCollector::new([CollectResult::NoMatch]),
        };
        let request = CollectRequest {
            session_id: "s".to_string(),
            item: "drink".to_string(),
            prompts: PromptQueue::new(),
            grammars: Vec::new(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(collector.begin_collect(request).await.unwrap(), CollectResult::NoMatch);
        assert_eq!(collector.inner.requests().await[0].item, "drink");

        let player = Transcript {
            inner: TracingPlayer::new(),
        };
        let mut prompts = PromptQueue::new();
        prompts.push("Goodbye.");
        player.play(&prompts).await.unwrap();
        assert_eq!(player.inner.played().await, vec!["Goodbye."]);
    }
}
