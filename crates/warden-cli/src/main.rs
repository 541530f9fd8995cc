//! warden CLI entry point.
//!
//! Offline operator tooling: hash and validate templates, decode captured
//! streams, preview tool-argument redaction.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;

use warden_core::contract::validate_template_schema;
use warden_core::{
    create_template_ref_from_definition, summarize_tool_args, SseDecoder, SseEvent, StreamDecoder,
    TemplateDefinition,
};

/// warden: governed model runs with verified citations.
#[derive(Parser)]
#[command(name = "warden", version)]
struct Cli {
    /// Log at debug level (otherwise RUST_LOG applies)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the content-addressed reference of a template definition.
    TemplateHash {
        /// Template definition (JSON or YAML)
        file: PathBuf,

        #[arg(long, default_value = "inline")]
        id: String,

        #[arg(long = "template-version", default_value = "inline")]
        template_version: String,
    },

    /// Validate a template definition and list every issue.
    ValidateTemplate {
        /// Template definition (JSON or YAML)
        file: PathBuf,
    },

    /// Decode a captured data stream (or SSE stream) and print one JSON line per entry.
    DecodeStream {
        file: PathBuf,

        /// Feed the decoder in chunks of this many bytes
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,

        /// Input is the SSE channel instead of the data stream
        #[arg(long)]
        sse: bool,
    },

    /// Print the redacted summary of tool-call arguments.
    Redact {
        /// Arguments as JSON
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::TemplateHash {
            file,
            id,
            template_version,
        } => template_hash(&file, &id, &template_version),
        Commands::ValidateTemplate { file } => validate_template(&file),
        Commands::DecodeStream {
            file,
            chunk_size,
            sse,
        } => decode_stream(&file, chunk_size, sse),
        Commands::Redact { file } => redact(&file),
    }
}

fn template_hash(file: &Path, id: &str, version: &str) -> Result<()> {
    let value = read_document(file)?;
    let definition = TemplateDefinition::from_value(&value).map_err(|issues| {
        anyhow::anyhow!(
            "{} is not a valid template ({} issues); run validate-template for details",
            file.display(),
            issues.len()
        )
    })?;
    let template_ref = create_template_ref_from_definition(id, version, &definition);
    println!("{}", serde_json::to_string_pretty(&template_ref)?);
    Ok(())
}

fn validate_template(file: &Path) -> Result<()> {
    let value = read_document(file)?;
    match validate_template_schema(&value) {
        Ok(()) => {
            println!("{}: valid", file.display());
            Ok(())
        }
        Err(issues) => {
            for issue in &issues {
                let path = if issue.path.is_empty() { "(root)" } else { &issue.path };
                println!("{}: {}", path, issue.message);
            }
            bail!("{}: {} validation issue(s)", file.display(), issues.len())
        }
    }
}

fn decode_stream(file: &Path, chunk_size: usize, sse: bool) -> Result<()> {
    if chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    tracing::debug!(bytes = bytes.len(), chunk_size, sse, "Decoding stream");

    if sse {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            let pushed = decoder.push(chunk, &mut events);
            for event in events.drain(..) {
                println!("{}", sse_event_json(&event)?);
            }
            pushed?;
        }
        if let Some(event) = decoder.finish()? {
            println!("{}", sse_event_json(&event)?);
        }
        return Ok(());
    }

    let mut decoder = StreamDecoder::new();
    let mut lines = Vec::new();
    let mut count = 0usize;
    for chunk in bytes.chunks(chunk_size) {
        let pushed = decoder.push(chunk, &mut lines);
        for line in lines.drain(..) {
            println!("{}", serde_json::to_string(&line)?);
            count += 1;
        }
        pushed?;
    }
    if let Some(line) = decoder.finish()? {
        println!("{}", serde_json::to_string(&line)?);
        count += 1;
    }
    tracing::debug!(lines = count, "Stream decoded");
    Ok(())
}

/// Parts print as their wire JSON; the done marker prints as `"[DONE]"`.
fn sse_event_json(event: &SseEvent) -> Result<String> {
    Ok(match event {
        SseEvent::Part(part) => serde_json::to_string(part)?,
        SseEvent::Done => serde_json::to_string("[DONE]")?,
    })
}

fn redact(file: &Path) -> Result<()> {
    let contents =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let args: JsonValue = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    println!("{}", summarize_tool_args(&args));
    Ok(())
}

/// Read a JSON or YAML document, choosing by extension.
fn read_document(file: &Path) -> Result<JsonValue> {
    let contents =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let value = match file.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
            .with_context(|| format!("{} is not valid YAML", file.display()))?,
        _ => serde_json::from_str(&contents)
            .with_context(|| format!("{} is not valid JSON", file.display()))?,
    };
    Ok(value)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
