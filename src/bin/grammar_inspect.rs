//! Grammar inspector command line
//!
//! Probe grammar endpoints, parse and evaluate expressions, and drive the
//! incremental inspector once from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # What kind of backend is this?
//! grammar-inspect probe http://localhost:8080/calc
//!
//! # Parse an expression and print the tree
//! grammar-inspect parse http://localhost:8080/calc --expr "1+1"
//!
//! # Evaluate against a context
//! grammar-inspect eval http://localhost:8080/calc --expr "x*2" --context '{"x": 21}'
//!
//! # Full inspector pass, reporting the node under offset 2
//! grammar-inspect inspect http://localhost:8080/calc --expr "1+1" --offset 2
//!
//! # Replay a saved session
//! grammar-inspect session saved-session.json
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use grammar_inspector::{
    EndpointProber, FieldMapping, GrammarConfig, GrammarLoader, GrammarPlugin, Inspector,
    InspectorConfig, InspectorState, NodeRef, SessionEnvelope,
};

#[derive(Parser)]
#[command(name = "grammar-inspect")]
#[command(version)]
#[command(about = "Probe grammar endpoints, parse, evaluate and inspect expressions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Client identity sent with every call (random when omitted)
    #[arg(long, global = true, env = "GRAMMAR_CLIENT_ID")]
    client_id: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging for this crate
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Request timeout in milliseconds (overrides GRAMMAR_HTTP_TIMEOUT_MS)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Args)]
struct InputArgs {
    /// Expression text
    #[arg(long, short, conflicts_with = "file")]
    expr: Option<String>,

    /// Read the expression from a file (stdin when neither is given)
    #[arg(long, short)]
    file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a grammar URL as live or static
    Probe { url: String },

    /// Parse an expression and print the hydrated tree
    Parse {
        url: String,
        #[arg(long)]
        root_tag: Option<String>,
        /// JSON field mapping file
        #[arg(long)]
        mapping: Option<PathBuf>,
        #[command(flatten)]
        input: InputArgs,
    },

    /// Evaluate an expression against a JSON context
    Eval {
        url: String,
        #[arg(long)]
        root_tag: Option<String>,
        #[arg(long, default_value = "{}")]
        context: String,
        #[command(flatten)]
        input: InputArgs,
    },

    /// Read one grammar option
    #[command(name = "option")]
    GetOption { url: String, key: String },

    /// Recompile a live grammar from source
    Recompile {
        url: String,
        /// Grammar source file
        #[arg(long)]
        grammar: PathBuf,
    },

    /// Run the incremental inspector once and print everything it derived
    Inspect {
        url: String,
        #[arg(long)]
        root_tag: Option<String>,
        #[arg(long, default_value = "{}")]
        context: String,
        /// Report the node under this character offset
        #[arg(long)]
        offset: Option<usize>,
        #[command(flatten)]
        input: InputArgs,
    },

    /// Inspect the active grammar of a saved session
    Session {
        file: PathBuf,
        #[arg(long)]
        offset: Option<usize>,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,grammar_inspector=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = GrammarConfig::from_env();
    if let Some(ms) = cli.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    let client_id = cli
        .client_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let loader = GrammarLoader::new(config.clone())?;

    match cli.command {
        Commands::Probe { url } => {
            let prober = EndpointProber::new(&config)?;
            let endpoint = prober.probe(&client_id, &config.rewrite_url(&url)).await?;
            if cli.json {
                print_json(&endpoint)?;
            } else {
                println!("transport:    {}", endpoint.transport);
                println!("resolved:     {}", endpoint.resolved_url);
                println!("capabilities: {}", endpoint.capabilities.join(", "));
            }
        }

        Commands::Parse {
            url,
            root_tag,
            mapping,
            input,
        } => {
            let mapping = mapping.as_deref().map(read_mapping).transpose()?;
            let plugin = loader.load(&client_id, &url, mapping).await?;
            let root_tag = resolve_root_tag(&plugin, root_tag).await;
            let expression = read_input(&input)?;
            let tree = plugin.parse(&root_tag, &expression).await?;
            if cli.json {
                print_json(&tree)?;
            } else {
                print_tree(&tree, 0);
            }
        }

        Commands::Eval {
            url,
            root_tag,
            context,
            input,
        } => {
            let context: serde_json::Value =
                serde_json::from_str(&context).context("--context is not valid JSON")?;
            let plugin = loader.load(&client_id, &url, None).await?;
            let root_tag = resolve_root_tag(&plugin, root_tag).await;
            let expression = read_input(&input)?;
            let output = plugin.eval(&root_tag, &expression, &context).await?;
            print_json(&output)?;
        }

        Commands::GetOption { url, key } => {
            let plugin = loader.load(&client_id, &url, None).await?;
            let value = plugin.get_option(&key).await?;
            print_json(&value)?;
        }

        Commands::Recompile { url, grammar } => {
            let source = std::fs::read_to_string(&grammar)
                .with_context(|| format!("Failed to read {}", grammar.display()))?;
            let plugin = loader.load(&client_id, &url, None).await?;
            let status = plugin.recompile(&source).await?;
            print_json(&status)?;
        }

        Commands::Inspect {
            url,
            root_tag,
            context,
            offset,
            input,
        } => {
            let plugin = loader.load(&client_id, &url, None).await?;
            let expression = read_input(&input)?;
            let state = run_inspector(Arc::new(plugin), expression, context, root_tag).await?;
            report(&state, offset, cli.json)?;
        }

        Commands::Session { file, offset } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut session = SessionEnvelope::import(&text, false)?;
            let expression = session.expression.clone();
            let context = session.context_str.clone();
            let root_tag = session.grammar_tag.clone();
            let grammar = session
                .active_grammar_mut()
                .ok_or_else(|| anyhow!("Session has no active grammar"))?;
            let plugin = grammar.ensure_loaded(&loader, &client_id).await?;
            let state = run_inspector(plugin, expression, context, root_tag).await?;
            report(&state, offset, cli.json)?;
        }
    }

    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

async fn run_inspector(
    plugin: Arc<GrammarPlugin>,
    expression: String,
    context: String,
    root_tag: Option<String>,
) -> Result<Arc<InspectorState>> {
    let config = InspectorConfig::from_env().with_debounce(Duration::ZERO);
    let settle_timeout = Duration::from_secs(60);

    let inspector = Inspector::spawn(config);
    let mut notifications = inspector.notifications();
    inspector.set_plugin(Some(plugin))?;
    inspector.set_grammar_tag(root_tag)?;
    inspector.set_context_str(context)?;
    inspector.set_expression(expression)?;

    let state = inspector.settle(settle_timeout).await?;
    inspector.shutdown();

    if let Ok(notification) = notifications.try_recv() {
        bail!("{}", notification.message);
    }
    Ok(state)
}

fn report(state: &InspectorState, offset: Option<usize>, json: bool) -> Result<()> {
    let node = offset.and_then(|o| {
        state
            .tree_root
            .as_ref()
            .and_then(|root| grammar_inspector::find_node_at(root, o))
    });

    if json {
        return print_json(&serde_json::json!({
            "state": state,
            "nodeAtOffset": node,
        }));
    }

    match &state.tree_root {
        Some(tree) => print_tree(tree, 0),
        None => println!("(no tree)"),
    }
    println!();
    println!("root tag:      {}", state.grammar_tag.as_deref().unwrap_or("-"));
    println!("tokens:        {}", state.tree_tokens.len());
    for mark in &state.syntax_marks {
        println!("  {:>4}..{:<4} {}", mark.start, mark.end, mark.class);
    }
    if let Some(e) = &state.context_parse_error {
        println!("context error: {}", e);
    }
    if let Some(e) = &state.output_error {
        println!("parse error:   {}", e);
    }
    if let Some(e) = &state.eval_error {
        println!("eval error:    {}", e);
    }
    println!(
        "output:        {}",
        state
            .output
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".into())
    );
    if let Some(o) = offset {
        match node {
            Some(n) => println!("at offset {}:  {} [{}..{}]", o, n.name, n.start, n.end),
            None => println!("at offset {}:  (no node)", o),
        }
    }
    Ok(())
}

async fn resolve_root_tag(plugin: &GrammarPlugin, root_tag: Option<String>) -> String {
    match root_tag {
        Some(tag) => tag,
        None => plugin
            .root_tags()
            .await
            .ok()
            .and_then(|tags| tags.into_iter().next())
            .unwrap_or_default(),
    }
}

fn read_input(input: &InputArgs) -> Result<String> {
    if let Some(expr) = &input.expr {
        return Ok(expr.clone());
    }
    match &input.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn read_mapping(path: &Path) -> Result<FieldMapping> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid mapping in {}", path.display()))
}

fn print_tree(node: &NodeRef, depth: usize) {
    let mut line = format!(
        "{}{} [{}..{}]",
        "  ".repeat(depth),
        node.name,
        node.start,
        node.end
    );
    if let Some(token_type) = &node.token_type {
        line.push_str(&format!(" <{}>", token_type));
    }
    if let Some(value) = &node.value {
        line.push_str(&format!(" = {}", value));
    }
    if let Some(error) = &node.error {
        line.push_str(&format!(" !! {}", error));
    }
    println!("{}", line);
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
