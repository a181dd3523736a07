//! Spindle CLI binary: connect to the tool server, run one question or an
//! interactive REPL.

mod repl;

use std::sync::Arc;

use clap::Parser;
use spindle::{
    Agent, HttpOracle, McpClient, McpTransport, MockOracle, Oracle, PolicyEngine, Settings,
    StdioTransport,
};

#[derive(Parser, Debug)]
#[command(name = "spindle")]
#[command(about = "Spindle — terminal-automation agent over MCP")]
struct Args {
    /// Question to answer (or pass as positional arguments)
    #[arg(short, long, value_name = "TEXT")]
    message: Option<String>,

    /// Positional args: the question when -m/--message is not used
    #[arg(trailing_var_arg = true)]
    rest: Vec<String>,

    /// Tool-server command line (spawned over stdio)
    #[arg(long, value_name = "CMD", env = "SPINDLE_SERVER_CMD", default_value = "python server.py")]
    server: String,

    /// Session id for checkpoints
    #[arg(long, value_name = "ID", default_value = "main")]
    session: String,

    /// Simulate mutating tools instead of dispatching them
    #[arg(long)]
    dry_run: bool,

    /// Verbose: debug logging, tool-server stderr shown
    #[arg(short, long)]
    verbose: bool,

    /// Interactive REPL (default when no message is given)
    #[arg(short, long)]
    interactive: bool,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_oracle() -> Arc<dyn Oracle> {
    match HttpOracle::from_env() {
        Some(oracle) => Arc::new(oracle),
        None => {
            eprintln!(
                "warning: SPINDLE_LLM_BASE_URL is not set; planning degrades to fallback plans"
            );
            Arc::new(MockOracle::new("{}"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Err(e) = config::load_and_apply("spindle", None) {
        eprintln!("warning: config load failed: {}", e);
    }
    init_tracing(args.verbose);

    let mut settings = Settings::from_env();
    if args.dry_run {
        settings.dry_run = true;
    }
    let policy = PolicyEngine::new(settings.dry_run);
    let oracle = build_oracle();

    let mut server_parts = args.server.split_whitespace();
    let server_cmd = server_parts.next().unwrap_or("python").to_string();
    let server_args: Vec<String> = server_parts.map(String::from).collect();

    let transport = StdioTransport::connect(server_cmd, server_args, vec![], args.verbose).await?;
    let client = McpClient::connect(
        Arc::new(transport) as Arc<dyn McpTransport>,
        Arc::clone(&oracle),
        policy.clone(),
        settings.clone(),
    )
    .await?;
    eprintln!(
        "connected: {} tools, {} resources, {} prompts",
        client.tools().len(),
        client.resources().len(),
        client.prompts().len()
    );

    let client = Arc::new(client);
    let mut agent = Agent::new(
        Arc::clone(&client),
        oracle,
        policy,
        settings,
        args.session.clone(),
    );

    let message = args.message.clone().or_else(|| {
        if args.rest.is_empty() {
            None
        } else {
            Some(args.rest.join(" "))
        }
    });

    match message {
        Some(question) if !args.interactive => {
            let answer = agent.answer(&question).await?;
            println!("{}", answer);
        }
        _ => {
            repl::run_repl_loop(&mut agent).await?;
        }
    }

    client.close().await;
    Ok(())
}
