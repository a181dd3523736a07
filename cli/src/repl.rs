//! Interactive REPL loop: read stdin, run the agent or an informational
//! command, print output, repeat until EOF or quit.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use cli::{
    help_text, render_cache_stats, render_memory, render_resources, render_tools, render_trace,
    ReplCommand,
};
use spindle::Agent;

const TRACE_DISPLAY_LIMIT: usize = 20;
const MEMORY_DISPLAY_LIMIT: usize = 10;

/// Runs the REPL: prompt, read line, dispatch, repeat.
///
/// Exits on EOF (Ctrl+D) or `quit`/`exit`. On agent error, prints to stderr
/// and continues.
pub async fn run_repl_loop(agent: &mut Agent) -> Result<(), Box<dyn std::error::Error>> {
    println!("type 'help' for commands, 'exit' to quit");
    let mut reader = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = reader.next_line().await? else {
            break;
        };
        let Some(command) = ReplCommand::parse(&line) else {
            continue;
        };

        match command {
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{}", help_text()),
            ReplCommand::Tools => print!("{}", render_tools(agent.client().tools())),
            ReplCommand::Resources => print!(
                "{}",
                render_resources(agent.client().resources(), agent.client().prompts())
            ),
            ReplCommand::Cache => {
                let (live, total) = agent.client().cache_stats();
                print!("{}", render_cache_stats(live, total));
            }
            ReplCommand::Trace => {
                print!("{}", render_trace(&agent.client().trace(), TRACE_DISPLAY_LIMIT))
            }
            ReplCommand::Memory => {
                print!(
                    "{}",
                    render_memory(agent.memory().retrieve(MEMORY_DISPLAY_LIMIT))
                )
            }
            ReplCommand::Question(question) => match agent.answer(&question).await {
                Ok(answer) => println!("{}\n", answer),
                Err(e) => eprintln!("error: {}\n", e),
            },
        }
    }

    Ok(())
}
