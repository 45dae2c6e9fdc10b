//! `smartseva chat` — Interactive chat backed by the session log.

use std::io::Write;

use smartseva_pipeline::QueryOutcome;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CmdResult, Runtime};

pub async fn run(session: Option<String>) -> CmdResult {
    let runtime = Runtime::load()?;
    let session = runtime.open_session(session.as_deref()).await?;
    let history = runtime.pipeline.memory().summary(&session).pair_count;

    println!();
    println!("  SmartSeva — government services assistant");
    println!();
    println!("  Model:    {}", runtime.pipeline.settings().model);
    println!("  Session:  {session}");
    if history > 0 {
        println!("  History:  {history} earlier exchanges restored");
    }
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        print!("  SmartSeva > ");
        std::io::stdout().flush()?;
        match runtime.answer(&session, question).await? {
            QueryOutcome::Completed(report) if report.timed_out => {
                eprintln!("  [answer cut short after {} ms]", report.elapsed.as_millis());
            }
            QueryOutcome::Unavailable => {
                eprintln!("  [check retrieval.corpus_path in your config]");
            }
            _ => {}
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
