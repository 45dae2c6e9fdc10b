//! `smartseva ask` — Answer a single question.

use smartseva_pipeline::QueryOutcome;

use super::{CmdResult, Runtime};

pub async fn run(question: String, session: Option<String>, report: bool) -> CmdResult {
    let runtime = Runtime::load()?;
    if !runtime.config.has_api_key() {
        eprintln!("  No API key configured. Set SMARTSEVA_API_KEY or run `smartseva onboard`.");
    }

    let session = runtime.open_session(session.as_deref()).await?;
    let outcome = runtime.answer(&session, &question).await?;

    if let Some(query_report) = outcome.report() {
        if !query_report.citations.is_empty() {
            eprintln!();
            for citation in &query_report.citations {
                eprintln!("  [source] {} (page {})", citation.source, citation.page);
            }
        }
        if report {
            println!("{}", serde_json::to_string_pretty(query_report)?);
        }
    }
    eprintln!("  Session: {session}");

    match outcome {
        QueryOutcome::Completed(_) => Ok(()),
        QueryOutcome::Rejected(e) => Err(e.into()),
        QueryOutcome::Unavailable => Err("document store unavailable".into()),
        QueryOutcome::Failed { failure, .. } => Err(failure.to_string().into()),
    }
}
