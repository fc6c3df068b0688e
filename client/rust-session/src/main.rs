use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assignment_session::{
    Config, HttpPersistenceClient, LeaveReason, SessionHandle, SessionNavigator, SessionPhase,
};

/// Console stand-in for the router: remembers that the session asked to
/// leave so the input loop can stop.
#[derive(Default)]
struct ConsoleNavigator {
    left: AtomicBool,
}

impl ConsoleNavigator {
    fn has_left(&self) -> bool {
        self.left.load(Ordering::SeqCst)
    }
}

impl SessionNavigator for ConsoleNavigator {
    fn leave_session(&self, reason: LeaveReason) {
        self.left.store(true, Ordering::SeqCst);
        match reason {
            LeaveReason::Submitted => println!("Assignment submitted. Returning to dashboard."),
            LeaveReason::LoadError => {
                println!("Could not open the assignment. Returning to dashboard.")
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assignment_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    let assignment_id = std::env::args()
        .nth(1)
        .context("usage: assignment-session <assignment-id>")?;

    let persistence = Arc::new(HttpPersistenceClient::from_config(&config));
    let navigator = Arc::new(ConsoleNavigator::default());

    println!("Loading assignment {}...", assignment_id);
    let session = SessionHandle::open(
        assignment_id,
        persistence,
        navigator.clone(),
        config.autosave_policy(),
        config.autosave_retry(),
    )
    .await;

    if session.phase().await == SessionPhase::Error {
        // The navigator has already explained the exit.
        return Ok(());
    }

    if let Some(assignment) = session.assignment().await {
        println!("Assignment {}", assignment.assignment_id);
        println!("Source document: {}", assignment.pdf_path);
    }
    if let Some(saved_at) = session.last_saved_at().await {
        println!("Last saved: {}", saved_at.to_rfc3339());
    }

    if session.phase().await == SessionPhase::Locked {
        println!("This assignment is already submitted; the response is read-only.");
        println!("--- response ---");
        println!("{}", session.content().await);
        session.close().await;
        return Ok(());
    }

    println!("Type to extend your response. Commands: :save, :submit, :quit");

    let mut response = session.content().await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if navigator.has_left() {
            break;
        }
        match line.trim() {
            ":quit" => break,
            ":save" => match session.save().await {
                Ok(()) => {
                    if let Some(saved_at) = session.last_saved_at().await {
                        println!("Saved at {}", saved_at.to_rfc3339());
                    }
                }
                Err(err) => println!("Save failed, your edits are kept locally: {}", err),
            },
            ":submit" => {
                // Irreversibility confirmation belongs here, not in the core.
                if !confirm_submission(&mut lines).await? {
                    println!("Submission cancelled.");
                    continue;
                }
                match session.submit().await {
                    Ok(()) => break,
                    Err(err) => println!("Submission failed, nothing was locked: {}", err),
                }
            }
            _ => {
                if !response.is_empty() {
                    response.push('\n');
                }
                response.push_str(&line);
                session.update_content(response.clone()).await;
            }
        }
    }

    session.close().await;
    Ok(())
}

async fn confirm_submission(lines: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<bool> {
    println!("Submit this assignment? This action cannot be undone. Type 'yes' to confirm.");
    let answer = lines.next_line().await?;
    Ok(matches!(answer, Some(text) if text.trim().eq_ignore_ascii_case("yes")))
}
