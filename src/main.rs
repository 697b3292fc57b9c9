#![allow(missing_docs)]

//! Redline — interactive guardrailed terminal chat.
//!
//! Reads user lines from stdin, runs each through the guardrail pipeline
//! against the policy selected with `--app`, and prints the model's answer
//! or the block notice. Informational commands: `/policies`, `/policy`,
//! `/audit <n>`. Exit with `quit` or `exit`.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use uuid::Uuid;

use redline::config::RedlineConfig;
use redline::guard::audit::AuditRecorder;
use redline::guard::authorize::OverrideEvidence;
use redline::guard::classifier::Finding;
use redline::guard::policy::{OverrideTier, PolicyRegistry};
use redline::guard::session::{EvidenceSource, Pipeline, Session};
use redline::providers::gemini::GeminiProvider;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "redline", about = "Policy-aware guardrailed chat terminal")]
struct Args {
    /// Application context selecting the governance policy.
    #[arg(long, short)]
    app: Option<String>,
}

/// Evidence source that prompts the operator on stdin.
struct StdinEvidence;

impl EvidenceSource for StdinEvidence {
    fn request(&self, findings: &[Finding], tier: OverrideTier) -> OverrideEvidence {
        println!("⚠ This request was flagged:");
        for f in findings {
            println!("  - {} (\"{}\"): {}", f.category, f.signal, f.description);
        }
        let justification = prompt_line("Justification to proceed (empty to decline): ");
        let approver_role = if tier == OverrideTier::ManagerApproval {
            prompt_line("Approver role (empty to decline): ")
        } else {
            None
        };
        OverrideEvidence {
            justification,
            approver_role,
        }
    }
}

/// Read one trimmed line from stdin; `None` on EOF or empty input.
fn prompt_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _flush = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(_) => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; a missing file is not an error.
    let _dotenv = dotenvy::dotenv();

    let args = Args::parse();
    let config = RedlineConfig::load().context("failed to load configuration")?;
    let _logging = redline::logging::init_interactive(config.paths.logs_dir.as_ref())
        .context("failed to initialise logging")?;

    // A missing model credential is fatal for the binary; the guardrail
    // core itself would just see the model as unavailable.
    let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
        anyhow::anyhow!(
            "GEMINI_API_KEY not set.\n\
             Provide it via the environment or a .env file:\n\
             GEMINI_API_KEY=your_api_key_here"
        )
    })?;

    let registry = PolicyRegistry::builtin();
    let app = args
        .app
        .unwrap_or_else(|| config.session.default_app.clone());
    let policy = match registry.lookup(&app) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("⚠ {e}; falling back to the general policy");
            registry.default_policy()
        }
    };

    let recorder = Arc::new(
        AuditRecorder::new(&config.paths.audit_log, &config.paths.human_log)
            .context("failed to open audit sinks")?,
    );
    let provider = Arc::new(GeminiProvider::new(&config.model.model, &api_key));
    let pipeline = Pipeline::new(
        Arc::clone(&recorder),
        provider,
        Duration::from_secs(config.model.request_timeout_seconds),
    );
    let mut session = Session::new(Uuid::new_v4().to_string(), Arc::clone(&policy));

    println!("Redline guardrailed chat");
    println!(
        "policy: {} [{}] | override tier: {:?} | model: {}",
        policy.display_name, policy.framework, policy.override_tier, config.model.model
    );
    println!("commands: /policies, /policy, /audit <n>, quit");

    let stdin = std::io::stdin();
    loop {
        print!("\nyou: ");
        let _flush = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "quit" | "exit" | "bye" => break,
            "/policies" => {
                for p in registry.list() {
                    println!(
                        "  {:<14} {} [{}], tier {:?}",
                        p.id, p.display_name, p.framework, p.override_tier
                    );
                }
                continue;
            }
            "/policy" => {
                let p = session.policy();
                println!("  {} [{}], tier {:?}", p.display_name, p.framework, p.override_tier);
                println!("  {}", p.system_prompt);
                continue;
            }
            cmd if cmd.starts_with("/audit") => {
                let n = cmd
                    .split_whitespace()
                    .nth(1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5);
                match recorder.recent(n) {
                    Ok(records) => {
                        for r in records {
                            println!(
                                "  turn {:>3} [{}] {:?}: {}",
                                r.turn,
                                r.timestamp.format("%H:%M:%S"),
                                r.decision,
                                r.user_input
                            );
                        }
                    }
                    Err(e) => eprintln!("  failed to read audit trail: {e}"),
                }
                continue;
            }
            _ => {}
        }

        let outcome = pipeline.handle_turn(&mut session, input, &StdinEvidence).await;
        println!("\nbot: {}", outcome.display());
    }

    println!("bye");
    Ok(())
}
