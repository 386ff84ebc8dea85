/*!
 * Key inspection and rotation commands
 */

use agent_id_sdk::{KeyBackend, ReconcileOutcome, RotationConfig, RotationEvent, RotationState};
use anyhow::Result;
use colored::*;
use std::time::Duration;

use super::Context;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn show(ctx: &Context) -> Result<()> {
    println!("{}", "=== Credential Bundle ===".bold().cyan());

    let bundle = ctx.load_bundle()?;
    println!("\n  Agent ID: {}", bundle.agent_id);
    println!("  Public Key: {}", bundle.public_key);
    println!("  Private Key: {}", "<stored, not shown>".dimmed());
    println!("  Backend: {}", bundle.backend_url);
    println!("  Status: {}", bundle.status);
    println!("  Trust Score: {:.1}", bundle.trust_score);
    println!("  Registered At: {}", bundle.registered_at);
    match (bundle.last_rotated_at, bundle.rotation_count) {
        (Some(at), Some(count)) => println!("  Rotations: {} (last at {})", count, at),
        _ => println!("  Rotations: {}", "never".dimmed()),
    }

    Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
    println!("{}", "=== Key Status ===".bold().cyan());

    let bundle = ctx.load_bundle()?;
    let backend = ctx.backend(&bundle)?;
    let report = backend.key_status(bundle.agent_id).await?;
    let state = RotationState::from_report(&report, RotationConfig::default().rotation_window_days);

    println!("\n  Key Status: {}", report.key_status);
    println!("  Days Until Expiry: {}", report.days_until_expiry);
    println!("  Rotation Count: {}", report.rotation_count);
    println!("  Lifecycle: {}", state.as_str());
    if report.in_grace_period {
        println!(
            "  {} (until {})",
            "Previous key still accepted".yellow(),
            report.previous_key_grace_until.unwrap_or_default()
        );
    }

    if report.public_key == bundle.public_key {
        println!("\n{}", "✓ Local key matches the key of record".green());
    } else {
        println!(
            "\n{}",
            "✗ Local key differs from the key of record; run `agent-id reconcile`"
                .red()
                .bold()
        );
    }

    Ok(())
}

pub async fn rotate(ctx: &Context) -> Result<()> {
    println!("{}", "=== Key Rotation ===".bold().cyan());

    let agent = ctx.agent(RotationConfig::default())?;
    let ack = agent.rotate_now().await?;

    println!("\n{}", "✓ Key rotated".green().bold());
    println!("  New Public Key: {}", ack.public_key);
    println!("  Rotation Count: {}", ack.rotation_count);
    println!("  Expires At: {}", ack.key_expires_at);
    if let Some(until) = ack.previous_key_grace_until {
        println!("  Previous key accepted until: {}", until);
    }

    Ok(())
}

pub async fn reconcile(ctx: &Context) -> Result<()> {
    println!("{}", "=== Reconcile ===".bold().cyan());

    let agent = ctx.agent(RotationConfig::default())?;
    print_outcome(&agent.reconcile().await?);

    Ok(())
}

fn print_outcome(outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::InSync => println!("\n{}", "✓ In sync with the backend".green()),
        ReconcileOutcome::PendingPromoted => {
            println!("\n{}", "✓ Interrupted rotation completed".green())
        }
        ReconcileOutcome::PendingDiscarded => {
            println!("\n{}", "✓ Unacknowledged pending key discarded".green())
        }
        ReconcileOutcome::Mismatch { local, backend } => {
            println!("\n{}", "✗ Key mismatch; re-issue the agent".red().bold());
            println!("  Local: {}", local);
            println!("  Backend: {}", backend);
        }
    }
}

pub async fn watch(ctx: &Context, interval: u64) -> Result<()> {
    println!("{}", "=== Rotation Monitor ===".bold().cyan());

    let agent = ctx.agent(RotationConfig {
        check_interval: Duration::from_secs(interval.max(1)),
        ..RotationConfig::default()
    })?;

    let outcome = agent.reconcile().await?;
    print_outcome(&outcome);
    if let ReconcileOutcome::Mismatch { .. } = outcome {
        anyhow::bail!("Refusing to rotate a key the backend does not recognize");
    }

    let mut events = agent.subscribe();
    let handle = agent.clone().spawn();
    println!("{}", "Watching; press Ctrl+C to stop".dimmed());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown(SHUTDOWN_TIMEOUT).await?;
    println!("{}", "Monitor stopped".dimmed());

    Ok(())
}

fn print_event(event: &RotationEvent) {
    match event {
        RotationEvent::StateChanged { from, to } => {
            println!("  {} → {}", from.as_str(), to.as_str().bold())
        }
        RotationEvent::Rotated {
            public_key,
            rotation_count,
        } => println!(
            "  {} #{}: {}",
            "Rotated".green().bold(),
            rotation_count,
            public_key
        ),
        RotationEvent::RotationFailed {
            consecutive_failures,
            error,
        } => println!(
            "  {} ({}): {}",
            "Rotation check failed".yellow(),
            consecutive_failures,
            error
        ),
        RotationEvent::OperatorAlert {
            consecutive_failures,
            error,
        } => println!(
            "  {} {} consecutive failures: {}",
            "ALERT".red().bold(),
            consecutive_failures,
            error
        ),
        RotationEvent::Reconciled(outcome) => print_outcome(outcome),
    }
}
