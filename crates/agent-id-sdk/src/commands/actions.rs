/*!
 * Action verification command
 */

use agent_id_sdk::SigningHandle;
use anyhow::{bail, Result};
use colored::*;

use super::Context;

const RISK_LEVELS: [&str; 4] = ["low", "medium", "high", "critical"];

pub async fn verify(ctx: &Context, action: &str, resource: &str, risk: &str) -> Result<()> {
    println!("{}", "=== Action Verification ===".bold().cyan());

    let risk = risk.to_ascii_lowercase();
    if !RISK_LEVELS.contains(&risk.as_str()) {
        bail!("Unknown risk level '{}'", risk);
    }

    let bundle = ctx.load_bundle()?;
    let backend = ctx.backend(&bundle)?;
    let signer = SigningHandle::new(bundle.agent_id, bundle.keypair()?);

    let request = signer.sign_action(action, resource, &risk, serde_json::Value::Null);
    println!("\n  Verification ID: {}", request.verification_id);
    println!("  Action: {} on {} ({})", action, resource, risk);

    let outcome = backend.verify_action(&request).await?;

    if outcome.is_approved() {
        println!("\n{}", "✓ APPROVED".green().bold());
        if outcome.alerted {
            println!("  {}", "Approved with a policy alert".yellow());
        }
    } else {
        println!("\n{}", "✗ DENIED".red().bold());
        if let Some(reason) = &outcome.denial_reason {
            println!("  Reason: {}", reason);
        }
    }
    println!(
        "  Trust score: {:.1} → {:.1}",
        outcome.trust_score_before, outcome.trust_score_after
    );

    Ok(())
}
