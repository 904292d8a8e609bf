//! Brownout control surface commands

use crate::client::GuardianClient;
use crate::output::{self, OutputFormat};
use crate::{BrownoutCommands, OverrideCommands, ToggleArg};
use anyhow::Result;
use guardian_lib::brownout::BrownoutProfile;

/// Activate or deactivate a brownout level
pub async fn run_brownout(
    client: &GuardianClient,
    command: BrownoutCommands,
    format: OutputFormat,
) -> Result<()> {
    match command {
        BrownoutCommands::Activate { level } => {
            let profile = client.activate_brownout(level.as_str()).await?;
            output::print_success(&format!("Brownout '{}' activated", level.as_str()));
            print_profile(&profile, format)?;
        }
        BrownoutCommands::Deactivate => {
            let profile = client.deactivate_brownout().await?;
            output::print_success("Primary profile restored");
            print_profile(&profile, format)?;
        }
    }
    Ok(())
}

/// Apply a single profile override
pub async fn run_override(
    client: &GuardianClient,
    command: OverrideCommands,
    format: OutputFormat,
) -> Result<()> {
    let result = match command {
        OverrideCommands::Model { name } => {
            let result = client.set_model(&name).await?;
            output::print_success(&format!("Model switched to '{}'", name));
            result
        }
        OverrideCommands::ContextWindow { value } => {
            let result = client.set_context_window(value).await?;
            output::print_success(&format!("Context window set to {}", value));
            result
        }
        OverrideCommands::RagTopK { value } => {
            let result = client.set_rag_top_k(value).await?;
            output::print_success(&format!("Retrieval depth set to {}", value));
            result
        }
        OverrideCommands::ToolsHeavy { state } => {
            let enabled = matches!(state, ToggleArg::On);
            let result = client.set_tools_heavy(enabled).await?;
            output::print_success(&format!(
                "Heavy tools {}",
                if enabled { "enabled" } else { "disabled" }
            ));
            result
        }
    };

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

/// Request an emergency reset
pub async fn run_emergency_reset(client: &GuardianClient) -> Result<()> {
    client.emergency_reset().await?;
    output::print_warning("Emergency reset requested: lockdown cleared, minimal profile forced");
    output::print_info("The guardian recovers to normal once pressure stays below recovery");
    Ok(())
}

fn print_profile(profile: &BrownoutProfile, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(profile)?);
        }
        OutputFormat::Table => {
            output::print_info(&format!(
                "model={} context={} rag_top_k={} max_tokens={} tools={}",
                profile.model,
                profile.context_window,
                profile.rag_top_k,
                profile.max_tokens,
                profile.tools_enabled.join(",")
            ));
        }
    }
    Ok(())
}
