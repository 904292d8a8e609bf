//! Guardian status command

use crate::client::GuardianClient;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
    #[tabled(rename = "As Of")]
    timestamp: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Context")]
    context_window: u32,
    #[tabled(rename = "RAG k")]
    rag_top_k: u32,
    #[tabled(rename = "Max Tokens")]
    max_tokens: u32,
    #[tabled(rename = "Heavy Tools")]
    tools_heavy: bool,
}

/// Fetch and print the guardian status plus the active profile
pub async fn run(client: &GuardianClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;
    let profile = client.profile().await?;

    match format {
        OutputFormat::Json => {
            let combined = serde_json::json!({
                "status": status,
                "profile": profile,
            });
            println!("{}", serde_json::to_string_pretty(&combined)?);
        }
        OutputFormat::Table => {
            let row = StatusRow {
                status: output::color_status(status.status.as_str()),
                detail: output::color_status(status.detail_status.as_str()),
                timestamp: status.timestamp.to_rfc3339(),
                model: profile.model.clone(),
                context_window: profile.context_window,
                rag_top_k: profile.rag_top_k,
                max_tokens: profile.max_tokens,
                tools_heavy: profile.tools_heavy,
            };
            output::print_table(&[row], format);

            if status.detail_status.as_str() != "normal" {
                output::print_warning("Guardian is not in normal state");
            }
        }
    }

    Ok(())
}
