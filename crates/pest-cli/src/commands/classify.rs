//! Photo classification command

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::client::{ApiClient, ApiError, Verdict};
use crate::output::{color_confidence, color_threat, print_json, print_warning, OutputFormat};

/// Upload a photo and print the verdict
pub async fn classify(client: &ApiClient, image: &Path, format: OutputFormat) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    let file_name = image
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let verdict: Verdict = match client.upload(&["predict"], file_name, bytes).await {
        Ok(verdict) => verdict,
        Err(e) => {
            let rejected_upload = e
                .downcast_ref::<ApiError>()
                .map(|api| matches!(api.code.as_deref(), Some("no_input" | "decode_error")))
                .unwrap_or(false);
            if rejected_upload {
                print_warning("The server accepts JPEG and PNG photos");
            }
            return Err(e);
        }
    };

    match format {
        OutputFormat::Json => print_json(&verdict)?,
        OutputFormat::Table => print_verdict(&verdict),
    }

    Ok(())
}

fn print_verdict(verdict: &Verdict) {
    let headline = if verdict.is_pest {
        verdict.message.red().bold()
    } else {
        verdict.message.green().bold()
    };
    println!("{}", headline);
    println!("{}", "=".repeat(50));
    println!("Class:                  {}", verdict.class_name.cyan());
    if let Some(name) = &verdict.scientific_name {
        println!("Scientific name:        {}", name.italic());
    }
    println!(
        "Confidence:             {}",
        color_confidence(&verdict.confidence, verdict.confidence_value)
    );
    println!("Category:               {}", verdict.category);
    println!(
        "Threat:                 {}",
        color_threat(&verdict.threat_level, &verdict.threat_level)
    );
    println!();
    println!(
        "Advice: {}",
        format!("pestid pests show {}", verdict.class_name).dimmed()
    );
}
