//! Pest directory commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, PestDetail, PestDirectory};
use crate::output::{color_threat, print_info, print_json, print_section, print_table, OutputFormat};

/// Row for the pest directory table
#[derive(Tabled)]
struct PestRow {
    #[tabled(rename = "Pest")]
    label: String,
    #[tabled(rename = "Scientific Name")]
    scientific_name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Threat")]
    threat: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

impl From<&PestDetail> for PestRow {
    fn from(pest: &PestDetail) -> Self {
        Self {
            label: pest.label.clone(),
            scientific_name: pest.scientific_name.clone(),
            category: pest.category_display.clone(),
            threat: pest.threat_text.clone(),
            summary: pest.summary.clone(),
        }
    }
}

/// List every pest the service knows about
pub async fn list_pests(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let directory: PestDirectory = client.get(&["pests"]).await?;

    match format {
        OutputFormat::Json => print_json(&directory)?,
        OutputFormat::Table => {
            let rows: Vec<PestRow> = directory.pests.iter().map(PestRow::from).collect();
            print_table(&rows);
            print_info(&format!(
                "{} pests, knowledge base v{}",
                directory.pests.len(),
                directory.version
            ));
        }
    }

    Ok(())
}

/// Show the full advisory for one pest
pub async fn show_pest(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let pest: PestDetail = client.get(&["pest", name]).await?;

    match format {
        OutputFormat::Json => print_json(&pest)?,
        OutputFormat::Table => {
            println!(
                "{} ({})",
                pest.label.bold(),
                pest.scientific_name.italic()
            );
            println!("{}", "=".repeat(50));
            println!(
                "{} | {}",
                pest.category_display.cyan(),
                color_threat(&pest.threat_level, &pest.threat_text)
            );
            println!();
            println!("{}", pest.description);

            print_section("Symptoms", &pest.symptoms);
            print_section("Organic Treatment", &pest.organic_treatment);
            print_section("Chemical Treatment", &pest.chemical_treatment);
            print_section("Prevention", &pest.prevention);

            let species: Vec<String> = pest
                .common_species
                .iter()
                .map(|s| format!("{}: {}", s.name.bold(), s.description))
                .collect();
            print_section("Common Species", &species);
        }
    }

    Ok(())
}
