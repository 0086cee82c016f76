//! Pest knowledge store
//!
//! Read-only advisory content keyed by class label. Parsed once from a
//! versioned JSON dataset and checked for totality against the classifier's
//! label set before the service starts answering requests.

use crate::error::{PestError, Result};
use crate::models::{ClassLabel, LabelSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// A species commonly grouped under a pest class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonSpecies {
    pub name: String,
    pub description: String,
}

/// Advisory content for one pest class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PestRecord {
    pub label: ClassLabel,
    pub scientific_name: String,
    pub summary: String,
    pub description: String,
    /// Illustration file name, resolved by whoever serves assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub symptoms: Vec<String>,
    pub organic_treatment: Vec<String>,
    pub chemical_treatment: Vec<String>,
    pub prevention: Vec<String>,
    pub common_species: Vec<CommonSpecies>,
}

impl PestRecord {
    /// Name of the first required field that is empty, if any
    fn first_missing_field(&self) -> Option<&'static str> {
        fn blank(s: &str) -> bool {
            s.trim().is_empty()
        }
        fn blank_list(items: &[String]) -> bool {
            items.is_empty() || items.iter().any(|s| blank(s))
        }

        if blank(&self.scientific_name) {
            Some("scientific_name")
        } else if blank(&self.summary) {
            Some("summary")
        } else if blank(&self.description) {
            Some("description")
        } else if blank_list(&self.symptoms) {
            Some("symptoms")
        } else if blank_list(&self.organic_treatment) {
            Some("organic_treatment")
        } else if blank_list(&self.chemical_treatment) {
            Some("chemical_treatment")
        } else if blank_list(&self.prevention) {
            Some("prevention")
        } else if self.common_species.is_empty()
            || self
                .common_species
                .iter()
                .any(|s| blank(&s.name) || blank(&s.description))
        {
            Some("common_species")
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct KnowledgeDocument {
    version: String,
    pests: Vec<PestRecord>,
}

/// Immutable label -> advisory mapping
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    version: String,
    order: Vec<ClassLabel>,
    records: HashMap<ClassLabel, PestRecord>,
}

impl KnowledgeBase {
    /// Load a dataset file and check it against the label set
    pub fn load(path: &Path, labels: &LabelSet) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PestError::KnowledgeBase(format!("failed to read {}: {}", path.display(), e))
        })?;
        let kb = Self::from_json_str(&content, labels)?;
        debug!(
            path = %path.display(),
            version = %kb.version,
            records = kb.len(),
            "Loaded knowledge base"
        );
        Ok(kb)
    }

    /// Parse a dataset document and check it against the label set
    pub fn from_json_str(content: &str, labels: &LabelSet) -> Result<Self> {
        let document: KnowledgeDocument = serde_json::from_str(content)
            .map_err(|e| PestError::KnowledgeBase(format!("invalid dataset: {}", e)))?;
        Self::from_records(document.version, document.pests, labels)
    }

    /// Build from records, requiring exactly one complete record per label
    pub fn from_records(
        version: impl Into<String>,
        pests: Vec<PestRecord>,
        labels: &LabelSet,
    ) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(PestError::KnowledgeBase("dataset version is empty".to_string()));
        }

        let mut records = HashMap::with_capacity(pests.len());
        for record in pests {
            if !labels.contains(record.label.as_str()) {
                return Err(PestError::KnowledgeBase(format!(
                    "record '{}' does not name a classifier label",
                    record.label
                )));
            }
            if let Some(field) = record.first_missing_field() {
                return Err(PestError::KnowledgeBase(format!(
                    "record '{}' has an empty '{}' field",
                    record.label, field
                )));
            }
            let label = record.label.clone();
            if records.insert(label.clone(), record).is_some() {
                return Err(PestError::KnowledgeBase(format!(
                    "duplicate record for '{}'",
                    label
                )));
            }
        }

        let missing: Vec<&str> = labels
            .iter()
            .map(ClassLabel::as_str)
            .filter(|l| !records.contains_key(*l))
            .collect();
        if !missing.is_empty() {
            return Err(PestError::KnowledgeBase(format!(
                "no record for labels: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            version,
            order: labels.iter().cloned().collect(),
            records,
        })
    }

    /// Advisory record for a label; fails for names outside the label set
    pub fn lookup(&self, label: &str) -> Result<&PestRecord> {
        self.records
            .get(label)
            .ok_or_else(|| PestError::UnknownLabel(label.to_string()))
    }

    /// Records in classifier label order
    pub fn records(&self) -> impl Iterator<Item = &PestRecord> {
        self.order.iter().filter_map(|l| self.records.get(l))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
