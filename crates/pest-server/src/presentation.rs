//! Display-only lookup tables for the pest directory
//!
//! Categories and threat levels decorate API responses; the inference
//! pipeline never consults them.

use serde::Serialize;

/// How a pest moves or feeds, for grouping in the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Crawling,
    Flying,
    Larval,
    SoftBodied,
}

impl Category {
    pub fn for_label(label: &str) -> Self {
        match label {
            "Bees" | "Grasshoppers" | "Moths" | "Wasps" => Category::Flying,
            "Caterpillars" => Category::Larval,
            "Slugs" | "Snails" => Category::SoftBodied,
            _ => Category::Crawling,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Category::Crawling => "Crawling Pest",
            Category::Flying => "Flying Pest",
            Category::Larval => "Larval Pest",
            Category::SoftBodied => "Soft-bodied Pest",
        }
    }
}

/// Expected crop damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
}

impl ThreatLevel {
    pub fn for_label(label: &str) -> Self {
        match label {
            "Beetles" | "Caterpillars" | "Grasshoppers" | "Weevils" => ThreatLevel::High,
            "Bees" | "Earthworms" => ThreatLevel::Low,
            _ => ThreatLevel::Medium,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "Low Threat",
            ThreatLevel::Medium => "Medium Threat",
            ThreatLevel::High => "High Threat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(Category::for_label("Wasps"), Category::Flying);
        assert_eq!(Category::for_label("Snails"), Category::SoftBodied);
        assert_eq!(Category::for_label("Caterpillars").display(), "Larval Pest");
        assert_eq!(Category::for_label("Earwigs"), Category::Crawling);
    }

    #[test]
    fn test_unlisted_label_falls_back() {
        assert_eq!(Category::for_label("Aphids"), Category::Crawling);
        assert_eq!(ThreatLevel::for_label("Aphids"), ThreatLevel::Medium);
    }

    #[test]
    fn test_threat_levels() {
        assert_eq!(ThreatLevel::for_label("Weevils"), ThreatLevel::High);
        assert_eq!(ThreatLevel::for_label("Earthworms"), ThreatLevel::Low);
        assert_eq!(ThreatLevel::for_label("Slugs").display(), "Medium Threat");
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_string(&Category::SoftBodied).unwrap(),
            "\"soft-bodied\""
        );
        assert_eq!(serde_json::to_string(&ThreatLevel::High).unwrap(), "\"high\"");
    }
}
