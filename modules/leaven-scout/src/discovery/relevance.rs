use leaven_common::RelevanceConfig;

/// Local filter for raw search results. No network.
#[derive(Debug, Clone)]
pub struct RelevancePolicy {
    inclusion: Vec<String>,
    exclusion: Vec<String>,
    category_term: String,
}

impl RelevancePolicy {
    pub fn new(config: &RelevanceConfig) -> Self {
        let lower = |words: &[String]| {
            words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            inclusion: lower(&config.inclusion_keywords),
            exclusion: lower(&config.exclusion_keywords),
            category_term: config.category_term.trim().to_lowercase(),
        }
    }

    /// Exclusions are checked against name and description only; inclusions
    /// also look at the category labels.
    pub fn is_relevant(&self, name: &str, description: Option<&str>, categories: &[String]) -> bool {
        let identity = format!("{} {}", name, description.unwrap_or_default()).to_lowercase();
        if self.exclusion.iter().any(|w| identity.contains(w.as_str())) {
            return false;
        }

        let haystack = format!("{} {}", identity, categories.join(" ").to_lowercase());
        if self.inclusion.iter().any(|w| haystack.contains(w.as_str())) {
            return true;
        }
        !self.category_term.is_empty()
            && haystack.contains(self.category_term.as_str())
            && haystack.contains("restaurant")
    }
}

impl Default for RelevancePolicy {
    fn default() -> Self {
        Self::new(&RelevanceConfig::default())
    }
}
