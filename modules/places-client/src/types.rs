use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for one places-search submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
    pub language: String,
    pub region: String,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: u32) -> Self {
        Self {
            query: query.into(),
            limit,
            language: "en".to_string(),
            region: "US".to_string(),
        }
    }

    pub fn with_locale(mut self, language: impl Into<String>, region: impl Into<String>) -> Self {
        self.language = language.into();
        self.region = region.into();
        self
    }
}

/// Request lifecycle as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum JobState {
    #[serde(alias = "pending", alias = "PENDING")]
    Pending,
    #[serde(alias = "success", alias = "SUCCESS")]
    Success,
    #[serde(alias = "error", alias = "ERROR", alias = "Failed", alias = "FAILED")]
    Error,
    #[serde(other)]
    Unknown,
}

/// Body returned by both the submit and the request-status endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<JobState>,
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl JobResponse {
    /// Effective state. A body carrying `data` but no status is a synchronous success.
    pub fn state(&self) -> JobState {
        match self.status {
            Some(JobState::Unknown) | None if self.data.is_some() => JobState::Success,
            Some(state) => state,
            None => JobState::Unknown,
        }
    }

    /// Upstream-reported error text, if any.
    pub fn error_text(&self) -> Option<String> {
        if let Some(msg) = self.error_message.as_ref().filter(|m| !m.is_empty()) {
            return Some(msg.clone());
        }
        match &self.error {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Bool(true)) => Some("upstream reported an error".to_string()),
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    /// Consume the response and flatten its `data` into place records.
    pub fn into_places(self) -> Vec<PlaceRecord> {
        flatten_places(self.data.unwrap_or_default())
    }
}

/// A field the API sends either as a single (possibly comma-separated) string or a list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn values(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            OneOrMany::Many(v) => v
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// A single place from the search dataset. Field names vary between API
/// versions, so alternates are kept side by side and resolved by accessors.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PlaceRecord {
    pub name: Option<String>,
    pub address: Option<String>,
    pub full_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub site: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Option<f64>,
    pub reviews_count: Option<f64>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub place_type: Option<String>,
    pub category: Option<String>,
    pub categories: Option<OneOrMany>,
    pub subtypes: Option<OneOrMany>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PlaceRecord {
    pub fn address(&self) -> Option<&str> {
        non_empty(self.full_address.as_deref()).or(non_empty(self.address.as_deref()))
    }

    pub fn website(&self) -> Option<&str> {
        non_empty(self.site.as_deref()).or(non_empty(self.website.as_deref()))
    }

    pub fn review_count(&self) -> Option<u32> {
        self.reviews_count
            .or(self.reviews)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n as u32)
    }

    /// Every category label on the record, deduplicated, in first-seen order.
    pub fn all_categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let singles = [self.place_type.as_deref(), self.category.as_deref()];
        let lists = [self.subtypes.as_ref(), self.categories.as_ref()];

        let candidates = singles
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .chain(lists.into_iter().flatten().flat_map(OneOrMany::values));

        for c in candidates {
            if !c.is_empty() && !out.iter().any(|seen| seen.eq_ignore_ascii_case(&c)) {
                out.push(c);
            }
        }
        out
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Flatten `data`, which is either a list of places or a list of per-query
/// lists of places. Entries that don't parse are skipped.
pub fn flatten_places(data: Vec<Value>) -> Vec<PlaceRecord> {
    let mut places = Vec::new();
    for item in data {
        match item {
            Value::Array(inner) => {
                for nested in inner {
                    push_place(nested, &mut places);
                }
            }
            other => push_place(other, &mut places),
        }
    }
    places
}

fn push_place(value: Value, places: &mut Vec<PlaceRecord>) {
    if !value.is_object() {
        return;
    }
    match serde_json::from_value::<PlaceRecord>(value) {
        Ok(place) => places.push(place),
        Err(e) => tracing::debug!(error = %e, "Skipping unparseable place record"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_one_level_of_nesting() {
        let data = vec![
            json!([{"name": "Pizza A"}, {"name": "Pizza B"}]),
            json!({"name": "Pizza C"}),
            json!("not a place"),
        ];
        let names: Vec<_> = flatten_places(data)
            .into_iter()
            .filter_map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Pizza A", "Pizza B", "Pizza C"]);
    }

    #[test]
    fn prefers_full_address_and_site() {
        let place: PlaceRecord = serde_json::from_value(json!({
            "name": "Pizza A",
            "address": "1 Main St",
            "full_address": "1 Main St, Portland, OR 97201",
            "site": "https://pizza-a.example",
            "website": "https://other.example",
            "reviews": 41.0
        }))
        .unwrap();
        assert_eq!(place.address(), Some("1 Main St, Portland, OR 97201"));
        assert_eq!(place.website(), Some("https://pizza-a.example"));
        assert_eq!(place.review_count(), Some(41));
    }

    #[test]
    fn merges_category_fields() {
        let place: PlaceRecord = serde_json::from_value(json!({
            "name": "Pizza A",
            "type": "Pizza restaurant",
            "subtypes": "Pizza restaurant, Italian restaurant, Bakery",
            "categories": ["bakery", "Takeout"]
        }))
        .unwrap();
        assert_eq!(
            place.all_categories(),
            vec!["Pizza restaurant", "Italian restaurant", "Bakery", "Takeout"]
        );
    }

    #[test]
    fn state_falls_back_to_success_when_data_present() {
        let resp: JobResponse = serde_json::from_value(json!({"data": []})).unwrap();
        assert_eq!(resp.state(), JobState::Success);

        let resp: JobResponse =
            serde_json::from_value(json!({"id": "r1", "status": "Pending"})).unwrap();
        assert_eq!(resp.state(), JobState::Pending);

        let resp: JobResponse =
            serde_json::from_value(json!({"id": "r1", "status": "Queued"})).unwrap();
        assert_eq!(resp.state(), JobState::Unknown);
    }

    #[test]
    fn error_text_reads_either_shape() {
        let resp: JobResponse = serde_json::from_value(json!({
            "status": "Error", "error": true, "errorMessage": "query too long"
        }))
        .unwrap();
        assert_eq!(resp.error_text().as_deref(), Some("query too long"));

        let resp: JobResponse =
            serde_json::from_value(json!({"status": "Error", "error": "bad region"})).unwrap();
        assert_eq!(resp.error_text().as_deref(), Some("bad region"));
    }
}
