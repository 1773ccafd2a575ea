use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));

/// Coordinates are bucketed to 0.001° (~110 m) for identity purposes.
pub const COORD_BUCKETS_PER_DEGREE: f64 = 1000.0;

/// Two sightings are the same spot when both coordinates agree within this.
pub const COORD_EPSILON_DEG: f64 = 0.001;

/// Lower-case, strip diacritics, replace every run of characters that are
/// neither letters nor digits (in any script) with one space, trim.
pub fn normalize_text(s: &str) -> String {
    let folded: String = s.nfd().filter(|c| !is_combining_mark(*c)).collect();
    NON_ALNUM
        .replace_all(&folded.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Normalized name for identity keys. A name made only of punctuation keeps
/// its trimmed raw form so it never collapses to "".
fn name_key(name: &str) -> String {
    let normalized = normalize_text(name);
    if normalized.is_empty() {
        name.trim().to_lowercase()
    } else {
        normalized
    }
}

fn coord_bucket(deg: f64) -> i64 {
    (deg * COORD_BUCKETS_PER_DEGREE).round() as i64
}

// --- Identity ---

/// Dedup key identifying one real-world place across search results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    Geo { name: String, lat: i64, lng: i64 },
    Address { name: String, address: String },
}

impl IdentityKey {
    /// The eight surrounding `Geo` buckets with the same name. Address keys
    /// have no neighbours.
    pub fn neighbours(&self) -> Vec<IdentityKey> {
        let IdentityKey::Geo { name, lat, lng } = self else {
            return Vec::new();
        };
        let mut keys = Vec::with_capacity(8);
        for dlat in -1..=1 {
            for dlng in -1..=1 {
                if dlat == 0 && dlng == 0 {
                    continue;
                }
                keys.push(IdentityKey::Geo {
                    name: name.clone(),
                    lat: lat + dlat,
                    lng: lng + dlng,
                });
            }
        }
        keys
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Geo { name, lat, lng } => write!(f, "geo:{name}:{lat}:{lng}"),
            IdentityKey::Address { name, address } => write!(f, "addr:{name}|{address}"),
        }
    }
}

// --- Candidate ---

/// A discovered business before verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub raw_description: Option<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
}

impl Candidate {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            city: city.into(),
            state: state.into(),
            zip_code: None,
            phone: None,
            website: None,
            rating: None,
            review_count: None,
            latitude: None,
            longitude: None,
            raw_description: None,
            categories: BTreeSet::new(),
        }
    }

    /// Both coordinates, if present and finite.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }

    /// Squared coordinate distance in degrees when both candidates are
    /// located and agree within [`COORD_EPSILON_DEG`] on each axis.
    pub fn coordinate_gap(&self, other: &Candidate) -> Option<f64> {
        let (lat_a, lng_a) = self.coordinates()?;
        let (lat_b, lng_b) = other.coordinates()?;
        let (dlat, dlng) = ((lat_a - lat_b).abs(), (lng_a - lng_b).abs());
        let tolerance = COORD_EPSILON_DEG + 1e-9;
        (dlat <= tolerance && dlng <= tolerance).then(|| dlat * dlat + dlng * dlng)
    }

    pub fn identity_key(&self) -> IdentityKey {
        let name = name_key(&self.name);
        match self.coordinates() {
            Some((lat, lng)) => IdentityKey::Geo {
                name,
                lat: coord_bucket(lat),
                lng: coord_bucket(lng),
            },
            None => IdentityKey::Address {
                name,
                address: normalize_text(&self.address),
            },
        }
    }

    /// Fold a later sighting of the same place into this one. Fields already
    /// set here win; empty fields are filled; categories are unioned.
    pub fn absorb(&mut self, other: Candidate) {
        let other_coords = other.coordinates();
        if self.address.trim().is_empty() {
            self.address = other.address;
        }
        fill(&mut self.zip_code, other.zip_code);
        fill(&mut self.phone, other.phone);
        fill(&mut self.website, other.website);
        fill(&mut self.rating, other.rating);
        fill(&mut self.review_count, other.review_count);
        if let (None, Some((lat, lng))) = (self.coordinates(), other_coords) {
            self.latitude = Some(lat);
            self.longitude = Some(lng);
        }
        fill(&mut self.raw_description, other.raw_description);
        self.categories.extend(other.categories);
    }

    /// Refresh descriptive fields from a newer observation. New values win,
    /// missing values never erase what is already known.
    pub fn refresh_from(&mut self, newer: &Candidate) {
        self.name = newer.name.clone();
        if !newer.address.trim().is_empty() {
            self.address = newer.address.clone();
        }
        if !newer.city.is_empty() {
            self.city = newer.city.clone();
        }
        if !newer.state.is_empty() {
            self.state = newer.state.clone();
        }
        overwrite(&mut self.zip_code, &newer.zip_code);
        overwrite(&mut self.phone, &newer.phone);
        overwrite(&mut self.website, &newer.website);
        overwrite(&mut self.rating, &newer.rating);
        overwrite(&mut self.review_count, &newer.review_count);
        if newer.coordinates().is_some() {
            self.latitude = newer.latitude;
            self.longitude = newer.longitude;
        }
        overwrite(&mut self.raw_description, &newer.raw_description);
        self.categories.extend(newer.categories.iter().cloned());
    }
}

fn fill<T>(slot: &mut Option<T>, other: Option<T>) {
    if slot.is_none() {
        *slot = other;
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, newer: &Option<T>) {
    if newer.is_some() {
        *slot = newer.clone();
    }
}

// --- Evidence ---

/// An independent channel scanned for verification keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    BusinessProfile,
    Website,
    SocialBio,
}

impl EvidenceSource {
    pub const ALL: [EvidenceSource; 3] = [
        EvidenceSource::BusinessProfile,
        EvidenceSource::Website,
        EvidenceSource::SocialBio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceSource::BusinessProfile => "business_profile",
            EvidenceSource::Website => "website",
            EvidenceSource::SocialBio => "social_bio",
        }
    }
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business_profile" => Ok(EvidenceSource::BusinessProfile),
            "website" => Ok(EvidenceSource::Website),
            "social_bio" => Ok(EvidenceSource::SocialBio),
            other => Err(format!("unknown evidence source: {other}")),
        }
    }
}

/// Outcome of scanning one source for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceResult {
    pub source: EvidenceSource,
    /// Canonical vocabulary entries found.
    pub matched_keywords: BTreeSet<String>,
    /// Literal surface forms found (e.g. "naturally-leavened").
    #[serde(default)]
    pub matched_tokens: BTreeSet<String>,
    pub fetched_ok: bool,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl EvidenceResult {
    pub fn fetched(
        source: EvidenceSource,
        matched_keywords: BTreeSet<String>,
        matched_tokens: BTreeSet<String>,
    ) -> Self {
        Self {
            source,
            matched_keywords,
            matched_tokens,
            fetched_ok: true,
            failure_reason: None,
        }
    }

    pub fn not_fetched(source: EvidenceSource, reason: impl Into<String>) -> Self {
        Self {
            source,
            matched_keywords: BTreeSet::new(),
            matched_tokens: BTreeSet::new(),
            fetched_ok: false,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn has_matches(&self) -> bool {
        !self.matched_keywords.is_empty()
    }
}

// --- Decision ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDecision {
    pub verified: bool,
    pub keywords: BTreeSet<String>,
    pub sources: BTreeSet<EvidenceSource>,
}

impl VerificationDecision {
    /// Combine evidence. Order of `evidence` never affects the result.
    pub fn from_evidence<'a>(evidence: impl IntoIterator<Item = &'a EvidenceResult>) -> Self {
        let mut decision = Self::default();
        for result in evidence {
            decision.absorb(result);
        }
        decision
    }

    /// Fold one more result in. Only ever grows the decision.
    pub fn absorb(&mut self, result: &EvidenceResult) {
        if !result.has_matches() {
            return;
        }
        self.keywords.extend(result.matched_keywords.iter().cloned());
        self.sources.insert(result.source);
        self.verified = !self.keywords.is_empty();
    }

    pub fn merge(&mut self, other: &VerificationDecision) {
        self.keywords.extend(other.keywords.iter().cloned());
        self.sources.extend(other.sources.iter().copied());
        self.verified = self.verified || other.verified || !self.keywords.is_empty();
    }
}

// --- Persistence ---

/// A candidate plus its accumulated verification state, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: Uuid,
    pub identity_key: String,
    #[serde(flatten)]
    pub candidate: Candidate,
    pub verified: bool,
    pub keywords: BTreeSet<String>,
    pub sources: BTreeSet<EvidenceSource>,
    /// Evidence from the most recent check.
    #[serde(default)]
    pub evidence: Vec<EvidenceResult>,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn new(
        candidate: Candidate,
        decision: &VerificationDecision,
        evidence: Vec<EvidenceResult>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_key: candidate.identity_key().to_string(),
            candidate,
            verified: decision.verified,
            keywords: decision.keywords.clone(),
            sources: decision.sources.clone(),
            evidence,
            created_at: checked_at,
            last_checked_at: checked_at,
        }
    }

    pub fn decision(&self) -> VerificationDecision {
        VerificationDecision {
            verified: self.verified,
            keywords: self.keywords.clone(),
            sources: self.sources.clone(),
        }
    }

    /// Upsert semantics: sets only grow, `verified` never reverts, descriptive
    /// fields refresh, the check timestamp moves forward.
    pub fn apply_check(
        &mut self,
        candidate: &Candidate,
        decision: &VerificationDecision,
        evidence: Vec<EvidenceResult>,
        checked_at: DateTime<Utc>,
    ) {
        self.candidate.refresh_from(candidate);
        let mut merged = self.decision();
        merged.merge(decision);
        self.verified = merged.verified;
        self.keywords = merged.keywords;
        self.sources = merged.sources;
        self.evidence = evidence;
        if checked_at > self.last_checked_at {
            self.last_checked_at = checked_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn located(name: &str, lat: f64, lng: f64) -> Candidate {
        let mut c = Candidate::new(name, "", "Portland", "OR");
        c.latitude = Some(lat);
        c.longitude = Some(lng);
        c
    }

    #[test]
    fn nearby_coordinates_share_identity() {
        let a = located("Pizza A", 10.0001, 20.0001);
        let b = located("pizza  a!", 10.0, 20.0);
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn distant_coordinates_differ() {
        let a = located("Pizza A", 10.0, 20.0);
        let b = located("Pizza A", 10.01, 20.0);
        assert_ne!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn accents_fold_but_other_scripts_stay_distinct() {
        let plain = located("Pizzeria Uno", 35.0, 139.0);
        let accented = located("Pizzería Uno", 35.0, 139.0);
        assert_eq!(plain.identity_key(), accented.identity_key());

        let tokyo = located("東京ピザ", 35.0, 139.0);
        let osaka = located("大阪ピザ", 35.0, 139.0);
        assert_ne!(tokyo.identity_key(), osaka.identity_key());
        assert!(!tokyo.identity_key().to_string().starts_with("geo::"));
    }

    #[test]
    fn punctuation_only_name_keeps_raw_form() {
        let c = located(" *** ", 1.0, 2.0);
        assert_eq!(c.identity_key().to_string(), "geo:***:1000:2000");
    }

    #[test]
    fn neighbours_surround_geo_key() {
        let key = located("Pizza A", 10.0, 20.0).identity_key();
        let around = key.neighbours();
        assert_eq!(around.len(), 8);
        assert!(around.contains(&IdentityKey::Geo {
            name: "pizza a".into(),
            lat: 10001,
            lng: 19999,
        }));
        assert!(!around.contains(&key));
        assert!(Candidate::new("Pizza A", "1 Main St", "Portland", "OR")
            .identity_key()
            .neighbours()
            .is_empty());
    }

    #[test]
    fn coordinate_gap_respects_epsilon() {
        let a = located("Pizza A", 10.0004, 20.0);
        assert!(a.coordinate_gap(&located("Pizza A", 10.0006, 20.0)).is_some());
        assert!(a.coordinate_gap(&located("Pizza A", 10.0020, 20.0)).is_none());
        assert!(a
            .coordinate_gap(&Candidate::new("Pizza A", "", "Portland", "OR"))
            .is_none());
    }

    #[test]
    fn falls_back_to_name_and_address() {
        let a = Candidate::new("Pizza A", "1 Main St.", "Portland", "OR");
        let b = Candidate::new("PIZZA A", "1 main st", "Portland", "OR");
        assert_eq!(a.identity_key(), b.identity_key());
        assert_eq!(a.identity_key().to_string(), "addr:pizza a|1 main st");
    }

    #[test]
    fn absorb_keeps_first_seen_and_unions_categories() {
        let mut first = located("Pizza A", 10.0, 20.0);
        first.phone = Some("555-0100".into());
        first.categories = keywords(&["Pizza restaurant"]);

        let mut second = located("Pizza A", 10.0001, 20.0001);
        second.phone = Some("555-9999".into());
        second.website = Some("https://pizza-a.example".into());
        second.categories = keywords(&["Bakery"]);

        first.absorb(second);
        assert_eq!(first.phone.as_deref(), Some("555-0100"));
        assert_eq!(first.website.as_deref(), Some("https://pizza-a.example"));
        assert_eq!(first.latitude, Some(10.0));
        assert_eq!(first.categories, keywords(&["Bakery", "Pizza restaurant"]));
    }

    #[test]
    fn absorb_takes_coordinates_when_first_sighting_had_none() {
        let mut first = Candidate::new("Pizza A", "1 Main St", "Portland", "OR");
        let mut later = located("Pizza A", 45.52, -122.68);
        later.phone = Some("555-0100".into());
        later.website = Some("https://pizza-a.example".into());

        first.absorb(later);
        assert_eq!(first.coordinates(), Some((45.52, -122.68)));
        assert_eq!(first.website.as_deref(), Some("https://pizza-a.example"));
        assert_eq!(first.address, "1 Main St");
    }

    #[test]
    fn decision_is_monotonic() {
        let hit = EvidenceResult::fetched(
            EvidenceSource::Website,
            keywords(&["sourdough"]),
            keywords(&["sourdough"]),
        );
        let mut decision = VerificationDecision::from_evidence([&hit]);
        assert!(decision.verified);

        let miss = EvidenceResult::not_fetched(EvidenceSource::SocialBio, "404");
        decision.absorb(&miss);
        assert!(decision.verified);
        assert_eq!(decision.keywords.len(), 1);

        let more = EvidenceResult::fetched(
            EvidenceSource::BusinessProfile,
            keywords(&["wild yeast"]),
            keywords(&["wild yeast"]),
        );
        decision.absorb(&more);
        assert_eq!(decision.keywords, keywords(&["sourdough", "wild yeast"]));
        assert_eq!(
            decision.sources,
            [EvidenceSource::BusinessProfile, EvidenceSource::Website]
                .into_iter()
                .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn combination_is_order_independent() {
        let results = [
            EvidenceResult::fetched(
                EvidenceSource::BusinessProfile,
                keywords(&["sourdough"]),
                BTreeSet::new(),
            ),
            EvidenceResult::not_fetched(EvidenceSource::Website, "timeout"),
            EvidenceResult::fetched(
                EvidenceSource::SocialBio,
                keywords(&["naturally leavened"]),
                BTreeSet::new(),
            ),
        ];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        let expected = VerificationDecision::from_evidence(results.iter());
        for order in orders {
            let permuted = VerificationDecision::from_evidence(order.iter().map(|&i| &results[i]));
            assert_eq!(permuted, expected);
        }
    }

    #[test]
    fn fetched_without_matches_does_not_count_as_source() {
        let empty =
            EvidenceResult::fetched(EvidenceSource::Website, BTreeSet::new(), BTreeSet::new());
        let decision = VerificationDecision::from_evidence([&empty]);
        assert!(!decision.verified);
        assert!(decision.sources.is_empty());
    }

    #[test]
    fn apply_check_never_shrinks() {
        let candidate = located("Pizza A", 10.0, 20.0);
        let first = VerificationDecision {
            verified: true,
            keywords: keywords(&["sourdough"]),
            sources: [EvidenceSource::Website].into_iter().collect(),
        };
        let t0 = Utc::now();
        let mut record = PersistedRecord::new(candidate.clone(), &first, Vec::new(), t0);

        let later = t0 + chrono::Duration::hours(1);
        record.apply_check(&candidate, &VerificationDecision::default(), Vec::new(), later);

        assert!(record.verified);
        assert_eq!(record.keywords, keywords(&["sourdough"]));
        assert_eq!(record.last_checked_at, later);
        assert_eq!(record.created_at, t0);
    }

    #[test]
    fn evidence_source_round_trips_through_str() {
        for source in EvidenceSource::ALL {
            assert_eq!(source.as_str().parse::<EvidenceSource>(), Ok(source));
        }
    }
}
