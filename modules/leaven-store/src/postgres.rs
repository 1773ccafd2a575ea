// Postgres persistence for restaurant records.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use leaven_common::{
    Candidate, EvidenceResult, EvidenceSource, PersistedRecord, VerificationDecision,
};

use crate::error::Result;
use crate::{RecordFilter, RecordStore};

pub struct PgStore {
    pool: PgPool,
}

/// A row from the restaurants table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    identity_key: String,
    name: String,
    address: String,
    city: String,
    state: String,
    zip_code: Option<String>,
    phone: Option<String>,
    website: Option<String>,
    rating: Option<f64>,
    review_count: Option<i32>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    raw_description: Option<String>,
    categories: Vec<String>,
    verified: bool,
    keywords: Vec<String>,
    sources: Vec<String>,
    evidence: Json<Vec<EvidenceResult>>,
    created_at: DateTime<Utc>,
    last_checked_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> PersistedRecord {
        let sources: BTreeSet<EvidenceSource> = self
            .sources
            .iter()
            .filter_map(|s| match s.parse() {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!(id = %self.id, error = %e, "Ignoring unknown evidence source");
                    None
                }
            })
            .collect();

        PersistedRecord {
            id: self.id,
            identity_key: self.identity_key,
            candidate: Candidate {
                name: self.name,
                address: self.address,
                city: self.city,
                state: self.state,
                zip_code: self.zip_code,
                phone: self.phone,
                website: self.website,
                rating: self.rating,
                review_count: self.review_count.and_then(|n| u32::try_from(n).ok()),
                latitude: self.latitude,
                longitude: self.longitude,
                raw_description: self.raw_description,
                categories: self.categories.into_iter().collect(),
            },
            verified: self.verified,
            keywords: self.keywords.into_iter().collect(),
            sources,
            evidence: self.evidence.0,
            created_at: self.created_at,
            last_checked_at: self.last_checked_at,
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        info!("Connected to Postgres");
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const UPSERT_SQL: &str = r#"
    INSERT INTO restaurants
        (id, identity_key, name, address, city, state, zip_code, phone, website,
         rating, review_count, latitude, longitude, raw_description, categories,
         verified, keywords, sources, evidence, created_at, last_checked_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
            $16, $17, $18, $19, $20, $20)
    ON CONFLICT (identity_key) DO UPDATE SET
        name            = EXCLUDED.name,
        address         = CASE WHEN EXCLUDED.address <> '' THEN EXCLUDED.address ELSE restaurants.address END,
        city            = CASE WHEN EXCLUDED.city <> '' THEN EXCLUDED.city ELSE restaurants.city END,
        state           = CASE WHEN EXCLUDED.state <> '' THEN EXCLUDED.state ELSE restaurants.state END,
        zip_code        = COALESCE(EXCLUDED.zip_code, restaurants.zip_code),
        phone           = COALESCE(EXCLUDED.phone, restaurants.phone),
        website         = COALESCE(EXCLUDED.website, restaurants.website),
        rating          = COALESCE(EXCLUDED.rating, restaurants.rating),
        review_count    = COALESCE(EXCLUDED.review_count, restaurants.review_count),
        latitude        = COALESCE(EXCLUDED.latitude, restaurants.latitude),
        longitude       = COALESCE(EXCLUDED.longitude, restaurants.longitude),
        raw_description = COALESCE(EXCLUDED.raw_description, restaurants.raw_description),
        categories      = ARRAY(SELECT DISTINCT c FROM unnest(restaurants.categories || EXCLUDED.categories) AS c ORDER BY c),
        verified        = restaurants.verified OR EXCLUDED.verified,
        keywords        = ARRAY(SELECT DISTINCT k FROM unnest(restaurants.keywords || EXCLUDED.keywords) AS k ORDER BY k),
        sources         = ARRAY(SELECT DISTINCT s FROM unnest(restaurants.sources || EXCLUDED.sources) AS s ORDER BY s),
        evidence        = EXCLUDED.evidence,
        last_checked_at = GREATEST(restaurants.last_checked_at, EXCLUDED.last_checked_at)
    RETURNING *
"#;

#[async_trait]
impl RecordStore for PgStore {
    async fn upsert(
        &self,
        candidate: &Candidate,
        decision: &VerificationDecision,
        evidence: &[EvidenceResult],
        checked_at: DateTime<Utc>,
    ) -> Result<PersistedRecord> {
        let identity_key = candidate.identity_key().to_string();
        let categories: Vec<String> = candidate.categories.iter().cloned().collect();
        let keywords: Vec<String> = decision.keywords.iter().cloned().collect();
        let sources: Vec<String> = decision
            .sources
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let review_count = candidate
            .review_count
            .map(|n| i32::try_from(n).unwrap_or(i32::MAX));

        let row = sqlx::query_as::<_, RecordRow>(UPSERT_SQL)
            .bind(Uuid::new_v4())
            .bind(&identity_key)
            .bind(&candidate.name)
            .bind(&candidate.address)
            .bind(&candidate.city)
            .bind(&candidate.state)
            .bind(&candidate.zip_code)
            .bind(&candidate.phone)
            .bind(&candidate.website)
            .bind(candidate.rating)
            .bind(review_count)
            .bind(candidate.latitude)
            .bind(candidate.longitude)
            .bind(&candidate.raw_description)
            .bind(&categories)
            .bind(decision.verified)
            .bind(&keywords)
            .bind(&sources)
            .bind(Json(evidence))
            .bind(checked_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into_record())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PersistedRecord>> {
        let row = sqlx::query_as::<_, RecordRow>("SELECT * FROM restaurants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(RecordRow::into_record))
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<PersistedRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT * FROM restaurants
            WHERE ($1::text IS NULL OR lower(city) = lower(trim($1)))
              AND ($2::text IS NULL OR lower(state) = lower(trim($2)))
              AND (NOT $3 OR verified)
            ORDER BY name ASC
            LIMIT $4
            "#,
        )
        .bind(&filter.city)
        .bind(&filter.state)
        .bind(filter.verified_only)
        .bind(i64::from(filter.effective_limit()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RecordRow::into_record).collect())
    }
}
