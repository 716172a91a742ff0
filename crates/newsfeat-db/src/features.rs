//! Extracted feature repository implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use tracing::info;

use newsfeat_core::{
    ArticleId, ArticleStatus, Asset, CreateFeaturesRequest, Error, ExpectationMatch,
    ExtractedFeatures, FeatureRepository, ImpactDirection, ImpactDuration, Institution,
    MarketDirection, Result, Sentiment, StoredFeatures, Tone, Urgency,
};

use crate::pool::SharedPool;

/// Columns written for one extraction, in bind order.
const INSERT_COLUMNS: [&str; 28] = [
    "article_id",
    "unlu_isimler",
    "firmalar",
    "ulkeler",
    "kurumlar",
    "is_makroekonomi",
    "is_mikroekonomi",
    "alt_kategori",
    "guven_skoru_makro",
    "olay_tipi",
    "etki_yonu",
    "etkilenen_varlik_sinifi",
    "piyasa_etki_tahmini",
    "etki_degeri_confidence",
    "duygu",
    "duygu_skoru",
    "ton",
    "aciliyet",
    "surpriz_mi",
    "surpriz_confidence",
    "etki_suresi",
    "gelecege_yonelik_mi",
    "gelecek_confidence",
    "sayisal_degerler",
    "beklenti_karsilama",
    "extraction_date",
    "model_version",
    "processing_time_ms",
];

/// `INSERT ... RETURNING id` with one placeholder per entry of [`INSERT_COLUMNS`].
fn insert_sql() -> String {
    let placeholders = (1..=INSERT_COLUMNS.len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO extracted_features ({}) VALUES ({}) RETURNING id",
        INSERT_COLUMNS.join(", "),
        placeholders
    )
}

/// PostgreSQL implementation of FeatureRepository over `extracted_features`.
///
/// Inserts are not retried here. A failed insert fails the unit of work and
/// the queue decides whether it runs again.
pub struct PgFeatureRepository {
    pool: Arc<SharedPool>,
}

impl PgFeatureRepository {
    pub fn new(pool: Arc<SharedPool>) -> Self {
        Self { pool }
    }

    fn parse_column<T>(
        row: &PgRow,
        column: &str,
        parse: fn(&str) -> Option<T>,
    ) -> Result<T> {
        let raw: String = row.get(column);
        parse(&raw).ok_or_else(|| {
            Error::Internal(format!("unexpected value {:?} in column {}", raw, column))
        })
    }

    fn row_to_stored(row: &PgRow) -> Result<StoredFeatures> {
        let assets: Vec<String> = row.get("etkilenen_varlik_sinifi");
        let affected_assets = assets
            .iter()
            .map(|a| {
                Asset::parse(a)
                    .ok_or_else(|| Error::Internal(format!("unexpected asset {:?}", a)))
            })
            .collect::<Result<Vec<_>>>()?;

        let Json(institutions): Json<Vec<Institution>> = row.get("kurumlar");
        let Json(market_impact): Json<BTreeMap<Asset, MarketDirection>> =
            row.get("piyasa_etki_tahmini");
        let Json(numeric_values): Json<serde_json::Map<String, serde_json::Value>> =
            row.get("sayisal_degerler");

        let features = ExtractedFeatures {
            notable_people: row.get("unlu_isimler"),
            companies: row.get("firmalar"),
            countries: row.get("ulkeler"),
            institutions,
            is_macroeconomic: row.get("is_makroekonomi"),
            is_microeconomic: row.get("is_mikroekonomi"),
            subcategory: row.get::<i16, _>("alt_kategori") as u8,
            macro_confidence: row.get("guven_skoru_makro"),
            event_type: row.get("olay_tipi"),
            impact_direction: Self::parse_column(row, "etki_yonu", ImpactDirection::parse)?,
            affected_assets,
            market_impact,
            impact_confidence: row.get("etki_degeri_confidence"),
            sentiment: Self::parse_column(row, "duygu", Sentiment::parse)?,
            sentiment_score: row.get("duygu_skoru"),
            tone: Self::parse_column(row, "ton", Tone::parse)?,
            urgency: Self::parse_column(row, "aciliyet", Urgency::parse)?,
            is_surprise: row.get("surpriz_mi"),
            surprise_confidence: row.get("surpriz_confidence"),
            impact_duration: Self::parse_column(row, "etki_suresi", ImpactDuration::parse)?,
            is_forward_looking: row.get("gelecege_yonelik_mi"),
            forward_confidence: row.get("gelecek_confidence"),
            numeric_values,
            expectation_match: Self::parse_column(
                row,
                "beklenti_karsilama",
                ExpectationMatch::parse,
            )?,
        };

        Ok(StoredFeatures {
            id: row.get("id"),
            article_id: row.get("article_id"),
            features,
            extraction_date: row.get("extraction_date"),
            model_version: row.get("model_version"),
            processing_time_ms: row.get("processing_time_ms"),
        })
    }
}

#[async_trait]
impl FeatureRepository for PgFeatureRepository {
    async fn insert_with_status(&self, req: CreateFeaturesRequest) -> Result<i64> {
        let pool = self.pool.get().await?;
        let f = &req.features;

        let mut tx = pool.begin().await?;

        let sql = insert_sql();
        let id: i64 = sqlx::query_scalar(&sql)
            .bind(req.article_id)
            .bind(&f.notable_people)
            .bind(&f.companies)
            .bind(&f.countries)
            .bind(Json(&f.institutions))
            .bind(f.is_macroeconomic)
            .bind(f.is_microeconomic)
            .bind(f.subcategory as i16)
            .bind(f.macro_confidence)
            .bind(&f.event_type)
            .bind(f.impact_direction.as_str())
            .bind(f.affected_asset_names())
            .bind(Json(&f.market_impact))
            .bind(f.impact_confidence)
            .bind(f.sentiment.as_str())
            .bind(f.sentiment_score)
            .bind(f.tone.as_str())
            .bind(f.urgency.as_str())
            .bind(f.is_surprise)
            .bind(f.surprise_confidence)
            .bind(f.impact_duration.as_str())
            .bind(f.is_forward_looking)
            .bind(f.forward_confidence)
            .bind(Json(&f.numeric_values))
            .bind(f.expectation_match.as_str())
            .bind(req.extraction_date)
            .bind(&req.model_version)
            .bind(req.processing_time_ms)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE news SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(ArticleStatus::Success.as_str())
            .bind(req.article_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            subsystem = "database",
            component = "features",
            op = "insert",
            article_id = req.article_id,
            feature_id = id,
            processing_time_ms = req.processing_time_ms,
            "Features saved"
        );
        Ok(id)
    }

    async fn list_for_article(&self, article_id: ArticleId) -> Result<Vec<StoredFeatures>> {
        let pool = self.pool.get().await?;

        let rows = sqlx::query(
            r#"
            SELECT *
            FROM extracted_features
            WHERE article_id = $1
            ORDER BY extraction_date ASC, id ASC
            "#,
        )
        .bind(article_id)
        .fetch_all(pool.as_ref())
        .await?;

        rows.iter().map(Self::row_to_stored).collect()
    }
}
