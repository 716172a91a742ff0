//! Domain models shared across the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key of a row in the externally owned `news` table.
pub type ArticleId = i64;

// =============================================================================
// ARTICLES
// =============================================================================

/// A news article as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub content: String,
    pub source: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
}

/// Processing status of an article, written by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    /// Published to the work queue
    Queued,
    /// A worker picked it up
    Processing,
    /// Features stored
    Success,
    /// Last attempt failed
    Failed,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// WORK ITEMS
// =============================================================================

/// Unit of work carried on the queue. Exists only on the wire.
///
/// `retry_count` never decreases across republish cycles and is bounded by
/// the configured maximum. The timestamps are informational and are not
/// interpreted by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub article_id: ArticleId,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub enqueued_at: String,
}

impl WorkItem {
    /// Create a work item stamped with the current time.
    pub fn new(article_id: ArticleId, retry_count: u32) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            article_id,
            retry_count,
            timestamp: now.clone(),
            enqueued_at: now,
        }
    }
}

// =============================================================================
// EXTRACTED FEATURES
// =============================================================================

/// Declares a closed string vocabulary used by the extraction schema.
macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            /// Every accepted value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            /// Look up a value by its wire spelling.
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($wire => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Wire spellings of every accepted value.
            pub fn wire_values() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary! {
    /// Expected direction of the news impact (`etki_yonu`).
    pub enum ImpactDirection {
        Positive => "pozitif",
        Negative => "negatif",
        Neutral => "notr",
    }
}

vocabulary! {
    /// Overall sentiment (`duygu`).
    pub enum Sentiment {
        Positive => "pozitif",
        Negative => "negatif",
        NeutralPositive => "notr_pozitif",
        NeutralNegative => "notr_negatif",
        Neutral => "notr",
    }
}

vocabulary! {
    /// Register of the text (`ton`).
    pub enum Tone {
        Formal => "resmi",
        Technical => "teknik",
        Popular => "populer",
        Unclear => "belirsiz",
    }
}

vocabulary! {
    /// Urgency of the news (`aciliyet`).
    pub enum Urgency {
        High => "yuksek",
        Medium => "orta",
        Low => "dusuk",
    }
}

vocabulary! {
    /// Expected duration of the impact (`etki_suresi`).
    pub enum ImpactDuration {
        ShortTerm => "kisa_vadeli",
        LongTerm => "uzun_vadeli",
        Unclear => "belirsiz",
    }
}

vocabulary! {
    /// How the reported figures compare to expectations (`beklenti_karsilama`).
    pub enum ExpectationMatch {
        Above => "ustunde",
        Below => "altinda",
        AsExpected => "beklendiği_gibi",
        Unclear => "belirsiz",
    }
}

vocabulary! {
    /// Asset classes the model may reference.
    pub enum Asset {
        Lira => "TL",
        Bist100 => "BIST100",
        UsdTry => "USDTRY",
        EurTry => "EURTRY",
        Gold => "ALTIN",
        Brent => "BRENT",
        Bonds => "tahvil",
    }
}

vocabulary! {
    /// Predicted move of an asset (`piyasa_etki_tahmini` values).
    pub enum MarketDirection {
        Strengthen => "guclenme",
        Weaken => "zayiflama",
        Stable => "stabil",
        Positive => "pozitif",
        Negative => "negatif",
    }
}

/// An institution mentioned in the article, with its catalogue id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    #[serde(rename = "ad")]
    pub name: String,
    pub id: i64,
}

/// Validated output of one enrichment call.
///
/// Field names on the wire and in storage are the model's schema names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFeatures {
    // Entities
    #[serde(rename = "unlu_isimler")]
    pub notable_people: Vec<String>,
    #[serde(rename = "firmalar")]
    pub companies: Vec<String>,
    #[serde(rename = "ulkeler")]
    pub countries: Vec<String>,
    #[serde(rename = "kurumlar")]
    pub institutions: Vec<Institution>,

    // Classification
    #[serde(rename = "is_makroekonomi")]
    pub is_macroeconomic: bool,
    #[serde(rename = "is_mikroekonomi")]
    pub is_microeconomic: bool,
    #[serde(rename = "alt_kategori")]
    pub subcategory: u8,
    #[serde(rename = "guven_skoru_makro")]
    pub macro_confidence: f64,

    // Event
    #[serde(rename = "olay_tipi")]
    pub event_type: String,
    #[serde(rename = "etki_yonu")]
    pub impact_direction: ImpactDirection,
    #[serde(rename = "etkilenen_varlik_sinifi")]
    pub affected_assets: Vec<Asset>,
    #[serde(rename = "piyasa_etki_tahmini")]
    pub market_impact: BTreeMap<Asset, MarketDirection>,
    #[serde(rename = "etki_degeri_confidence")]
    pub impact_confidence: f64,

    // Sentiment
    #[serde(rename = "duygu")]
    pub sentiment: Sentiment,
    #[serde(rename = "duygu_skoru")]
    pub sentiment_score: f64,
    #[serde(rename = "ton")]
    pub tone: Tone,
    #[serde(rename = "aciliyet")]
    pub urgency: Urgency,

    // Surprise
    #[serde(rename = "surpriz_mi")]
    pub is_surprise: bool,
    #[serde(rename = "surpriz_confidence")]
    pub surprise_confidence: f64,

    // Temporal
    #[serde(rename = "etki_suresi")]
    pub impact_duration: ImpactDuration,
    #[serde(rename = "gelecege_yonelik_mi")]
    pub is_forward_looking: bool,
    #[serde(rename = "gelecek_confidence")]
    pub forward_confidence: f64,

    // Numeric
    #[serde(rename = "sayisal_degerler")]
    pub numeric_values: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "beklenti_karsilama")]
    pub expectation_match: ExpectationMatch,
}

impl ExtractedFeatures {
    /// Asset tokens as plain strings, for array columns.
    pub fn affected_asset_names(&self) -> Vec<String> {
        self.affected_assets
            .iter()
            .map(|a| a.as_str().to_string())
            .collect()
    }
}

/// A persisted extraction record. Append-only; never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFeatures {
    pub id: i64,
    pub article_id: ArticleId,
    pub features: ExtractedFeatures,
    pub extraction_date: DateTime<Utc>,
    pub model_version: String,
    pub processing_time_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_features_json() -> serde_json::Value {
        json!({
            "unlu_isimler": [],
            "firmalar": [],
            "ulkeler": ["Türkiye"],
            "kurumlar": [{"ad": "TCMB", "id": 1}],
            "is_makroekonomi": true,
            "is_mikroekonomi": false,
            "alt_kategori": 0,
            "guven_skoru_makro": 0.95,
            "olay_tipi": "faiz_degisikligi",
            "etki_yonu": "notr",
            "etkilenen_varlik_sinifi": ["TL", "tahvil"],
            "piyasa_etki_tahmini": {"TL": "stabil", "BIST100": "pozitif"},
            "etki_degeri_confidence": 0.7,
            "duygu": "notr",
            "duygu_skoru": 0.5,
            "ton": "resmi",
            "aciliyet": "yuksek",
            "surpriz_mi": false,
            "surpriz_confidence": 0.8,
            "etki_suresi": "kisa_vadeli",
            "gelecege_yonelik_mi": true,
            "gelecek_confidence": 0.6,
            "sayisal_degerler": {"politika_faizi": 50},
            "beklenti_karsilama": "beklendiği_gibi"
        })
    }

    #[test]
    fn test_article_status_as_str() {
        assert_eq!(ArticleStatus::Queued.as_str(), "queued");
        assert_eq!(ArticleStatus::Processing.to_string(), "processing");
        assert_eq!(ArticleStatus::Success.as_str(), "success");
        assert_eq!(ArticleStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_work_item_defaults_missing_retry_count() {
        let item: WorkItem = serde_json::from_str(r#"{"article_id": 42}"#).unwrap();
        assert_eq!(item.article_id, 42);
        assert_eq!(item.retry_count, 0);
    }

    #[test]
    fn test_work_item_new_stamps_both_timestamps() {
        let item = WorkItem::new(7, 2);
        assert_eq!(item.retry_count, 2);
        assert!(!item.timestamp.is_empty());
        assert_eq!(item.timestamp, item.enqueued_at);
        assert!(DateTime::parse_from_rfc3339(&item.timestamp).is_ok());
    }

    #[test]
    fn test_vocabulary_parse_and_display() {
        assert_eq!(Asset::parse("tahvil"), Some(Asset::Bonds));
        assert_eq!(Asset::parse("tahvİl"), None);
        assert_eq!(Asset::UsdTry.to_string(), "USDTRY");
        assert_eq!(
            ExpectationMatch::parse("beklendiği_gibi"),
            Some(ExpectationMatch::AsExpected)
        );
        assert_eq!(Sentiment::ALL.len(), 5);
        assert_eq!(MarketDirection::wire_values().len(), 5);
    }

    #[test]
    fn test_extracted_features_deserialize_schema_names() {
        let features: ExtractedFeatures =
            serde_json::from_value(sample_features_json()).unwrap();
        assert_eq!(features.subcategory, 0);
        assert_eq!(features.event_type, "faiz_degisikligi");
        assert_eq!(features.institutions[0].name, "TCMB");
        assert_eq!(
            features.market_impact.get(&Asset::Lira),
            Some(&MarketDirection::Stable)
        );
        assert_eq!(features.expectation_match, ExpectationMatch::AsExpected);
        assert_eq!(features.affected_asset_names(), vec!["TL", "tahvil"]);
    }

    #[test]
    fn test_extracted_features_serializes_back_to_schema_names() {
        let features: ExtractedFeatures =
            serde_json::from_value(sample_features_json()).unwrap();
        let value = serde_json::to_value(&features).unwrap();
        assert_eq!(value["kurumlar"][0]["ad"], "TCMB");
        assert_eq!(value["piyasa_etki_tahmini"]["BIST100"], "pozitif");
        assert_eq!(value["beklenti_karsilama"], "beklendiği_gibi");
    }
}
