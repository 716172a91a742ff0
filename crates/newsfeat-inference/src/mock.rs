//! Mock extractor for deterministic testing.
//!
//! ```rust,ignore
//! use newsfeat_inference::mock::{rate_decision_features, MockExtractor};
//!
//! let extractor = MockExtractor::new().with_response(rate_decision_features());
//! let features = extractor.extract_features("body", "title").await?;
//! assert_eq!(extractor.calls().len(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use newsfeat_core::{Error, ExtractedFeatures, FailureKind, FeatureExtractor, Result};

/// What the mock does on one call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed(ExtractedFeatures),
    Fail(FailureKind),
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub title: String,
    pub text: String,
}

/// Extractor returning scripted outcomes in order, then the default.
#[derive(Clone)]
pub struct MockExtractor {
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    default: MockOutcome,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    /// Mock that succeeds with [`rate_decision_features`] by default.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            default: MockOutcome::Succeed(rate_decision_features()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the default successful response.
    pub fn with_response(mut self, features: ExtractedFeatures) -> Self {
        self.default = MockOutcome::Succeed(features);
        self
    }

    /// Fail every unscripted call with an error of the given kind.
    pub fn failing(mut self, kind: FailureKind) -> Self {
        self.default = MockOutcome::Fail(kind);
        self
    }

    /// Queue a one-off outcome ahead of the default.
    pub fn then(self, outcome: MockOutcome) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// An error of the requested kind, as the real client would produce it.
pub fn error_of_kind(kind: FailureKind) -> Error {
    match kind {
        FailureKind::Connection => Error::Connection("mock: connection refused".into()),
        FailureKind::Authentication => Error::Authentication("mock: invalid API key".into()),
        FailureKind::Validation => Error::Validation("mock: 'duygu' invalid".into()),
        FailureKind::TransientApi => Error::Api {
            status: 503,
            message: "mock: unavailable".into(),
        },
        FailureKind::RejectedApi => Error::Api {
            status: 400,
            message: "mock: bad request".into(),
        },
        FailureKind::UnrecoverableMessage => Error::MalformedMessage("mock".into()),
        FailureKind::NotFound => Error::NotFound("mock".into()),
        FailureKind::Configuration => Error::Config("mock".into()),
        FailureKind::Internal => Error::Internal("mock".into()),
    }
}

#[async_trait]
impl FeatureExtractor for MockExtractor {
    async fn extract_features(&self, text: &str, title: &str) -> Result<ExtractedFeatures> {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(MockCall {
                title: title.to_string(),
                text: text.to_string(),
            });
        }

        let outcome = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.default.clone());

        match outcome {
            MockOutcome::Succeed(features) => Ok(features),
            MockOutcome::Fail(kind) => Err(error_of_kind(kind)),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Schema-valid response for a central bank holding its policy rate.
pub fn rate_decision_json() -> serde_json::Value {
    json!({
        "unlu_isimler": [],
        "firmalar": [],
        "ulkeler": ["Türkiye"],
        "kurumlar": [{"ad": "TCMB", "id": 1001}],
        "is_makroekonomi": true,
        "is_mikroekonomi": false,
        "alt_kategori": 0,
        "guven_skoru_makro": 0.9,
        "olay_tipi": "faiz_degisikligi",
        "etki_yonu": "notr",
        "etkilenen_varlik_sinifi": ["TL"],
        "piyasa_etki_tahmini": {"TL": "stabil"},
        "etki_degeri_confidence": 0.5,
        "duygu": "notr",
        "duygu_skoru": 0.5,
        "ton": "resmi",
        "aciliyet": "yuksek",
        "surpriz_mi": false,
        "surpriz_confidence": 0.8,
        "etki_suresi": "kisa_vadeli",
        "gelecege_yonelik_mi": false,
        "gelecek_confidence": 0.3,
        "sayisal_degerler": {"politika_faizi": 50},
        "beklenti_karsilama": "beklendiği_gibi"
    })
}

/// [`rate_decision_json`] as a typed record.
pub fn rate_decision_features() -> ExtractedFeatures {
    crate::schema::validate_features(&rate_decision_json())
        .unwrap_or_else(|e| panic!("canned response must validate: {}", e))
}
