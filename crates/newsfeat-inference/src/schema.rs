//! Validation gate for enrichment responses.
//!
//! A response either satisfies every rule here and becomes a typed
//! [`ExtractedFeatures`], or it is rejected with [`Error::Validation`]. Rejected
//! payloads are never persisted. Checks run in a fixed order: presence, types,
//! ranges, enums, institution entries, asset tokens.

use serde_json::{Map, Value};
use tracing::debug;

use newsfeat_core::{
    Asset, Error, ExpectationMatch, ExtractedFeatures, ImpactDirection, ImpactDuration,
    MarketDirection, Result, Sentiment, Tone, Urgency,
};

/// Every field the model must return.
pub const REQUIRED_FIELDS: [&str; 24] = [
    // Entities
    "unlu_isimler",
    "firmalar",
    "ulkeler",
    "kurumlar",
    // Classification
    "is_makroekonomi",
    "is_mikroekonomi",
    "alt_kategori",
    "guven_skoru_makro",
    // Event
    "olay_tipi",
    "etki_yonu",
    "etkilenen_varlik_sinifi",
    "piyasa_etki_tahmini",
    "etki_degeri_confidence",
    // Sentiment
    "duygu",
    "duygu_skoru",
    "ton",
    "aciliyet",
    // Surprise
    "surpriz_mi",
    "surpriz_confidence",
    // Temporal
    "etki_suresi",
    "gelecege_yonelik_mi",
    "gelecek_confidence",
    // Numeric
    "sayisal_degerler",
    "beklenti_karsilama",
];

const ARRAY_FIELDS: [&str; 5] = [
    "unlu_isimler",
    "firmalar",
    "ulkeler",
    "kurumlar",
    "etkilenen_varlik_sinifi",
];

const STRING_LIST_FIELDS: [&str; 3] = ["unlu_isimler", "firmalar", "ulkeler"];

const BOOLEAN_FIELDS: [&str; 4] = [
    "is_makroekonomi",
    "is_mikroekonomi",
    "surpriz_mi",
    "gelecege_yonelik_mi",
];

/// Scores that must lie in `[0, 1]`.
const SCORE_FIELDS: [&str; 5] = [
    "guven_skoru_makro",
    "duygu_skoru",
    "etki_degeri_confidence",
    "surpriz_confidence",
    "gelecek_confidence",
];

const STRING_FIELDS: [&str; 7] = [
    "olay_tipi",
    "etki_yonu",
    "duygu",
    "ton",
    "aciliyet",
    "etki_suresi",
    "beklenti_karsilama",
];

const OBJECT_FIELDS: [&str; 2] = ["piyasa_etki_tahmini", "sayisal_degerler"];

/// Highest valid `alt_kategori`.
pub const MAX_SUBCATEGORY: i64 = 13;

fn invalid(msg: impl Into<String>) -> Error {
    Error::Validation(msg.into())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Validate a decoded response and convert it to the typed record.
pub fn validate_features(value: &Value) -> Result<ExtractedFeatures> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid(format!("response must be an object, got {}", type_name(value))))?;

    check_presence(obj)?;
    check_types(obj)?;
    check_ranges(obj)?;
    check_enums(obj)?;
    check_institutions(obj)?;
    check_assets(obj)?;

    debug!(
        subsystem = "inference",
        component = "schema",
        "All validation checks passed"
    );

    serde_json::from_value(value.clone())
        .map_err(|e| invalid(format!("response does not match the feature record: {}", e)))
}

fn check_presence(obj: &Map<String, Value>) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| !obj.contains_key(*f))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(invalid(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

fn check_types(obj: &Map<String, Value>) -> Result<()> {
    for field in ARRAY_FIELDS {
        if !obj[field].is_array() {
            return Err(invalid(format!(
                "'{}' must be a list, got {}",
                field,
                type_name(&obj[field])
            )));
        }
    }
    for field in STRING_LIST_FIELDS {
        if let Some(i) = obj[field]
            .as_array()
            .and_then(|items| items.iter().position(|v| !v.is_string()))
        {
            return Err(invalid(format!("{}[{}] must be a string", field, i)));
        }
    }
    for field in BOOLEAN_FIELDS {
        if !obj[field].is_boolean() {
            return Err(invalid(format!(
                "'{}' must be a boolean, got {}",
                field,
                type_name(&obj[field])
            )));
        }
    }
    for field in SCORE_FIELDS {
        if !obj[field].is_number() {
            return Err(invalid(format!(
                "'{}' must be numeric, got {}",
                field,
                type_name(&obj[field])
            )));
        }
    }
    if !(obj["alt_kategori"].is_i64() || obj["alt_kategori"].is_u64()) {
        return Err(invalid(format!(
            "'alt_kategori' must be an integer, got {}",
            type_name(&obj["alt_kategori"])
        )));
    }
    for field in STRING_FIELDS {
        if !obj[field].is_string() {
            return Err(invalid(format!(
                "'{}' must be a string, got {}",
                field,
                type_name(&obj[field])
            )));
        }
    }
    for field in OBJECT_FIELDS {
        if !obj[field].is_object() {
            return Err(invalid(format!(
                "'{}' must be an object, got {}",
                field,
                type_name(&obj[field])
            )));
        }
    }
    Ok(())
}

fn check_ranges(obj: &Map<String, Value>) -> Result<()> {
    for field in SCORE_FIELDS {
        let score = obj[field].as_f64().unwrap_or(f64::NAN);
        if !(0.0..=1.0).contains(&score) {
            return Err(invalid(format!(
                "'{}' must be between 0.00 and 1.00, got {}",
                field, obj[field]
            )));
        }
    }
    let in_range = obj["alt_kategori"]
        .as_i64()
        .is_some_and(|c| (0..=MAX_SUBCATEGORY).contains(&c));
    if !in_range {
        return Err(invalid(format!(
            "'alt_kategori' must be between 0 and {}, got {}",
            MAX_SUBCATEGORY, obj["alt_kategori"]
        )));
    }
    Ok(())
}

fn check_enum(
    obj: &Map<String, Value>,
    field: &str,
    is_allowed: fn(&str) -> bool,
    allowed: Vec<&'static str>,
) -> Result<()> {
    let value = obj[field].as_str().unwrap_or_default();
    if is_allowed(value) {
        Ok(())
    } else {
        Err(invalid(format!(
            "'{}' must be one of {:?}, got '{}'",
            field, allowed, value
        )))
    }
}

fn check_enums(obj: &Map<String, Value>) -> Result<()> {
    check_enum(
        obj,
        "etki_yonu",
        |v| ImpactDirection::parse(v).is_some(),
        ImpactDirection::wire_values(),
    )?;
    check_enum(
        obj,
        "duygu",
        |v| Sentiment::parse(v).is_some(),
        Sentiment::wire_values(),
    )?;
    check_enum(obj, "ton", |v| Tone::parse(v).is_some(), Tone::wire_values())?;
    check_enum(
        obj,
        "aciliyet",
        |v| Urgency::parse(v).is_some(),
        Urgency::wire_values(),
    )?;
    check_enum(
        obj,
        "etki_suresi",
        |v| ImpactDuration::parse(v).is_some(),
        ImpactDuration::wire_values(),
    )?;
    check_enum(
        obj,
        "beklenti_karsilama",
        |v| ExpectationMatch::parse(v).is_some(),
        ExpectationMatch::wire_values(),
    )
}

fn check_institutions(obj: &Map<String, Value>) -> Result<()> {
    let entries = obj["kurumlar"].as_array().map(Vec::as_slice).unwrap_or_default();
    for (i, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            return Err(invalid(format!(
                "kurumlar[{}] must be an object, got {}",
                i,
                type_name(entry)
            )));
        };
        let (Some(name), Some(id)) = (entry.get("ad"), entry.get("id")) else {
            return Err(invalid(format!("kurumlar[{}] must contain 'ad' and 'id'", i)));
        };
        if !name.is_string() {
            return Err(invalid(format!("kurumlar[{}].ad must be a string", i)));
        }
        if !(id.is_i64() || id.is_u64()) {
            return Err(invalid(format!("kurumlar[{}].id must be an integer", i)));
        }
    }
    Ok(())
}

fn check_assets(obj: &Map<String, Value>) -> Result<()> {
    let allowed = Asset::wire_values();

    let listed = obj["etkilenen_varlik_sinifi"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();
    for asset in listed {
        if asset.as_str().and_then(Asset::parse).is_none() {
            return Err(invalid(format!(
                "invalid asset {} in 'etkilenen_varlik_sinifi', allowed: {:?}",
                asset, allowed
            )));
        }
    }

    if let Some(impact) = obj["piyasa_etki_tahmini"].as_object() {
        for (asset, direction) in impact {
            if Asset::parse(asset).is_none() {
                return Err(invalid(format!(
                    "invalid asset key '{}' in 'piyasa_etki_tahmini', allowed: {:?}",
                    asset, allowed
                )));
            }
            if direction.as_str().and_then(MarketDirection::parse).is_none() {
                return Err(invalid(format!(
                    "invalid value {} for 'piyasa_etki_tahmini[{}]', allowed: {:?}",
                    direction,
                    asset,
                    MarketDirection::wire_values()
                )));
            }
        }
    }
    Ok(())
}
