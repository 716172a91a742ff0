//! Wire format of queued work items.

use lapin::types::{AMQPValue, FieldTable, ShortString};

use newsfeat_core::{Error, Result, WorkItem};

/// Header carrying the retry count of a work item.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";
/// Header carrying the article id of a work item.
pub const ARTICLE_ID_HEADER: &str = "x-article-id";
/// Content type of every published body.
pub const CONTENT_TYPE: &str = "application/json";
/// AMQP delivery mode for messages that survive a broker restart.
pub const PERSISTENT: u8 = 2;

/// Serialize a work item as the JSON message body.
pub fn encode(item: &WorkItem) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(item)?)
}

/// Decode a message body.
///
/// Anything that is not a JSON object with an integer `article_id` is
/// malformed and will never become processable.
pub fn decode(body: &[u8]) -> Result<WorkItem> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedMessage(e.to_string()))
}

/// Routing headers mirroring the body fields.
pub fn headers(item: &WorkItem) -> FieldTable {
    let mut table = FieldTable::default();
    table.insert(
        ShortString::from(RETRY_COUNT_HEADER),
        AMQPValue::LongLongInt(i64::from(item.retry_count)),
    );
    table.insert(
        ShortString::from(ARTICLE_ID_HEADER),
        AMQPValue::LongLongInt(item.article_id),
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_fields() {
        let item = WorkItem::new(42, 2);
        let body: serde_json::Value = serde_json::from_slice(&encode(&item).unwrap()).unwrap();

        assert_eq!(body["article_id"], 42);
        assert_eq!(body["retry_count"], 2);
        assert!(body["timestamp"].is_string());
        assert!(body["enqueued_at"].is_string());
    }

    #[test]
    fn test_decode_defaults_retry_count() {
        let item = decode(br#"{"article_id": 7}"#).unwrap();
        assert_eq!(item.article_id, 7);
        assert_eq!(item.retry_count, 0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for body in [
            &b"not json"[..],
            br#"{"retry_count": 1}"#,
            br#"{"article_id": "abc"}"#,
            br#"{"article_id": 1, "retry_count": -1}"#,
            b"",
        ] {
            let err = decode(body).unwrap_err();
            assert!(matches!(err, Error::MalformedMessage(_)), "{:?}", body);
        }
    }

    #[test]
    fn test_headers_mirror_body() {
        let table = headers(&WorkItem::new(123, 3));
        let inner = table.inner();

        assert_eq!(
            inner.get(&ShortString::from(RETRY_COUNT_HEADER)),
            Some(&AMQPValue::LongLongInt(3))
        );
        assert_eq!(
            inner.get(&ShortString::from(ARTICLE_ID_HEADER)),
            Some(&AMQPValue::LongLongInt(123))
        );
    }
}
