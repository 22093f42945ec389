//! Wire message forms, `spec.md` §4.F:
//!
//! Request:      `{ "id": <string|null>, "method": "<name>", "params": <array> }`
//! Response:     `{ "id": <string>, "result": <value|null>, "error": <value|null> }`
//!
//! A request with a `null` id is a notification: no response is ever
//! sent for it, and on the inbound side it is dispatched with
//! invocation handle `0` rather than a freshly-minted one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The wire-level request/notification form. `id` is `None` exactly
/// when the message is a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RequestMessage {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// The wire-level response form. Exactly one of `result`/`error` is
/// non-null on a well-formed response; [`ResponseMessage::outcome`]
/// turns that convention into a typed `Result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ResponseMessage {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: Value) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// The completion outcome implied by which of `result`/`error` is
    /// present. Both-present and neither-present are protocol errors —
    /// `spec.md` §4.F: "if both or neither are present, the outbound
    /// call completes with a protocol error instead".
    pub fn outcome(&self) -> Result<&Value, ResponseShape> {
        match (&self.result, &self.error) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(ResponseShape::Error(error)),
            (None, None) => Err(ResponseShape::Empty),
            (Some(_), Some(_)) => Err(ResponseShape::Both),
        }
    }
}

#[derive(Debug)]
pub enum ResponseShape<'a> {
    Error(&'a Value),
    Empty,
    Both,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_with_null_id_is_a_notification() {
        let req: RequestMessage = serde_json::from_value(json!({
            "id": null,
            "method": "ping",
            "params": []
        }))
        .unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn response_with_only_result_is_success_outcome() {
        let resp = ResponseMessage::success("1", json!(42));
        assert_eq!(resp.outcome().unwrap(), &json!(42));
    }

    #[test]
    fn response_with_neither_field_is_empty_shape() {
        let resp = ResponseMessage {
            id: "1".into(),
            result: None,
            error: None,
        };
        assert!(matches!(resp.outcome(), Err(ResponseShape::Empty)));
    }

    #[test]
    fn response_with_both_fields_is_both_shape() {
        let resp = ResponseMessage {
            id: "1".into(),
            result: Some(json!(1)),
            error: Some(json!("boom")),
        };
        assert!(matches!(resp.outcome(), Err(ResponseShape::Both)));
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    fn arbitrary_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            any::<String>().prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 16, 8, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::vec((any::<String>(), inner), 0..4)
                    .prop_map(|pairs| Value::Object(pairs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        /// `spec.md` §8's JSON-RPC round-trip property: serializing then
        /// parsing a well-formed request reproduces `id`, `method`, and
        /// `params` exactly, whatever shape `params` takes.
        #[test]
        fn request_round_trips_id_method_and_params(
            id in proptest::option::of(any::<String>()),
            method in "[a-zA-Z_][a-zA-Z0-9_.]{0,31}",
            params in arbitrary_json(),
        ) {
            let original = RequestMessage { id: id.clone(), method: method.clone(), params: params.clone() };
            let bytes = serde_json::to_vec(&original).unwrap();
            let parsed: RequestMessage = serde_json::from_slice(&bytes).unwrap();

            prop_assert_eq!(parsed.id, id);
            prop_assert_eq!(parsed.method, method);
            prop_assert_eq!(parsed.params, params);
        }

        /// Same property for the response side, keyed on whichever of
        /// `result`/`error` is present.
        #[test]
        fn response_round_trips_id_and_outcome(
            id in any::<String>(),
            result in proptest::option::of(arbitrary_json()),
        ) {
            let original = match result.clone() {
                Some(value) => ResponseMessage::success(id.clone(), value),
                None => ResponseMessage::failure(id.clone(), json!("boom")),
            };
            let bytes = serde_json::to_vec(&original).unwrap();
            let parsed: ResponseMessage = serde_json::from_slice(&bytes).unwrap();

            prop_assert_eq!(parsed.id, id);
            match result {
                Some(value) => prop_assert_eq!(parsed.outcome().ok().cloned(), Some(value)),
                None => prop_assert!(matches!(parsed.outcome(), Err(ResponseShape::Error(_)))),
            }
        }
    }
}
