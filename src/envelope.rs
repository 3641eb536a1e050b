use serde::Serialize;

/// Uniform success/failure container returned by every operation in this crate.
///
/// A success carries its payload (possibly none, for unit actions) and no
/// message. A failure carries a descriptive message and no payload. Fields are
/// private; an envelope never changes after construction.
///
/// Serializes as `{"success": bool, "data": T | null, "message": string | null}`
/// so response renderers can emit it as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Envelope<T> {
    #[serde(rename = "success")]
    succeeded: bool,
    #[serde(rename = "data")]
    payload: Option<T>,
    message: Option<String>,
}

impl<T> Envelope<T> {
    /// Wraps a successful payload.
    pub fn success(payload: T) -> Self {
        Self {
            succeeded: true,
            payload: Some(payload),
            message: None,
        }
    }

    /// A success with nothing to return.
    pub fn empty() -> Self {
        Self {
            succeeded: true,
            payload: None,
            message: None,
        }
    }

    /// Wraps a failure description.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            payload: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.succeeded
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Maps the payload of a success, leaving failures untouched.
    pub fn map<U, F>(self, f: F) -> Envelope<U>
    where
        F: FnOnce(T) -> U,
    {
        Envelope {
            succeeded: self.succeeded,
            payload: self.payload.map(f),
            message: self.message,
        }
    }

    /// Converts into a `Result`, yielding the (optional) payload on success
    /// and the failure message otherwise.
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.succeeded {
            Ok(self.payload)
        } else {
            Err(self.message.unwrap_or_default())
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Renders the envelope as a JSON value.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Envelope<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(payload) => Self::success(payload),
            Err(err) => Self::failure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Envelope;

    #[test]
    fn success_has_payload_and_no_message() {
        let envelope = Envelope::success(7);
        assert!(envelope.is_success());
        assert_eq!(envelope.payload(), Some(&7));
        assert_eq!(envelope.message(), None);
    }

    #[test]
    fn failure_has_message_and_no_payload() {
        let envelope = Envelope::<u32>::failure("boom");
        assert!(!envelope.is_success());
        assert_eq!(envelope.payload(), None);
        assert_eq!(envelope.message(), Some("boom"));
        assert_eq!(envelope.into_result(), Err("boom".to_owned()));
    }

    #[test]
    fn empty_success_converts_to_ok_none() {
        assert_eq!(Envelope::<()>::empty().into_result(), Ok(None));
    }

    #[test]
    fn map_keeps_failure_message() {
        let mapped = Envelope::<u32>::failure("nope").map(|value| value * 2);
        assert_eq!(mapped.message(), Some("nope"));

        let mapped = Envelope::success(21).map(|value| value * 2);
        assert_eq!(mapped.payload(), Some(&42));
    }

    #[test]
    fn serializes_in_response_shape() {
        let value = Envelope::success("hi").to_json().expect("must serialize");
        assert_eq!(
            value,
            json!({ "success": true, "data": "hi", "message": null })
        );

        let value = Envelope::<String>::failure("bad").to_json().expect("must serialize");
        assert_eq!(
            value,
            json!({ "success": false, "data": null, "message": "bad" })
        );
    }

    #[test]
    fn from_result_uses_display_for_errors() {
        let envelope: Envelope<u8> = Err::<u8, _>("denied").into();
        assert_eq!(envelope.message(), Some("denied"));
    }
}
