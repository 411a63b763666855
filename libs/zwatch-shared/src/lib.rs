use serde::{Deserialize, Serialize};

pub mod protocol {
    use super::*;

    /// Issuer value reported when no issuer could be observed.
    pub const UNKNOWN_ISSUER: &str = "N/A";

    /// One inbound frame from the browser. Unknown members are ignored.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CheckRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub hostname: Option<String>,
    }

    /// One outbound frame. Exactly one of `issuer`/`error` is present:
    /// a verdict always carries an issuer (possibly [`UNKNOWN_ISSUER`]),
    /// a rejected request carries an error message instead.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct CheckResponse {
        pub intercepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub issuer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
    }

    impl CheckResponse {
        pub fn verdict(intercepted: bool, issuer: impl Into<String>) -> Self {
            Self {
                intercepted,
                issuer: Some(issuer.into()),
                error: None,
            }
        }

        pub fn rejected(message: impl Into<String>) -> Self {
            Self {
                intercepted: false,
                issuer: None,
                error: Some(message.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::protocol::*;

    #[test]
    fn verdict_omits_error_member() {
        let value = serde_json::to_value(CheckResponse::verdict(true, "Zscaler Root CA")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"intercepted": true, "issuer": "Zscaler Root CA"})
        );
    }

    #[test]
    fn rejection_omits_issuer_member() {
        let value = serde_json::to_value(CheckResponse::rejected("No hostname provided")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"intercepted": false, "error": "No hostname provided"})
        );
    }

    #[test]
    fn request_hostname_is_optional() {
        let request: CheckRequest = serde_json::from_str("{}").unwrap();
        assert!(request.hostname.is_none());
    }

    #[test]
    fn request_ignores_unknown_members() {
        let request: CheckRequest =
            serde_json::from_str(r#"{"hostname": "example.com", "tab": 7}"#).unwrap();
        assert_eq!(request.hostname.as_deref(), Some("example.com"));
    }
}
