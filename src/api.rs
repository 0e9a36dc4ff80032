//! JSON types exchanged with sidecars on `POST /iptables`
//!
//! Field names follow the camelCase wire format the sidecars already speak.
//! Every field is optional on decode; missing strings decode as empty.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rules for one IP family, in `iptables-restore` format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IptablesOptions {
    pub rules: String,
}

/// Request body for `POST /iptables`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IptablesRequest {
    pub pod_namespace: String,
    pub pod_name: String,
    pub ipv4_options: IptablesOptions,
    pub ipv6_options: IptablesOptions,
}

impl IptablesRequest {
    pub fn pod(&self) -> PodIdentity {
        PodIdentity::new(&self.pod_namespace, &self.pod_name)
    }
}

/// Output of one restore/save pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionResult {
    pub restore_command_output: String,
    pub save_command_output: String,
}

/// Response body for `POST /iptables`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IptablesResponse {
    pub ipv4: ExecutionResult,
    pub ipv6: ExecutionResult,
}

/// The pod whose network namespace a request targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodIdentity {
    pub namespace: String,
    pub name: String,
}

impl PodIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Both halves of the identity must be present
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.is_empty() {
            return Err("podNamespace must not be empty".to_string());
        }
        if self.name.is_empty() {
            return Err("podName must not be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_decodes_camel_case() {
        let req: IptablesRequest = serde_json::from_str(
            r#"{
                "podNamespace": "default",
                "podName": "pod-a",
                "ipv4Options": {"rules": "-A INPUT -j ACCEPT"},
                "ipv6Options": {"rules": ""}
            }"#,
        )
        .unwrap();

        assert_eq!(req.pod(), PodIdentity::new("default", "pod-a"));
        assert_eq!(req.ipv4_options.rules, "-A INPUT -j ACCEPT");
        assert!(req.ipv6_options.rules.is_empty());
    }

    #[test]
    fn test_missing_options_decode_empty() {
        let req: IptablesRequest =
            serde_json::from_str(r#"{"podNamespace": "ns", "podName": "p"}"#).unwrap();
        assert_eq!(req.ipv4_options, IptablesOptions::default());
        assert_eq!(req.ipv6_options, IptablesOptions::default());
    }

    #[test]
    fn test_response_field_names() {
        let resp = IptablesResponse {
            ipv4: ExecutionResult {
                restore_command_output: "r4".to_string(),
                save_command_output: "s4".to_string(),
            },
            ipv6: ExecutionResult::default(),
        };
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["ipv4"]["restoreCommandOutput"], "r4");
        assert_eq!(json["ipv4"]["saveCommandOutput"], "s4");
        assert_eq!(json["ipv6"]["restoreCommandOutput"], "");
    }

    #[test]
    fn test_pod_identity_validation() {
        assert!(PodIdentity::new("default", "pod-a").validate().is_ok());
        assert!(PodIdentity::new("", "pod-a").validate().is_err());
        assert!(PodIdentity::new("default", "").validate().is_err());
        assert_eq!(PodIdentity::new("default", "pod-a").to_string(), "default/pod-a");
    }
}
