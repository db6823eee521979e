use crate::policy::PolicyVariant;
use std::path::PathBuf;

pub const ENV_LOG: &str = "GRADEBOOKD_LOG";
pub const ENV_LOG_JSON: &str = "GRADEBOOKD_LOG_JSON";
pub const ENV_WORKSPACE: &str = "GRADEBOOKD_WORKSPACE";
pub const ENV_POLICY_VARIANT: &str = "GRADEBOOKD_POLICY_VARIANT";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonConfig {
    pub log_level: Option<String>,
    pub log_json: bool,
    pub workspace: Option<PathBuf>,
    pub policy_variant: Option<PolicyVariant>,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let policy_variant = non_empty(ENV_POLICY_VARIANT).and_then(|raw| {
            let parsed = PolicyVariant::parse(&raw);
            if parsed.is_none() {
                // Logging is not up yet when config is read.
                eprintln!("ignoring unknown {}={}", ENV_POLICY_VARIANT, raw);
            }
            parsed
        });

        Self {
            log_level: non_empty(ENV_LOG),
            log_json: non_empty(ENV_LOG_JSON)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
            policy_variant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> DaemonConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]), DaemonConfig::default());
    }

    #[test]
    fn reads_every_knob() {
        let c = config(&[
            (ENV_LOG, "debug"),
            (ENV_LOG_JSON, "TRUE"),
            (ENV_WORKSPACE, "/tmp/ws"),
            (ENV_POLICY_VARIANT, "mcps"),
        ]);
        assert_eq!(c.log_level.as_deref(), Some("debug"));
        assert!(c.log_json);
        assert_eq!(c.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(c.policy_variant, Some(PolicyVariant::Mcps));
    }

    #[test]
    fn blank_and_unknown_values_are_ignored() {
        let c = config(&[(ENV_WORKSPACE, "  "), (ENV_POLICY_VARIANT, "district-z")]);
        assert_eq!(c.workspace, None);
        assert_eq!(c.policy_variant, None);
    }
}
