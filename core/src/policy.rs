//! Certification policies.

use serde::{Deserialize, Serialize};

use crate::error::CertError;

/// Named rule set governing which checks apply to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// The full container policy.
    Standard,
    /// Container policy for projects allowed to run as root.
    RootException,
    /// Container policy for images without a package manager layer.
    Scratch,
}

impl Policy {
    pub const ALL: [Policy; 3] = [Policy::Standard, Policy::RootException, Policy::Scratch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::RootException => "root-exception",
            Self::Scratch => "scratch",
        }
    }

    /// Scratch images carry no package inventory.
    pub fn has_package_manifest(&self) -> bool {
        !matches!(self, Self::Scratch)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::Standard
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Policy {
    type Err = CertError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "standard" | "container" => Ok(Self::Standard),
            "root-exception" | "root" => Ok(Self::RootException),
            "scratch" => Ok(Self::Scratch),
            other => Err(CertError::ConfigError(format!(
                "provided container policy '{}' is unknown (supported: standard, root-exception, scratch)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!("standard".parse::<Policy>().unwrap(), Policy::Standard);
        assert_eq!("container".parse::<Policy>().unwrap(), Policy::Standard);
        assert_eq!("root-exception".parse::<Policy>().unwrap(), Policy::RootException);
        assert_eq!("scratch".parse::<Policy>().unwrap(), Policy::Scratch);
    }

    #[test]
    fn test_unknown_policy_is_config_error() {
        let err = "operator".parse::<Policy>().unwrap_err();
        assert!(matches!(err, CertError::ConfigError(_)));
        assert!(err.to_string().contains("operator"));
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for policy in Policy::ALL {
            assert_eq!(policy.to_string().parse::<Policy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_package_manifest_only_outside_scratch() {
        assert!(Policy::Standard.has_package_manifest());
        assert!(Policy::RootException.has_package_manifest());
        assert!(!Policy::Scratch.has_package_manifest());
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&Policy::RootException).unwrap();
        assert_eq!(json, "\"root-exception\"");
    }
}
