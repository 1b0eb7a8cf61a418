use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    ProPlus,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::ProPlus => "pro_plus",
        }
    }

    /// Unknown or missing plans count as `free`.
    pub fn parse_lossy(value: Option<&str>) -> Self {
        match value.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("pro") => Self::Pro,
            Some("pro_plus") | Some("pro+") => Self::ProPlus,
            _ => Self::Free,
        }
    }

    pub fn allows(self, feature: GatedFeature) -> bool {
        self >= feature.required_plan()
    }

    pub fn require(self, feature: GatedFeature) -> Result<(), AppError> {
        if self.allows(feature) {
            Ok(())
        } else {
            Err(AppError::PlanRequired {
                feature: feature.as_str(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedFeature {
    StrategyAnalysis,
    StatsDownload,
}

impl GatedFeature {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrategyAnalysis => "strategy_analysis",
            Self::StatsDownload => "stats_download",
        }
    }

    pub fn required_plan(self) -> Plan {
        match self {
            Self::StrategyAnalysis | Self::StatsDownload => Plan::Pro,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserInfoWire {
    #[serde(default)]
    pub plan: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_are_ordered() {
        assert!(Plan::Free < Plan::Pro);
        assert!(Plan::Pro < Plan::ProPlus);
    }

    #[test]
    fn free_plan_is_denied_paid_features() {
        let error = Plan::Free
            .require(GatedFeature::StrategyAnalysis)
            .expect_err("free plan must be gated");
        assert!(matches!(
            error,
            AppError::PlanRequired {
                feature: "strategy_analysis"
            }
        ));
        assert!(!Plan::Free.allows(GatedFeature::StatsDownload));
        assert!(Plan::Pro.allows(GatedFeature::StatsDownload));
        assert!(Plan::ProPlus.require(GatedFeature::StrategyAnalysis).is_ok());
    }

    #[test]
    fn unknown_plans_fall_back_to_free() {
        assert_eq!(Plan::parse_lossy(Some("PRO_PLUS")), Plan::ProPlus);
        assert_eq!(Plan::parse_lossy(Some("enterprise")), Plan::Free);
        assert_eq!(Plan::parse_lossy(None), Plan::Free);
    }
}
