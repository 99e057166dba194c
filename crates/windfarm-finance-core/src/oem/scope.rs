use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WindFinanceError;
use crate::types::Money;
use crate::WindFinanceResult;

/// Name used when a scope selects no coverage at all.
pub const BASIC_SCOPE_NAME: &str = "Basic-OEM-Scope";

/// Level of OEM staff stationed on site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SitePersonnel {
    #[default]
    None,
    Partial,
    Full,
}

/// What the OEM brings to a major corrective intervention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectiveMajorDetails {
    #[serde(default)]
    pub tooling: bool,
    #[serde(default)]
    pub manpower: bool,
    #[serde(default)]
    pub parts: bool,
    #[serde(default)]
    pub crane: bool,
}

/// Bundle of OEM coverage flags and caps, referenced by contracts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OemScope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub preventive_maintenance: bool,
    #[serde(default)]
    pub blade_inspections: bool,
    #[serde(default)]
    pub remote_monitoring: bool,
    #[serde(default)]
    pub site_personnel: SitePersonnel,
    #[serde(default)]
    pub corrective_minor: bool,
    #[serde(default)]
    pub corrective_major: bool,
    /// Inert unless `corrective_major` is set.
    #[serde(default)]
    pub corrective_major_details: CorrectiveMajorDetails,
    #[serde(default)]
    pub blade_integrity_management: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crane_event_cap: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crane_financial_cap: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_component_event_cap: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_component_financial_cap: Option<Money>,
}

impl OemScope {
    /// Major corrective sub-flags as they actually apply.
    pub fn effective_major_details(&self) -> CorrectiveMajorDetails {
        if self.corrective_major {
            self.corrective_major_details
        } else {
            CorrectiveMajorDetails::default()
        }
    }

    /// Deterministic name built from the active coverage flags.
    pub fn generate_name(&self) -> String {
        let mut tokens: Vec<String> = Vec::new();
        if self.preventive_maintenance {
            tokens.push("PM".into());
        }
        if self.blade_inspections {
            tokens.push("BI".into());
        }
        if self.remote_monitoring {
            tokens.push("RM".into());
        }
        match self.site_personnel {
            SitePersonnel::Full => tokens.push("SP-Full".into()),
            SitePersonnel::Partial => tokens.push("SP-Part".into()),
            SitePersonnel::None => {}
        }
        if self.corrective_minor {
            tokens.push("CMin".into());
        }
        if self.corrective_major {
            let d = self.corrective_major_details;
            let mut token = String::from("CMaj");
            for (on, suffix) in [
                (d.tooling, 'T'),
                (d.manpower, 'M'),
                (d.parts, 'P'),
                (d.crane, 'C'),
            ] {
                if on {
                    token.push(suffix);
                }
            }
            tokens.push(token);
        }
        if self.blade_integrity_management {
            tokens.push("BIM".into());
        }

        if tokens.is_empty() {
            BASIC_SCOPE_NAME.to_string()
        } else {
            tokens.join("-")
        }
    }

    /// Fill derived fields and check caps. Call after construction or edit.
    pub fn normalize(mut self) -> WindFinanceResult<Self> {
        let trimmed = self.name.trim();
        self.name = if trimmed.is_empty() {
            self.generate_name()
        } else {
            trimmed.to_string()
        };

        for (field, cap) in [
            ("craneFinancialCap", self.crane_financial_cap),
            ("majorComponentFinancialCap", self.major_component_financial_cap),
        ] {
            if let Some(c) = cap {
                if c < Decimal::ZERO {
                    return Err(WindFinanceError::InvalidInput {
                        field: format!("oemScope.{field}"),
                        reason: format!("cap cannot be negative, got {c}"),
                    });
                }
            }
        }
        Ok(self)
    }
}
