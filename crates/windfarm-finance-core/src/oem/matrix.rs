use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::warn;

use super::contract::OemContract;
use super::scope::{OemScope, SitePersonnel};
use crate::error::WindFinanceError;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::WindFinanceResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Share of a maintenance category borne by each party. Always sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub oem: f64,
    pub owner: f64,
}

impl Allocation {
    pub const OWNER: Allocation = Allocation {
        oem: 0.0,
        owner: 1.0,
    };
    pub const OEM: Allocation = Allocation {
        oem: 1.0,
        owner: 0.0,
    };

    pub fn from_flag(covered: bool) -> Self {
        if covered {
            Self::OEM
        } else {
            Self::OWNER
        }
    }

    pub fn from_oem_share(oem: f64) -> Self {
        Self {
            oem,
            owner: 1.0 - oem,
        }
    }
}

/// Allocation with OEM event-count and money caps (`None` = uncapped).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CappedAllocation {
    pub oem: f64,
    pub owner: f64,
    pub event_cap: Option<u32>,
    pub financial_cap: Option<Money>,
}

impl CappedAllocation {
    fn owner_only() -> Self {
        Self {
            oem: 0.0,
            owner: 1.0,
            event_cap: None,
            financial_cap: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveMajorAllocation {
    pub tooling: Allocation,
    pub manpower: Allocation,
    pub parts: Allocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsibilityAllocations {
    pub preventive_maintenance: Allocation,
    pub blade_inspections: Allocation,
    pub remote_monitoring: Allocation,
    pub site_personnel: Allocation,
    pub corrective_minor: Allocation,
    pub corrective_major: CorrectiveMajorAllocation,
    pub blade_integrity_management: Allocation,
    pub crane: CappedAllocation,
    pub major_component: CappedAllocation,
}

impl ResponsibilityAllocations {
    /// Everything on the owner; used for years without a contract.
    pub fn owner_only() -> Self {
        Self {
            preventive_maintenance: Allocation::OWNER,
            blade_inspections: Allocation::OWNER,
            remote_monitoring: Allocation::OWNER,
            site_personnel: Allocation::OWNER,
            corrective_minor: Allocation::OWNER,
            corrective_major: CorrectiveMajorAllocation {
                tooling: Allocation::OWNER,
                manpower: Allocation::OWNER,
                parts: Allocation::OWNER,
            },
            blade_integrity_management: Allocation::OWNER,
            crane: CappedAllocation::owner_only(),
            major_component: CappedAllocation::owner_only(),
        }
    }

    pub fn from_scope(scope: &OemScope) -> Self {
        let major = scope.effective_major_details();
        let corrective_major = CorrectiveMajorAllocation {
            tooling: Allocation::from_flag(major.tooling),
            manpower: Allocation::from_flag(major.manpower),
            parts: Allocation::from_flag(major.parts),
        };
        // A major component intervention splits evenly into tooling, manpower and parts.
        let component_share = (corrective_major.tooling.oem
            + corrective_major.manpower.oem
            + corrective_major.parts.oem)
            / 3.0;
        let crane = Allocation::from_flag(major.crane);

        Self {
            preventive_maintenance: Allocation::from_flag(scope.preventive_maintenance),
            blade_inspections: Allocation::from_flag(scope.blade_inspections),
            remote_monitoring: Allocation::from_flag(scope.remote_monitoring),
            site_personnel: match scope.site_personnel {
                SitePersonnel::Full => Allocation::OEM,
                SitePersonnel::Partial => Allocation::from_oem_share(0.5),
                SitePersonnel::None => Allocation::OWNER,
            },
            corrective_minor: Allocation::from_flag(scope.corrective_minor),
            corrective_major,
            blade_integrity_management: Allocation::from_flag(scope.blade_integrity_management),
            crane: CappedAllocation {
                oem: crane.oem,
                owner: crane.owner,
                event_cap: scope.crane_event_cap,
                financial_cap: scope.crane_financial_cap,
            },
            major_component: CappedAllocation {
                oem: component_share,
                owner: 1.0 - component_share,
                event_cap: scope.major_component_event_cap,
                financial_cap: scope.major_component_financial_cap,
            },
        }
    }
}

/// Responsibility split for one project year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyResponsibility {
    pub year: u32,
    pub contract_id: Option<String>,
    pub oem_scope_id: Option<String>,
    pub oem_scope_name: Option<String>,
    pub fixed_fee: Option<Money>,
    pub is_per_turbine: bool,
    /// Fee for the whole farm this year (`fixedFee × numWTGs` when per turbine).
    pub annual_fee: Money,
    pub allocations: ResponsibilityAllocations,
    /// Other contracts active this year that lost on precedence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlapping_contracts: Vec<String>,
}

impl YearlyResponsibility {
    pub fn has_contract(&self) -> bool {
        self.contract_id.is_some()
    }
}

/// How to resolve several contracts active in the same year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlapPolicy {
    /// Latest `createdAt` wins; ties and missing timestamps fall back to input order (later wins).
    #[default]
    MostRecent,
    /// Overlap is an error.
    Strict,
}

/// Input for stand-alone matrix building.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixInput {
    pub project_life: u32,
    #[serde(rename = "numWTGs")]
    pub num_wtgs: u32,
    pub contracts: Vec<OemContract>,
    pub scopes: Vec<OemScope>,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

/// Pick the winning contract index among `active` (indices into `contracts`).
fn resolve_overlap(
    year: u32,
    active: &[usize],
    contracts: &[OemContract],
    policy: OverlapPolicy,
) -> WindFinanceResult<usize> {
    if active.len() > 1 && policy == OverlapPolicy::Strict {
        return Err(WindFinanceError::ResponsibilityMatrixConflict {
            year,
            contracts: active.iter().map(|&i| contracts[i].id.clone()).collect(),
        });
    }
    // max_by_key keeps the last maximum, so input order breaks ties.
    active
        .iter()
        .copied()
        .max_by_key(|&i| contracts[i].created_at)
        .ok_or_else(|| {
            WindFinanceError::InsufficientData(format!("no contract active in year {year}"))
        })
}

/// Build the year-by-year OEM/owner responsibility matrix for years `1..=project_life`.
///
/// Contracts are normalized here; every contract must reference a scope in `scopes`.
pub fn build_matrix(
    project_life: u32,
    num_wtgs: u32,
    contracts: &[OemContract],
    scopes: &[OemScope],
    policy: OverlapPolicy,
) -> WindFinanceResult<Vec<YearlyResponsibility>> {
    let contracts: Vec<OemContract> = contracts
        .iter()
        .cloned()
        .map(OemContract::normalize)
        .collect::<WindFinanceResult<_>>()?;

    let scope_by_id: HashMap<&str, &OemScope> =
        scopes.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut allocations_by_scope: HashMap<&str, (ResponsibilityAllocations, String)> =
        HashMap::new();
    for contract in &contracts {
        let scope = scope_by_id.get(contract.oem_scope.as_str()).ok_or_else(|| {
            WindFinanceError::InvalidInput {
                field: format!("oemContract[{}].oemScope", contract.id),
                reason: format!("unknown OEM scope '{}'", contract.oem_scope),
            }
        })?;
        let scope = (*scope).clone().normalize()?;
        allocations_by_scope.insert(
            contract.oem_scope.as_str(),
            (ResponsibilityAllocations::from_scope(&scope), scope.name),
        );
    }

    let mut matrix = Vec::with_capacity(project_life as usize);
    for year in 1..=project_life {
        let active: Vec<usize> = contracts
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_active(year))
            .map(|(i, _)| i)
            .collect();

        if active.is_empty() {
            matrix.push(YearlyResponsibility {
                year,
                contract_id: None,
                oem_scope_id: None,
                oem_scope_name: None,
                fixed_fee: None,
                is_per_turbine: false,
                annual_fee: Decimal::ZERO,
                allocations: ResponsibilityAllocations::owner_only(),
                overlapping_contracts: Vec::new(),
            });
            continue;
        }

        let winner_idx = resolve_overlap(year, &active, &contracts, policy)?;
        let winner = &contracts[winner_idx];
        let overlapping: Vec<String> = active
            .iter()
            .filter(|&&i| i != winner_idx)
            .map(|&i| contracts[i].id.clone())
            .collect();
        if !overlapping.is_empty() {
            warn!(
                year,
                winner = %winner.id,
                overlapping = ?overlapping,
                "overlapping OEM contracts resolved by most-recent precedence"
            );
        }

        let (allocations, scope_name) = allocations_by_scope
            .get(winner.oem_scope.as_str())
            .cloned()
            .ok_or_else(|| WindFinanceError::InvalidInput {
                field: format!("oemContract[{}].oemScope", winner.id),
                reason: format!("unknown OEM scope '{}'", winner.oem_scope),
            })?;

        matrix.push(YearlyResponsibility {
            year,
            contract_id: Some(winner.id.clone()),
            oem_scope_id: Some(winner.oem_scope.clone()),
            oem_scope_name: Some(scope_name),
            fixed_fee: Some(winner.fixed_fee),
            is_per_turbine: winner.is_per_turbine,
            annual_fee: winner.annual_fee(num_wtgs),
            allocations,
            overlapping_contracts: overlapping,
        });
    }

    Ok(matrix)
}

/// Build the matrix and wrap it with warnings for overlapping years.
pub fn build_responsibility_matrix(
    input: &MatrixInput,
) -> WindFinanceResult<ComputationOutput<Vec<YearlyResponsibility>>> {
    let start = Instant::now();
    let matrix = build_matrix(
        input.project_life,
        input.num_wtgs,
        &input.contracts,
        &input.scopes,
        input.overlap_policy,
    )?;

    let warnings: Vec<String> = matrix
        .iter()
        .filter(|y| !y.overlapping_contracts.is_empty())
        .map(|y| {
            format!(
                "Year {}: contract {} takes precedence over {:?}",
                y.year,
                y.contract_id.as_deref().unwrap_or("-"),
                y.overlapping_contracts
            )
        })
        .collect();

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "OEM Responsibility Matrix",
        &serde_json::json!({
            "project_life": input.project_life,
            "num_wtgs": input.num_wtgs,
            "contracts": input.contracts.len(),
            "overlap_policy": input.overlap_policy,
        }),
        warnings,
        elapsed,
        matrix,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oem::scope::CorrectiveMajorDetails;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn scope(id: &str) -> OemScope {
        OemScope {
            id: id.into(),
            preventive_maintenance: true,
            corrective_minor: true,
            corrective_major: true,
            corrective_major_details: CorrectiveMajorDetails {
                tooling: true,
                manpower: true,
                parts: false,
                crane: true,
            },
            crane_event_cap: Some(2),
            crane_financial_cap: Some(dec!(250000)),
            ..Default::default()
        }
    }

    fn contract(id: &str, years: Vec<u32>) -> OemContract {
        OemContract {
            id: id.into(),
            years,
            start_year: None,
            end_year: None,
            fixed_fee: dec!(100000),
            is_per_turbine: true,
            oem_scope: "s1".into(),
            created_at: None,
        }
    }

    #[test]
    fn test_one_entry_per_year() {
        let contracts = [contract("c1", vec![1, 2, 3])];
        let m = build_matrix(5, 10, &contracts, &[scope("s1")], OverlapPolicy::Strict)
            .unwrap();
        assert_eq!(m.len(), 5);
        assert_eq!(m.iter().map(|y| y.year).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(m[2].has_contract());
        assert!(!m[3].has_contract());
        assert_eq!(m[3].annual_fee, Decimal::ZERO);
    }

    #[test]
    fn test_per_turbine_fee() {
        let contracts = [contract("c1", vec![1])];
        let m = build_matrix(3, 10, &contracts, &[scope("s1")], OverlapPolicy::Strict)
            .unwrap();
        assert_eq!(m[0].annual_fee, dec!(1000000));
        assert_eq!(m[0].fixed_fee, Some(dec!(100000)));
    }

    #[test]
    fn test_allocations_from_scope() {
        let contracts = [contract("c1", vec![1])];
        let m = build_matrix(1, 1, &contracts, &[scope("s1")], OverlapPolicy::Strict)
            .unwrap();
        let a = m[0].allocations;
        assert_eq!(a.preventive_maintenance, Allocation::OEM);
        assert_eq!(a.blade_inspections, Allocation::OWNER);
        assert_eq!(a.corrective_major.parts, Allocation::OWNER);
        assert_eq!(a.corrective_major.tooling, Allocation::OEM);
        assert!((a.major_component.oem - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(a.crane.event_cap, Some(2));
        assert_eq!(a.crane.financial_cap, Some(dec!(250000)));
        assert_eq!(a.major_component.financial_cap, None);
        assert_eq!(m[0].oem_scope_name.as_deref(), Some("PM-CMin-CMajTMC"));
    }

    #[test]
    fn test_simple_categories_sum_to_one() {
        let mut s = scope("s1");
        s.site_personnel = SitePersonnel::Partial;
        let contracts = [contract("c1", vec![2, 3])];
        let m = build_matrix(4, 3, &contracts, &[s], OverlapPolicy::Strict).unwrap();
        for entry in &m {
            let a = entry.allocations;
            for alloc in [
                a.preventive_maintenance,
                a.blade_inspections,
                a.remote_monitoring,
                a.site_personnel,
                a.corrective_minor,
                a.blade_integrity_management,
                a.corrective_major.tooling,
                a.corrective_major.manpower,
                a.corrective_major.parts,
            ] {
                assert!((alloc.oem + alloc.owner - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_strict_overlap_conflict() {
        let err = build_matrix(
            3,
            1,
            &[contract("a", vec![1, 2]), contract("b", vec![2, 3])],
            &[scope("s1")],
            OverlapPolicy::Strict,
        )
        .unwrap_err();
        match err {
            WindFinanceError::ResponsibilityMatrixConflict { year, contracts } => {
                assert_eq!(year, 2);
                assert_eq!(contracts, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_most_recent_precedence() {
        let mut older = contract("older", vec![1, 2]);
        older.created_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut newer = contract("newer", vec![2, 3]);
        newer.created_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());

        // Newer listed first still wins on timestamp.
        let m = build_matrix(3, 1, &[newer, older], &[scope("s1")], OverlapPolicy::MostRecent)
            .unwrap();
        assert_eq!(m[1].contract_id.as_deref(), Some("newer"));
        assert_eq!(m[1].overlapping_contracts, vec!["older".to_string()]);
        assert_eq!(m[0].contract_id.as_deref(), Some("older"));
    }

    #[test]
    fn test_input_order_breaks_ties() {
        let m = build_matrix(
            2,
            1,
            &[contract("first", vec![1]), contract("second", vec![1])],
            &[scope("s1")],
            OverlapPolicy::MostRecent,
        )
        .unwrap();
        assert_eq!(m[0].contract_id.as_deref(), Some("second"));
    }

    #[test]
    fn test_unknown_scope_rejected() {
        let mut c = contract("c1", vec![1]);
        c.oem_scope = "missing".into();
        assert!(build_matrix(2, 1, &[c], &[scope("s1")], OverlapPolicy::Strict).is_err());
    }

    #[test]
    fn test_envelope_warnings_list_overlaps() {
        let input = MatrixInput {
            project_life: 2,
            num_wtgs: 1,
            contracts: vec![contract("a", vec![1]), contract("b", vec![1])],
            scopes: vec![scope("s1")],
            overlap_policy: OverlapPolicy::MostRecent,
        };
        let out = build_responsibility_matrix(&input).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("Year 1"));
    }
}
