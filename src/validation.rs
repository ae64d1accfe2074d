//! Input validation for ISO plans.
//!
//! Checks structural integrity of a plan before any worklist is created.
//! Detects:
//! - Plate markers used for more than one role
//! - Transfers for plates the plan does not know
//! - Batches holding the wrong transfer types
//! - Missing or unknown dilution pipetting methods
//!
//! All problems are collected; the caller receives every issue at once.

use std::collections::BTreeSet;

use crate::error::{finish, joined, PlanningError, PlanningResult};
use crate::models::{PipettingSpecsRegistry, PlannedTransfer, TransferType};
use crate::planning::IsoPlan;

/// Validates an ISO plan against a pipetting registry.
///
/// Checks:
/// 1. No plate marker is used for more than one role
/// 2. Dilutions target known plates and contain only dilutions
/// 3. Every plate with dilutions has a registered dilution method
/// 4. Intraplate batches belong to known plates and contain no dilutions
/// 5. Interplate batches connect known plates and share one transfer type
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_plan(plan: &IsoPlan, registry: &PipettingSpecsRegistry) -> PlanningResult<()> {
    let mut errors = Vec::new();

    let duplicates: BTreeSet<&String> = plan
        .preparation_plates
        .intersection(&plan.job_plates)
        .chain(
            plan.preparation_plates
                .iter()
                .chain(plan.job_plates.iter())
                .filter(|m| **m == plan.final_plate),
        )
        .collect();
    if !duplicates.is_empty() {
        errors.push(PlanningError::consistency(format!(
            "plate markers used for more than one plate role: {}",
            joined(duplicates)
        )));
    }

    // Dilutions
    for (plate, dilutions) in &plan.dilutions {
        if !plan.contains_plate(plate) {
            errors.push(PlanningError::input(format!(
                "dilutions for unknown plate {plate:?}"
            )));
            continue;
        }
        let foreign = describe_foreign(dilutions, |t| t != TransferType::Dilution);
        if !foreign.is_empty() {
            errors.push(PlanningError::input(format!(
                "dilution batch for plate {plate:?} contains other transfers: {foreign}"
            )));
        }
        if dilutions.is_empty() {
            continue;
        }
        match plan.dilution_methods.get(plate) {
            None => errors.push(PlanningError::input(format!(
                "no dilution pipetting method for plate {plate:?}"
            ))),
            Some(method) if !registry.contains(method) => errors.push(PlanningError::input(format!(
                "unknown dilution pipetting method {method:?} for plate {plate:?}"
            ))),
            Some(_) => {}
        }
    }

    // Intraplate transfers
    for (plate, generation, transfers) in plan.intraplate.iter() {
        if !plan.contains_plate(plate) {
            errors.push(PlanningError::input(format!(
                "intraplate transfers for unknown plate {plate:?}"
            )));
            continue;
        }
        let foreign = describe_foreign(transfers, |t| t == TransferType::Dilution);
        if !foreign.is_empty() {
            errors.push(PlanningError::input(format!(
                "intraplate batch {plate:?} (generation {generation}) contains dilutions: {foreign}"
            )));
        }
    }

    // Interplate transfers
    for (source, targets) in &plan.interplate {
        if !plan.contains_plate(source) {
            errors.push(PlanningError::input(format!(
                "interplate transfers from unknown plate {source:?}"
            )));
        }
        for (target, transfers) in targets {
            if !plan.contains_plate(target) {
                errors.push(PlanningError::input(format!(
                    "interplate transfers from {source:?} to unknown plate {target:?}"
                )));
            }
            let types: BTreeSet<TransferType> = transfers.iter().map(|t| t.transfer_type()).collect();
            if types.len() > 1 {
                errors.push(PlanningError::input(format!(
                    "interplate batch {source:?} to {target:?} mixes transfer types: {}",
                    joined(types.iter().map(|t| t.to_string()))
                )));
            }
            if types.contains(&TransferType::Dilution) {
                errors.push(PlanningError::input(format!(
                    "interplate batch {source:?} to {target:?} contains dilutions"
                )));
            }
        }
    }

    finish((), errors)
}

fn describe_foreign(transfers: &[PlannedTransfer], is_foreign: impl Fn(TransferType) -> bool) -> String {
    joined(
        transfers
            .iter()
            .filter(|t| is_foreign(t.transfer_type()))
            .map(|t| format!("{t} ({})", t.transfer_type())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipettingConfig;
    use crate::error::ErrorKind;
    use crate::models::RackPosition;

    fn pos(label: &str) -> RackPosition {
        RackPosition::from_label(label).unwrap()
    }

    fn registry() -> PipettingSpecsRegistry {
        PipettingConfig::standard().registry().unwrap()
    }

    fn valid_plan() -> IsoPlan {
        let mut plan = IsoPlan::new(1)
            .with_preparation_plate("p1")
            .with_dilution_method("p1", "BioMek");
        plan.add_dilution("p1", PlannedTransfer::dilution(10.0, "buffer", pos("A1")));
        plan.add_intraplate("p1", 0, PlannedTransfer::transfer(5.0, pos("A1"), pos("A2")));
        plan.add_interplate("p1", "a", PlannedTransfer::transfer(5.0, pos("A2"), pos("A2")));
        plan
    }

    #[test]
    fn test_valid_plan() {
        assert!(validate_plan(&valid_plan(), &registry()).is_ok());
    }

    #[test]
    fn test_unknown_interplate_target() {
        let mut plan = valid_plan();
        plan.add_interplate("p1", "p9", PlannedTransfer::transfer(5.0, pos("A2"), pos("A2")));
        let errors = validate_plan(&plan, &registry()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Input);
        assert!(errors[0].message().contains("p9"));
    }

    #[test]
    fn test_missing_dilution_method() {
        let mut plan = valid_plan();
        plan.add_dilution("a", PlannedTransfer::dilution(10.0, "buffer", pos("B1")));
        let errors = validate_plan(&plan, &registry()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message().contains("no dilution pipetting method for plate \"a\"")));
    }

    #[test]
    fn test_unknown_dilution_method() {
        let plan = valid_plan().with_dilution_method("p1", "Pipetman");
        let errors = validate_plan(&plan, &registry()).unwrap_err();
        assert!(errors[0].message().contains("Pipetman"));
    }

    #[test]
    fn test_mixed_interplate_batch() {
        let mut plan = valid_plan();
        plan.add_interplate("p1", "a", PlannedTransfer::one_to_one(5.0));
        let errors = validate_plan(&plan, &registry()).unwrap_err();
        assert!(errors.iter().any(|e| e.message().contains("mixes transfer types")));
    }

    #[test]
    fn test_duplicate_plate_roles() {
        let plan = valid_plan().with_job_plate("p1").with_job_plate("a");
        let errors = validate_plan(&plan, &registry()).unwrap_err();
        assert!(errors.iter().any(|e| e.kind() == ErrorKind::Consistency));
        assert!(errors[0].message().contains("a, p1"));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut plan = valid_plan();
        plan.add_intraplate("p7", 0, PlannedTransfer::transfer(5.0, pos("A1"), pos("A2")));
        plan.add_intraplate("p1", 1, PlannedTransfer::dilution(5.0, "buffer", pos("A2")));
        plan.add_dilution("p8", PlannedTransfer::dilution(5.0, "buffer", pos("A2")));
        let errors = validate_plan(&plan, &registry()).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
