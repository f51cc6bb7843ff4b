//! Policy to checklist mapping.

use ccert_core::Policy;

use crate::checks::{Check, CheckDeps, CheckId};

const STANDARD: &[CheckId] = &[
    CheckId::HasLicense,
    CheckId::HasUniqueTag,
    CheckId::LayerCountAcceptable,
    CheckId::HasNoProhibitedPackages,
    CheckId::HasRequiredLabel,
    CheckId::RunAsNonRoot,
    CheckId::HasModifiedFiles,
    CheckId::BasedOnUbi,
];

const ROOT_EXCEPTION: &[CheckId] = &[
    CheckId::HasLicense,
    CheckId::HasUniqueTag,
    CheckId::LayerCountAcceptable,
    CheckId::HasNoProhibitedPackages,
    CheckId::HasRequiredLabel,
    CheckId::HasModifiedFiles,
    CheckId::BasedOnUbi,
];

const SCRATCH: &[CheckId] = &[
    CheckId::HasLicense,
    CheckId::HasUniqueTag,
    CheckId::LayerCountAcceptable,
    CheckId::HasRequiredLabel,
    CheckId::RunAsNonRoot,
];

/// Ordered checks applying to `policy`.
pub fn checks_for(policy: Policy) -> &'static [CheckId] {
    match policy {
        Policy::Standard => STANDARD,
        Policy::RootException => ROOT_EXCEPTION,
        Policy::Scratch => SCRATCH,
    }
}

/// Instantiate the checklist of `policy`.
pub fn build_checklist(policy: Policy, deps: &CheckDeps) -> Vec<Box<dyn Check>> {
    checks_for(policy).iter().map(|id| id.build(deps)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures;
    use std::collections::HashSet;

    #[test]
    fn test_deterministic_and_unique() {
        for policy in Policy::ALL {
            assert_eq!(checks_for(policy), checks_for(policy));
            let unique: HashSet<_> = checks_for(policy).iter().collect();
            assert_eq!(unique.len(), checks_for(policy).len(), "{policy}");
        }
    }

    #[test]
    fn test_root_exception_drops_only_run_as_non_root() {
        let standard: Vec<_> = checks_for(Policy::Standard)
            .iter()
            .copied()
            .filter(|id| *id != CheckId::RunAsNonRoot)
            .collect();
        assert_eq!(standard, checks_for(Policy::RootException));
    }

    #[test]
    fn test_scratch_has_no_package_checks() {
        let scratch = checks_for(Policy::Scratch);
        assert_eq!(scratch.len(), 5);
        for id in [CheckId::HasNoProhibitedPackages, CheckId::HasModifiedFiles, CheckId::BasedOnUbi] {
            assert!(!scratch.contains(&id));
        }
    }

    #[test]
    fn test_build_checklist_keeps_order() {
        let checks = build_checklist(Policy::Standard, &fixtures::deps());
        let names: Vec<_> = checks.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            [
                "HasLicense",
                "HasUniqueTag",
                "LayerCountAcceptable",
                "HasNoProhibitedPackages",
                "HasRequiredLabel",
                "RunAsNonRoot",
                "HasModifiedFiles",
                "BasedOnUbi",
            ]
        );
    }
}
