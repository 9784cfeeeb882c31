use std::fmt::{self, Display};

use crate::confirm::AssumeYes;

/// What to do with VMs left over from a previous run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Nothing exists yet, bring the fleet up from scratch
    Create,
    /// Keep the VMs and their disks, re-run the provisioners
    RetainAndReprovision,
    /// Keep the VMs, reboot them and re-run the provisioners
    RetainAndRedeploy,
    /// Destroy every matched VM and create the fleet again
    DestroyAndRecreate,
    Abort,
}

impl ReconcileAction {
    pub fn destroys(&self) -> bool {
        matches!(self, ReconcileAction::DestroyAndRecreate)
    }
}

impl Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconcileAction::Create => "Create new VMs",
            ReconcileAction::RetainAndReprovision => "Keep existing VMs and re-run provisioning",
            ReconcileAction::RetainAndRedeploy => {
                "Keep existing VMs, reboot them and re-run provisioning"
            }
            ReconcileAction::DestroyAndRecreate => "Destroy existing VMs and create new ones",
            ReconcileAction::Abort => "Abort",
        };
        f.write_str(s)
    }
}

const MATCHING_CHOICES: [ReconcileAction; 4] = [
    ReconcileAction::RetainAndReprovision,
    ReconcileAction::RetainAndRedeploy,
    ReconcileAction::DestroyAndRecreate,
    ReconcileAction::Abort,
];

const MISMATCHED_CHOICES: [ReconcileAction; 2] =
    [ReconcileAction::DestroyAndRecreate, ReconcileAction::Abort];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InventoryOutcome {
    Empty,
    CountMatches,
    CountMismatch,
}

impl InventoryOutcome {
    pub fn classify(desired: u32, existing: usize) -> Self {
        if existing == 0 {
            InventoryOutcome::Empty
        } else if existing == desired as usize {
            InventoryOutcome::CountMatches
        } else {
            InventoryOutcome::CountMismatch
        }
    }

    pub fn classify_indices(desired: u32, indices: &[u32]) -> Self {
        let stray = indices.iter().any(|index| !(1..=desired).contains(index));

        match Self::classify(desired, indices.len()) {
            InventoryOutcome::CountMatches if stray => InventoryOutcome::CountMismatch,
            outcome => outcome,
        }
    }

    pub fn choices(&self) -> &'static [ReconcileAction] {
        match self {
            InventoryOutcome::Empty => &[ReconcileAction::Create],
            InventoryOutcome::CountMatches => &MATCHING_CHOICES,
            InventoryOutcome::CountMismatch => &MISMATCHED_CHOICES,
        }
    }

    /// The choice taken when running non-interactively.
    pub fn default_action(&self) -> ReconcileAction {
        match self {
            InventoryOutcome::Empty => ReconcileAction::Create,
            InventoryOutcome::CountMatches => ReconcileAction::RetainAndReprovision,
            InventoryOutcome::CountMismatch => ReconcileAction::DestroyAndRecreate,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Resolved(ReconcileAction),
    /// The operator has to pick one of these
    Ask(&'static [ReconcileAction]),
}

fn decide(outcome: InventoryOutcome, assume_yes: AssumeYes) -> Decision {
    match (outcome, assume_yes) {
        (InventoryOutcome::Empty, _) | (_, AssumeYes::DefaultYes) => {
            Decision::Resolved(outcome.default_action())
        }
        (_, AssumeYes::AlwaysAsk) => Decision::Ask(outcome.choices()),
    }
}

pub fn reconcile(desired: u32, existing: usize, assume_yes: AssumeYes) -> Decision {
    decide(InventoryOutcome::classify(desired, existing), assume_yes)
}

/// Reconciles the indices of the existing fleet VMs. A VM numbered outside
/// `1..=desired` can never be reused, so it forces the mismatch choices even
/// when the count is right.
pub fn reconcile_indices(desired: u32, indices: &[u32], assume_yes: AssumeYes) -> Decision {
    match InventoryOutcome::classify_indices(desired, indices) {
        InventoryOutcome::CountMismatch => decide(InventoryOutcome::CountMismatch, assume_yes),
        _ => reconcile(desired, indices.len(), assume_yes),
    }
}
