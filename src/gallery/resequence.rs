use std::collections::HashSet;

use crate::gallery::name::{encode, BucketKey, ParsedName};
use crate::gallery::parse_member;
use crate::remote::{RemoteFile, RemoteStore};

/// One member's planned rename. `new_name` may equal `old_name`, in which
/// case application skips the member without calling the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub asset_id: String,
    pub old_name: String,
    pub new_name: String,
}

/// Output of the planning phase. Must pass [`ResequencePlan::validate`]
/// before it can be applied; there is no other path to a rename.
#[derive(Debug)]
pub struct ResequencePlan {
    pub bucket: BucketKey,
    pub assignments: Vec<Assignment>,
}

/// A plan whose candidate names were checked against the full listing.
#[derive(Debug)]
pub struct ValidatedPlan {
    plan: ResequencePlan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanConflict {
    pub candidate: String,
    pub existing: String,
}

/// Validation found a candidate colliding with an asset outside the plan.
/// Zero renames are issued for an aborted plan.
#[derive(Debug)]
pub struct PlanAborted {
    pub bucket: BucketKey,
    pub conflicts: Vec<PlanConflict>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// More members than the two-digit rank field can hold.
    BucketOverflow { members: usize },
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::BucketOverflow { members } => {
                write!(f, "bucket has {} members, ranks stop at 99", members)
            }
        }
    }
}

impl std::error::Error for PlanError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameStatus {
    Renamed,
    /// Candidate equals the current name; treated as already applied.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RenameOutcome {
    pub asset_id: String,
    pub old_name: String,
    pub new_name: String,
    pub status: RenameStatus,
}

/// Per-member outcomes of the application phase. With no rollback available,
/// a mixed report leaves the bucket part-old part-new; re-running the whole
/// resequencing converges it.
#[derive(Debug)]
pub struct ApplyReport {
    pub bucket: BucketKey,
    pub outcomes: Vec<RenameOutcome>,
}

impl ApplyReport {
    pub fn renamed(&self) -> usize {
        self.count(|s| matches!(s, RenameStatus::Renamed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, RenameStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, RenameStatus::Failed(_)))
    }

    pub fn fully_applied(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&RenameStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// PLANNING: sort the bucket's members by (existing rank, name), assign ranks
/// 1..N, and derive each candidate name through the codec, keeping the
/// member's slug and extension.
pub fn plan(bucket: BucketKey, full_listing: &[RemoteFile]) -> Result<ResequencePlan, PlanError> {
    let mut members: Vec<(ParsedName, &RemoteFile)> = full_listing
        .iter()
        .filter_map(|f| {
            parse_member(&f.name)
                .filter(|p| p.bucket() == bucket)
                .map(|p| (p, f))
        })
        .collect();
    members.sort_by(|a, b| a.0.rank.cmp(&b.0.rank).then_with(|| a.1.name.cmp(&b.1.name)));

    let count = members.len();
    let mut assignments = Vec::with_capacity(count);
    for (i, (parsed, file)) in members.into_iter().enumerate() {
        let new_name = encode(
            bucket,
            (i + 1) as u32,
            parsed.slug.as_deref(),
            parsed.extension,
        )
        .map_err(|_| PlanError::BucketOverflow { members: count })?;
        assignments.push(Assignment {
            asset_id: file.id.clone(),
            old_name: file.name.clone(),
            new_name,
        });
    }

    Ok(ResequencePlan {
        bucket,
        assignments,
    })
}

impl ResequencePlan {
    /// VALIDATION: all-or-nothing. Every candidate is compared
    /// (case-insensitively) against every listed asset that is not a plan
    /// member; any hit aborts the plan with the conflicting names. Collisions
    /// between members are expected while ranks shift and are left to
    /// application order.
    pub fn validate(self, full_listing: &[RemoteFile]) -> Result<ValidatedPlan, PlanAborted> {
        let member_ids: HashSet<&str> =
            self.assignments.iter().map(|a| a.asset_id.as_str()).collect();

        let mut conflicts = Vec::new();
        for assignment in &self.assignments {
            let candidate = assignment.new_name.to_lowercase();
            for file in full_listing {
                if member_ids.contains(file.id.as_str()) {
                    continue;
                }
                if file.name.to_lowercase() == candidate {
                    conflicts.push(PlanConflict {
                        candidate: assignment.new_name.clone(),
                        existing: file.name.clone(),
                    });
                }
            }
        }

        if conflicts.is_empty() {
            Ok(ValidatedPlan { plan: self })
        } else {
            Err(PlanAborted {
                bucket: self.bucket,
                conflicts,
            })
        }
    }
}

impl ValidatedPlan {
    #[allow(dead_code)]
    pub fn assignments(&self) -> &[Assignment] {
        &self.plan.assignments
    }

    /// APPLICATION: rename members in planned order, one remote call each.
    /// An individual failure is recorded and the walk continues; the remote
    /// offers no transaction, so there is nothing to roll back.
    pub fn apply(self, remote: &dyn RemoteStore, auth_token: &str) -> ApplyReport {
        let mut outcomes = Vec::with_capacity(self.plan.assignments.len());
        for assignment in self.plan.assignments {
            let status = if assignment.new_name == assignment.old_name {
                RenameStatus::Skipped
            } else {
                match remote.rename(&assignment.asset_id, &assignment.new_name, auth_token) {
                    Ok(()) => RenameStatus::Renamed,
                    Err(e) => RenameStatus::Failed(e.to_string()),
                }
            };
            outcomes.push(RenameOutcome {
                asset_id: assignment.asset_id,
                old_name: assignment.old_name,
                new_name: assignment.new_name,
                status,
            });
        }
        ApplyReport {
            bucket: self.plan.bucket,
            outcomes,
        }
    }
}
