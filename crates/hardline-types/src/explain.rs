//! Explain registry for error and warning codes.
//!
//! Maps codes to human-readable explanations with remediation guidance. The UI shows these next
//! to the raw `ErrorInfo.message`.

use crate::ids;

/// Explanation entry for a code.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Short description of the code.
    pub title: &'static str,
    /// What happened and what the engine did about it.
    pub description: &'static str,
    /// What the operator can do next.
    pub remediation: &'static str,
}

/// Look up an explanation by code.
///
/// Returns `None` if the code is not recognized.
pub fn lookup_explanation(code: &str) -> Option<Explanation> {
    let exp = match code {
        ids::CODE_VALIDATION_ERROR => Explanation {
            title: "Invalid Policy Record",
            description: "\
A policy document could not be used: it failed to parse, is missing an id or name, sets
`auto_apply: true`, or repeats an id already defined by another document.

Only the offending record is excluded; the rest of the catalog loads normally.",
            remediation: "\
Fix the document named in the message. Every policy needs a unique `policy_id`, a `name`,
and a `mechanism` block, and must leave `auto_apply` unset or false.",
        },
        ids::CODE_GRAPH_ERROR => Explanation {
            title: "Dependency Cycle In Catalog",
            description: "\
The mandatory dependency graph (required, prerequisite, and non-overridable recommended
edges) contains at least one cycle. The engine refuses to run because it cannot order
policies safely.",
            remediation: "\
Break each listed cycle by removing an edge or by marking a recommended edge as
`user_can_override: true`.",
        },
        ids::CODE_CATALOG_ERROR => Explanation {
            title: "Catalog Unavailable",
            description: "The policy directory could not be read.",
            remediation: "Check that the configured `policy_dir` exists and is readable.",
        },
        ids::CODE_OVERRIDE_INVALID => Explanation {
            title: "Override Ignored",
            description: "\
A stored or requested override did not produce a valid mechanism definition when merged,
so the shipped definition was used instead.",
            remediation: "Remove or correct the override for the named policy.",
        },
        ids::CODE_NOT_APPLICABLE => Explanation {
            title: "Policy Not Applicable",
            description: "\
The policy's build range or SKU filter excludes this host. This is a normal skip, not a
failure.",
            remediation: "No action needed.",
        },
        ids::CODE_DEPENDENCY_CYCLE => Explanation {
            title: "Request Dependency Cycle",
            description: "Ordering the requested policies hit a dependency cycle.",
            remediation: "Request the policies separately or fix the catalog dependencies.",
        },
        ids::CODE_DEPENDENCY_MISSING => Explanation {
            title: "Missing Dependency",
            description: "\
A dependency names a policy that is not in the catalog. The dependent policy still runs
(best effort).",
            remediation: "Add the missing policy to the catalog or drop the dependency edge.",
        },
        ids::CODE_DEPENDENCY_CONFLICT => Explanation {
            title: "Conflicting Policies",
            description: "Two policies in the batch are declared as conflicting.",
            remediation: "Deselect one of the two policies.",
        },
        ids::CODE_EXECUTION_ERROR => Explanation {
            title: "Change Failed",
            description: "The mechanism backend failed to apply or revert the policy.",
            remediation: "Inspect the message; retry after resolving the underlying OS error.",
        },
        ids::CODE_AUTHORIZATION_ERROR => Explanation {
            title: "Insufficient Privilege",
            description: "\
The OS denied access to the target (missing elevation or a tamper-protected resource).",
            remediation: "Run the operation elevated, or disable tamper protection first.",
        },
        ids::CODE_IRREVERSIBLE => Explanation {
            title: "Irreversible Change",
            description: "The applied change cannot be undone (for example a deleted task).",
            remediation: "Restore from a system restore point if the change must be undone.",
        },
        ids::CODE_CANCELLED => Explanation {
            title: "Batch Cancelled",
            description: "\
The batch was cancelled between policies. Policies already processed keep their results;
the rest were not attempted.",
            remediation: "Re-run the operation for the remaining policies.",
        },
        ids::CODE_ALREADY_REVERTED => Explanation {
            title: "Already Reverted",
            description: "The policy's latest change is already a revert; nothing was done.",
            remediation: "No action needed.",
        },
        ids::CODE_PERSISTENCE_ERROR => Explanation {
            title: "History Not Recorded",
            description: "\
A snapshot or change record could not be written. The system change itself already
happened; only the audit trail is incomplete.",
            remediation: "Check free disk space and permissions on the change-log database.",
        },
        ids::CODE_NOT_FOUND => Explanation {
            title: "Not Found",
            description: "The policy id, snapshot id, or change history does not exist.",
            remediation: "Verify the identifier against the catalog or the state view.",
        },
        ids::CODE_NO_SNAPSHOT => Explanation {
            title: "No Baseline Snapshot",
            description: "Drift detection needs a snapshot and none has been taken yet.",
            remediation: "Create a snapshot or apply policies first.",
        },
        ids::CODE_RESTORE_POINT_FAILED => Explanation {
            title: "Restore Point Not Created",
            description: "\
The OS restore point could not be created. The operation continued; snapshots still
allow revert.",
            remediation: "Enable System Protection on the system drive.",
        },
        ids::CODE_UNSUPPORTED => Explanation {
            title: "Unsupported Operation",
            description: "The requested operation is not supported (e.g. revert by restore point).",
            remediation: "Use the OS restore tooling directly.",
        },
        _ => return None,
    };
    Some(exp)
}

/// List all known codes.
pub fn all_codes() -> &'static [&'static str] {
    &[
        ids::CODE_VALIDATION_ERROR,
        ids::CODE_GRAPH_ERROR,
        ids::CODE_CATALOG_ERROR,
        ids::CODE_OVERRIDE_INVALID,
        ids::CODE_NOT_APPLICABLE,
        ids::CODE_DEPENDENCY_CYCLE,
        ids::CODE_DEPENDENCY_MISSING,
        ids::CODE_DEPENDENCY_CONFLICT,
        ids::CODE_EXECUTION_ERROR,
        ids::CODE_AUTHORIZATION_ERROR,
        ids::CODE_IRREVERSIBLE,
        ids::CODE_CANCELLED,
        ids::CODE_ALREADY_REVERTED,
        ids::CODE_PERSISTENCE_ERROR,
        ids::CODE_NOT_FOUND,
        ids::CODE_NO_SNAPSHOT,
        ids::CODE_RESTORE_POINT_FAILED,
        ids::CODE_UNSUPPORTED,
    ]
}
