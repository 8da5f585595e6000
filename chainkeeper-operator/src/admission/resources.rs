//! Resource quantity invariants.
//!
//! One routine compares a request/limit pair under a policy; the policy is a
//! property of the resource kind, never of the create/update transition:
//! CPU limits may equal the request, memory limits must exceed it.

use super::field::{FieldError, FieldErrorList, FieldPath};
use crate::crd::Resources;
use crate::quantity::ParsedQuantity;

/// How a limit must relate to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPolicy {
    /// `limit >= request`
    AtLeast,
    /// `limit > request`
    Above,
}

impl LimitPolicy {
    /// Relation wording used in error details.
    pub fn relation(&self) -> &'static str {
        match self {
            LimitPolicy::AtLeast => "greater than or equal to",
            LimitPolicy::Above => "greater than",
        }
    }

    fn holds(&self, request: &ParsedQuantity, limit: &ParsedQuantity) -> bool {
        match self {
            LimitPolicy::AtLeast => limit >= request,
            LimitPolicy::Above => limit > request,
        }
    }
}

/// Policy applied to CPU pairs.
pub const CPU_POLICY: LimitPolicy = LimitPolicy::AtLeast;

/// Policy applied to memory pairs; memory has no graceful throttling.
pub const MEMORY_POLICY: LimitPolicy = LimitPolicy::Above;

/// A request/limit pair of one resource kind.
#[derive(Debug, Clone, Copy)]
pub struct QuantityPair<'a> {
    /// Resource kind as named in error details (`cpu`, `memory`).
    pub kind: &'a str,
    /// Request value.
    pub request: &'a str,
    /// Limit value.
    pub limit: &'a str,
}

/// Check one pair. Empty values impose no constraint.
///
/// `request_path` and `limit_path` locate the two fields; a limit that breaks
/// the policy is reported on `limit_path` with the offending limit as value.
pub fn check_limit(
    pair: QuantityPair<'_>,
    policy: LimitPolicy,
    request_path: &FieldPath,
    limit_path: &FieldPath,
) -> Result<(), FieldError> {
    if pair.request.is_empty() || pair.limit.is_empty() {
        return Ok(());
    }

    let request = ParsedQuantity::parse(pair.request)
        .map_err(|e| FieldError::invalid(request_path, pair.request, e.to_string()))?;
    let limit = ParsedQuantity::parse(pair.limit)
        .map_err(|e| FieldError::invalid(limit_path, pair.limit, e.to_string()))?;

    if policy.holds(&request, &limit) {
        Ok(())
    } else {
        Err(FieldError::invalid(
            limit_path,
            pair.limit,
            format!("must be {} {} {}", policy.relation(), pair.kind, pair.request),
        ))
    }
}

/// Parse one field of a resources block. Empty values are skipped; values
/// that do not parse or are negative are reported on the field.
fn check_quantity(value: &str, path: &FieldPath) -> Result<(), FieldError> {
    if value.is_empty() {
        return Ok(());
    }
    let quantity =
        ParsedQuantity::parse(value).map_err(|e| FieldError::invalid(path, value, e.to_string()))?;
    if quantity.is_negative() {
        return Err(FieldError::invalid(path, value, "must be greater than or equal to 0"));
    }
    Ok(())
}

/// Validate a resources block located at `path` (e.g. `spec.resources`).
///
/// Every field is checked on its own first. A request/limit pair is only
/// compared when both of its fields passed.
pub fn validate_resources(resources: &Resources, path: &FieldPath) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    let mut valid = |value: &str, name: &str| match check_quantity(value, &path.child(name)) {
        Ok(()) => true,
        Err(err) => {
            errors.push(err);
            false
        }
    };
    let cpu_valid = valid(&resources.cpu, "cpu") & valid(&resources.cpu_limit, "cpuLimit");
    let memory_valid =
        valid(&resources.memory, "memory") & valid(&resources.memory_limit, "memoryLimit");
    valid(&resources.storage, "storage");

    if cpu_valid {
        let cpu = QuantityPair {
            kind: "cpu",
            request: &resources.cpu,
            limit: &resources.cpu_limit,
        };
        if let Err(err) = check_limit(cpu, CPU_POLICY, &path.child("cpu"), &path.child("cpuLimit"))
        {
            errors.push(err);
        }
    }

    if memory_valid {
        let memory = QuantityPair {
            kind: "memory",
            request: &resources.memory,
            limit: &resources.memory_limit,
        };
        if let Err(err) = check_limit(
            memory,
            MEMORY_POLICY,
            &path.child("memory"),
            &path.child("memoryLimit"),
        ) {
            errors.push(err);
        }
    }

    errors
}

/// Checks on a resources block that only apply to updates: the storage class
/// is fixed once the claim exists and storage can only grow.
pub fn validate_resources_update(
    old: &Resources,
    new: &Resources,
    path: &FieldPath,
) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    if old.storage_class != new.storage_class {
        errors.push(FieldError::invalid(
            &path.child("storageClass"),
            new.storage_class.clone().unwrap_or_default(),
            "field is immutable",
        ));
    }

    if let (Ok(old_storage), Ok(new_storage)) = (
        ParsedQuantity::parse(&old.storage),
        ParsedQuantity::parse(&new.storage),
    ) {
        if new_storage < old_storage {
            errors.push(FieldError::invalid(
                &path.child("storage"),
                &new.storage,
                format!("must be greater than or equal to previous storage {}", old.storage),
            ));
        }
    }

    errors
}
