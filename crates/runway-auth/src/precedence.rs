//! Authorization precedence.
//!
//! Resolution order for one atomic check:
//! 1. Records on the resource instance beat type-wide (`*`) records.
//! 2. Within a scope, user records beat group records, and group records
//!    beat global ones (GLOBAL records and GRANT/REVOKE records for user `*`).
//! 3. Within one level, REVOKE beats GRANT.
//!
//! A level whose records do not mention the permission does not decide.
//! If no level decides, access is denied.

use runway_core::MissingAuthorization;
use runway_entity::authorization::{
    ANY, Authentication, Authorization, AuthorizationType, CompositePermissionCheck,
    PermissionCheck,
};

/// Outcome of an atomic check that some level decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Granted by a GRANT or GLOBAL record.
    Granted,
    /// Denied by a REVOKE record.
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    User,
    Group,
    Global,
}

const LEVELS: [Level; 3] = [Level::User, Level::Group, Level::Global];

fn level_of(record: &Authorization, authentication: &Authentication) -> Option<Level> {
    match (record.user_id.as_deref(), record.group_id.as_deref()) {
        (Some(ANY), _) => Some(Level::Global),
        (Some(user), _) if user == authentication.user_id => Some(Level::User),
        (None, Some(group)) if authentication.is_member_of(group) => Some(Level::Group),
        _ => None,
    }
}

/// Decide one atomic check, or `None` when no record applies.
pub fn decide(
    records: &[Authorization],
    authentication: &Authentication,
    check: &PermissionCheck,
) -> Option<Decision> {
    let scopes: &[&str] = if check.resource_id == ANY {
        &[ANY]
    } else {
        &[check.resource_id.as_str(), ANY]
    };
    let mask = check.permission.mask();

    for scope in scopes {
        for level in LEVELS {
            let mut granted = 0u32;
            let mut revoked = 0u32;
            for record in records.iter().filter(|r| {
                r.resource == check.resource
                    && r.resource_id == *scope
                    && level_of(r, authentication) == Some(level)
            }) {
                match record.auth_type {
                    AuthorizationType::Revoke => revoked |= record.permissions.bits(),
                    AuthorizationType::Grant | AuthorizationType::Global => {
                        granted |= record.permissions.bits()
                    }
                }
            }

            if revoked & mask != 0 {
                return Some(Decision::Revoked);
            }
            if granted & mask == mask {
                return Some(Decision::Granted);
            }
        }
    }
    None
}

/// Whether `authentication` holds the permission of `check`.
pub fn is_granted(
    records: &[Authorization],
    authentication: &Authentication,
    check: &PermissionCheck,
) -> bool {
    decide(records, authentication, check) == Some(Decision::Granted)
}

/// Unmet atomic checks of a composite check.
///
/// A conjunction reports every failing child; a disjunction reports nothing
/// when one child passes and every child's failures otherwise.
pub fn missing(
    records: &[Authorization],
    authentication: &Authentication,
    check: &CompositePermissionCheck,
) -> Vec<MissingAuthorization> {
    match check {
        CompositePermissionCheck::Atomic(atomic) => {
            if is_granted(records, authentication, atomic) {
                Vec::new()
            } else {
                vec![atomic.to_missing()]
            }
        }
        CompositePermissionCheck::All(children) => children
            .iter()
            .flat_map(|child| missing(records, authentication, child))
            .collect(),
        CompositePermissionCheck::Any(children) => {
            let mut union = Vec::new();
            for child in children {
                let failures = missing(records, authentication, child);
                if failures.is_empty() {
                    return Vec::new();
                }
                union.extend(failures);
            }
            union
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runway_entity::authorization::{Permission, PermissionSet, Resource};

    fn kermit() -> Authentication {
        Authentication::user("kermit").with_groups(["muppets", "frogs"])
    }

    fn record(
        auth_type: AuthorizationType,
        resource_id: &str,
        permissions: &[Permission],
    ) -> Authorization {
        Authorization::new(auth_type, Resource::Job, resource_id)
            .with_permissions(PermissionSet::of(permissions))
    }

    fn grant_user(resource_id: &str, permissions: &[Permission]) -> Authorization {
        record(AuthorizationType::Grant, resource_id, permissions).for_user("kermit")
    }

    fn revoke_user(resource_id: &str, permissions: &[Permission]) -> Authorization {
        record(AuthorizationType::Revoke, resource_id, permissions).for_user("kermit")
    }

    fn grant_group(group: &str, resource_id: &str, permissions: &[Permission]) -> Authorization {
        record(AuthorizationType::Grant, resource_id, permissions).for_group(group)
    }

    fn revoke_group(group: &str, resource_id: &str, permissions: &[Permission]) -> Authorization {
        record(AuthorizationType::Revoke, resource_id, permissions).for_group(group)
    }

    fn global(resource_id: &str, permissions: &[Permission]) -> Authorization {
        record(AuthorizationType::Global, resource_id, permissions)
    }

    fn read_job_1() -> PermissionCheck {
        PermissionCheck::new(Permission::Read, Resource::Job, "job-1")
    }

    #[test]
    fn test_no_records_means_denial() {
        assert_eq!(decide(&[], &kermit(), &read_job_1()), None);
        assert!(!is_granted(&[], &kermit(), &read_job_1()));
    }

    #[test]
    fn test_global_is_the_fallback() {
        let records = vec![global(ANY, &[Permission::Read])];
        assert!(is_granted(&records, &kermit(), &read_job_1()));
        assert!(is_granted(&records, &Authentication::user("gonzo"), &read_job_1()));
    }

    #[test]
    fn test_instance_scope_beats_type_wide() {
        let records = vec![
            grant_user(ANY, &[Permission::Read]),
            revoke_user("job-1", &[Permission::Read]),
        ];
        assert_eq!(decide(&records, &kermit(), &read_job_1()), Some(Decision::Revoked));

        let records = vec![
            revoke_user(ANY, &[Permission::Read]),
            grant_user("job-1", &[Permission::Read]),
        ];
        assert_eq!(decide(&records, &kermit(), &read_job_1()), Some(Decision::Granted));
    }

    #[test]
    fn test_user_beats_group() {
        let records = vec![
            revoke_group("muppets", "job-1", &[Permission::Read]),
            grant_user("job-1", &[Permission::Read]),
        ];
        assert!(is_granted(&records, &kermit(), &read_job_1()));

        let records = vec![
            grant_group("muppets", "job-1", &[Permission::Read]),
            revoke_user("job-1", &[Permission::Read]),
        ];
        assert!(!is_granted(&records, &kermit(), &read_job_1()));
    }

    #[test]
    fn test_group_beats_global() {
        let records = vec![
            global("job-1", &[Permission::Read]),
            revoke_group("frogs", "job-1", &[Permission::Read]),
        ];
        assert!(!is_granted(&records, &kermit(), &read_job_1()));

        let wildcard_revoke =
            record(AuthorizationType::Revoke, "job-1", &[Permission::Read]).for_user(ANY);
        let records = vec![wildcard_revoke, grant_group("frogs", "job-1", &[Permission::Read])];
        assert!(is_granted(&records, &kermit(), &read_job_1()));
    }

    #[test]
    fn test_revoke_beats_grant_within_a_level() {
        let records = vec![
            grant_group("muppets", "job-1", &[Permission::Read]),
            revoke_group("frogs", "job-1", &[Permission::Read]),
        ];
        assert_eq!(decide(&records, &kermit(), &read_job_1()), Some(Decision::Revoked));

        let records = vec![
            grant_user("job-1", &[Permission::Read]),
            revoke_user("job-1", &[Permission::Read]),
        ];
        assert_eq!(decide(&records, &kermit(), &read_job_1()), Some(Decision::Revoked));
    }

    #[test]
    fn test_unrelated_permission_does_not_decide() {
        let records = vec![
            revoke_user("job-1", &[Permission::Delete]),
            grant_group("muppets", ANY, &[Permission::Read]),
        ];
        assert!(is_granted(&records, &kermit(), &read_job_1()));
    }

    #[test]
    fn test_groups_of_other_users_do_not_apply() {
        let records = vec![grant_group("chefs", "job-1", &[Permission::Read])];
        assert!(!is_granted(&records, &kermit(), &read_job_1()));
    }

    #[test]
    fn test_all_permission_needs_every_bit() {
        let all = PermissionCheck::new(Permission::All, Resource::Job, "job-1");

        let records = vec![grant_user("job-1", &[Permission::Read, Permission::Update])];
        assert!(!is_granted(&records, &kermit(), &all));

        let records = vec![grant_user("job-1", &[Permission::All])];
        assert!(is_granted(&records, &kermit(), &all));
    }

    #[test]
    fn test_composite_all_reports_every_failure() {
        let records = vec![grant_user(ANY, &[Permission::Read])];
        let check = CompositePermissionCheck::All(vec![
            CompositePermissionCheck::atomic(Permission::Read, Resource::Job, "job-1"),
            CompositePermissionCheck::atomic(Permission::Update, Resource::Job, "job-1"),
            CompositePermissionCheck::atomic(Permission::Delete, Resource::Job, "job-1"),
        ]);

        let failures = missing(&records, &kermit(), &check);
        let names: Vec<_> = failures.iter().map(|m| m.permission.as_str()).collect();
        assert_eq!(names, vec!["UPDATE", "DELETE"]);
    }

    #[test]
    fn test_composite_any_passes_when_one_child_passes() {
        let records = vec![grant_user(ANY, &[Permission::Update])];
        let check = CompositePermissionCheck::Any(vec![
            CompositePermissionCheck::atomic(Permission::Read, Resource::Job, "job-1"),
            CompositePermissionCheck::atomic(Permission::Update, Resource::Job, "job-1"),
        ]);
        assert!(missing(&records, &kermit(), &check).is_empty());

        let denied = CompositePermissionCheck::Any(vec![
            CompositePermissionCheck::atomic(Permission::Read, Resource::Job, "job-1"),
            CompositePermissionCheck::atomic(Permission::Delete, Resource::Job, "job-1"),
        ]);
        assert_eq!(missing(&records, &kermit(), &denied).len(), 2);
    }
}
