//! Pure authorization decisions. Nothing here performs I/O: the caller
//! fetches owner ids first, and the storage layer applies the returned
//! scopes as query filters.

use mediq_contracts::{
    AccountId, Action, AppointmentParties, EntityKind, ResourceOwnership, Role, Session,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Single-resource decision, evaluated as an OR across the roles held:
/// holding any one sufficient role grants access.
///
/// - ADMIN allows every action on every resource in scope.
/// - A single-owner resource (patient or doctor profile) is accessible to
///   its owner.
/// - A two-sided resource is accessible to a party on either side, but only
///   when the caller holds the role matching the side they occupy.
///
/// The ownership rules are the same for read, update, and delete, so the
/// action does not currently branch the decision beyond the admin override.
pub fn authorize(caller: &Session, resource: ResourceOwnership, _action: Action) -> Decision {
    if caller.roles.contains(Role::Admin) {
        return Decision::Allow;
    }

    let allowed = match resource {
        ResourceOwnership::Single(owner_id) => caller.subject_id == owner_id,
        ResourceOwnership::TwoSided(parties) => {
            let as_patient = caller.subject_id == parties.patient_id
                && caller.roles.contains(Role::Patient);
            let as_doctor =
                caller.subject_id == parties.doctor_id && caller.roles.contains(Role::Doctor);
            as_patient || as_doctor
        }
    };

    if allowed { Decision::Allow } else { Decision::Deny }
}

/// Declarative filter describing which records of an entity type a caller
/// may enumerate. The storage layer translates each variant into a single
/// query whose union clauses are evaluated as one logical OR, so a record
/// matched by two clauses appears exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    /// Every record of the entity type.
    All,
    /// Records whose primary identity is the caller. For appointments this
    /// means records where the caller is either party.
    SelfOnly(AccountId),
    /// Union of the patient-side and doctor-side appointment clauses; a
    /// side is present only when the caller holds the matching role. Both
    /// sides absent matches nothing.
    AppointmentParties {
        patient_id: Option<AccountId>,
        doctor_id: Option<AccountId>,
    },
    /// Patients sharing at least one appointment with the doctor, with the
    /// caller's own profile unioned in when they also hold PATIENT.
    PatientsOfDoctor {
        doctor_id: AccountId,
        include_self: Option<AccountId>,
    },
}

/// Collection-level visibility with union semantics across the roles held.
/// ADMIN takes precedence and short-circuits the union: an admin who is
/// also a patient still sees everything. A role set yielding no clause for
/// the requested entity falls back to self-only.
pub fn visible_scope(caller: &Session, entity: EntityKind) -> QueryScope {
    if caller.roles.contains(Role::Admin) {
        return QueryScope::All;
    }

    let is_patient = caller.roles.contains(Role::Patient);
    let is_doctor = caller.roles.contains(Role::Doctor);

    match entity {
        EntityKind::Appointment => {
            if !is_patient && !is_doctor {
                return QueryScope::SelfOnly(caller.subject_id);
            }
            QueryScope::AppointmentParties {
                patient_id: is_patient.then_some(caller.subject_id),
                doctor_id: is_doctor.then_some(caller.subject_id),
            }
        }
        EntityKind::Patient => match (is_patient, is_doctor) {
            (true, false) => QueryScope::SelfOnly(caller.subject_id),
            (false, true) => QueryScope::PatientsOfDoctor {
                doctor_id: caller.subject_id,
                include_self: None,
            },
            (true, true) => QueryScope::PatientsOfDoctor {
                doctor_id: caller.subject_id,
                include_self: Some(caller.subject_id),
            },
            (false, false) => QueryScope::SelfOnly(caller.subject_id),
        },
        // The doctor directory is public to any signed-in caller.
        EntityKind::Doctor => QueryScope::All,
        // Accounts are never enumerated through the visibility resolver
        // (the ADMIN-only `GET /api/users` path does not call this); the
        // spec's documented safe default is self-only.
        EntityKind::Account => QueryScope::SelfOnly(caller.subject_id),
    }
}

impl QueryScope {
    /// Whether an appointment with the given parties falls inside this
    /// scope. The storage layer expresses the same predicate in SQL; this
    /// form exists for decisions over rows already in memory.
    pub fn permits_appointment(&self, parties: AppointmentParties) -> bool {
        match *self {
            QueryScope::All => true,
            QueryScope::SelfOnly(id) => parties.patient_id == id || parties.doctor_id == id,
            QueryScope::AppointmentParties {
                patient_id,
                doctor_id,
            } => {
                patient_id.is_some_and(|id| parties.patient_id == id)
                    || doctor_id.is_some_and(|id| parties.doctor_id == id)
            }
            QueryScope::PatientsOfDoctor { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediq_contracts::RoleSet;

    fn caller(id: AccountId, roles: &[Role]) -> Session {
        Session {
            subject_id: id,
            roles: RoleSet::from_roles(roles),
        }
    }

    #[test]
    fn admin_is_allowed_regardless_of_ownership() {
        let admin = caller(1, &[Role::Admin, Role::Patient]);

        for action in [Action::Read, Action::Update, Action::Delete] {
            assert!(authorize(&admin, ResourceOwnership::Single(999), action).is_allow());
            assert!(
                authorize(
                    &admin,
                    ResourceOwnership::TwoSided(AppointmentParties {
                        patient_id: 50,
                        doctor_id: 60,
                    }),
                    action,
                )
                .is_allow()
            );
        }
    }

    #[test]
    fn single_owner_resources_require_identity_match() {
        let patient = caller(5, &[Role::Patient]);

        assert!(authorize(&patient, ResourceOwnership::Single(5), Action::Read).is_allow());
        assert_eq!(
            authorize(&patient, ResourceOwnership::Single(6), Action::Read),
            Decision::Deny
        );
    }

    #[test]
    fn two_sided_resources_require_the_role_matching_the_side() {
        let parties = AppointmentParties {
            patient_id: 1,
            doctor_id: 10,
        };

        let patient = caller(1, &[Role::Patient]);
        assert!(authorize(&patient, ResourceOwnership::TwoSided(parties), Action::Read).is_allow());

        // Same identity on the doctor side, but no DOCTOR role held.
        let impostor = caller(10, &[Role::Patient]);
        assert_eq!(
            authorize(&impostor, ResourceOwnership::TwoSided(parties), Action::Read),
            Decision::Deny
        );

        let doctor = caller(10, &[Role::Doctor]);
        assert!(authorize(&doctor, ResourceOwnership::TwoSided(parties), Action::Update).is_allow());

        let outsider = caller(2, &[Role::Patient, Role::Doctor]);
        assert_eq!(
            authorize(&outsider, ResourceOwnership::TwoSided(parties), Action::Delete),
            Decision::Deny
        );
    }

    #[test]
    fn admin_scope_short_circuits_the_union() {
        let admin_patient = caller(3, &[Role::Admin, Role::Patient]);

        for entity in [EntityKind::Patient, EntityKind::Doctor, EntityKind::Appointment] {
            assert_eq!(visible_scope(&admin_patient, entity), QueryScope::All);
        }
    }

    #[test]
    fn patient_sees_only_their_own_appointments() {
        let patient = caller(1, &[Role::Patient]);

        let scope = visible_scope(&patient, EntityKind::Appointment);
        assert_eq!(
            scope,
            QueryScope::AppointmentParties {
                patient_id: Some(1),
                doctor_id: None,
            }
        );

        // patientId matches, doctorId-only matches, neither matches.
        assert!(scope.permits_appointment(AppointmentParties {
            patient_id: 1,
            doctor_id: 10,
        }));
        assert!(!scope.permits_appointment(AppointmentParties {
            patient_id: 2,
            doctor_id: 1,
        }));
        assert!(!scope.permits_appointment(AppointmentParties {
            patient_id: 2,
            doctor_id: 10,
        }));
    }

    #[test]
    fn patient_doctor_union_covers_both_sides_without_duplicates() {
        let both = caller(7, &[Role::Patient, Role::Doctor]);
        let scope = visible_scope(&both, EntityKind::Appointment);

        let table = [
            (1, AppointmentParties { patient_id: 7, doctor_id: 20 }),
            (2, AppointmentParties { patient_id: 30, doctor_id: 7 }),
            (3, AppointmentParties { patient_id: 30, doctor_id: 20 }),
            // Self-referential: both sides are the caller; must appear once.
            (4, AppointmentParties { patient_id: 7, doctor_id: 7 }),
        ];

        let visible: Vec<i64> = table
            .iter()
            .filter(|(_, parties)| scope.permits_appointment(*parties))
            .map(|(id, _)| *id)
            .collect();

        assert_eq!(visible, vec![1, 2, 4]);
    }

    #[test]
    fn patient_profile_scopes_follow_role_combinations() {
        assert_eq!(
            visible_scope(&caller(1, &[Role::Patient]), EntityKind::Patient),
            QueryScope::SelfOnly(1)
        );
        assert_eq!(
            visible_scope(&caller(10, &[Role::Doctor]), EntityKind::Patient),
            QueryScope::PatientsOfDoctor {
                doctor_id: 10,
                include_self: None,
            }
        );
        assert_eq!(
            visible_scope(&caller(7, &[Role::Patient, Role::Doctor]), EntityKind::Patient),
            QueryScope::PatientsOfDoctor {
                doctor_id: 7,
                include_self: Some(7),
            }
        );
    }

    #[test]
    fn doctor_directory_is_visible_to_any_signed_in_caller() {
        assert_eq!(
            visible_scope(&caller(1, &[Role::Patient]), EntityKind::Doctor),
            QueryScope::All
        );
        assert_eq!(
            visible_scope(&caller(10, &[Role::Doctor]), EntityKind::Doctor),
            QueryScope::All
        );
    }

    #[test]
    fn empty_effective_role_set_falls_back_to_self_only() {
        // A token minted before a vocabulary change can carry only tags we
        // no longer recognize; the session then holds no effective role.
        let stale = Session {
            subject_id: 4,
            roles: RoleSet::EMPTY,
        };

        assert_eq!(
            visible_scope(&stale, EntityKind::Appointment),
            QueryScope::SelfOnly(4)
        );
        assert_eq!(
            visible_scope(&stale, EntityKind::Patient),
            QueryScope::SelfOnly(4)
        );
    }

    #[test]
    fn concrete_patient_scenario_matches_only_their_appointment() {
        let session = caller(1, &[Role::Patient]);

        let appointments = [
            (1, AppointmentParties { patient_id: 1, doctor_id: 10 }),
            (2, AppointmentParties { patient_id: 2, doctor_id: 10 }),
        ];

        let scope = visible_scope(&session, EntityKind::Appointment);
        let visible: Vec<i64> = appointments
            .iter()
            .filter(|(_, parties)| scope.permits_appointment(*parties))
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(visible, vec![1]);

        // Reading appointment 2 directly is denied.
        assert_eq!(
            authorize(
                &session,
                ResourceOwnership::TwoSided(appointments[1].1),
                Action::Read,
            ),
            Decision::Deny
        );
    }
}
