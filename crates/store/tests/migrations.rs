use std::time::{SystemTime, UNIX_EPOCH};

use mediq_contracts::{EntityKind, ErrorKind, Role, RoleSet, Session};
use mediq_policy::{QueryScope, visible_scope};
use mediq_store::{NewAppointment, NewDoctor, NewPatient, Store};

fn test_db_url() -> Option<String> {
    std::env::var("MEDIQ_TEST_DB_URL")
        .ok()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn schema_db_url(base: &str, schema: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!("{base}{separator}options=-csearch_path%3D{schema}")
}

async fn fresh_store() -> Option<Store> {
    let db_url = test_db_url()?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    let schema = format!("mediq_test_{}_{}", std::process::id(), nanos);

    let admin_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await
        .expect("DB connect should succeed");
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin_pool)
        .await
        .expect("create schema should succeed");
    admin_pool.close().await;

    let store = Store::connect_and_migrate(
        &schema_db_url(&db_url, &schema),
        4,
        std::time::Duration::from_secs(5),
    )
    .await
    .expect("store should connect and migrate");

    store.migrate().await.expect("migrations are idempotent");

    Some(store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registration_conflicts_and_reference_checks() {
    let Some(store) = fresh_store().await else {
        eprintln!("skipping DB test; set MEDIQ_TEST_DB_URL to enable");
        return;
    };

    let emily = store
        .register_patient(NewPatient {
            email: "emily.smith@example.com".to_string(),
            password_hash: "$argon2id$stub$stub".to_string(),
            name: "Emily Smith".to_string(),
            street: None,
            number: None,
            postal_code: None,
            city: None,
            birthdate: None,
        })
        .await
        .expect("registration should succeed");
    assert_eq!(emily.roles, vec!["PATIENT".to_string()]);

    let err = store
        .register_patient(NewPatient {
            email: "emily.smith@example.com".to_string(),
            password_hash: "$argon2id$stub$stub".to_string(),
            name: "Someone Else".to_string(),
            street: None,
            number: None,
            postal_code: None,
            city: None,
            birthdate: None,
        })
        .await
        .expect_err("duplicate email must conflict");
    assert_eq!(err.kind, ErrorKind::Conflict);

    let nora = store
        .create_doctor(NewDoctor {
            email: "nora.janssens@example.com".to_string(),
            password_hash: "$argon2id$stub$stub".to_string(),
            name: "Nora Janssens".to_string(),
            speciality: "Cardiology".to_string(),
            hospital: None,
            about: None,
        })
        .await
        .expect("doctor creation should succeed");

    let created = store
        .create_appointment(NewAppointment {
            patient_id: emily.id,
            doctor_id: nora.id,
            date: "2023-12-01T09:00:00Z".parse().expect("date must parse"),
            description: "Routine checkup".to_string(),
            condition: None,
            number_of_beds: None,
        })
        .await
        .expect("appointment creation should succeed");
    assert_eq!(created.patient.id, emily.id);
    assert_eq!(created.doctor.id, nora.id);

    // Missing patient, valid doctor: the error names the patient.
    let err = store
        .create_appointment(NewAppointment {
            patient_id: 999,
            doctor_id: nora.id,
            date: "2023-12-01T09:00:00Z".parse().expect("date must parse"),
            description: "Ghost".to_string(),
            condition: None,
            number_of_beds: None,
        })
        .await
        .expect_err("missing patient must fail");
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(
        err.details,
        Some(serde_json::json!({ "entity": "patient", "id": 999 }))
    );

    // Both missing: both are reported, no short-circuit.
    let err = store
        .create_appointment(NewAppointment {
            patient_id: 999,
            doctor_id: 998,
            date: "2023-12-01T09:00:00Z".parse().expect("date must parse"),
            description: "Ghost".to_string(),
            condition: None,
            number_of_beds: None,
        })
        .await
        .expect_err("missing parties must fail");
    assert_eq!(err.kind, ErrorKind::NotFound);
    let details = err.details.expect("details must be present");
    assert_eq!(
        details
            .get("missing")
            .and_then(|m| m.as_array())
            .map(|m| m.len()),
        Some(2)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn visibility_scopes_deduplicate_union_results() {
    let Some(store) = fresh_store().await else {
        eprintln!("skipping DB test; set MEDIQ_TEST_DB_URL to enable");
        return;
    };

    let mara = store
        .register_patient(NewPatient {
            email: "mara@example.com".to_string(),
            password_hash: "$argon2id$stub$stub".to_string(),
            name: "Mara".to_string(),
            street: None,
            number: None,
            postal_code: None,
            city: None,
            birthdate: None,
        })
        .await
        .expect("registration should succeed");

    let pieter = store
        .create_doctor(NewDoctor {
            email: "pieter@example.com".to_string(),
            password_hash: "$argon2id$stub$stub".to_string(),
            name: "Pieter".to_string(),
            speciality: "Dermatology".to_string(),
            hospital: None,
            about: None,
        })
        .await
        .expect("doctor creation should succeed");

    // Give Mara a doctor profile too, so she can hold both roles.
    store
        .update_account_roles(mara.id, RoleSet::from_roles(&[Role::Patient, Role::Doctor]))
        .await
        .expect("role update should succeed");
    sqlx::query("INSERT INTO doctors (id, name, speciality) VALUES ($1, 'Mara', 'General practice')")
        .bind(mara.id)
        .execute(store.pool())
        .await
        .expect("doctor profile insert should succeed");

    let date: chrono::DateTime<chrono::Utc> =
        "2023-12-01T09:00:00Z".parse().expect("date must parse");

    // Mara as patient of Pieter, Mara as her own doctor (self-referential),
    // and an unrelated pair.
    for (patient_id, doctor_id) in [(mara.id, pieter.id), (mara.id, mara.id)] {
        store
            .create_appointment(NewAppointment {
                patient_id,
                doctor_id,
                date,
                description: "Consultation".to_string(),
                condition: None,
                number_of_beds: None,
            })
            .await
            .expect("appointment creation should succeed");
    }

    let both = Session {
        subject_id: mara.id,
        roles: RoleSet::from_roles(&[Role::Patient, Role::Doctor]),
    };
    let scope = visible_scope(&both, EntityKind::Appointment);

    let visible = store
        .list_appointments(&scope)
        .await
        .expect("listing should succeed");
    assert_eq!(visible.len(), 2);

    let mut ids: Vec<i64> = visible.iter().map(|a| a.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 2, "self-referential appointment must appear once");

    // Pure-patient scope sees only the patient-side records.
    let patient_only = Session {
        subject_id: pieter.id,
        roles: RoleSet::from_roles(&[Role::Patient]),
    };
    let scope = visible_scope(&patient_only, EntityKind::Appointment);
    let visible = store
        .list_appointments(&scope)
        .await
        .expect("listing should succeed");
    assert!(visible.is_empty());

    // Doctor sees the patients they share an appointment with.
    let doctor = Session {
        subject_id: pieter.id,
        roles: RoleSet::from_roles(&[Role::Doctor]),
    };
    let scope = visible_scope(&doctor, EntityKind::Patient);
    let patients = store
        .list_patients(&scope)
        .await
        .expect("listing should succeed");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].id, mara.id);

    // Deleting the account cascades through profiles and appointments.
    assert!(store
        .delete_account(mara.id)
        .await
        .expect("delete should succeed"));
    let remaining = store
        .list_appointments(&QueryScope::All)
        .await
        .expect("listing should succeed");
    assert!(remaining.is_empty());
}
