//! Binding machines to licenses: quota, fingerprints and rejections.

use crate::common::*;
use serde_json::json;

fn latest_event(conn: &rusqlite::Connection, license_id: &str) -> Event {
    events_of(conn, license_id)
        .into_iter()
        .next()
        .expect("license should have events")
}

#[test]
fn test_first_bind_activates_pending_license() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    let outcome = bind(&mut conn, &license, "MACHINE-1", &hw(Some("K1"), Some("MB1"), Some("D1"))).unwrap();

    assert!(outcome.is_new);
    assert!(!outcome.hardware_changed());
    assert_eq!(outcome.license.status, LicenseStatus::Active);
    assert_eq!(reload_license(&conn, &license.id).status, LicenseStatus::Active);

    assert_eq!(outcome.activation.machine_code, "MACHINE-1");
    assert_eq!(outcome.activation.keypro_id.as_deref(), Some("K1"));
    assert_eq!(outcome.activation.ip_address.as_deref(), Some("198.51.100.10"));

    let events = events_of(&conn, &license.id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Activation);
    assert_eq!(events[0].severity, Severity::Info);
    assert_eq!(events[0].activation_id.as_deref(), Some(outcome.activation.id.as_str()));
    assert_eq!(events[0].serial_number, license.serial_number);
    assert_eq!(events[0].user_agent.as_deref(), Some("license-client/2.0"));
    assert!(!events[0].is_confirmed);
}

#[test]
fn test_bind_by_license_id() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    let hardware = HardwareDescriptor::default();

    let outcome = binder::bind(
        &mut conn,
        &EngineSettings::default(),
        &BindRequest {
            license: LicenseLookup::Id(&license.id),
            machine_code: "MACHINE-1",
            hardware: &hardware,
            app_version: Some("4.2.0"),
            client: &ClientInfo::default(),
        },
    )
    .unwrap();

    assert!(outcome.is_new);
    assert_eq!(outcome.activation.app_version.as_deref(), Some("4.2.0"));
}

#[test]
fn test_identical_revalidation_keeps_one_row() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    let hardware = hw(Some("K1"), Some("MB1"), Some("D1"));

    let first = bind(&mut conn, &license, "MACHINE-1", &hardware).unwrap();
    let second = bind(&mut conn, &license, "MACHINE-1", &hardware).unwrap();
    let third = bind(&mut conn, &license, "MACHINE-1", &hardware).unwrap();

    assert!(first.is_new);
    assert!(!second.is_new);
    assert!(!third.is_new);
    assert_eq!(second.activation.id, first.activation.id);

    let activations = queries::list_activations_for_license(&conn, &license.id).unwrap();
    assert_eq!(activations.len(), 1);

    for outcome in [&second, &third] {
        assert_eq!(outcome.event.event_type, EventType::Validation);
        assert_eq!(
            outcome.event.event_subtype.as_deref(),
            Some(classifier::subtype::NORMAL_VALIDATION)
        );
        assert_eq!(outcome.event.severity, Severity::Info);
        // Routine traffic is confirmed on write
        assert!(outcome.event.is_confirmed);
        assert_eq!(outcome.event.confirmed_by.as_deref(), Some(classifier::SYSTEM_ACTOR));
    }
    assert_eq!(classifier::unconfirmed_count_for(&conn, &license.id).unwrap(), 1);
}

#[test]
fn test_routine_validations_stay_unconfirmed_when_auto_confirm_is_off() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    let settings = EngineSettings {
        auto_confirm_routine: false,
        ..Default::default()
    };
    let hardware = hw(Some("K1"), None, None);

    bind_with(&mut conn, &settings, &license, "MACHINE-1", &hardware).unwrap();
    let outcome = bind_with(&mut conn, &settings, &license, "MACHINE-1", &hardware).unwrap();

    assert_eq!(outcome.event.event_type, EventType::Validation);
    assert!(!outcome.event.is_confirmed);
    assert_eq!(classifier::unconfirmed_count_for(&conn, &license.id).unwrap(), 2);
}

#[test]
fn test_one_changed_component_is_a_warning() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    bind(&mut conn, &license, "MACHINE-1", &hw(Some("K1"), Some("MB1"), Some("D1"))).unwrap();
    let outcome = bind(&mut conn, &license, "MACHINE-1", &hw(Some("K1"), Some("MB2"), Some("D1"))).unwrap();

    assert!(outcome.hardware_changed());
    assert!(!outcome.is_new);
    assert_eq!(outcome.event.event_type, EventType::HardwareChange);
    assert_eq!(outcome.event.severity, Severity::Warning);
    assert!(!outcome.event.is_confirmed);
    assert_eq!(
        outcome.event.details,
        Some(json!({
            "hardware_changes": { "motherboard_id": { "old": "MB1", "new": "MB2" } },
            "changed_count": 1,
        }))
    );
    assert_eq!(outcome.activation.motherboard_id.as_deref(), Some("MB2"));
}

#[test]
fn test_two_changed_components_are_suspicious() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    bind(&mut conn, &license, "MACHINE-1", &hw(Some("K1"), Some("MB1"), Some("D1"))).unwrap();
    let outcome = bind(&mut conn, &license, "MACHINE-1", &hw(Some("K2"), Some("MB1"), Some("D2"))).unwrap();

    assert_eq!(outcome.event.event_type, EventType::HardwareChange);
    assert_eq!(outcome.event.severity, Severity::Suspicious);
    let details = outcome.event.details.unwrap();
    assert_eq!(details["changed_count"], 2);
    assert_eq!(details["hardware_changes"]["keypro_id"]["old"], "K1");
    assert_eq!(details["hardware_changes"]["disk_id"]["new"], "D2");
    assert!(details["hardware_changes"].get("motherboard_id").is_none());
}

#[test]
fn test_comparison_uses_last_known_snapshot() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    bind(&mut conn, &license, "MACHINE-1", &hw(None, Some("A"), Some("B"))).unwrap();

    let second = bind(&mut conn, &license, "MACHINE-1", &hw(None, Some("C"), Some("B"))).unwrap();
    assert_eq!(second.event.severity, Severity::Warning);
    assert_eq!(
        second.event.details.as_ref().unwrap()["hardware_changes"]["motherboard_id"],
        json!({ "old": "A", "new": "C" })
    );

    // Motherboard C is now the baseline; only the disk differs
    let third = bind(&mut conn, &license, "MACHINE-1", &hw(None, Some("C"), Some("D"))).unwrap();
    assert_eq!(third.event.severity, Severity::Warning);
    assert_eq!(
        third.event.details.as_ref().unwrap()["hardware_changes"],
        json!({ "disk_id": { "old": "B", "new": "D" } })
    );

    let fourth = bind(&mut conn, &license, "MACHINE-1", &hw(None, Some("C"), Some("D"))).unwrap();
    assert_eq!(fourth.event.event_type, EventType::Validation);
    assert_eq!(fourth.event.severity, Severity::Info);
}

#[test]
fn test_missing_or_placeholder_components_are_not_changes() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    bind(&mut conn, &license, "MACHINE-1", &hw(Some("K1"), Some("MB1"), Some("D1"))).unwrap();
    let outcome = bind(
        &mut conn,
        &license,
        "MACHINE-1",
        &hw(None, Some("  "), Some("Volume{4f2a}")),
    )
    .unwrap();

    assert_eq!(outcome.event.event_type, EventType::Validation);
    assert_eq!(outcome.event.severity, Severity::Info);

    // The stored snapshot keeps the last usable values
    assert_eq!(outcome.activation.hardware(), hw(Some("K1"), Some("MB1"), Some("D1")));
}

#[test]
fn test_quota_exceeded_is_rejected_and_recorded() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap();
    let err = bind(&mut conn, &license, "MACHINE-2", &HardwareDescriptor::default()).unwrap_err();

    assert!(matches!(err, AppError::QuotaExceeded { used: 1, max: 1 }));

    let activations = queries::list_activations_for_license(&conn, &license.id).unwrap();
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].machine_code, "MACHINE-1");

    let event = latest_event(&conn, &license.id);
    assert_eq!(event.event_type, EventType::Activation);
    assert_eq!(event.event_subtype.as_deref(), Some(classifier::subtype::QUOTA_EXCEEDED));
    assert!(event.severity >= Severity::Warning);
    assert_eq!(event.machine_code.as_deref(), Some("MACHINE-2"));
    assert!(event.activation_id.is_none());
}

#[test]
fn test_deactivation_frees_a_slot() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    let first = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap();
    let change = binder::deactivate(
        &mut conn,
        &EngineSettings::default(),
        &first.activation.id,
        Some("ops@example.test"),
        &ClientInfo::default(),
    )
    .unwrap();

    assert_eq!(change.activation.status, ActivationStatus::Deactivated);
    assert!(change.activation.deactivated_at.is_some());
    assert_eq!(change.event.event_type, EventType::Deactivation);
    assert_eq!(change.event.details, Some(json!({ "actor": "ops@example.test" })));

    let second = bind(&mut conn, &license, "MACHINE-2", &HardwareDescriptor::default()).unwrap();
    assert!(second.is_new);
    assert_eq!(queries::count_quota_activations(&conn, &license.id).unwrap(), 1);
}

#[test]
fn test_deactivated_machine_reactivates_its_row() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    let first = bind(&mut conn, &license, "MACHINE-1", &hw(Some("K1"), None, None)).unwrap();
    binder::deactivate(
        &mut conn,
        &EngineSettings::default(),
        &first.activation.id,
        None,
        &ClientInfo::default(),
    )
    .unwrap();

    let again = bind(&mut conn, &license, "MACHINE-1", &hw(Some("K9"), None, None)).unwrap();
    assert!(!again.is_new);
    assert_eq!(again.activation.id, first.activation.id);
    assert_eq!(again.activation.status, ActivationStatus::Active);
    assert!(again.activation.deactivated_at.is_none());
    assert_eq!(again.activation.keypro_id.as_deref(), Some("K9"));
    assert_eq!(again.event.event_type, EventType::ReActivation);
    assert_eq!(again.event.severity, Severity::Info);
}

#[test]
fn test_reactivation_respects_quota() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    let first = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap();
    binder::deactivate(
        &mut conn,
        &EngineSettings::default(),
        &first.activation.id,
        None,
        &ClientInfo::default(),
    )
    .unwrap();
    bind(&mut conn, &license, "MACHINE-2", &HardwareDescriptor::default()).unwrap();

    let err = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { .. }));

    let event = latest_event(&conn, &license.id);
    assert_eq!(event.event_type, EventType::ReActivation);
    assert_eq!(event.activation_id.as_deref(), Some(first.activation.id.as_str()));
}

#[test]
fn test_blacklisted_machine_is_rejected_on_every_attempt() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    let first = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap();
    let change = binder::blacklist(
        &mut conn,
        &EngineSettings::default(),
        &first.activation.id,
        Some("admin"),
        &ClientInfo::default(),
    )
    .unwrap();
    assert_eq!(change.activation.status, ActivationStatus::Blacklisted);
    assert!(change.activation.blacklisted_at.is_some());

    for _ in 0..3 {
        let err = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap_err();
        assert!(matches!(err, AppError::Blacklisted));
    }

    let critical: Vec<Event> = events_of(&conn, &license.id)
        .into_iter()
        .filter(|e| e.severity == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 3);
    assert!(critical.iter().all(|e| {
        e.event_subtype.as_deref() == Some(classifier::subtype::BLACKLISTED_MACHINE) && !e.is_confirmed
    }));

    // The banned machine keeps its slot
    let err = bind(&mut conn, &license, "MACHINE-2", &HardwareDescriptor::default()).unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { used: 1, max: 1 }));
}

#[test]
fn test_blacklisted_machine_cannot_be_deactivated_or_blacklisted_again() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 2);
    let settings = EngineSettings::default();

    let first = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap();
    let id = first.activation.id.clone();
    binder::blacklist(&mut conn, &settings, &id, None, &ClientInfo::default()).unwrap();

    let err = binder::blacklist(&mut conn, &settings, &id, None, &ClientInfo::default()).unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    let err = binder::deactivate(&mut conn, &settings, &id, None, &ClientInfo::default()).unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    let activation = queries::get_activation_by_id(&conn, &id).unwrap().unwrap();
    assert_eq!(activation.status, ActivationStatus::Blacklisted);

    let err = binder::deactivate(&mut conn, &settings, "missing", None, &ClientInfo::default()).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn test_blacklisted_hardware_under_new_machine_code_is_rejected() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 2);
    let hardware = hw(Some("K1"), Some("MB1"), Some("D1"));

    let first = bind(&mut conn, &license, "MACHINE-1", &hardware).unwrap();
    binder::blacklist(
        &mut conn,
        &EngineSettings::default(),
        &first.activation.id,
        None,
        &ClientInfo::default(),
    )
    .unwrap();

    let err = bind(&mut conn, &license, "MACHINE-1-CLONE", &hardware).unwrap_err();
    assert!(matches!(err, AppError::Blacklisted));

    // A single shared component is enough
    let err = bind(&mut conn, &license, "MACHINE-9", &hw(None, None, Some("D1"))).unwrap_err();
    assert!(matches!(err, AppError::Blacklisted));

    let event = latest_event(&conn, &license.id);
    assert_eq!(event.event_type, EventType::Validation);
    assert_eq!(event.event_subtype.as_deref(), Some(classifier::subtype::HARDWARE_ID_MATCH));
    assert_eq!(event.severity, Severity::Critical);
    assert_eq!(event.machine_code.as_deref(), Some("MACHINE-9"));
    assert_eq!(event.activation_id.as_deref(), Some(first.activation.id.as_str()));
    let details = event.details.unwrap();
    assert_eq!(details["matched_machine_code"], "MACHINE-1");
    assert_eq!(details["matched_components"], json!(["disk_id"]));
    assert!(!event.is_confirmed);

    assert!(queries::get_activation_for_machine(&conn, &license.id, "MACHINE-1-CLONE")
        .unwrap()
        .is_none());
    assert_eq!(queries::count_quota_activations(&conn, &license.id).unwrap(), 1);
}

#[test]
fn test_placeholder_disk_ids_do_not_match_blacklisted_hardware() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 3);

    let first = bind(&mut conn, &license, "MACHINE-1", &hw(None, None, Some("DAHA"))).unwrap();
    binder::blacklist(
        &mut conn,
        &EngineSettings::default(),
        &first.activation.id,
        None,
        &ClientInfo::default(),
    )
    .unwrap();

    let outcome = bind(&mut conn, &license, "MACHINE-2", &hw(None, None, Some("DAHA"))).unwrap();
    assert!(outcome.is_new);
    assert_eq!(
        outcome.event.event_subtype.as_deref(),
        Some(classifier::subtype::NEW_ACTIVATION)
    );
}

#[test]
fn test_active_hardware_under_new_machine_code_is_flagged() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 2);

    let first = bind(&mut conn, &license, "MACHINE-1", &hw(Some("K1"), Some("MB1"), Some("D1"))).unwrap();
    let clone = bind(&mut conn, &license, "MACHINE-2", &hw(Some("K1"), Some("MB2"), Some("D2"))).unwrap();

    assert!(clone.is_new);
    assert_eq!(clone.event.event_type, EventType::Activation);
    assert_eq!(
        clone.event.event_subtype.as_deref(),
        Some(classifier::subtype::HARDWARE_ID_MATCH)
    );
    assert_eq!(clone.event.severity, Severity::Suspicious);
    let details = clone.event.details.unwrap();
    assert_eq!(details["matched_activation_id"], json!(first.activation.id));
    assert_eq!(details["matched_components"], json!(["keypro_id"]));
    assert_eq!(details["blacklisted"], false);
}

#[test]
fn test_deactivated_machine_can_still_be_blacklisted() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    let settings = EngineSettings::default();

    let first = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap();
    binder::deactivate(&mut conn, &settings, &first.activation.id, None, &ClientInfo::default()).unwrap();
    binder::blacklist(&mut conn, &settings, &first.activation.id, None, &ClientInfo::default()).unwrap();

    let err = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap_err();
    assert!(matches!(err, AppError::Blacklisted));
}

#[test]
fn test_expired_license_rejects_bind_and_persists_status() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);

    bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap();
    lifecycle::update(
        &conn,
        &license.id,
        &UpdateLicense {
            expires_at: Some(Some(past_timestamp(1))),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(reload_license(&conn, &license.id).status, LicenseStatus::Active);

    let err = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap_err();
    assert!(matches!(err, AppError::LicenseInactive(_)));

    // The lapse is written back even though the bind was refused
    assert_eq!(reload_license(&conn, &license.id).status, LicenseStatus::Expired);

    let event = latest_event(&conn, &license.id);
    assert_eq!(event.event_subtype.as_deref(), Some(classifier::subtype::LICENSE_INACTIVE));
    assert_eq!(event.severity, Severity::Warning);
    assert_eq!(event.details.as_ref().unwrap()["status"], "expired");
}

#[test]
fn test_disabled_license_rejects_bind() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    lifecycle::set_status(&conn, &license.id, LicenseStatus::Disabled).unwrap();

    let err = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap_err();
    assert!(matches!(err, AppError::LicenseInactive(_)));
    assert!(queries::list_activations_for_license(&conn, &license.id).unwrap().is_empty());
    assert_eq!(events_of(&conn, &license.id).len(), 1);
}

#[test]
fn test_pending_license_past_expiry_rejects_bind() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let customer = create_test_customer(&conn, "Late Starter", "5550001112");
    let product = create_test_product(&conn, "Suite", &[]);
    let mut input = license_input(&customer, &product, 1);
    input.expires_at = Some(past_timestamp(2));
    let license = create_test_license_with(&mut conn, input);

    let err = bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap_err();
    assert!(matches!(err, AppError::LicenseInactive(_)));
    assert_eq!(reload_license(&conn, &license.id).status, LicenseStatus::Pending);
}

#[test]
fn test_unknown_serial_and_blank_machine_code() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    let hardware = HardwareDescriptor::default();

    let err = binder::bind(
        &mut conn,
        &EngineSettings::default(),
        &BindRequest {
            license: LicenseLookup::Serial("LIC-NOPE-NOPE"),
            machine_code: "MACHINE-1",
            hardware: &hardware,
            app_version: None,
            client: &ClientInfo::default(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = bind(&mut conn, &license, "  ", &hardware).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(events_of(&conn, &license.id).is_empty());
}

#[test]
fn test_manual_bind_enforces_quota() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    let settings = EngineSettings::default();

    let outcome =
        binder::bind_manual(&mut conn, &settings, &license.id, "MACHINE-1", &ClientInfo::default()).unwrap();
    assert!(outcome.is_new);
    assert_eq!(outcome.license.status, LicenseStatus::Active);
    assert_eq!(
        outcome.event.event_subtype.as_deref(),
        Some(classifier::subtype::MANUAL_ACTIVATION)
    );

    let err = binder::bind_manual(&mut conn, &settings, &license.id, "MACHINE-1", &ClientInfo::default())
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = binder::bind_manual(&mut conn, &settings, &license.id, "MACHINE-2", &ClientInfo::default())
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { used: 1, max: 1 }));

    let err = binder::bind_manual(&mut conn, &settings, "missing", "MACHINE-3", &ClientInfo::default())
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn test_manual_bind_reuses_deactivated_row() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    let settings = EngineSettings::default();

    let first = bind(&mut conn, &license, "MACHINE-1", &hw(Some("K1"), Some("MB1"), None)).unwrap();
    binder::deactivate(&mut conn, &settings, &first.activation.id, None, &ClientInfo::default()).unwrap();

    let outcome =
        binder::bind_manual(&mut conn, &settings, &license.id, "MACHINE-1", &ClientInfo::default()).unwrap();
    assert!(!outcome.is_new);
    assert_eq!(outcome.activation.id, first.activation.id);
    assert_eq!(outcome.activation.status, ActivationStatus::Active);
    assert_eq!(outcome.activation.hardware(), hw(Some("K1"), Some("MB1"), None));
}

#[test]
fn test_client_deactivation_by_machine() {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let license = create_test_license(&mut conn, 1);
    let settings = EngineSettings::default();

    bind(&mut conn, &license, "MACHINE-1", &HardwareDescriptor::default()).unwrap();
    let change = binder::deactivate_by_machine(
        &mut conn,
        &settings,
        &license.serial_number,
        "MACHINE-1",
        &ClientInfo::default(),
    )
    .unwrap();
    assert_eq!(change.activation.status, ActivationStatus::Deactivated);
    assert_eq!(
        change.event.event_subtype.as_deref(),
        Some(classifier::subtype::CLIENT_DEACTIVATION)
    );

    let err = binder::deactivate_by_machine(
        &mut conn,
        &settings,
        &license.serial_number,
        "MACHINE-1",
        &ClientInfo::default(),
    )
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
