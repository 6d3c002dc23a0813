// End-to-end scenarios across the gate, the admin service and the durable
// files, using only the public library API.

use originbind::admin::{AdminError, AdminService};
use originbind::gatekeeper::{AccessGate, AccessHistory, AuditLog, Decision, GatePolicy};
use originbind::geo::{GeoResolver, MockGeoLookup};
use originbind::identity::{Identity, Origin};
use originbind::persistence::{
    RegistrationStore, ACCESS_HISTORY_FILE, FAILED_LOGINS_FILE, REGISTRATIONS_FILE,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Server {
    store: Arc<RegistrationStore>,
    audit: Arc<AuditLog>,
    gate: AccessGate,
    admin: AdminService,
}

fn open_server(dir: &TempDir) -> Server {
    let store = Arc::new(RegistrationStore::open(dir.path().join(REGISTRATIONS_FILE)).unwrap());
    let audit = Arc::new(AuditLog::open(dir.path().join(FAILED_LOGINS_FILE)).unwrap());
    let history = Arc::new(AccessHistory::open(dir.path().join(ACCESS_HISTORY_FILE), 10).unwrap());

    let gate = AccessGate::new(Arc::clone(&store), Arc::clone(&audit), GatePolicy::default())
        .with_history(Arc::clone(&history));
    let admin = AdminService::new(Arc::clone(&store), Arc::clone(&audit), 2).with_history(history);

    Server {
        store,
        audit,
        gate,
        admin,
    }
}

fn ip(s: &str) -> Origin {
    Origin::parse(s).unwrap()
}

#[test]
fn test_two_origin_lifecycle() {
    let dir = TempDir::new().unwrap();
    let server = open_server(&dir);
    let u1 = Identity::random();

    assert_eq!(server.gate.on_pre_authentication(u1, &ip("1.2.3.4"), "U1"), Decision::Allow);
    assert_eq!(server.store.origins_for(&u1), vec![ip("1.2.3.4")]);

    server.admin.add_origin(&u1, ip("5.6.7.8")).unwrap();
    assert_eq!(server.store.origins_for(&u1), vec![ip("1.2.3.4"), ip("5.6.7.8")]);

    assert_eq!(server.gate.on_pre_authentication(u1, &ip("5.6.7.8"), "U1"), Decision::Allow);
    assert!(server.audit.is_empty());

    assert!(!server.gate.on_pre_authentication(u1, &ip("9.9.9.9"), "U1").is_allowed());
    let denials = server.admin.recent_denials(10);
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].attempted_origin, ip("9.9.9.9"));
    assert!(denials[0].reason.contains("2/2"));

    server.admin.remove_origin(&u1, &ip("5.6.7.8")).unwrap();
    assert!(matches!(
        server.admin.remove_origin(&u1, &ip("5.6.7.8")),
        Err(AdminError::SoleOrigin(_))
    ));

    server.admin.reset_all(&u1).unwrap();
    assert!(!server.store.has_identity(&u1));
    assert!(server.store.origins_for(&u1).is_empty());

    // After a reset the next login registers a new primary.
    assert!(server.gate.on_pre_authentication(u1, &ip("9.9.9.9"), "U1").is_allowed());
    assert_eq!(server.store.origins_for(&u1), vec![ip("9.9.9.9")]);
}

#[test]
fn test_recent_denials_ordering() {
    let dir = TempDir::new().unwrap();
    let server = open_server(&dir);
    let u1 = Identity::random();
    let u2 = Identity::random();

    server.gate.on_pre_authentication(u1, &ip("1.1.1.1"), "U1");
    server.gate.on_pre_authentication(u2, &ip("2.2.2.2"), "U2");

    server.gate.on_pre_authentication(u1, &ip("10.0.0.1"), "U1");
    server.gate.on_pre_authentication(u2, &ip("10.0.0.2"), "U2");
    server.gate.on_pre_authentication(u1, &ip("10.0.0.3"), "U1");

    let all: Vec<String> = server
        .admin
        .recent_denials(10)
        .into_iter()
        .map(|r| r.attempted_origin.to_string())
        .collect();
    assert_eq!(all, vec!["10.0.0.3", "10.0.0.2", "10.0.0.1"]);

    let for_u1: Vec<String> = server
        .admin
        .recent_denials_for(&u1, 10)
        .into_iter()
        .map(|r| r.attempted_origin.to_string())
        .collect();
    assert_eq!(for_u1, vec!["10.0.0.3", "10.0.0.1"]);

    assert_eq!(server.admin.recent_denials(2).len(), 2);
}

#[test]
fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let u1 = Identity::random();

    {
        let server = open_server(&dir);
        server.gate.on_pre_authentication(u1, &ip("1.2.3.4"), "U1");
        server.admin.add_origin(&u1, ip("5.6.7.8")).unwrap();
        server.gate.on_pre_authentication(u1, &ip("9.9.9.9"), "U1");
    }

    let server = open_server(&dir);
    assert_eq!(server.store.origins_for(&u1), vec![ip("1.2.3.4"), ip("5.6.7.8")]);
    assert_eq!(server.audit.len(), 1);
    assert_eq!(server.admin.access_history(&u1).unwrap().len(), 2);
    assert!(server.gate.on_pre_authentication(u1, &ip("5.6.7.8"), "U1").is_allowed());
}

#[test]
fn test_reload_picks_up_external_edits() {
    let dir = TempDir::new().unwrap();
    let server = open_server(&dir);
    let u1 = Identity::random();

    std::fs::write(
        dir.path().join(REGISTRATIONS_FILE),
        format!("[identities]\n\"{}\" = [\"1.2.3.4\"]\n", u1),
    )
    .unwrap();

    let summary = server.admin.reload().unwrap();
    assert_eq!(summary.identities, 1);
    assert!(server.gate.on_pre_authentication(u1, &ip("1.2.3.4"), "U1").is_allowed());
}

#[tokio::test]
async fn test_denials_never_wait_on_geolocation() {
    let dir = TempDir::new().unwrap();
    let server = open_server(&dir);

    let mock = Arc::new(MockGeoLookup::new());
    mock.set_country("9.9.9.9", "DE");
    mock.set_delay(Duration::from_secs(30));
    let geo = Arc::new(GeoResolver::new(mock, Duration::from_secs(3600), Duration::from_secs(60)));

    let gate = AccessGate::new(
        Arc::clone(&server.store),
        Arc::clone(&server.audit),
        GatePolicy::default(),
    )
    .with_geo(geo);

    let u1 = Identity::random();
    gate.on_pre_authentication(u1, &ip("1.2.3.4"), "U1");

    let decision = tokio::time::timeout(
        Duration::from_millis(500),
        async { gate.on_pre_authentication(u1, &ip("9.9.9.9"), "U1") },
    )
    .await
    .expect("decision must not wait on the lookup");

    assert!(!decision.is_allowed());
    assert_eq!(server.audit.recent(1)[0].country, None);
}
