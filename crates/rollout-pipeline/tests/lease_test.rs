use std::time::{Duration, SystemTime};

use chrono::Utc;
use rollout_core::{LeaseConfig, ServiceIdentity};
use rollout_pipeline::{LeaseError, LeaseInfo, LeaseRegistry};
use tempfile::TempDir;

const HOUR: Duration = Duration::from_secs(3600);

fn identity() -> ServiceIdentity {
    ServiceIdentity::new("p", "svc", "r1").unwrap()
}

fn write_lease(dir: &TempDir, info: &LeaseInfo) {
    std::fs::write(
        dir.path().join("p.r1.svc.lock"),
        serde_json::to_string(info).unwrap(),
    )
    .unwrap();
}

// ── In-process Tests ──

#[test]
fn second_acquire_conflicts_until_release() {
    let leases = LeaseRegistry::in_memory();

    let guard = leases.acquire(&identity()).unwrap();
    assert!(leases.is_held(&identity()));
    assert!(matches!(
        leases.acquire(&identity()),
        Err(LeaseError::Conflict(_))
    ));

    drop(guard);
    assert!(!leases.is_held(&identity()));
    assert!(leases.acquire(&identity()).is_ok());
}

#[test]
fn clones_share_one_table() {
    let leases = LeaseRegistry::in_memory();
    let other = leases.clone();

    let _guard = leases.acquire(&identity()).unwrap();

    assert!(other.is_held(&identity()));
    assert!(other.acquire(&identity()).is_err());
}

#[test]
fn identities_are_independent() {
    let leases = LeaseRegistry::in_memory();
    let other = ServiceIdentity::new("p", "svc", "r2").unwrap();

    let _a = leases.acquire(&identity()).unwrap();
    let b = leases.acquire(&other).unwrap();

    assert_eq!(b.identity(), &other);
}

// ── Lease File Tests ──

#[test]
fn file_lease_is_written_and_removed() {
    let tmp = TempDir::new().unwrap();
    let leases = LeaseRegistry::with_dir(tmp.path(), HOUR);
    let path = tmp.path().join("p.r1.svc.lock");

    let guard = leases.acquire(&identity()).unwrap();
    let info: LeaseInfo =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(info.identity, "p.r1.svc");
    assert_eq!(info.pid, std::process::id());

    drop(guard);
    assert!(!path.exists());
}

#[test]
fn file_lease_excludes_other_registries() {
    let tmp = TempDir::new().unwrap();
    let first = LeaseRegistry::with_dir(tmp.path(), HOUR);
    // A separate table stands in for another process
    let second = LeaseRegistry::with_dir(tmp.path(), HOUR);

    let guard = first.acquire(&identity()).unwrap();

    match second.acquire(&identity()) {
        Err(LeaseError::Conflict(conflict)) => {
            assert!(conflict.held_by.contains(&std::process::id().to_string()));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(!second.is_held(&identity()));

    drop(guard);
    assert!(second.acquire(&identity()).is_ok());
}

#[test]
fn stale_file_lease_is_broken() {
    let tmp = TempDir::new().unwrap();
    write_lease(
        &tmp,
        &LeaseInfo {
            holder: "ci-runner-7".to_owned(),
            pid: 4242,
            acquired_at: Utc::now() - chrono::Duration::hours(2),
            identity: "p.r1.svc".to_owned(),
        },
    );

    let leases = LeaseRegistry::with_dir(tmp.path(), HOUR);
    let _guard = leases.acquire(&identity()).unwrap();

    let content = std::fs::read_to_string(tmp.path().join("p.r1.svc.lock")).unwrap();
    let info: LeaseInfo = serde_json::from_str(&content).unwrap();
    assert_eq!(info.pid, std::process::id());
}

#[test]
fn fresh_foreign_file_lease_is_respected() {
    let tmp = TempDir::new().unwrap();
    write_lease(
        &tmp,
        &LeaseInfo {
            holder: "ci-runner-7".to_owned(),
            pid: 4242,
            acquired_at: Utc::now(),
            identity: "p.r1.svc".to_owned(),
        },
    );

    let leases = LeaseRegistry::with_dir(tmp.path(), HOUR);
    let err = leases.acquire(&identity()).unwrap_err();

    assert!(err.to_string().contains("ci-runner-7"));
    assert!(tmp.path().join("p.r1.svc.lock").exists());
}

#[test]
fn fresh_empty_lease_file_is_respected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("p.r1.svc.lock");
    // Another run has created the file but not yet written its record
    std::fs::write(&path, "").unwrap();

    let leases = LeaseRegistry::with_dir(tmp.path(), HOUR);

    assert!(matches!(
        leases.acquire(&identity()),
        Err(LeaseError::Conflict(_))
    ));
    assert!(path.exists());
}

#[test]
fn old_unreadable_lease_file_is_broken() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("p.r1.svc.lock");
    std::fs::write(&path, "not json").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - 2 * HOUR)
        .unwrap();

    let leases = LeaseRegistry::with_dir(tmp.path(), HOUR);
    let _guard = leases.acquire(&identity()).unwrap();

    let info: LeaseInfo = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(info.pid, std::process::id());
}

#[test]
fn release_leaves_a_lease_file_another_run_took_over() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("p.r1.svc.lock");
    let leases = LeaseRegistry::with_dir(tmp.path(), HOUR);

    let guard = leases.acquire(&identity()).unwrap();
    let successor = LeaseInfo {
        holder: "ci-runner-7".to_owned(),
        pid: 4242,
        acquired_at: Utc::now(),
        identity: "p.r1.svc".to_owned(),
    };
    write_lease(&tmp, &successor);
    drop(guard);

    let info: LeaseInfo = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(info, successor);
    assert!(!leases.is_held(&identity()));
}

#[test]
fn lease_dir_holds_only_the_lease_file() {
    let tmp = TempDir::new().unwrap();
    let leases = LeaseRegistry::with_dir(tmp.path(), HOUR);

    let _guard = leases.acquire(&identity()).unwrap();

    let names: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names, ["p.r1.svc.lock"]);
}

#[test]
fn lease_dir_is_created() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("nested/leases");
    let leases = LeaseRegistry::from_config(&LeaseConfig {
        dir: Some(dir.clone()),
        stale_after: HOUR,
    });

    let _guard = leases.acquire(&identity()).unwrap();

    assert!(dir.join("p.r1.svc.lock").exists());
}
