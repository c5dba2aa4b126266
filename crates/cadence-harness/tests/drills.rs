// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use cadence_config::{ConfigError, ConfigService};
use cadence_core::{DriverConfig, GroupOrder};
use cadence_dry_tests::InMemoryConfigStore;
use cadence_harness::drill::{
    emit_repro, load_driver_config, run_split, run_world, torture, DRIVER_KEY,
};

fn default_order() -> GroupOrder {
    GroupOrder::try_from(&DriverConfig::default()).unwrap()
}

#[test]
fn repeated_runs_share_a_digest() {
    let order = default_order();
    let a = run_world(&order, 60).unwrap();
    let b = run_world(&order, 60).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.digest.len(), 64);
    assert!(a.population > 6);
}

#[test]
fn digest_changes_as_the_world_evolves() {
    let order = default_order();
    assert_ne!(
        run_world(&order, 10).unwrap().digest,
        run_world(&order, 11).unwrap().digest
    );
}

#[test]
fn resume_matches_uninterrupted_run_at_every_split() {
    let order = default_order();
    let straight = run_world(&order, 40).unwrap();
    for split in [0, 1, 4, 5, 6, 13, 27, 39, 40] {
        let resumed = run_split(&order, 40, split).unwrap();
        assert_eq!(resumed.digest, straight.digest, "split {split}");
        assert_eq!(resumed.ticks, 40);
    }
}

#[test]
fn resume_holds_for_a_custom_group_order() {
    let order = GroupOrder::new(["late", "main", "early"]).unwrap();
    let straight = run_world(&order, 30).unwrap();
    assert_eq!(run_split(&order, 30, 11).unwrap().digest, straight.digest);
}

#[test]
fn torture_finds_no_divergence() {
    assert!(torture(&default_order(), 25, 4).unwrap().is_none());
}

#[test]
fn driver_config_comes_from_the_store() {
    let json = br#"{"groups":["main"],"ticks":9}"#.to_vec();
    let service = ConfigService::new(InMemoryConfigStore::with_entry(DRIVER_KEY, json));
    let config = load_driver_config(None, Some(&service)).unwrap();
    assert_eq!(config.groups, vec!["main".to_owned()]);
    assert_eq!(config.ticks, 9);

    let empty = ConfigService::new(InMemoryConfigStore::new());
    assert_eq!(
        load_driver_config(None, Some(&empty)).unwrap(),
        DriverConfig::default()
    );
}

#[test]
fn failing_config_store_is_reported_not_defaulted() {
    let store = InMemoryConfigStore::with_entry(DRIVER_KEY, br#"{"ticks":9}"#.to_vec());
    store.set_fail_on_load(true);
    let service = ConfigService::new(store);
    let err = load_driver_config(None, Some(&service)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Other(_))
    ));
    assert_eq!(service.store().load_count(), 1);

    let garbled = ConfigService::new(InMemoryConfigStore::with_entry(
        DRIVER_KEY,
        b"{not json".to_vec(),
    ));
    let err = load_driver_config(None, Some(&garbled)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Serde(_))
    ));
}

#[test]
fn driver_config_file_overrides_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("driver.json");
    std::fs::write(&path, r#"{"ticks":3}"#).unwrap();
    let service = ConfigService::new(InMemoryConfigStore::with_entry(
        DRIVER_KEY,
        br#"{"ticks":99}"#.to_vec(),
    ));
    let config = load_driver_config(Some(path.as_path()), Some(&service)).unwrap();
    assert_eq!(config.ticks, 3);
    assert_eq!(config.groups, DriverConfig::default().groups);
    assert_eq!(service.store().load_count(), 0);
}

#[test]
fn repro_bundle_holds_both_snapshots() {
    let order = default_order();
    let expected = run_world(&order, 5).unwrap();
    let actual = run_world(&order, 6).unwrap();
    let dir = tempfile::tempdir().unwrap();
    emit_repro(dir.path(), &expected, &actual).unwrap();
    for file in ["expected.json", "actual.json", "diff.txt"] {
        assert!(dir.path().join(file).is_file(), "{file}");
    }
    let diff = std::fs::read_to_string(dir.path().join("diff.txt")).unwrap();
    assert!(diff.contains(&actual.digest));
}
