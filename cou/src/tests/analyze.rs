//! Tests for topology building and cloud analysis.

use std::collections::BTreeMap;

use super::mock::*;
use crate::catalog::release::{CephRelease, OpenStackRelease};
use crate::config::Config;
use crate::errors::CouError;
use crate::topology::Topology;

#[test]
fn s1_snapshot_derives_the_expected_releases() {
    let topology = topology_s1();
    let snapshot = snapshot_for(&topology, &Config::default()).unwrap();

    assert_eq!(snapshot.current, OpenStackRelease::Ussuri);
    assert_eq!(snapshot.target, OpenStackRelease::Victoria);

    let keystone = &snapshot.applications["keystone"];
    assert_eq!(keystone.release, Some(OpenStackRelease::Ussuri));
    assert_eq!(
        keystone.units["keystone/0"].release,
        Some(OpenStackRelease::Ussuri)
    );

    // subordinates own no units; they inherit their principal's release and
    // machines
    let ldap = &snapshot.applications["keystone-ldap"];
    assert!(ldap.units.is_empty());
    assert_eq!(ldap.release, Some(OpenStackRelease::Ussuri));
    assert!(ldap.machines.contains("1"));

    let ceph = &snapshot.applications["ceph-osd"];
    assert_eq!(ceph.release, Some(OpenStackRelease::Ussuri));
    assert_eq!(ceph.ceph_release, Some(CephRelease::Octopus));
}

#[test]
fn analysis_is_idempotent() {
    let topology = topology_s1();
    let first = snapshot_for(&topology, &Config::default()).unwrap();
    let second = snapshot_for(&topology, &Config::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn mixed_unit_releases_are_fatal() {
    // S3: nova-compute/0 at ussuri, nova-compute/1 at victoria
    let mut status = status_two_zones();
    status
        .applications
        .get_mut("nova-compute")
        .unwrap()
        .units
        .get_mut("nova-compute/1")
        .unwrap()
        .workload_version = NOVA_VICTORIA.to_owned();
    let topology = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap();

    let err = snapshot_for(&topology, &Config::default()).unwrap_err();
    match err {
        CouError::MixedReleases { app, detail } => {
            assert_eq!(app, "nova-compute");
            assert!(detail.contains("nova-compute/0=ussuri"), "{detail}");
            assert!(detail.contains("nova-compute/1=victoria"), "{detail}");
        }
        other => panic!("expected MixedReleases, got {other:?}"),
    }
}

#[test]
fn unknown_charms_are_fatal_unless_skipped() {
    let mut status = status_s1();
    status.applications.insert(
        "frobnicator".to_owned(),
        principal_app(
            "frobnicator",
            "latest/stable",
            BTreeMap::from([("frobnicator/0".to_owned(), unit("1", "1.2.3", true))]),
        ),
    );
    let topology = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap();

    let err = snapshot_for(&topology, &Config::default()).unwrap_err();
    assert!(matches!(err, CouError::UnknownCharm { charm, .. } if charm == "frobnicator"));

    // The skip list is consulted before the catalog. (The CLI restricts the
    // list to the allow-listed names; analysis itself only honours it.)
    let config = Config {
        skip_apps: vec!["frobnicator".to_owned()],
        ..Default::default()
    };
    let snapshot = snapshot_for(&topology, &config).unwrap();
    assert!(snapshot.applications["frobnicator"].skipped);
}

#[test]
fn skipped_vault_does_not_block_analysis() {
    // S2: vault reports a workload the tables know nothing about
    let mut status = status_s1();
    status.applications.insert(
        "vault".to_owned(),
        principal_app(
            "vault",
            "1.7/stable",
            BTreeMap::from([("vault/0".to_owned(), unit("1", "0.0.0-weird", true))]),
        ),
    );
    let topology = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap();

    let config = Config {
        skip_apps: vec!["vault".to_owned()],
        ..Default::default()
    };
    let snapshot = snapshot_for(&topology, &config).unwrap();
    assert!(snapshot.applications["vault"].skipped);
    assert_eq!(snapshot.applications["vault"].release, None);
    assert_eq!(snapshot.current, OpenStackRelease::Ussuri);
}

#[test]
fn final_release_on_the_series_is_an_error() {
    let mut status = status_s1();
    // Everything at yoga on focal: there is nowhere to go without a series
    // upgrade.
    for name in ["keystone", "nova-compute"] {
        let app = status.applications.get_mut(name).unwrap();
        app.charm_channel = "yoga/stable".to_owned();
        let workload = if name == "keystone" { KEYSTONE_YOGA } else { "25.0.0" };
        for unit in app.units.values_mut() {
            unit.workload_version = workload.to_owned();
        }
    }
    status
        .applications
        .get_mut("ceph-osd")
        .unwrap()
        .units
        .get_mut("ceph-osd/0")
        .unwrap()
        .workload_version = "17.2.0".to_owned();
    let topology = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap();

    let err = snapshot_for(&topology, &Config::default()).unwrap_err();
    assert!(matches!(
        err,
        CouError::AlreadyAtFinal {
            release: OpenStackRelease::Yoga,
            ..
        }
    ));
}

#[test]
fn a_principal_two_releases_ahead_is_inconsistent() {
    let mut status = status_s1();
    status.applications.insert(
        "glance".to_owned(),
        principal_app(
            "glance",
            "wallaby/stable",
            BTreeMap::from([("glance/0".to_owned(), unit("1", GLANCE_WALLABY, true))]),
        ),
    );
    let topology = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap();

    let err = snapshot_for(&topology, &Config::default()).unwrap_err();
    match err {
        CouError::InconsistentCloud { app, release, cloud } => {
            assert_eq!(app, "glance");
            assert_eq!(release, OpenStackRelease::Wallaby);
            assert_eq!(cloud, OpenStackRelease::Ussuri);
        }
        other => panic!("expected InconsistentCloud, got {other:?}"),
    }
}

#[test]
fn one_release_ahead_is_tolerated() {
    // keystone already moved to victoria, nova still at ussuri: a partially
    // upgraded control plane is a normal mid-flight state.
    let mut status = status_s1();
    let keystone = status.applications.get_mut("keystone").unwrap();
    keystone.charm_channel = "victoria/stable".to_owned();
    keystone
        .units
        .get_mut("keystone/0")
        .unwrap()
        .workload_version = KEYSTONE_VICTORIA.to_owned();
    status.applications.insert(
        "glance".to_owned(),
        principal_app(
            "glance",
            "ussuri/stable",
            BTreeMap::from([("glance/0".to_owned(), unit("1", "20.4.0", true))]),
        ),
    );
    let topology = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap();

    let snapshot = snapshot_for(&topology, &Config::default()).unwrap();
    assert_eq!(snapshot.current, OpenStackRelease::Ussuri);
    assert_eq!(
        snapshot.applications["keystone"].release,
        Some(OpenStackRelease::Victoria)
    );
}

#[test]
fn empty_workload_versions_are_rejected_by_the_builder() {
    let mut status = status_s1();
    status
        .applications
        .get_mut("keystone")
        .unwrap()
        .units
        .get_mut("keystone/0")
        .unwrap()
        .workload_version = String::new();

    let err = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap_err();
    assert!(matches!(
        err,
        CouError::EmptyWorkloadVersion { app, unit } if app == "keystone" && unit == "keystone/0"
    ));
}

#[test]
fn missing_required_fields_are_rejected_by_the_builder() {
    let mut status = status_s1();
    status
        .applications
        .get_mut("keystone")
        .unwrap()
        .charm_channel = String::new();
    let err = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap_err();
    assert!(matches!(
        err,
        CouError::TopologyField { app, field } if app == "keystone" && field == "charm-channel"
    ));
}

#[test]
fn unsupported_series_strings_are_rejected() {
    let mut status = status_s1();
    for app in status.applications.values_mut() {
        app.series = "bionic".to_owned();
    }
    let err = Topology::from_status(&status, BTreeMap::new(), BTreeMap::new()).unwrap_err();
    assert!(matches!(err, CouError::UnknownSeries { .. }));
}

#[test]
fn hypervisor_instance_counts_survive_into_the_snapshot() {
    let topology =
        topology_two_zones(BTreeMap::from([("nova-compute/0".to_owned(), 3_u64)]));
    let snapshot = snapshot_for(&topology, &Config::default()).unwrap();
    let nova = &snapshot.applications["nova-compute"];
    assert_eq!(nova.units["nova-compute/0"].instance_count, Some(3));
    assert_eq!(nova.units["nova-compute/1"].instance_count, None);
}
