//! Tests for the release catalog: interval lookups, channels, classification,
//! and the canonical round-trip of the shipped tables.

use crate::catalog::lookup::{
    self, lenient_version, parse_lookup, parse_tracks, serialize_lookup, serialize_tracks,
};
use crate::catalog::release::{CephRelease, OpenStackRelease, Series};
use crate::catalog::{CharmCategory, ReleaseCatalog, UpgradeScope};

fn catalog() -> ReleaseCatalog {
    ReleaseCatalog::bundled().unwrap()
}

#[test]
fn release_of_uses_half_open_intervals() {
    let catalog = catalog();
    assert_eq!(
        catalog.release_of("keystone", "17.0.1"),
        Some(OpenStackRelease::Ussuri)
    );
    // lower bound inclusive
    assert_eq!(
        catalog.release_of("keystone", "17.0.0"),
        Some(OpenStackRelease::Ussuri)
    );
    // upper bound exclusive
    assert_eq!(
        catalog.release_of("keystone", "18.0.0"),
        Some(OpenStackRelease::Victoria)
    );
    // below every interval is unknown, not an error
    assert_eq!(catalog.release_of("keystone", "16.9.9"), None);
    assert_eq!(catalog.release_of("keystone", "not-a-version"), None);
}

#[test]
fn release_of_is_monotone() {
    let catalog = catalog();
    let versions = ["21.0.0", "21.0.1", "21.9.9", "22.0.0", "25.3.1", "29.0.4"];
    let releases: Vec<_> = versions
        .iter()
        .map(|v| catalog.release_of("nova-compute", v).unwrap())
        .collect();
    for pair in releases.windows(2) {
        assert!(pair[0] <= pair[1], "release_of must be monotone: {releases:?}");
    }
}

#[test]
fn ceph_charms_use_the_ceph_table() {
    let catalog = catalog();
    assert_eq!(catalog.ceph_release_of("15.2.17"), Some(CephRelease::Octopus));
    assert_eq!(catalog.ceph_release_of("18.2.0"), Some(CephRelease::Reef));
    assert_eq!(catalog.ceph_release_of("14.2.0"), None);
    // folded back into the OpenStack ordering at the earliest release
    assert_eq!(
        catalog.release_of("ceph-osd", "15.2.17"),
        Some(OpenStackRelease::Ussuri)
    );
    assert_eq!(
        catalog.release_of("ceph-mon", "16.2.1"),
        Some(OpenStackRelease::Wallaby)
    );
}

#[test]
fn target_channel_for_openstack_charms_is_the_codename() {
    let catalog = catalog();
    let channel = catalog
        .target_channel("keystone", Series::Focal, OpenStackRelease::Victoria)
        .unwrap();
    assert_eq!(channel.to_string(), "victoria/stable");
}

#[test]
fn target_channel_for_other_charms_uses_the_track_table() {
    let catalog = catalog();
    let rabbit = catalog
        .target_channel("rabbitmq-server", Series::Focal, OpenStackRelease::Victoria)
        .unwrap();
    assert_eq!(rabbit.to_string(), "3.8/stable");

    let ceph = catalog
        .target_channel("ceph-mon", Series::Focal, OpenStackRelease::Wallaby)
        .unwrap();
    assert_eq!(ceph.to_string(), "pacific/stable");

    // no row for a series the charm never shipped on
    assert_eq!(
        catalog.target_channel("rabbitmq-server", Series::Jammy, OpenStackRelease::Ussuri),
        None
    );
}

#[test]
fn reverse_track_lookup_finds_the_greatest_release() {
    let catalog = catalog();
    // 3.8 covers ussuri..yoga on focal; the greatest is yoga
    assert_eq!(
        catalog.reverse_track_release("rabbitmq-server", Series::Focal, "3.8"),
        Some(OpenStackRelease::Yoga)
    );
    assert_eq!(
        catalog.reverse_track_release("rabbitmq-server", Series::Focal, "9.9"),
        None
    );
}

#[test]
fn classification_matches_the_planes() {
    let catalog = catalog();
    assert_eq!(
        catalog.classify("keystone"),
        Some(UpgradeScope::ControlPlanePrincipal)
    );
    assert_eq!(
        catalog.classify("nova-compute"),
        Some(UpgradeScope::DataPlaneHypervisor)
    );
    assert_eq!(
        catalog.classify("ceph-osd"),
        Some(UpgradeScope::DataPlanePrincipal)
    );
    assert_eq!(
        catalog.classify("keystone-ldap"),
        Some(UpgradeScope::ControlPlaneSubordinate)
    );
    assert_eq!(
        catalog.classify("ovn-chassis"),
        Some(UpgradeScope::DataPlaneSubordinate)
    );
    assert_eq!(catalog.classify("hacluster"), Some(UpgradeScope::Auxiliary));
    assert_eq!(catalog.classify("not-a-charm"), None);

    assert_eq!(catalog.category("vault"), Some(CharmCategory::Special));
    assert_eq!(catalog.category("ceph-mon"), Some(CharmCategory::Ceph));
}

#[test]
fn supported_upgrades_are_adjacent_and_share_a_series() {
    let catalog = catalog();
    use OpenStackRelease::*;
    assert!(catalog.supported_upgrade(Ussuri, Victoria));
    assert!(catalog.supported_upgrade(Xena, Yoga));
    // yoga→zed crosses the series boundary via the jammy overlap
    assert!(catalog.supported_upgrade(Yoga, Zed));
    // not adjacent
    assert!(!catalog.supported_upgrade(Ussuri, Wallaby));
    // backwards
    assert!(!catalog.supported_upgrade(Victoria, Ussuri));
}

#[test]
fn origin_key_dispatches_on_charm_name() {
    let catalog = catalog();
    assert_eq!(catalog.origin_config_key("keystone"), "openstack-origin");
    assert_eq!(catalog.origin_config_key("ceph-osd"), "source");
    assert_eq!(catalog.origin_config_key("rabbitmq-server"), "source");
}

#[test]
fn priority_orders_the_control_plane() {
    let catalog = catalog();
    assert!(catalog.priority("rabbitmq-server") < catalog.priority("ceph-mon"));
    assert!(catalog.priority("ceph-mon") < catalog.priority("keystone"));
    assert!(catalog.priority("keystone") < catalog.priority("openstack-dashboard"));
    assert!(catalog.priority("vault") < catalog.priority("some-unknown-charm"));
}

#[test]
fn lenient_versions_pad_and_strip() {
    assert_eq!(lenient_version("3.9").unwrap().to_string(), "3.9.0");
    assert_eq!(lenient_version("17.0.1").unwrap().to_string(), "17.0.1");
    assert_eq!(lenient_version("21.0.0~rc1").unwrap().to_string(), "21.0.0");
    assert_eq!(lenient_version("15").unwrap().to_string(), "15.0.0");
    assert!(lenient_version("garbage").is_none());
    assert!(lenient_version("").is_none());
}

#[test]
fn shipped_tables_round_trip_canonically() {
    let parsed = parse_lookup(lookup::OPENSTACK_LOOKUP_CSV).unwrap();
    assert_eq!(serialize_lookup(&parsed), lookup::OPENSTACK_LOOKUP_CSV);

    let tracks = parse_tracks(lookup::TRACK_MAPPING_CSV).unwrap();
    assert_eq!(serialize_tracks(&tracks), lookup::TRACK_MAPPING_CSV);
}

#[test]
fn catalog_views_match_the_shipped_tables() {
    let catalog = catalog();
    assert_eq!(
        serialize_lookup(&catalog.workload_table()),
        lookup::OPENSTACK_LOOKUP_CSV
    );
    assert_eq!(
        serialize_tracks(catalog.track_table()),
        lookup::TRACK_MAPPING_CSV
    );
}
