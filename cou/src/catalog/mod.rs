//! The release catalog: everything the tool statically knows about charms,
//! releases, and channels.
//!
//! The catalog is frozen at construction and exposes pure lookups only.
//! Workload-version intervals and track mappings come from the two CSVs
//! shipped with the tool; charm classification is a set of built-in tables
//! below, keyed by charm name.

pub mod lookup;
pub mod release;

use std::collections::BTreeMap;

use cou_juju::Channel;

use crate::errors::CouResult;
use lookup::WorkloadRange;
use release::{CephRelease, OpenStackRelease, Series};

/// How a charm is delivered and attached
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CharmCategory {
    /// An OpenStack service with its own units
    OpenStackPrincipal,
    /// An OpenStack service riding on a principal's units
    OpenStackSubordinate,
    /// A supporting service with its own units (message queue, database, ...)
    AuxiliaryPrincipal,
    /// A supporting service riding on a principal's units
    AuxiliarySubordinate,
    /// The ceph family, versioned by ceph releases rather than OpenStack ones
    Ceph,
    /// Charms with their own rules (vault)
    Special,
}

/// Where a charm sits in the upgrade ordering
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpgradeScope {
    /// Upgraded in the control-plane phase, with its own units
    ControlPlanePrincipal,
    /// Upgraded in the control-plane phase, as a subordinate
    ControlPlaneSubordinate,
    /// A hypervisor-hosting principal, upgraded zone by zone
    DataPlaneHypervisor,
    /// A non-hypervisor data-plane principal (storage)
    DataPlanePrincipal,
    /// A data-plane subordinate
    DataPlaneSubordinate,
    /// A subordinate that attaches to either plane and follows its principal
    Auxiliary,
}

const OPENSTACK_PRINCIPALS: &[&str] = &[
    "cinder",
    "glance",
    "keystone",
    "neutron-api",
    "nova-cloud-controller",
    "nova-compute",
    "octavia",
    "openstack-dashboard",
    "placement",
];
const OPENSTACK_SUBORDINATES: &[&str] = &["keystone-ldap", "neutron-openvswitch"];
const AUXILIARY_PRINCIPALS: &[&str] = &["mysql-innodb-cluster", "ovn-central", "rabbitmq-server"];
const AUXILIARY_SUBORDINATES: &[&str] = &["hacluster", "mysql-router", "ovn-chassis"];
const CEPH_CHARMS: &[&str] = &["ceph-mon", "ceph-osd", "ceph-radosgw"];
const SPECIAL_CHARMS: &[&str] = &["vault"];

/// Hypervisor-hosting charms, upgraded one paused unit at a time.
const HYPERVISOR_CHARMS: &[&str] = &["nova-compute"];
/// Principals that may be colocated on hypervisor machines and then follow
/// the hypervisor schedule instead of the control-plane one.
const COLOCATABLE_CHARMS: &[&str] = &["cinder"];
/// Non-hypervisor data-plane principals.
const DATA_PLANE_PRINCIPALS: &[&str] = &["ceph-osd"];
/// Subordinates that ride on data-plane principals.
const DATA_PLANE_SUBORDINATES: &[&str] = &["neutron-openvswitch", "ovn-chassis"];
/// Subordinates that attach to whatever principal they relate to.
const AUXILIARY_SCOPE: &[&str] = &["hacluster", "mysql-router"];

/// Charms that take a long time to settle after an upgrade operation.
const LONG_IDLE_CHARMS: &[&str] = &[
    "keystone",
    "mysql-innodb-cluster",
    "octavia",
    "rabbitmq-server",
];

/// Charms configuring their package origin via `source` rather than
/// `openstack-origin`.
const SOURCE_ORIGIN_CHARMS: &[&str] = &[
    "ceph-mon",
    "ceph-osd",
    "ceph-radosgw",
    "mysql-innodb-cluster",
    "rabbitmq-server",
];

/// The fixed control-plane upgrade order. Charms not listed here sort after
/// the list, lexicographically.
const CONTROL_PLANE_PRIORITY: &[&str] = &[
    "rabbitmq-server",
    "ceph-mon",
    "keystone",
    "glance",
    "cinder",
    "placement",
    "nova-cloud-controller",
    "neutron-api",
    "ovn-central",
    "ceph-radosgw",
    "openstack-dashboard",
    "octavia",
    "mysql-innodb-cluster",
    "vault",
];

/// Static knowledge about one charm
#[derive(Clone, Debug)]
pub struct CharmDescriptor {
    /// The charm name
    pub name: String,
    /// How the charm is delivered and attached
    pub category: CharmCategory,
    /// Workload-version intervals, sorted by lower bound; empty for charms
    /// whose workload versions do not encode OpenStack releases
    pub ranges: Vec<WorkloadRange>,
}

/// The frozen catalog
#[derive(Clone, Debug)]
pub struct ReleaseCatalog {
    charms: BTreeMap<String, CharmDescriptor>,
    tracks: BTreeMap<(String, Series, OpenStackRelease), String>,
}

fn category_of(charm: &str) -> Option<CharmCategory> {
    if OPENSTACK_PRINCIPALS.contains(&charm) {
        Some(CharmCategory::OpenStackPrincipal)
    } else if OPENSTACK_SUBORDINATES.contains(&charm) {
        Some(CharmCategory::OpenStackSubordinate)
    } else if AUXILIARY_PRINCIPALS.contains(&charm) {
        Some(CharmCategory::AuxiliaryPrincipal)
    } else if AUXILIARY_SUBORDINATES.contains(&charm) {
        Some(CharmCategory::AuxiliarySubordinate)
    } else if CEPH_CHARMS.contains(&charm) {
        Some(CharmCategory::Ceph)
    } else if SPECIAL_CHARMS.contains(&charm) {
        Some(CharmCategory::Special)
    } else {
        None
    }
}

impl ReleaseCatalog {
    /// The catalog shipped with the tool.
    pub fn bundled() -> CouResult<Self> {
        let mut ranges = lookup::parse_lookup(lookup::OPENSTACK_LOOKUP_CSV)?;
        let tracks = lookup::parse_tracks(lookup::TRACK_MAPPING_CSV)?;

        let mut charms = BTreeMap::new();
        let all_known = OPENSTACK_PRINCIPALS
            .iter()
            .chain(OPENSTACK_SUBORDINATES)
            .chain(AUXILIARY_PRINCIPALS)
            .chain(AUXILIARY_SUBORDINATES)
            .chain(CEPH_CHARMS)
            .chain(SPECIAL_CHARMS);
        for &name in all_known {
            let category = category_of(name).expect("every built-in charm has a category");
            charms.insert(
                name.to_owned(),
                CharmDescriptor {
                    name: name.to_owned(),
                    category,
                    ranges: ranges.remove(name).unwrap_or_default(),
                },
            );
        }
        Ok(ReleaseCatalog { charms, tracks })
    }

    /// The descriptor of a charm, if the catalog knows it.
    pub fn descriptor(&self, charm: &str) -> Option<&CharmDescriptor> {
        self.charms.get(charm)
    }

    /// Whether the catalog knows this charm at all.
    pub fn known(&self, charm: &str) -> bool {
        self.charms.contains_key(charm)
    }

    /// The charm's delivery category.
    pub fn category(&self, charm: &str) -> Option<CharmCategory> {
        self.descriptor(charm).map(|d| d.category)
    }

    /// Where the charm sits in the upgrade ordering.
    pub fn classify(&self, charm: &str) -> Option<UpgradeScope> {
        if !self.known(charm) {
            return None;
        }
        let scope = if HYPERVISOR_CHARMS.contains(&charm) {
            UpgradeScope::DataPlaneHypervisor
        } else if DATA_PLANE_PRINCIPALS.contains(&charm) {
            UpgradeScope::DataPlanePrincipal
        } else if DATA_PLANE_SUBORDINATES.contains(&charm) {
            UpgradeScope::DataPlaneSubordinate
        } else if AUXILIARY_SCOPE.contains(&charm) {
            UpgradeScope::Auxiliary
        } else if matches!(
            self.category(charm),
            Some(CharmCategory::OpenStackSubordinate) | Some(CharmCategory::AuxiliarySubordinate)
        ) {
            UpgradeScope::ControlPlaneSubordinate
        } else {
            UpgradeScope::ControlPlanePrincipal
        };
        Some(scope)
    }

    /// The OpenStack release a workload version of this charm belongs to.
    ///
    /// Ceph-family charms go through the ceph table and fold back into the
    /// OpenStack ordering at the earliest compatible release. An empty result
    /// is *unknown*, not an error; the caller decides what that means.
    pub fn release_of(&self, charm: &str, workload_version: &str) -> Option<OpenStackRelease> {
        let descriptor = self.descriptor(charm)?;
        if descriptor.category == CharmCategory::Ceph {
            return self
                .ceph_release_of(workload_version)
                .map(CephRelease::earliest_openstack);
        }
        let version = lookup::lenient_version(workload_version)?;
        descriptor
            .ranges
            .iter()
            .find(|range| range.contains(&version))
            .map(|range| range.release)
    }

    /// The ceph release a ceph workload version belongs to.
    pub fn ceph_release_of(&self, workload_version: &str) -> Option<CephRelease> {
        let version = lookup::lenient_version(workload_version)?;
        CephRelease::from_major(version.major)
    }

    /// The channel an application of this charm should run for the given
    /// release: the release codename for OpenStack charms, a table lookup for
    /// everything else. Risk is always stable.
    pub fn target_channel(
        &self,
        charm: &str,
        series: Series,
        release: OpenStackRelease,
    ) -> Option<Channel> {
        match self.category(charm)? {
            CharmCategory::OpenStackPrincipal | CharmCategory::OpenStackSubordinate => {
                Some(Channel::stable(release.codename()))
            }
            _ => self
                .tracks
                .get(&(charm.to_owned(), series, release))
                .map(Channel::stable),
        }
    }

    /// The greatest release whose mapped track equals the given one, i.e. the
    /// release a non-OpenStack charm's channel is compatible up to.
    pub fn reverse_track_release(
        &self,
        charm: &str,
        series: Series,
        track: &str,
    ) -> Option<OpenStackRelease> {
        OpenStackRelease::ALL
            .iter()
            .rev()
            .find(|release| {
                self.tracks
                    .get(&(charm.to_owned(), series, **release))
                    .is_some_and(|mapped| mapped == track)
            })
            .copied()
    }

    /// Whether moving from `current` to `target` is a supported upgrade:
    /// adjacent releases sharing at least one series.
    pub fn supported_upgrade(&self, current: OpenStackRelease, target: OpenStackRelease) -> bool {
        current.next() == Some(target)
            && current
                .supported_series()
                .iter()
                .any(|series| target.is_supported_on(*series))
    }

    /// The config key that selects the package origin for this charm.
    pub fn origin_config_key(&self, charm: &str) -> &'static str {
        if SOURCE_ORIGIN_CHARMS.contains(&charm) {
            "source"
        } else {
            "openstack-origin"
        }
    }

    /// Whether the charm belongs to the slow-settling set.
    pub fn is_long_idle(&self, charm: &str) -> bool {
        LONG_IDLE_CHARMS.contains(&charm)
    }

    /// Whether this principal may ride on hypervisor machines.
    pub fn is_colocatable(&self, charm: &str) -> bool {
        COLOCATABLE_CHARMS.contains(&charm)
    }

    /// The charm's position in the control-plane ordering; unknown charms
    /// sort after the fixed list.
    pub fn priority(&self, charm: &str) -> usize {
        CONTROL_PLANE_PRIORITY
            .iter()
            .position(|c| *c == charm)
            .unwrap_or(CONTROL_PLANE_PRIORITY.len())
    }

    /// A view of the parsed workload table, for canonical re-serialization.
    pub fn workload_table(&self) -> BTreeMap<String, Vec<WorkloadRange>> {
        self.charms
            .iter()
            .filter(|(_, d)| !d.ranges.is_empty())
            .map(|(name, d)| (name.clone(), d.ranges.clone()))
            .collect()
    }

    /// A view of the parsed track table, for canonical re-serialization.
    pub fn track_table(&self) -> &BTreeMap<(String, Series, OpenStackRelease), String> {
        &self.tracks
    }
}
