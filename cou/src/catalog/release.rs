//! The ordered release identifiers the whole tool revolves around.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A base series a release can run on
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Series {
    /// Ubuntu 20.04
    Focal,
    /// Ubuntu 22.04
    Jammy,
}

impl Series {
    fn as_str(self) -> &'static str {
        match self {
            Series::Focal => "focal",
            Series::Jammy => "jammy",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl FromStr for Series {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "focal" => Ok(Series::Focal),
            "jammy" => Ok(Series::Jammy),
            other => Err(format!("unknown series '{other}'")),
        }
    }
}

/// An OpenStack release codename, totally ordered
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenStackRelease {
    /// 2020.1
    Ussuri,
    /// 2020.2
    Victoria,
    /// 2021.1
    Wallaby,
    /// 2021.2
    Xena,
    /// 2022.1
    Yoga,
    /// 2022.2
    Zed,
    /// 2023.1
    Antelope,
    /// 2023.2
    Bobcat,
    /// 2024.1
    Caracal,
}

impl OpenStackRelease {
    /// Every release, in order.
    pub const ALL: [OpenStackRelease; 9] = [
        OpenStackRelease::Ussuri,
        OpenStackRelease::Victoria,
        OpenStackRelease::Wallaby,
        OpenStackRelease::Xena,
        OpenStackRelease::Yoga,
        OpenStackRelease::Zed,
        OpenStackRelease::Antelope,
        OpenStackRelease::Bobcat,
        OpenStackRelease::Caracal,
    ];

    /// The release after this one, if any.
    pub fn next(self) -> Option<OpenStackRelease> {
        let idx = Self::ALL.iter().position(|r| *r == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// The release before this one, if any.
    pub fn previous(self) -> Option<OpenStackRelease> {
        let idx = Self::ALL.iter().position(|r| *r == self)?;
        idx.checked_sub(1).and_then(|prev| Self::ALL.get(prev)).copied()
    }

    /// The base series this release is supported on. Yoga appears on both
    /// focal and jammy; that overlap is what makes series upgrades possible.
    pub fn supported_series(self) -> &'static [Series] {
        use OpenStackRelease::*;
        match self {
            Ussuri | Victoria | Wallaby | Xena => &[Series::Focal],
            Yoga => &[Series::Focal, Series::Jammy],
            Zed | Antelope | Bobcat | Caracal => &[Series::Jammy],
        }
    }

    /// Whether this release runs on the given series.
    pub fn is_supported_on(self, series: Series) -> bool {
        self.supported_series().contains(&series)
    }

    /// The codename, e.g. `victoria`.
    pub fn codename(self) -> &'static str {
        use OpenStackRelease::*;
        match self {
            Ussuri => "ussuri",
            Victoria => "victoria",
            Wallaby => "wallaby",
            Xena => "xena",
            Yoga => "yoga",
            Zed => "zed",
            Antelope => "antelope",
            Bobcat => "bobcat",
            Caracal => "caracal",
        }
    }
}

impl fmt::Display for OpenStackRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.codename().fmt(f)
    }
}

impl FromStr for OpenStackRelease {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpenStackRelease::ALL
            .iter()
            .find(|r| r.codename() == s)
            .copied()
            .ok_or_else(|| format!("unknown OpenStack release '{s}'"))
    }
}

/// A ceph release codename, ordered
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CephRelease {
    /// ceph 15
    Octopus,
    /// ceph 16
    Pacific,
    /// ceph 17
    Quincy,
    /// ceph 18
    Reef,
}

impl CephRelease {
    /// The ceph release a workload major version belongs to.
    pub fn from_major(major: u64) -> Option<CephRelease> {
        match major {
            15 => Some(CephRelease::Octopus),
            16 => Some(CephRelease::Pacific),
            17 => Some(CephRelease::Quincy),
            18 => Some(CephRelease::Reef),
            _ => None,
        }
    }

    /// The ceph release charmed OpenStack pairs with the given release.
    pub fn for_openstack(release: OpenStackRelease) -> CephRelease {
        use OpenStackRelease::*;
        match release {
            Ussuri | Victoria => CephRelease::Octopus,
            Wallaby | Xena => CephRelease::Pacific,
            Yoga | Zed | Antelope => CephRelease::Quincy,
            Bobcat | Caracal => CephRelease::Reef,
        }
    }

    /// The earliest OpenStack release paired with this ceph release.
    ///
    /// Used to fold ceph workloads into the OpenStack ordering; several
    /// OpenStack releases share one ceph release, so this maps to the
    /// earliest of them.
    pub fn earliest_openstack(self) -> OpenStackRelease {
        match self {
            CephRelease::Octopus => OpenStackRelease::Ussuri,
            CephRelease::Pacific => OpenStackRelease::Wallaby,
            CephRelease::Quincy => OpenStackRelease::Yoga,
            CephRelease::Reef => OpenStackRelease::Bobcat,
        }
    }

    /// The codename, e.g. `octopus`.
    pub fn codename(self) -> &'static str {
        match self {
            CephRelease::Octopus => "octopus",
            CephRelease::Pacific => "pacific",
            CephRelease::Quincy => "quincy",
            CephRelease::Reef => "reef",
        }
    }
}

impl fmt::Display for CephRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.codename().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_are_totally_ordered() {
        for pair in OpenStackRelease::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn next_and_previous_are_inverses_on_the_interior() {
        for release in OpenStackRelease::ALL {
            if let Some(next) = release.next() {
                assert_eq!(next.previous(), Some(release));
            }
        }
        assert_eq!(OpenStackRelease::Ussuri.previous(), None);
        assert_eq!(OpenStackRelease::Caracal.next(), None);
    }

    #[test]
    fn yoga_overlaps_both_series() {
        assert!(OpenStackRelease::Yoga.is_supported_on(Series::Focal));
        assert!(OpenStackRelease::Yoga.is_supported_on(Series::Jammy));
        assert!(!OpenStackRelease::Zed.is_supported_on(Series::Focal));
        assert!(!OpenStackRelease::Xena.is_supported_on(Series::Jammy));
    }

    #[test]
    fn ceph_mapping_is_consistent() {
        assert_eq!(
            CephRelease::for_openstack(OpenStackRelease::Ussuri),
            CephRelease::Octopus
        );
        assert_eq!(
            CephRelease::Octopus.earliest_openstack(),
            OpenStackRelease::Ussuri
        );
        assert_eq!(CephRelease::from_major(15), Some(CephRelease::Octopus));
        assert_eq!(CephRelease::from_major(14), None);
    }
}
