//! Parsing and canonical serialization of the two shipped lookup tables.
//!
//! `openstack_lookup.csv` maps `(charm, workload version)` onto OpenStack
//! releases via half-open version intervals; `openstack_to_track_mapping.csv`
//! maps `(charm, series, release)` onto the channel track to switch to.
//! Both files are embedded in the binary and parsed once at startup.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::catalog::release::{OpenStackRelease, Series};
use crate::errors::{CouError, CouResult};

/// The embedded workload-version table.
pub const OPENSTACK_LOOKUP_CSV: &str = include_str!("../../data/openstack_lookup.csv");
/// The embedded track-mapping table.
pub const TRACK_MAPPING_CSV: &str = include_str!("../../data/openstack_to_track_mapping.csv");

/// One workload-version interval of a charm
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadRange {
    /// Lower bound, inclusive
    pub lower: Version,
    /// Upper bound, exclusive
    pub upper: Version,
    /// The release workloads in this interval belong to
    pub release: OpenStackRelease,
}

impl WorkloadRange {
    /// Whether the version falls inside this interval.
    pub fn contains(&self, version: &Version) -> bool {
        *version >= self.lower && *version < self.upper
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct LookupRow {
    charm: String,
    lower: String,
    upper: String,
    release: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct TrackRow {
    charm: String,
    series: String,
    release: String,
    track: String,
}

/// Compare workload versions the way the catalog needs to: numerically on
/// `MAJOR.MINOR.PATCH`, with missing components as zero and trailing
/// pre-release or packaging tags ignored.
pub fn lenient_version(raw: &str) -> Option<Version> {
    let numeric: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = numeric.split('.').filter(|p| !p.is_empty());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Parse the workload-version table into per-charm interval lists, sorted by
/// lower bound.
pub fn parse_lookup(text: &str) -> CouResult<BTreeMap<String, Vec<WorkloadRange>>> {
    const NAME: &str = "openstack_lookup.csv";
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut charms: BTreeMap<String, Vec<WorkloadRange>> = BTreeMap::new();
    for row in reader.deserialize() {
        let row: LookupRow = row.map_err(|source| CouError::LookupTable { name: NAME, source })?;
        let bad_row = |detail: String| CouError::LookupRow { name: NAME, detail };
        let lower = lenient_version(&row.lower)
            .ok_or_else(|| bad_row(format!("bad lower bound '{}'", row.lower)))?;
        let upper = lenient_version(&row.upper)
            .ok_or_else(|| bad_row(format!("bad upper bound '{}'", row.upper)))?;
        let release: OpenStackRelease = row.release.parse().map_err(bad_row)?;
        charms
            .entry(row.charm)
            .or_default()
            .push(WorkloadRange { lower, upper, release });
    }
    for ranges in charms.values_mut() {
        ranges.sort_by(|a, b| a.lower.cmp(&b.lower));
    }
    Ok(charms)
}

/// Parse the track-mapping table into a flat `(charm, series, release)` map.
pub fn parse_tracks(
    text: &str,
) -> CouResult<BTreeMap<(String, Series, OpenStackRelease), String>> {
    const NAME: &str = "openstack_to_track_mapping.csv";
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut tracks = BTreeMap::new();
    for row in reader.deserialize() {
        let row: TrackRow = row.map_err(|source| CouError::LookupTable { name: NAME, source })?;
        let bad_row = |detail: String| CouError::LookupRow { name: NAME, detail };
        let series: Series = row.series.parse().map_err(bad_row)?;
        let release: OpenStackRelease = row
            .release
            .parse()
            .map_err(|detail| CouError::LookupRow { name: NAME, detail })?;
        tracks.insert((row.charm, series, release), row.track);
    }
    Ok(tracks)
}

/// Re-serialize a parsed workload table in canonical form: header row, charms
/// in lexicographic order, intervals by lower bound, three-component bounds.
pub fn serialize_lookup(charms: &BTreeMap<String, Vec<WorkloadRange>>) -> String {
    let mut out = String::from("charm,lower,upper,release\n");
    for (charm, ranges) in charms {
        for range in ranges {
            out.push_str(&format!(
                "{charm},{},{},{}\n",
                range.lower, range.upper, range.release
            ));
        }
    }
    out
}

/// Re-serialize a parsed track table in canonical form: header row, rows
/// sorted by charm, series, then release order.
pub fn serialize_tracks(
    tracks: &BTreeMap<(String, Series, OpenStackRelease), String>,
) -> String {
    let mut out = String::from("charm,series,release,track\n");
    for ((charm, series, release), track) in tracks {
        out.push_str(&format!("{charm},{series},{release},{track}\n"));
    }
    out
}
