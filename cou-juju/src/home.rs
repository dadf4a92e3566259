//! Discovery of the controller credential directory.

use camino::Utf8PathBuf;

/// The directory the `juju` binary keeps controllers and credentials in.
///
/// `$JUJU_DATA` wins when set; otherwise the standard per-user location is
/// used. The upgrader never reads this directory itself, it only reports it
/// in diagnostics and hands it to the spawned `juju` process untouched.
pub fn juju_data_dir() -> Utf8PathBuf {
    if let Ok(dir) = std::env::var("JUJU_DATA") {
        if !dir.is_empty() {
            return Utf8PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    Utf8PathBuf::from(home).join(".local").join("share").join("juju")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lands_under_home() {
        // Runs without JUJU_DATA in CI; with it set the override wins, which
        // is also fine to assert.
        let dir = juju_data_dir();
        match std::env::var("JUJU_DATA") {
            Ok(expected) if !expected.is_empty() => assert_eq!(dir, Utf8PathBuf::from(expected)),
            _ => assert!(dir.as_str().ends_with(".local/share/juju")),
        }
    }
}
