#![forbid(unsafe_code)]

use std::ffi::OsString;
use std::path::PathBuf;

pub const STORAGE_DIR_ENV: &str = "SOI_STORAGE_DIR";
pub const IMAGES_DIR_ENV: &str = "SOI_IMAGES_DIR";
const DEFAULT_STORAGE_DIR: &str = ".soi";
const IMAGES_DIR_NAME: &str = "images";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub storage_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl ServiceConfig {
    /// Storage under `storage_dir`, images in its `images/` subdirectory.
    pub fn in_dir(storage_dir: impl Into<PathBuf>) -> Self {
        let storage_dir = storage_dir.into();
        let images_dir = storage_dir.join(IMAGES_DIR_NAME);
        Self {
            storage_dir,
            images_dir,
        }
    }

    /// Reads the process arguments and environment.
    pub fn from_env() -> Self {
        Self::resolve(std::env::args().skip(1), |key| std::env::var_os(key))
    }

    /// `--storage-dir DIR` wins over `SOI_STORAGE_DIR`, which wins over `./.soi`.
    /// `SOI_IMAGES_DIR` overrides the images location.
    pub fn resolve(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<OsString>,
    ) -> Self {
        let non_empty = |key: &str| env(key).filter(|value| !value.is_empty());

        let storage_dir = parse_flag(args, "--storage-dir")
            .map(PathBuf::from)
            .or_else(|| non_empty(STORAGE_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));

        let mut config = Self::in_dir(storage_dir);
        if let Some(images_dir) = non_empty(IMAGES_DIR_ENV) {
            config.images_dir = PathBuf::from(images_dir);
        }
        config
    }
}

pub(crate) fn parse_flag(args: impl IntoIterator<Item = String>, flag: &str) -> Option<String> {
    let mut args = args.into_iter();
    let mut value = None;
    while let Some(arg) = args.next() {
        if arg == flag {
            value = args.next();
        } else if let Some(inline) = arg.strip_prefix(flag).and_then(|v| v.strip_prefix('=')) {
            value = Some(inline.to_string());
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<OsString> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| OsString::from(v))
        }
    }

    #[test]
    fn defaults_to_dot_soi() {
        let config = ServiceConfig::resolve(args(&[]), env_of(&[]));
        assert_eq!(config.storage_dir, PathBuf::from(".soi"));
        assert_eq!(config.images_dir, PathBuf::from(".soi").join("images"));
    }

    #[test]
    fn flag_beats_environment() {
        let config = ServiceConfig::resolve(
            args(&["users", "--storage-dir", "/data/soi"]),
            env_of(&[("SOI_STORAGE_DIR", "/env/soi")]),
        );
        assert_eq!(config.storage_dir, PathBuf::from("/data/soi"));

        let config = ServiceConfig::resolve(
            args(&["--storage-dir=/inline"]),
            env_of(&[("SOI_STORAGE_DIR", "/env/soi")]),
        );
        assert_eq!(config.storage_dir, PathBuf::from("/inline"));
    }

    #[test]
    fn environment_sets_both_directories() {
        let config = ServiceConfig::resolve(
            args(&[]),
            env_of(&[("SOI_STORAGE_DIR", "/env/soi"), ("SOI_IMAGES_DIR", "/blobs")]),
        );
        assert_eq!(config.storage_dir, PathBuf::from("/env/soi"));
        assert_eq!(config.images_dir, PathBuf::from("/blobs"));
    }

    #[test]
    fn empty_environment_values_are_ignored() {
        let config = ServiceConfig::resolve(args(&[]), env_of(&[("SOI_STORAGE_DIR", "")]));
        assert_eq!(config.storage_dir, PathBuf::from(".soi"));
    }
}
