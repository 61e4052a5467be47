//! Layered configuration.
//!
//! Values are merged in order, later layers winning:
//!
//! 1. built-in defaults
//! 2. a configuration file (TOML, YAML or JSON, chosen by extension)
//! 3. `FERRY_*` environment variables, with `__` separating sections
//!    (`FERRY_DIGEST__WORKERS=4`)
//!
//! The merged [`Config`] is then validated into [`Settings`].

pub mod error;
mod model;

pub use crate::model::{Config, DigestConfig, DigestSettings, MAX_WORKERS, Settings, UploadConfig, UploadSettings};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "FERRY_";
/// Variables sharing the prefix that are not configuration keys.
const ENV_IGNORED: &[&str] = &["LOG", "CONFIG"];

/// Platform configuration file location, e.g. `~/.config/ferry/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ferry").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Build the layered [`Figment`] without extracting it.
///
/// An explicit `path` must exist. Without one, the [default path](default_path)
/// is used if a file is there.
pub fn figment(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    let file = match path {
        Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => default_path().filter(|path| path.is_file()),
    };
    if let Some(file) = file {
        tracing::debug!(path = %file.display(), "loading configuration file");
        figment = match file.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => figment.merge(Toml::file(&file)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(&file)),
            Some("json") => figment.merge(Json::file(&file)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
        };
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).ignore(ENV_IGNORED).split("__")))
}

/// Load and merge every layer.
pub fn load(path: Option<&Path>) -> Result<Config> {
    figment(path)?.extract::<Config>().or_raise(|| ErrorKind::Extract)
}

/// Load, merge and validate every layer.
pub fn settings(path: Option<&Path>) -> Result<Settings> {
    load(path)?.into_settings()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use ferry_upload::Method;
    use rstest::rstest;
    use std::time::Duration;

    fn jailed(err: error::Error) -> figment::Error {
        figment::Error::from(format!("{err:?}"))
    }

    #[rstest]
    #[case("ferry.toml", "[digest]\nworkers = 3\nimages_only = true\n")]
    #[case("ferry.yaml", "digest:\n  workers: 3\n  images_only: true\n")]
    #[case("ferry.json", r#"{"digest": {"workers": 3, "images_only": true}}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();

        let config = load(Some(path.as_path())).unwrap();
        assert_eq!(config.digest.workers, Some(3));
        assert!(config.digest.images_only);
        assert!(config.digest.skip.is_none());
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = load(Some(path.as_path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(p) if *p == path));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.ini");
        std::fs::write(&path, "workers=3").unwrap();
        let err = load(Some(path.as_path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_wrong_type_fails_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.toml");
        std::fs::write(&path, "[digest]\nworkers = \"many\"\n").unwrap();
        let err = load(Some(path.as_path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Extract));
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ferry.toml",
                "[upload]\nmethod = \"direct\"\nretry_attempts = 2\n\n[digest]\nskip = \"\\\\.tmp$\"\n",
            )?;
            jail.set_env("FERRY_UPLOAD__RETRY_ATTEMPTS", "7");
            jail.set_env("FERRY_UPLOAD__TIMEOUT_SECS", "90");
            jail.set_env("FERRY_LOG", "debug");

            let loaded = settings(Some(Path::new("ferry.toml"))).map_err(jailed)?;
            assert_eq!(loaded.upload.params.method, Method::Direct);
            assert_eq!(loaded.upload.params.retry.attempts, 7);
            assert_eq!(loaded.upload.params.timeout, Some(Duration::from_secs(90)));
            assert!(loaded.digest.skip.as_ref().is_some_and(|re| re.is_match("/a/b.tmp")));
            Ok(())
        });
    }
}
