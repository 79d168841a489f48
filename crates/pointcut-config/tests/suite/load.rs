use pointcut_config::{ConfigError, LocalsProfile, PointcutConfig};
use pointcut_flow::LocalsSettings;
use pointcut_resolve::ResolverOptions;
use pretty_assertions::assert_eq;

#[test]
fn empty_config_is_the_default() {
    let config = PointcutConfig::load_from_str("").unwrap();
    assert_eq!(config, PointcutConfig::default());
    assert_eq!(config.resolver_options(), ResolverOptions::default());
    assert_eq!(config.logging.level, "warn");
}

#[test]
fn every_section_is_read() {
    let config = PointcutConfig::load_from_str(
        r#"
[locals]
profile = "compatible"
chopped_frame_threshold = 2

[resolve]
default_fuzz = 4
max_fuzz = 16

[logging]
level = "pointcut.resolve=trace"
json = true
"#,
    )
    .unwrap();

    assert_eq!(config.locals.profile, LocalsProfile::Compatible);
    assert_eq!(
        config.locals_settings(),
        LocalsSettings {
            chopped_frame_threshold: Some(2),
            ..LocalsSettings::COMPATIBLE
        }
    );
    let options = config.resolver_options();
    assert_eq!((options.default_fuzz, options.max_fuzz), (4, 16));
    assert_eq!(options.locals, config.locals_settings());
    assert!(config.logging.json);
}

#[test]
fn unknown_keys_are_rejected() {
    for text in [
        "[locals]\nzombies = true\n",
        "[resolve]\nfuzz = 3\n",
        "[output]\ncolor = true\n",
    ] {
        let err = PointcutConfig::load_from_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "{text}: {err}");
    }
}

#[test]
fn unknown_profiles_are_rejected() {
    let err = PointcutConfig::load_from_str("[locals]\nprofile = \"lenient\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err}");
}

#[test]
fn parse_errors_do_not_quote_the_source() {
    let err = PointcutConfig::load_from_str("[logging]\nlevel = 3 # secret-marker\n").unwrap_err();
    assert!(!err.to_string().contains("secret-marker"), "{err}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PointcutConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err}");
}
