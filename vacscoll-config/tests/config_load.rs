use serial_test::serial;
use std::{fs, path::PathBuf, time::Duration};
use tempfile::TempDir;
use vacscoll_config::{PageIndexing, VacscollConfigLoader};

fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
version: "1"
provider:
  base_url: "https://api.hh.ru"
  endpoint: "vacancies"
  query_params:
    - ["per_page", "100"]
    - ["no_magic", "true"]
  filters: ["noExperience", "probation"]
  rate_delay: 0.2
  user_agent: "vacscoll/0.1 (${VACSCOLL_TEST_CONTACT})"
cache:
  path: "/tmp/vacscoll-test/seen.db"
  max_age_days: 3
logging:
  format: json
  emit_stderr: false
"#;

#[test]
#[serial]
fn loads_file_and_expands_env() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "vacscoll.yaml", FILE_YAML);

    let cfg = temp_env::with_var("VACSCOLL_TEST_CONTACT", Some("jobs@example.com"), || {
        VacscollConfigLoader::new().with_file(&p).load()
    })
    .expect("load config");

    assert_eq!(cfg.version.as_deref(), Some("1"));
    assert_eq!(
        cfg.provider.query_params,
        vec![
            ("per_page".to_string(), "100".to_string()),
            ("no_magic".to_string(), "true".to_string()),
        ]
    );
    assert_eq!(cfg.provider.filters.len(), 2);
    assert_eq!(cfg.provider.rate_delay(), Duration::from_millis(200));
    assert_eq!(cfg.provider.page_indexing, PageIndexing::ZeroBased);
    assert_eq!(
        cfg.provider.user_agent.as_deref(),
        Some("vacscoll/0.1 (jobs@example.com)")
    );
    assert_eq!(cfg.cache.max_age_days, 3);
    assert_eq!(
        cfg.cache.store_path(),
        PathBuf::from("/tmp/vacscoll-test/seen.db")
    );
    assert!(!cfg.logging.emit_stderr);
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "vacscoll.yaml", FILE_YAML);

    let cfg = temp_env::with_vars(
        [
            ("VACSCOLL__PROVIDER__RATE_DELAY", Some("0.5")),
            ("VACSCOLL__CACHE__MAX_AGE_DAYS", Some("14")),
        ],
        || VacscollConfigLoader::new().with_file(&p).load(),
    )
    .expect("load config");

    assert_eq!(cfg.provider.rate_delay(), Duration::from_millis(500));
    assert_eq!(cfg.cache.max_age_days, 14);
}

#[test]
#[serial]
fn optional_missing_file_falls_back_to_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.yaml");

    let cfg = VacscollConfigLoader::new()
        .with_optional_file(missing)
        .load()
        .expect("defaults load");

    assert_eq!(cfg.provider.base_url, "https://api.hh.ru");
    assert_eq!(cfg.provider.endpoint, "vacancies");
    assert_eq!(cfg.cache.max_age_days, 7);
}

#[test]
#[serial]
fn required_missing_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.yaml");

    assert!(VacscollConfigLoader::new().with_file(missing).load().is_err());
}
