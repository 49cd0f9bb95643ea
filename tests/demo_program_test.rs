//! The bundled demo input stays loadable.

use std::path::PathBuf;

use runcheck::domain::ports::{ProgramContext, TestProgramLoader};
use runcheck::harness::DeclarativeLoader;
use runcheck::infrastructure::config::{ConfigLoader, InputSources};
use serde_json::json;

const MATCHERS: &[&str] = &[
    "toHaveStatus",
    "withChecker",
    "withDataset",
    "withDuplicates",
    "withKeyValueStore",
    "withLog",
    "withOutput",
    "withRequestQueue",
    "withRunInfo",
    "withStatistics",
];

#[test]
fn test_demo_input_loads_and_interpolates() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/facebook.yaml");
    let input = temp_env::with_var_unset("RUNCHECK_RELAUNCH", || {
        ConfigLoader::load_input(&InputSources {
            file: Some(path),
            ..Default::default()
        })
    })
    .unwrap();

    assert_eq!(input.test_name.as_deref(), Some("Facebook scrapers"));
    assert!(input.retry_failed_tests);
    assert_eq!(input.default_timeout, 1_200_000);

    let context = ProgramContext {
        test_name: "Facebook scrapers".to_string(),
        custom_data: input.custom_data.clone(),
        matchers: MATCHERS.to_vec(),
    };
    let program = DeclarativeLoader::new()
        .load(input.test_spec.as_deref().unwrap(), &context)
        .unwrap();

    let suite = &program.suites[0];
    assert_eq!(suite.specs.len(), 2);
    assert_eq!(suite.suites[0].specs[0].timeout_ms, Some(1_800_000));

    let first = &suite.specs[0].steps[0].run;
    let second = &suite.specs[1].steps[0].run;
    assert_eq!(first.input["maxPosts"], json!(20));
    assert_eq!(
        first.input["startUrls"][0],
        json!("https://www.facebook.com/biz/hotel-supply/?place_id=103095856397524")
    );
    // Same request written with a different key order.
    assert_eq!(first.input, second.input);
}
