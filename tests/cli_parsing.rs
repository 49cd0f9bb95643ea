//! Command-line parsing.

use clap::Parser;
use runcheck::cli::{Cli, Commands};

fn parse(args: &[&str]) -> Cli {
    temp_env::with_var_unset("RUNCHECK_TOKEN", || Cli::try_parse_from(args).unwrap())
}

#[test]
fn test_run_collects_overrides() {
    let cli = parse(&[
        "runcheck",
        "run",
        "--input",
        "tests.yaml",
        "-f",
        "Facebook",
        "--filter",
        "Instagram posts",
        "--timeout-ms",
        "30000",
        "--retry-failed-tests",
        "--json",
    ]);

    assert!(cli.json);
    let Commands::Run(args) = cli.command else {
        panic!("expected run");
    };
    assert_eq!(args.input.as_deref(), Some(std::path::Path::new("tests.yaml")));
    assert_eq!(args.filter, vec!["Facebook", "Instagram posts"]);
    assert_eq!(args.timeout_ms, Some(30_000));
    assert!(args.retry_failed_tests);
    assert!(!args.quiet);
    assert!(args.token.is_none());
}

#[test]
fn test_token_falls_back_to_environment() {
    let cli = temp_env::with_var("RUNCHECK_TOKEN", Some("from-env"), || {
        Cli::try_parse_from(["runcheck", "abort", "--store", "kv1"]).unwrap()
    });
    let Commands::Abort(args) = cli.command else {
        panic!("expected abort");
    };
    assert_eq!(args.store, "kv1");
    assert_eq!(args.token.as_deref(), Some("from-env"));
}

#[test]
fn test_summary_takes_a_path() {
    let cli = parse(&["runcheck", "summary", "storage/OUTPUT.json", "-j"]);
    assert!(cli.json);
    assert!(matches!(cli.command, Commands::Summary(ref args) if args.path.ends_with("OUTPUT.json")));
}

#[test]
fn test_abort_requires_store() {
    let result = temp_env::with_var_unset("RUNCHECK_TOKEN", || {
        Cli::try_parse_from(["runcheck", "abort"])
    });
    assert!(result.is_err());
}
