//! Command routing against a real workspace: config files, a sled store and bundle import.

use crate::integration::support::bundle;
use clap::Parser;
use guardgen::cli::{map_error, Cli, CliError, RunContext};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes access to XDG_CONFIG_HOME across tests in this binary.
static XDG_ENV_MUTEX: Mutex<()> = Mutex::new(());

fn with_isolated_config<F: FnOnce()>(test: F) {
    let _guard = XDG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let xdg = TempDir::new().unwrap();
    let original = std::env::var("XDG_CONFIG_HOME").ok();
    std::env::set_var("XDG_CONFIG_HOME", xdg.path());
    test();
    match original {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
}

fn workspace(api_key: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::write(
        dir.path().join("config").join("config.toml"),
        format!(
            r#"
[provider]
provider_type = "anthropic"
model = "claude-test"
api_key = "{}"

[storage]
path = "data/store"

[generation]
default_strategy = "rapid"
default_intensity = "light"
"#,
            api_key
        ),
    )
    .unwrap();
    let bundle_json = serde_json::to_string_pretty(&bundle("uc-claims")).unwrap();
    std::fs::write(dir.path().join("bundle.json"), bundle_json).unwrap();
    dir
}

async fn run(ctx: &RunContext, args: &[&str]) -> Result<String, CliError> {
    let mut argv = vec!["guardgen"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    ctx.execute(&cli.command).await
}

fn json(output: &str) -> Value {
    serde_json::from_str(output).unwrap()
}

fn bundle_path(ws: &Path) -> String {
    ws.join("bundle.json").to_string_lossy().into_owned()
}

#[test]
fn import_then_job_without_credentials_fails_cleanly() {
    with_isolated_config(|| {
        let ws = workspace("");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let ctx = RunContext::new(ws.path().to_path_buf(), None).unwrap();

            let imported = run(&ctx, &["usecase", "import", &bundle_path(ws.path())])
                .await
                .unwrap();
            assert!(imported.starts_with("Imported use case uc-claims: 2 assessment(s)"));

            let created = run(
                &ctx,
                &["job", "create", "--use-case", "uc-claims", "--format", "json"],
            )
            .await
            .unwrap();
            let job = json(&created);
            assert_eq!(job["status"], "pending");
            assert_eq!(job["generationStrategy"], "rapid");
            assert_eq!(job["testIntensity"], "light");
            let job_id = job["id"].as_str().unwrap().to_string();

            let err = run(&ctx, &["job", "start", &job_id, "--sync"])
                .await
                .unwrap_err();
            assert!(map_error(&err).starts_with("[LLM_CONFIGURATION_REQUIRED]"));

            let status = run(
                &ctx,
                &["job", "status", "--use-case", "uc-claims", "--format", "json"],
            )
            .await
            .unwrap();
            let job = json(&status);
            assert_eq!(job["id"], job_id.as_str());
            assert_eq!(job["status"], "failed");
            assert_eq!(job["progress"], 0);

            let missing = run(&ctx, &["evaluation", "show", "--use-case", "uc-claims"])
                .await
                .unwrap_err();
            assert!(map_error(&missing).starts_with("[NOT_FOUND]"));
        });

        assert!(ws.path().join("data").join("store").exists());
    });
}

#[test]
fn config_show_redacts_the_api_key() {
    with_isolated_config(|| {
        let ws = workspace("sk-test-secret");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let ctx = RunContext::new(ws.path().to_path_buf(), None).unwrap();

            let shown = run(&ctx, &["config", "show", "--format", "json"])
                .await
                .unwrap();
            assert!(!shown.contains("sk-test-secret"));
            let config = json(&shown);
            assert_eq!(config["provider"]["model"], "claude-test");
            assert_eq!(config["provider"]["api_key"], "********");

            let toml = run(&ctx, &["config", "show"]).await.unwrap();
            assert!(toml.contains("claude-test"));
            assert!(!toml.contains("sk-test-secret"));

            let validated = run(&ctx, &["config", "validate"]).await.unwrap();
            assert!(validated.contains("credentials configured"));
        });
    });
}

#[test]
fn unreadable_bundle_is_an_input_error() {
    with_isolated_config(|| {
        let ws = workspace("");
        std::fs::write(ws.path().join("bundle.json"), "{ not json").unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let ctx = RunContext::new(ws.path().to_path_buf(), None).unwrap();
            let err = run(&ctx, &["usecase", "import", &bundle_path(ws.path())])
                .await
                .unwrap_err();
            assert!(matches!(err, CliError::Input(_)));
        });
    });
}

#[test]
fn invalid_configuration_is_reported_at_startup() {
    with_isolated_config(|| {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("config")).unwrap();
        std::fs::write(
            ws.path().join("config").join("config.toml"),
            "[generation]\nmax_retries = 0\n",
        )
        .unwrap();
        let err = match RunContext::new(ws.path().to_path_buf(), None) {
            Ok(_) => panic!("expected a validation failure"),
            Err(err) => err,
        };
        assert!(map_error(&err).contains("Configuration validation failed"));
    });
}
