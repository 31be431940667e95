use std::io::Write;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::NamedTempFile;

fn write_config(scenario: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    write!(
        file,
        r#"
default_provider: esms
retry_attempts: 2
retry_delay: 10ms
providers:
  esms:
    api_key: key
    secret: secret
    brandname: ACME
    base_url: mock://{scenario}
  twilio:
    account_sid: AC123
    auth_token: token
    from_number: "+15550001111"
    base_url: mock://{scenario}
  speedsms:
    token: test_token_with_at_least_20_characters
    base_url: mock://{scenario}
  smoke-signals: {{}}
"#
    )
    .unwrap();
    file
}

fn run(config: &NamedTempFile, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sms-dispatch"))
        .arg("--config")
        .arg(config.path())
        .args(args)
        .env("LOG_FORMAT", "text")
        .env("RUST_LOG", "warn")
        .output()
        .expect("run sms-dispatch CLI")
}

fn run_ok(config: &NamedTempFile, args: &[&str]) -> String {
    let output = run(config, args);
    if !output.status.success() {
        panic!(
            "CLI command {:?} failed: status={:?}\nstdout={}\nstderr={}",
            args,
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const SEND: [&str; 4] = ["--to", "+84901234567", "--from", "ACME"];

#[test]
fn providers_lists_active_and_unsupported() {
    let config = write_config("success");
    let stdout = run_ok(&config, &["providers"]);
    assert!(stdout.contains("* esms"), "stdout:\n{stdout}");
    assert!(stdout.contains("  twilio"), "stdout:\n{stdout}");
    assert!(
        stdout.contains("smoke-signals (unsupported by this build)"),
        "stdout:\n{stdout}"
    );

    let stdout = run_ok(&config, &["providers", "--json"]);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["active"], "esms");
    assert_eq!(
        report["registered"],
        serde_json::json!(["esms", "speedsms", "twilio"])
    );
}

#[test]
fn sms_prints_summary_line() {
    let config = write_config("success");
    let mut args = vec!["sms"];
    args.extend(SEND);
    args.extend(["--data", "message=hello"]);
    let stdout = run_ok(&config, &args);
    assert!(stdout.starts_with("SMS [esms-"), "stdout:\n{stdout}");
    assert!(stdout.contains("via esms: sent"), "stdout:\n{stdout}");
}

#[test]
fn call_through_selected_provider_as_json() {
    let config = write_config("success");
    let mut args = vec!["call", "--json", "--provider", "twilio"];
    args.extend(SEND);
    args.extend(["--template", "Code {code}", "--data", "code=4711"]);
    args.extend(["--option", "voice=alice", "--timeout", "5s"]);
    let stdout = run_ok(&config, &args);
    let response: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["provider"], "twilio");
    assert_eq!(response["status"], "queued");
    let twiml = response["provider_response"]["twiml"].as_str().unwrap();
    assert_eq!(
        twiml,
        r#"<Response><Say voice="alice">Code 4711</Say></Response>"#
    );
}

#[test]
fn unknown_provider_fails() {
    let config = write_config("success");
    let mut args = vec!["sms", "--provider", "carrier-pigeon"];
    args.extend(SEND);
    let output = run(&config, &args);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("provider `carrier-pigeon` not found"), "stderr:\n{stderr}");
}

#[test]
fn throttled_backend_exhausts_retries() {
    let config = write_config("throttle");
    let mut args = vec!["sms"];
    args.extend(SEND);
    let output = run(&config, &args);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sms dispatch failed"), "stderr:\n{stderr}");
    assert!(
        stderr.contains("send_sms failed after 2 attempts"),
        "stderr:\n{stderr}"
    );
}

#[test]
fn invalid_recipient_is_rejected_before_sending() {
    let config = write_config("success");
    let output = run(&config, &["sms", "--to", "12", "--from", "ACME"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("validation error: to"), "stderr:\n{stderr}");
}

#[test]
fn missing_config_names_the_path() {
    let output = Command::new(env!("CARGO_BIN_EXE_sms-dispatch"))
        .args(["--config", "/nonexistent/sms.yaml", "providers"])
        .output()
        .expect("run sms-dispatch CLI");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/sms.yaml"), "stderr:\n{stderr}");
}
