//! End-to-end tests for the `taor` binary.
//!
//! These run the real executable with an isolated HOME, so no user config
//! or saved sessions leak in. The serve test talks to the child over its
//! stdio with the same client a parent process would use.

use std::process::{Command, Stdio};

use serde_json::json;
use taor_config::AppConfig;
use taor_protocol::InitializeParams;
use taor_server::StdioClient;
use tempfile::TempDir;

const KEY_VARS: [&str; 5] = [
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "TAOR_PROVIDER",
    "TAOR_MODEL",
];

fn taor(home: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_taor"));
    command.env("HOME", home.path()).env("USERPROFILE", home.path());
    for var in KEY_VARS {
        command.env_remove(var);
    }
    command
}

#[test]
fn e2e_tools_lists_builtin_tools() {
    let home = TempDir::new().unwrap();
    let output = taor(&home).arg("tools").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("peek_result"), "stdout: {stdout}");
}

#[test]
fn e2e_chat_without_credentials_fails_clearly() {
    let home = TempDir::new().unwrap();
    let output = taor(&home)
        .arg("chat")
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No API key"), "stderr: {stderr}");
    assert!(stderr.contains("ANTHROPIC_API_KEY"), "stderr: {stderr}");
}

#[test]
fn e2e_unknown_provider_is_rejected() {
    let home = TempDir::new().unwrap();
    let output = taor(&home)
        .args(["serve", "--provider", "mystery"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown provider 'mystery'"), "stderr: {stderr}");
}

#[tokio::test]
async fn e2e_serve_speaks_the_protocol() {
    let home = TempDir::new().unwrap();
    let mut command = tokio::process::Command::from(taor(&home));
    command.args(["serve", "--provider", "ollama"]);
    let mut client = StdioClient::spawn(command)
        .unwrap()
        .with_timeout(AppConfig::default().server.request_timeout());

    let init = client.initialize(InitializeParams::default()).await.unwrap();
    assert_eq!(init.protocol_version, 1);
    assert_eq!(init.provider, "ollama");
    assert_eq!(init.model, "llama3.1");
    assert_eq!(init.tools, vec!["peek_result"]);

    let cost = client.command("/cost").await.unwrap();
    assert_eq!(cost["session_cost"], json!(0.0));

    let saved = client.command("/save").await.unwrap();
    let session_id = saved["session_id"].as_str().unwrap().to_string();
    let session_file = home
        .path()
        .join(".taor")
        .join("sessions")
        .join(format!("{session_id}.json"));
    assert!(session_file.exists());

    let loaded = client.load_session(&session_id).await.unwrap();
    assert_eq!(loaded.message_count, 0);

    client.shutdown().await.unwrap();
    let status = client.wait().await.unwrap().unwrap();
    assert!(status.success());
}
