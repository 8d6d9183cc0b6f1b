use parley_core::{Database, NewMessage};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const EMAIL: &str = "traveler@example.com";

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("parley/chats.db")
    }

    fn open_db(&self) -> Database {
        let db = Database::open(&self.db_path()).expect("failed to open db");
        db.migrate().expect("failed to migrate db");
        db
    }
}

fn command(env: &CliTestEnv, args: &[&str]) -> Command {
    let mut command = Command::new(PathBuf::from(assert_cmd::cargo::cargo_bin!("parley")));
    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("PARLEY_EMAIL")
        .env_remove("OPENROUTER_API_KEY")
        .env_remove("OPENROUTER_API_URL")
        .env_remove("OPENROUTER_API_MODEL")
        .env_remove("RUST_LOG");
    command
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    command(env, args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute parley: {e}"))
}

fn run_bin_with_stdin(env: &CliTestEnv, args: &[&str], input: &str) -> Output {
    let mut child = command(env, args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("failed to spawn parley: {e}"));
    child
        .stdin
        .take()
        .expect("missing stdin")
        .write_all(input.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait for parley")
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "parley {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn missing_identity_is_rejected() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["list"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("PARLEY_EMAIL"),
        "expected identity hint in stderr, got:\n{stderr}"
    );
}

#[test]
fn new_list_show_and_delete_round_trip() {
    let env = CliTestEnv::new();

    let args = ["--email", EMAIL, "new", "Trip Planning"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout_of(&output).contains("Created chat"));

    let chats = env.open_db().get_chats(EMAIL).expect("failed to query chats");
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].name, "Trip Planning");
    let chat_id = chats[0].id.to_string();

    let args = ["--email", EMAIL, "list"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout_of(&output).contains("Trip Planning"));

    let location = format!("/chats/{}", chat_id);
    let args = ["--email", EMAIL, "show", location.as_str()];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout_of(&output).contains("(no messages)"));

    let args = ["--email", EMAIL, "delete", chat_id.as_str(), "--yes"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);
    assert!(stdout_of(&output).contains("Deleted chat"));

    assert!(env.open_db().get_chats(EMAIL).unwrap().is_empty());
}

#[test]
fn delete_declined_on_stdin_keeps_chat() {
    let env = CliTestEnv::new();
    let chat_id = env
        .open_db()
        .create_chat(EMAIL, "Keep me", &[NewMessage::user("hello")])
        .unwrap()
        .to_string();

    let args = ["--email", EMAIL, "delete", chat_id.as_str()];
    let output = run_bin_with_stdin(&env, &args, "n\n");
    assert_success(&args, &output);
    assert!(stdout_of(&output).contains("kept"));

    assert_eq!(env.open_db().get_chats(EMAIL).unwrap().len(), 1);
}

#[test]
fn chats_of_other_users_are_hidden() {
    let env = CliTestEnv::new();
    let other_id = env
        .open_db()
        .create_chat("someone@example.com", "Private", &[])
        .unwrap()
        .to_string();

    let args = ["--email", EMAIL, "show", other_id.as_str()];
    let output = run_bin(&env, &args);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn send_without_endpoint_keeps_user_message() {
    let env = CliTestEnv::new();
    let chat_id = env
        .open_db()
        .create_chat(EMAIL, "Offline", &[])
        .unwrap();
    let chat_arg = chat_id.to_string();

    let args = ["--email", EMAIL, "send", chat_arg.as_str(), "Hello?"];
    let output = run_bin(&env, &args);
    assert!(!output.status.success());
    assert!(stdout_of(&output).contains("Error: Could not get response."));

    let stored = env.open_db().get_messages(chat_id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "Hello?");
}

#[test]
fn recent_prints_json() {
    let env = CliTestEnv::new();
    let db = env.open_db();
    db.create_chat(EMAIL, "Older", &[]).unwrap();
    db.create_chat(EMAIL, "Newer", &[NewMessage::user("hi")])
        .unwrap();
    drop(db);

    let args = ["--email", EMAIL, "recent", "--json"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = stdout_of(&output);
    assert!(stdout.contains("\"name\": \"Newer\""));
    assert!(stdout.contains("\"messages\""));
}

#[test]
fn repl_creates_chat_and_quits() {
    let env = CliTestEnv::new();

    let args = ["--email", EMAIL];
    let output = run_bin_with_stdin(&env, &args, "/new Recipes\n/list\n/quit\n");
    assert_success(&args, &output);

    let stdout = stdout_of(&output);
    assert!(stdout.contains("Opened new chat"));
    assert!(stdout.contains("Recipes"));
    assert_eq!(env.open_db().get_chats(EMAIL).unwrap().len(), 1);
}
