//! Runs the compiled binary against temporary sites.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn simple_press(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simple-press"))
        .arg(root)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run simple-press")
}

fn site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("input")).unwrap();
    fs::write(tmp.path().join("input/about.md"), "+++\ntitle = \"About\"\n+++\nHello\n").unwrap();
    fs::write(tmp.path().join("input/robots.txt"), "User-agent: *\n").unwrap();
    tmp
}

#[test]
fn one_shot_run_writes_output_and_prints_summary() {
    let tmp = site();
    let out = simple_press(tmp.path(), &[]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    assert_eq!(
        fs::read_to_string(tmp.path().join("output/about.html")).unwrap(),
        "<p>Hello</p>\n"
    );
    assert!(tmp.path().join("output/robots.txt").exists());

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("(stock)"));
    assert!(stdout.contains("001 Content → 1 document"));
    assert!(stdout.contains("Executed 2 pipelines, 2 documents"));
}

#[test]
fn output_flag_overrides_config() {
    let tmp = site();
    let out = simple_press(tmp.path(), &["--output", "public", "--nocache"]);
    assert!(out.status.success());
    assert!(tmp.path().join("public/about.html").exists());
    assert!(!tmp.path().join("output").exists());
}

#[test]
fn noclean_keeps_stale_files() {
    let tmp = site();
    fs::create_dir_all(tmp.path().join("output")).unwrap();
    fs::write(tmp.path().join("output/stale.html"), "old").unwrap();

    assert!(simple_press(tmp.path(), &["--noclean"]).status.success());
    assert!(tmp.path().join("output/stale.html").exists());

    assert!(simple_press(tmp.path(), &[]).status.success());
    assert!(!tmp.path().join("output/stale.html").exists());
}

#[test]
fn invalid_config_exits_with_failure() {
    let tmp = site();
    fs::write(tmp.path().join("config.toml"), "[[pipelines]]\nname = \"A\"\ninput = \"Nope\"\n").unwrap();
    let out = simple_press(tmp.path(), &[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Nope"));
}

#[test]
fn config_flag_selects_file() {
    let tmp = site();
    fs::write(
        tmp.path().join("only-text.toml"),
        "[[pipelines]]\nname = \"Text\"\nsteps = [ { ReadFiles = { pattern = \"*.txt\" } }, { WriteFiles = {} } ]\n",
    )
    .unwrap();
    let out = simple_press(tmp.path(), &["--config", "only-text.toml"]);
    assert!(out.status.success());
    assert!(tmp.path().join("output/robots.txt").exists());
    assert!(!tmp.path().join("output/about.html").exists());
}

#[test]
fn log_flag_writes_file() {
    let tmp = site();
    let log = tmp.path().join("run.log");
    let out = simple_press(tmp.path(), &["--log", log.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(log.exists());
}

#[test]
fn log_flag_without_value_writes_timestamped_file_in_root() {
    let tmp = site();
    let out = simple_press(tmp.path(), &["--log"]);
    assert!(out.status.success());

    let logs: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("simple-press-") && name.ends_with(".log"))
        .collect();
    assert_eq!(logs.len(), 1, "{logs:?}");
    let stamp = &logs[0]["simple-press-".len()..logs[0].len() - ".log".len()];
    assert_eq!(stamp.len(), 17);
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn output_pointing_at_root_is_refused() {
    let tmp = site();
    let out = simple_press(tmp.path(), &["--output", "."]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Refusing to clean"));
    assert!(tmp.path().join("input/about.md").exists());
}

#[test]
fn pause_continues_when_stdin_is_closed() {
    let tmp = site();
    let out = simple_press(tmp.path(), &["--pause"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("Press Enter to continue"));
    assert!(tmp.path().join("output/about.html").exists());
}

#[test]
fn gen_config_prints_stock_config() {
    let tmp = TempDir::new().unwrap();
    let out = simple_press(tmp.path(), &["--gen-config"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[[pipelines]]"));
    assert!(stdout.contains("name = \"Content\""));
}
