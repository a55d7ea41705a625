//! CLI-level checks: drive the `minicc` binary itself and assert on exit
//! codes, artifacts, and diagnostics. Cargo exposes the built binary's path
//! to integration tests via `CARGO_BIN_EXE_minicc`.

use std::path::Path;
use std::process::{Command, Output};

fn minicc(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_minicc"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("failed to run minicc")
}

fn write_source(dir: &Path, name: &str, src: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, src).unwrap();
    path
}

#[test]
fn test_compile_to_default_output() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "prog.c", "int main() { return 7; }");

    let out = minicc(&["prog.c"], dir.path());
    assert!(out.status.success(), "stderr: {:?}", out.stderr);

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Compiled prog.c -> prog.ll"));

    let ir = std::fs::read_to_string(dir.path().join("prog.ll")).unwrap();
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("ret i32 7"));
}

#[test]
fn test_explicit_output_path() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "prog.c", "int main() { return 0; }");

    let out = minicc(&["prog.c", "-o", "custom.out"], dir.path());
    assert!(out.status.success());
    assert!(dir.path().join("custom.out").exists());
    assert!(!dir.path().join("prog.ll").exists());
}

#[test]
fn test_emit_ast() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "prog.c", "int main() { return 1 + 2; }");

    let out = minicc(&["prog.c", "--emit", "ast"], dir.path());
    assert!(out.status.success());

    let ast = std::fs::read_to_string(dir.path().join("prog.ast")).unwrap();
    assert!(ast.contains("int main()"));
    assert!(ast.contains("return (1 + 2);"));
}

#[test]
fn test_mtriple_override() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "prog.c", "int main() { return 0; }");

    let out = minicc(&["prog.c", "--mtriple", "aarch64-apple-darwin"], dir.path());
    assert!(out.status.success());

    let ir = std::fs::read_to_string(dir.path().join("prog.ll")).unwrap();
    assert!(ir.contains("target triple = \"aarch64-apple-darwin\""));
}

#[test]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "prog.c", "int main() { return 0; }");
    let config = dir.path().join("minicc.toml");
    std::fs::write(&config, "triple = \"riscv64-unknown-elf\"\n").unwrap();

    let out = minicc(&["prog.c", "--config", "minicc.toml"], dir.path());
    assert!(out.status.success());

    let ir = std::fs::read_to_string(dir.path().join("prog.ll")).unwrap();
    assert!(ir.contains("target triple = \"riscv64-unknown-elf\""));
}

#[test]
fn test_mtriple_beats_config_file() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "prog.c", "int main() { return 0; }");
    let config = dir.path().join("minicc.toml");
    std::fs::write(&config, "triple = \"riscv64-unknown-elf\"\n").unwrap();

    let out = minicc(
        &["prog.c", "--config", "minicc.toml", "--mtriple", "aarch64-apple-darwin"],
        dir.path(),
    );
    assert!(out.status.success());

    let ir = std::fs::read_to_string(dir.path().join("prog.ll")).unwrap();
    assert!(ir.contains("target triple = \"aarch64-apple-darwin\""));
}

#[test]
fn test_bad_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "prog.c", "int main() { return 0; }");
    let config = dir.path().join("minicc.toml");
    std::fs::write(&config, "tripel = \"typo\"\n").unwrap();

    let out = minicc(&["prog.c", "--config", "minicc.toml"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error"), "stderr: {}", stderr);
}

#[test]
fn test_completions() {
    let dir = tempfile::tempdir().unwrap();
    let out = minicc(&["--completions", "bash"], dir.path());
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("minicc"));
}

#[test]
fn test_no_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = minicc(&[], dir.path());
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no input file"));
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = minicc(&["nope.c"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert!(!dir.path().join("nope.ll").exists());
}

#[test]
fn test_diagnostic_reports_location_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "bad.c", "int main() {\n  return nope;\n}\n");

    let out = minicc(&["bad.c"], dir.path());
    assert_eq!(out.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("bad.c:2:10: error: undefined symbol: 'nope'"),
        "stderr: {}",
        stderr
    );
    // A failed compilation writes no artifact.
    assert!(!dir.path().join("bad.ll").exists());
}
