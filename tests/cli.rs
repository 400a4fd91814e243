// 命令行集成测试

use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use tempfile::TempDir;

fn cli(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("reader-translate").expect("binary");
    cmd.current_dir(dir)
        .env("READER_TRANSLATE_LOG_LEVEL", "error")
        .env("READER_TRANSLATE_CACHE_PATH", dir.join("default.redb"));
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run command");
    assert!(
        output.status.success(),
        "命令失败: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf-8 stdout")
}

#[test]
fn test_prints_example_config() {
    let dir = TempDir::new().expect("tempdir");
    let out = stdout_of(cli(dir.path()).arg("config"));
    assert!(out.contains("target_lang"));
    assert!(out.contains("chunk_max_chars"));

    let docs = stdout_of(cli(dir.path()).args(["config", "--env"]));
    assert!(docs.contains("READER_TRANSLATE_TARGET_LANG"));
}

#[test]
fn test_paginate_json() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("book.txt");
    let text = "The harbour was quiet before the storm arrived. ".repeat(40);
    std::fs::write(&input, &text).expect("write input");

    let out = stdout_of(cli(dir.path()).args([
        "paginate",
        input.to_str().expect("path"),
        "--width",
        "300",
        "--height",
        "120",
        "--font-size",
        "10",
        "--json",
    ]));

    let pages: Vec<String> = serde_json::from_str(&out).expect("json pages");
    assert!(pages.len() > 1);
    assert_eq!(pages.concat(), text);
}

#[test]
fn test_translate_then_stats_then_clear() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("tiny.txt");
    let cache = dir.path().join("cache.redb");
    std::fs::write(&input, "Hello reader. This is a tiny book.").expect("write input");
    let cache_arg = cache.to_str().expect("path");

    let out = stdout_of(cli(dir.path()).args([
        "translate",
        input.to_str().expect("path"),
        "--book",
        "tiny",
        "--lang",
        "es",
        "--cache",
        cache_arg,
    ]));
    assert!(out.contains("--- page 0 ---"));
    assert!(out.contains("HELLO READER. THIS IS A TINY BOOK."));

    let stats = stdout_of(cli(dir.path()).args(["stats", "--cache", cache_arg]));
    assert!(stats.contains("chunks:   1"), "{}", stats);
    assert!(stats.contains("tiny: 1 chunks"), "{}", stats);

    let cleared = stdout_of(cli(dir.path()).args([
        "clear", "--cache", cache_arg, "--book", "tiny", "--lang", "es",
    ]));
    assert!(cleared.contains("removed 1 chunks for tiny (es)"));

    let stats = stdout_of(cli(dir.path()).args(["stats", "--cache", cache_arg]));
    assert!(stats.contains("chunks:   0"), "{}", stats);
}

#[test]
fn test_page_out_of_range_fails() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("tiny.txt");
    std::fs::write(&input, "One short page.").expect("write input");

    cli(dir.path())
        .args([
            "translate",
            input.to_str().expect("path"),
            "--book",
            "tiny",
            "--page",
            "4",
        ])
        .assert()
        .failure();
}
