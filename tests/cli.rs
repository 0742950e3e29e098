//! End-to-end tests of the word count binary.

use assert_cmd::Command;
use predicates::prelude::*;
use quasar::io::{FramedReader, FramedWriter, PairReader, PairWriter, RawPair};
use tempfile::TempDir;

const INPUT: &str = "the cat sat\nthe dog sat\n";

#[test]
fn counts_words_from_stdin() {
    let mut cmd = Command::cargo_bin("quasar").unwrap();
    cmd.write_stdin(INPUT)
        .assert()
        .success()
        .stdout("cat\t1\ndog\t1\nsat\t2\nthe\t2\n");
}

#[test]
fn reads_and_writes_files() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.txt");
    let output = dir.path().join("output.jsonl");
    std::fs::write(&input, INPUT).unwrap();

    let mut cmd = Command::cargo_bin("quasar").unwrap();
    cmd.arg("-f")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .args(["--output", "json", "--sort-buffer", "16"])
        .arg("--staging-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "{\"cat\":1}\n{\"dog\":1}\n{\"sat\":2}\n{\"the\":2}\n"
    );
    // Only the input and output files remain.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn fails_on_a_missing_input_file() {
    let mut cmd = Command::cargo_bin("quasar").unwrap();
    cmd.args(["-f", "/definitely/not/here.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open"));
}

#[test]
fn runs_a_single_map_phase() {
    let mut input = FramedWriter::new(Vec::new());
    input
        .write_pair(
            &quasar::codec::encode(&0u64).unwrap(),
            &quasar::codec::encode("Sat, sat.").unwrap(),
        )
        .unwrap();
    let input = input.into_inner().unwrap();

    let mut cmd = Command::cargo_bin("quasar").unwrap();
    let assert = cmd
        .args(["-task", "0", "-phase", "map"])
        .write_stdin(input)
        .assert()
        .success();

    let mut reader = FramedReader::new(&assert.get_output().stdout[..]);
    let mut pairs = Vec::new();
    while let Some(pair) = reader.next_pair().unwrap() {
        pairs.push(pair);
    }
    assert_eq!(
        pairs,
        vec![
            RawPair::encode("sat", &1u64).unwrap(),
            RawPair::encode("sat", &1u64).unwrap(),
        ]
    );
}

#[test]
fn rejects_an_unknown_phase() {
    let mut cmd = Command::cargo_bin("quasar").unwrap();
    cmd.args(["-task", "0", "-phase", "rock"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown phase rock"));
}

#[test]
fn rejects_a_missing_task() {
    let mut cmd = Command::cargo_bin("quasar").unwrap();
    cmd.args(["-task", "3", "-phase", "map"])
        .write_stdin(Vec::new())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no task 3"));
}

#[test]
fn prints_help() {
    let mut cmd = Command::cargo_bin("quasar").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}
