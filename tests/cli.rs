use assert_cmd::prelude::*;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn write_config(xml: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp config");
    tmp.write_all(xml.as_bytes()).expect("write config");
    tmp
}

#[test]
fn cli_lights_two_rooms_with_config() {
    let config = write_config(
        r#"<lighter>
  <portals><maxdepth>4</maxdepth></portals>
  <ambient>10 10 10</ambient>
  <radiosity>
    <maxiterations>40</maxiterations>
    <queue>heap</queue>
  </radiosity>
</lighter>
"#,
    );
    let mut cmd = Command::cargo_bin("crystal-lighter").expect("binary exists");
    cmd.arg(config.path()).arg("--demo").arg("two-rooms");
    cmd.assert()
        .success()
        .stdout(contains(
            "Loaded demo 'two-rooms' with 2 sectors, 13 polygons (11 lightmapped), 1 lights",
        ))
        .stdout(contains("Finished radiosity ("))
        .stdout(contains(" - A.floor "))
        .stdout(contains(" - B.ceiling "));
}

#[test]
fn cli_skips_radiosity_on_request() {
    let mut cmd = Command::cargo_bin("crystal-lighter").expect("binary exists");
    cmd.arg("--demo")
        .arg("mirrors")
        .arg("--no-radiosity")
        .arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded demo 'mirrors' with 1 sectors"))
        .stdout(contains("Radiosity skipped"))
        .stdout(contains("Drew "))
        .stdout(contains(" - hall.").not());
}

#[test]
fn cli_rejects_bad_input() {
    let config = write_config("<lighter><fog>1</fog></lighter>");
    Command::cargo_bin("crystal-lighter")
        .expect("binary exists")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(contains("<fog>"));

    Command::cargo_bin("crystal-lighter")
        .expect("binary exists")
        .arg("--demo")
        .arg("attic")
        .assert()
        .failure()
        .stderr(contains("unknown demo 'attic'"));

    Command::cargo_bin("crystal-lighter")
        .expect("binary exists")
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"));
}
