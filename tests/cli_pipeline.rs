use std::path::Path;

use assert_cmd::Command;
use kbds::formats::{Article, Media, MediaKind, Section};
use kbds::store;
use kbds::tier::Tier;
use predicates::prelude::*;

mod fake_site;

use fake_site::{FakeServer, FakeSite};

static LOGO_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

/// One topic ("Cat") published at all three tiers, listed under `c`.
fn cat_site() -> FakeSite {
    let mut site = FakeSite::new();
    let kids = site.add_article(
        Tier::Kids,
        "10",
        "Cat",
        &[(Tier::Students, "20"), (Tier::Scholars, "30")],
    );
    let students = site.add_article(
        Tier::Students,
        "20",
        "Cat",
        &[(Tier::Kids, "10"), (Tier::Scholars, "30")],
    );
    let scholars = site.add_article(
        Tier::Scholars,
        "30",
        "Cat",
        &[(Tier::Kids, "10"), (Tier::Students, "20")],
    );
    site.add_index(Tier::Kids, 'c', &[vec![kids]]);
    site.add_index(Tier::Students, 'c', &[vec![students]]);
    site.add_index(Tier::Scholars, 'c', &[vec![scholars]]);
    site
}

fn kbds() -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kbds");
    cmd.env_remove("KBDS_USERNAME")
        .env_remove("KBDS_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

fn data_arg(dir: &Path) -> String {
    dir.display().to_string()
}

#[test]
fn download_then_inspect_corpus() -> anyhow::Result<()> {
    let server = FakeServer::spawn(cat_site());
    let temp = tempfile::TempDir::new()?;
    let data = data_arg(temp.path());

    kbds()
        .args(["download", "--data-dir", &data, "--base-url", &server.base_url])
        .args(["--delay-ms", "0", "--max-retries", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "saved 3 of 3 article(s) after 0 retry round(s); 0 unresolved",
        ));

    assert!(store::urls_path(temp.path()).is_file());
    assert_eq!(store::saved_ids(temp.path())?.len(), 3);

    kbds()
        .args(["download", "--data-dir", &data, "--base-url", &server.base_url])
        .args(["--delay-ms", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved 0 of 0 article(s)"));

    kbds()
        .args(["metadata", "--data-dir", &data])
        .assert()
        .success()
        .stdout(predicate::str::contains("total: 3"));

    kbds()
        .args(["triples", "--data-dir", &data])
        .assert()
        .success()
        .stdout("10\t20\t30\n");

    kbds()
        .args(["show", "--data-dir", &data, "--id", "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cat"))
        .stdout(predicate::str::contains("1 section(s) containing 15 words"));

    kbds()
        .args(["stats", "--data-dir", &data])
        .assert()
        .success()
        .stdout(predicate::str::contains("scholars"));
    assert!(store::stats_path(temp.path()).is_file());

    let out = temp.path().join("aligned");
    kbds()
        .args(["subset", "--data-dir", &data, "--aligned", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("copied 3 of 3 article(s)"));
    assert_eq!(store::saved_ids(&out)?.len(), 3);
    Ok(())
}

#[test]
fn download_missing_fills_in_linked_tiers() -> anyhow::Result<()> {
    let server = FakeServer::spawn(cat_site());
    let temp = tempfile::TempDir::new()?;
    let data = data_arg(temp.path());

    kbds()
        .args(["download", "--data-dir", &data, "--base-url", &server.base_url])
        .args(["--delay-ms", "0", "--tier", "kids"])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved 1 of 1"));

    kbds()
        .args(["triples", "--data-dir", &data])
        .assert()
        .success()
        .stdout("10\t20\t30\n");

    kbds()
        .args(["download-missing", "--data-dir", &data, "--base-url", &server.base_url])
        .args(["--delay-ms", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved 2 of 2"));

    kbds()
        .args(["metadata", "--data-dir", &data])
        .assert()
        .success()
        .stdout(predicate::str::contains("total: 3"));
    Ok(())
}

#[test]
fn commands_on_empty_corpus_ask_for_a_download() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    kbds()
        .args(["show", "--id", "1", "--data-dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("download the data first"));
    Ok(())
}

#[test]
fn media_files_are_downloaded_once() -> anyhow::Result<()> {
    let mut site = FakeSite::new();
    site.add_file("/img/555.png", LOGO_PNG);
    let server = FakeServer::spawn(site);
    let temp = tempfile::TempDir::new()?;

    let article = Article {
        url: format!("{}/kids/article/cat/10", server.base_url),
        id: "10".to_owned(),
        tier: Tier::Kids,
        title: "Cat".to_owned(),
        text: vec![Section::new("", vec!["Cats purr.".to_owned()])],
        media: vec![
            Media {
                title: "Cat".to_owned(),
                caption: String::new(),
                id: "555".to_owned(),
                kind: MediaKind::Image {
                    src: format!("{}/img/555.png", server.base_url),
                    file_type: "png".to_owned(),
                },
            },
            Media {
                title: "Cat video".to_owned(),
                caption: String::new(),
                id: "vid".to_owned(),
                kind: MediaKind::Video {
                    transcript: String::new(),
                    video_id: "vid".to_owned(),
                    manifest_url: "https://content.jwplatform.com/manifests/vid.m3u8".to_owned(),
                    file_type: "mp4".to_owned(),
                },
            },
        ],
        adjacent_ids: Default::default(),
        related_articles: Vec::new(),
        related_websites: Vec::new(),
        htmls: None,
    };
    store::write_json_atomic(
        &store::article_path(temp.path(), Tier::Kids, "10", "Cat"),
        &article,
    )?;

    kbds()
        .args(["media", "--delay-ms", "0", "--data-dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("downloaded 1 file(s); 0 already present; 0 failed"));

    let saved = store::media_dir(temp.path()).join("kids/10 Cat/555.png");
    assert_eq!(std::fs::read(&saved)?, LOGO_PNG);

    kbds()
        .args(["media", "--delay-ms", "0", "--data-dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("downloaded 0 file(s); 1 already present"));
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    kbds()
        .env("RUST_LOG", "debug")
        .args(["metadata", "--data-dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsed cli"));
}
