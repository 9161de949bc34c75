//! End-to-end scenarios: inheritance, asset selection, cycles, checksum failures,
//! strategy short-circuits and fallback recovery.

mod common;

use std::collections::BTreeMap;
use std::fs;

use common::{ReleaseHost, all, processor, tar_gz, tools};
use forgebin::libs::asset_matcher::{Matcher, Requirements, pick_checksum_file};
use forgebin::libs::inheritance::{apply_defaults, resolve_defaults};
use forgebin::schemas::platform::Platform;
use forgebin::schemas::results::Status;
use forgebin::schemas::tools::Strategy;
use forgebin::{ErrorKind, Tool};

#[test]
fn defaults_are_inherited() {
    let defaults: BTreeMap<String, Tool> = serde_yaml::from_str(
        r#"
base: {output: /opt/bin, strategy: sync}
gh: {inherit: [base], source: {type: github, github: {repo: cli/cli}}}
"#,
    )
    .unwrap();
    let resolved = resolve_defaults(&defaults).unwrap();
    assert_eq!(resolved["gh"].output, "/opt/bin");
    assert_eq!(resolved["gh"].strategy, Some(Strategy::Sync));

    let tool: Tool = serde_yaml::from_str("{name: gh, inherit: gh}").unwrap();
    let merged = apply_defaults(&tool, &resolved).unwrap();
    assert_eq!(merged.output, "/opt/bin");
    assert_eq!(merged.source.github.repo, "cli/cli");
}

#[test]
fn picks_platform_asset_and_checksum_sibling() {
    let candidates = [
        "tool-1.0-linux-amd64.tar.gz",
        "tool-1.0-linux-arm64.tar.gz",
        "tool-1.0-darwin-amd64.tar.gz",
        "tool-1.0-SHA256SUMS",
    ];
    let requirements = Requirements {
        platform: Platform {
            os: "linux".into(),
            arch: "amd64".into(),
            ..Platform::default()
        },
        ..Requirements::default()
    };
    let best = Matcher::new(&requirements).unwrap().best(&candidates).unwrap();
    assert_eq!(best.name, "tool-1.0-linux-amd64.tar.gz");
    assert_eq!(
        pick_checksum_file(&candidates, &best.name).as_deref(),
        Some("tool-1.0-SHA256SUMS")
    );
}

#[test]
fn inheritance_cycle_is_reported_with_its_path() {
    let defaults: BTreeMap<String, Tool> =
        serde_yaml::from_str("{a: {inherit: [b]}, b: {inherit: [c]}, c: {inherit: [a]}}").unwrap();
    let err = resolve_defaults(&defaults).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(err.to_string().contains("a -> b -> c -> a"), "{err}");
}

#[test]
fn checksum_mismatch_fails_without_writing_output() {
    let host = ReleaseHost::start(vec![("/y".into(), 200, b"#!/bin/sh\necho y\n".to_vec())]);
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = tools(&format!(
        r#"
- name: y
  version: 1.0.0
  output: {out}
  strategy: force
  source: {{type: url, url: {{url: "{base}/y"}}}}
  checksum: {{type: sha256, value: "{digest}"}}
"#,
        out = out.path().display(),
        base = host.base,
        digest = "deadbeef".repeat(8),
    ));

    let err = processor(cache.path()).process(&list, &all()).unwrap_err();
    assert_eq!(err.failed, 1);
    assert_eq!(err.details[0].kind, ErrorKind::Integrity);
    assert!(!out.path().join("y").exists());
}

#[test]
fn strategy_none_with_existing_binary_makes_no_requests() {
    let host = ReleaseHost::start(Vec::new());
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(out.path().join("t"), b"#!/bin/sh\n").unwrap();
    let list = tools(&format!(
        "[{{name: t, output: {}, exe: {{name: t}}, strategy: none, source: {{type: github, github: {{repo: o/t, api: '{}'}}}}}}]",
        out.path().display(),
        host.base
    ));

    let summary = processor(cache.path()).process(&list, &all()).unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.results[0].status, Status::Skipped);
    assert_eq!(summary.results[0].message, "already exists");
    assert_eq!(host.hits(), 0);
}

#[test]
fn falls_back_to_url_when_github_has_no_release() {
    let archive = tar_gz(&[("y", "#!/bin/sh\necho 1.0.0\n")]);
    let host = ReleaseHost::start(vec![("/dl/y-1.0.0.tar.gz".into(), 200, archive)]);
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = tools(&format!(
        r#"
- name: y
  version: 1.0.0
  output: {out}
  strategy: force
  fallbacks: [url]
  source:
    type: github
    github: {{repo: owner/y, api: "{base}"}}
    url: {{url: "{base}/dl/y-{{{{ .Version }}}}.tar.gz"}}
"#,
        out = out.path().display(),
        base = host.base,
    ));

    let summary = processor(cache.path()).process(&list, &all()).unwrap();
    let result = &summary.results[0];
    assert_eq!(result.status, Status::Success, "{:?}", result.error);
    assert_eq!(result.record.as_ref().unwrap().kind, "url");
    assert!(out.path().join("y").is_file());
}

#[test]
fn exhausted_sources_report_every_failure() {
    let host = ReleaseHost::start(Vec::new());
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let list = tools(&format!(
        r#"
- name: y
  version: 1.0.0
  output: {out}
  fallbacks: [url]
  source:
    type: github
    github: {{repo: owner/y, api: "{base}"}}
"#,
        out = out.path().display(),
        base = host.base,
    ));

    let err = processor(cache.path()).process(&list, &all()).unwrap_err();
    let detail = &err.details[0];
    assert_eq!(detail.kind, ErrorKind::Resolve);
    assert!(detail.error.contains("github"), "{}", detail.error);
    assert!(detail.error.contains("url"), "{}", detail.error);
}
