//! Processor behaviour across runs: cache persistence, strategy decisions against the
//! cache, ordering under parallelism and tag selection.

mod common;

use common::{ReleaseHost, all, processor, tools};
use forgebin::libs::cache_store::CacheStore;
use forgebin::libs::pipeline::TagFilter;
use forgebin::schemas::results::Status;
use forgebin::schemas::tools::tool_id;

fn url_tool(name: &str, version: &str, out: &std::path::Path, base: &str, extra: &str) -> String {
    format!(
        "- {{name: {name}, version: {version}, output: {out}, source: {{type: url, url: {{url: '{base}/{name}-{version}'}}}}{extra}}}\n",
        out = out.display()
    )
}

#[test]
fn sync_skips_the_cached_version_and_updates_on_change() {
    let host = ReleaseHost::start(vec![
        ("/t-1.0.0".into(), 200, b"#!/bin/sh\necho 1.0.0\n".to_vec()),
        ("/t-1.1.0".into(), 200, b"#!/bin/sh\necho 1.1.0\n".to_vec()),
    ]);
    let cache_dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let first = tools(&url_tool("t", "1.0.0", out.path(), &host.base, ", strategy: sync"));
    let summary = processor(cache_dir.path()).process(&first, &all()).unwrap();
    assert_eq!(summary.successful, 1);

    let store = CacheStore::new(cache_dir.path().join("cache.yml"));
    let id = tool_id(&out.path().display().to_string(), "t");
    assert_eq!(store.load().get(&id).unwrap().version, "1.0.0");

    let again = processor(cache_dir.path()).process(&first, &all()).unwrap();
    assert_eq!(again.results[0].status, Status::Skipped);
    assert_eq!(again.results[0].message, "already at version 1.0.0");

    let newer = tools(&url_tool("t", "1.1.0", out.path(), &host.base, ", strategy: sync"));
    let updated = processor(cache_dir.path()).process(&newer, &all()).unwrap();
    assert_eq!(updated.successful, 1);
    assert_eq!(store.load().get(&id).unwrap().version, "1.1.0");
    assert_eq!(store.load().len(), 1);
}

#[test]
fn parallel_results_keep_input_order() {
    let names = ["a", "b", "c", "d", "e", "f"];
    let routes = names
        .iter()
        .map(|n| (format!("/{n}-1.0.0"), 200, format!("#!/bin/sh\necho {n}\n").into_bytes()))
        .collect();
    let host = ReleaseHost::start(routes);
    let cache_dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let list: String = names
        .iter()
        .map(|n| url_tool(n, "1.0.0", out.path(), &host.base, ", strategy: force"))
        .collect();
    let summary = processor(cache_dir.path()).process(&tools(&list), &all()).unwrap();

    let order: Vec<&str> = summary.results.iter().map(|r| r.tool.as_str()).collect();
    assert_eq!(order, names);
    assert_eq!(summary.successful, names.len());
    for name in names {
        assert!(out.path().join(name).is_file());
    }
    let store = CacheStore::new(cache_dir.path().join("cache.yml"));
    assert_eq!(store.load().len(), names.len());
}

#[test]
fn tag_selection_skips_unselected_tools() {
    let cache_dir = tempfile::tempdir().unwrap();
    let list = tools(
        r#"
- {name: a, tags: [cli], source: {type: none}}
- {name: b, tags: [gui], source: {type: none}}
"#,
    );
    let filter = TagFilter::new(vec!["cli".into()], Vec::new());
    let summary = processor(cache_dir.path()).process(&list, &filter).unwrap();
    assert_eq!(summary.results[0].message, "source type is none");
    assert_eq!(summary.results[1].message, "excluded by tags");
}
