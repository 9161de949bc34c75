//! Shared helpers for integration tests: a local release host and archive builders.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use forgebin::libs::pipeline::TagFilter;
use forgebin::libs::progress::NoProgress;
use forgebin::schemas::config::Config;
use forgebin::schemas::platform::Platform;
use forgebin::{Processor, Tool};
use tiny_http::{Response, Server, StatusCode};

/// A release host serving fixed routes on localhost.
pub struct ReleaseHost {
    pub base: String,
    hits: Arc<AtomicUsize>,
}

impl ReleaseHost {
    /// Serves `routes` as `(path, status, body)`; other paths answer 404.
    /// The server stops after five seconds without a request.
    pub fn start(routes: Vec<(String, u16, Vec<u8>)>) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr().to_ip().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        std::thread::spawn(move || {
            while let Ok(Some(request)) = server.recv_timeout(Duration::from_secs(5)) {
                counter.fetch_add(1, Ordering::SeqCst);
                let response = match routes.iter().find(|(path, _, _)| *path == request.url()) {
                    Some((_, status, body)) => {
                        Response::from_data(body.clone()).with_status_code(StatusCode(*status))
                    }
                    None => Response::from_string("Not Found").with_status_code(StatusCode(404)),
                };
                let _ = request.respond(response);
            }
        });
        Self { base, hits }
    }

    /// Number of requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// A `.tar.gz` holding one executable script per `(name, body)`.
pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A Linux/amd64 processor with its cache in `cache_dir` and a placeholder token so
/// tools run in parallel.
pub fn processor(cache_dir: &std::path::Path) -> Processor {
    let config = Config {
        cache_dir: cache_dir.to_path_buf(),
        github_token: Some("test-token".into()),
        env_tokens: false,
        ..Config::default()
    };
    Processor::new(config)
        .with_host(Platform {
            os: "linux".into(),
            arch: "amd64".into(),
            libc: "gnu".into(),
            ..Platform::default()
        })
        .with_progress(Box::new(NoProgress))
}

/// Parses a YAML tool list.
pub fn tools(yaml: &str) -> Vec<Tool> {
    serde_yaml::from_str(yaml).unwrap()
}

/// No tag selection.
pub fn all() -> TagFilter {
    TagFilter::default()
}
