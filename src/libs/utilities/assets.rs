// For working with file paths, specifically to place downloads in temp directories.
use std::path::Path;
// Shared ownership of the TLS configuration handed to the HTTP agent.
use std::sync::Arc;
// Connect and read timeouts for the agent.
use std::time::Duration;
// `std::io` contains core input/output functionalities; `std::fs` creates the destination file.
use std::fs::File;
use std::io::{self, Read, Write};
// The 'colored' crate helps us make our console output look pretty and readable.
use colored::Colorize;
// Typed decoding of JSON API responses.
use serde::de::DeserializeOwned;
// Certificate-skipping verifier behind `no-verify-ssl`.
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
// Our custom logging macros to give us nicely formatted (and colored!) output.
use crate::log_debug;
use crate::libs::cancel::CancelToken;
use crate::libs::errors::{Error, Result};
use crate::libs::progress::ProgressTracker;

/// `User-Agent` sent with every request. GitHub rejects requests without one.
pub const USER_AGENT: &str = concat!("forgebin/", env!("CARGO_PKG_VERSION"));

// Downloads are copied in chunks so cancellation is noticed mid-transfer.
const CHUNK_SIZE: usize = 64 * 1024;

/// Request headers as `(name, value)` pairs.
pub type Headers = [(String, String)];

/// Blocking HTTP client shared by populators, checksum lookups and downloads.
///
/// Cloning is cheap: clones share the same connection pool.
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    /// Builds a client.
    ///
    /// # Arguments
    /// * `no_verify_ssl`: Accept any server certificate. Only meant for self-hosted
    ///   endpoints with private certificates.
    ///
    /// # Returns
    /// * `Result<HttpClient>`: fails only when the insecure TLS configuration cannot be built.
    pub fn new(no_verify_ssl: bool) -> Result<Self> {
        let mut builder = ureq::AgentBuilder::new()
            .user_agent(USER_AGENT)
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300));
        if no_verify_ssl {
            builder = builder.tls_config(insecure_tls_config()?);
        }
        Ok(Self {
            agent: builder.build(),
        })
    }

    // Sends a GET and maps ureq's error split onto our taxonomy:
    // statuses >= 400 become `Error::Http`, everything else `Error::Network`.
    fn call(&self, url: &str, headers: &Headers) -> Result<ureq::Response> {
        log_debug!("[HTTP] GET {}", url.blue());
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        match request.call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, _)) => Err(Error::Http {
                url: url.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(transport)) => Err(Error::network(url, transport.to_string())),
        }
    }

    /// GETs `url` and decodes the JSON body.
    pub fn get_json<T: DeserializeOwned>(&self, url: &str, headers: &Headers) -> Result<T> {
        self.call(url, headers)?
            .into_json::<T>()
            .map_err(|e| Error::network(url, format!("invalid JSON response: {e}")))
    }

    /// GETs `url` and returns the body as text.
    pub fn get_text(&self, url: &str, headers: &Headers) -> Result<String> {
        self.call(url, headers)?
            .into_string()
            .map_err(|e| Error::network(url, format!("failed to read response: {e}")))
    }

    /// Streams `url` into `dest`.
    ///
    /// # Arguments
    /// * `url`: Asset URL.
    /// * `headers`: Extra request headers (authorization, accept).
    /// * `dest`: Full path of the file to create.
    /// * `progress`: Receives the body stream before it is copied.
    /// * `cancel`: Checked between chunks.
    ///
    /// # Returns
    /// * `Result<u64>`: bytes written.
    pub fn download(
        &self,
        url: &str,
        headers: &Headers,
        dest: &Path,
        progress: &dyn ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<u64> {
        cancel.check()?;
        let response = self.call(url, headers)?;
        let total = response
            .header("Content-Length")
            .and_then(|len| len.parse::<u64>().ok());
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| url.to_string());

        let mut reader = progress.track_progress(&name, 0, total, Box::new(response.into_reader()));
        let mut file = File::create(dest).map_err(|e| Error::io_at("create", dest, e))?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written: u64 = 0;
        loop {
            cancel.check()?;
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::network(url, e.to_string())),
            };
            file.write_all(&buffer[..n])
                .map_err(|e| Error::io_at("write", dest, e))?;
            written += n as u64;
        }
        file.flush().map_err(|e| Error::io_at("flush", dest, e))?;

        log_debug!("[HTTP] Downloaded {} bytes to {}", written, dest.display().to_string().green());
        Ok(written)
    }
}

fn insecure_tls_config() -> Result<Arc<rustls::ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::network("tls", e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

// Accepts every certificate but still checks handshake signatures with the provider.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Detects the archive type of a downloaded file.
///
/// The file name is checked first (compound extensions before single ones); when it
/// is inconclusive the leading magic bytes decide.
///
/// # Arguments
/// * `path`: The file to inspect.
///
/// # Returns
/// * `String`: one of `tar.gz`, `tar.xz`, `tar.bz2`, `zip`, `tar`, `gz`, `xz`, `bz2`
///   or `binary`.
pub fn detect_file_type(path: &Path) -> String {
    if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
        let lower = name.to_lowercase();
        let by_name = [
            (".tar.gz", "tar.gz"),
            (".tgz", "tar.gz"),
            (".tar.xz", "tar.xz"),
            (".txz", "tar.xz"),
            (".tar.bz2", "tar.bz2"),
            (".tbz2", "tar.bz2"),
            (".tbz", "tar.bz2"),
            (".zip", "zip"),
            (".tar", "tar"),
            (".gz", "gz"),
            (".xz", "xz"),
            (".bz2", "bz2"),
        ];
        if let Some((_, kind)) = by_name.iter().find(|(ext, _)| lower.ends_with(ext)) {
            return kind.to_string();
        }
    }

    let mut header = [0u8; 512];
    let read = File::open(path)
        .and_then(|mut file| read_up_to(&mut file, &mut header))
        .unwrap_or(0);
    let header = &header[..read];

    let kind = if header.starts_with(b"PK\x03\x04") {
        "zip"
    } else if header.starts_with(&[0x1f, 0x8b]) {
        "gz"
    } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        "xz"
    } else if header.starts_with(b"BZh") {
        "bz2"
    } else if header.len() >= 262 && &header[257..262] == b"ustar" {
        "tar"
    } else {
        "binary"
    };
    log_debug!("[Utils] Detected {} as {}", path.display(), kind);
    kind.to_string()
}

fn read_up_to(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::progress::NoProgress;
    use tiny_http::{Response, Server, StatusCode};

    #[test]
    fn detects_types_by_name_and_magic() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_file_type(&dir.path().join("a.TGZ")), "tar.gz");
        assert_eq!(detect_file_type(&dir.path().join("a.tar.bz2")), "tar.bz2");

        let zip = dir.path().join("download");
        std::fs::write(&zip, b"PK\x03\x04rest").unwrap();
        assert_eq!(detect_file_type(&zip), "zip");

        let plain = dir.path().join("tool");
        std::fs::write(&plain, b"#!/bin/sh\necho hi\n").unwrap();
        assert_eq!(detect_file_type(&plain), "binary");
    }

    #[test]
    fn download_writes_body_and_maps_statuses() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = std::thread::spawn(move || {
            for request in server.incoming_requests().take(2) {
                let response = if request.url() == "/ok" {
                    Response::from_string("payload")
                } else {
                    Response::from_string("nope").with_status_code(StatusCode(404))
                };
                request.respond(response).unwrap();
            }
        });

        let client = HttpClient::new(false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("asset.bin");
        let written = client
            .download(&format!("http://{addr}/ok"), &[], &dest, &NoProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "payload");

        let err = client.get_text(&format!("http://{addr}/missing"), &[]).unwrap_err();
        assert!(err.is_not_found());
        handle.join().unwrap();
    }

    #[test]
    fn cancelled_download_makes_no_request() {
        let client = HttpClient::new(false).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let dir = tempfile::tempdir().unwrap();
        let err = client
            .download("http://127.0.0.1:9/never", &[], &dir.path().join("x"), &NoProgress, &token)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn insecure_client_builds() {
        assert!(HttpClient::new(true).is_ok());
    }
}
