//! Remote record sources.
//!
//! [`RecordSource`] is the seam to the authoritative store. Two
//! implementations ship: [`HttpSource`] queries the records API, and
//! [`DirectorySource`] reads `<dir>/<entity_id>.json` for offline replays.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use reconcile_core::config::{HttpSourceConfig, SourceConfig};
use reconcile_core::{CoreError, EntityId, Record};

use crate::error::SyncError;

/// Supplies the authoritative record for an entity.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    async fn fetch(&self, entity_id: &EntityId) -> Result<Record, SyncError>;
}

// ---------------------------------------------------------------------------
// DirectorySource
// ---------------------------------------------------------------------------

/// Reads records from `<root>/<entity_id>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, entity_id: &EntityId) -> Result<PathBuf, SyncError> {
        let id = entity_id.0.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(SyncError::Fetch {
                entity_id: entity_id.clone(),
                message: "entity id is not a valid file name".into(),
            });
        }
        Ok(self.root.join(format!("{id}.json")))
    }
}

impl RecordSource for DirectorySource {
    async fn fetch(&self, entity_id: &EntityId) -> Result<Record, SyncError> {
        let path = self.record_path(entity_id)?;
        let contents =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| SyncError::SourceFile {
                    entity_id: entity_id.clone(),
                    path: path.clone(),
                    source,
                })?;
        let value: Value = serde_json::from_str(&contents).map_err(|e| SyncError::Fetch {
            entity_id: entity_id.clone(),
            message: format!("{} is not valid JSON: {e}", path.display()),
        })?;
        tracing::debug!("read record for {entity_id} from {}", path.display());
        Record::try_from(value).map_err(|_| SyncError::NotAnObject {
            entity_id: entity_id.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// HttpSource
// ---------------------------------------------------------------------------

/// Queries `GET <base_url>/<path>?<type_param>=<record_type>&<id_param>=<id>`.
///
/// `ureq` is blocking, so each call runs on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct HttpSource {
    agent: ureq::Agent,
    config: HttpSourceConfig,
    token: Option<String>,
}

impl HttpSource {
    /// Build a source; the bearer token is read once from `config.token_env`.
    pub fn new(config: HttpSourceConfig, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let token = config
            .token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|t| !t.is_empty());
        Self {
            agent: builder.build(),
            config,
            token,
        }
    }

    /// Base URL joined with the record path, without query parameters.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.path.trim_start_matches('/')
        )
    }
}

impl RecordSource for HttpSource {
    async fn fetch(&self, entity_id: &EntityId) -> Result<Record, SyncError> {
        let mut request = self
            .agent
            .get(&self.endpoint())
            .query(&self.config.type_param, &self.config.record_type)
            .query(&self.config.id_param, &entity_id.0);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        tracing::info!("fetching {} record for {entity_id}", self.config.record_type);
        let body = tokio::task::spawn_blocking(move || -> Result<Value, String> {
            let response = request.call().map_err(|e| match e {
                ureq::Error::Status(code, _) => format!("HTTP status {code}"),
                other => other.to_string(),
            })?;
            response
                .into_json::<Value>()
                .map_err(|e| format!("invalid JSON body: {e}"))
        })
        .await
        .map_err(|e| SyncError::Fetch {
            entity_id: entity_id.clone(),
            message: format!("fetch task failed: {e}"),
        })?
        .map_err(|message| SyncError::Fetch {
            entity_id: entity_id.clone(),
            message,
        })?;

        Record::try_from(body).map_err(|_| SyncError::NotAnObject {
            entity_id: entity_id.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// AnySource
// ---------------------------------------------------------------------------

/// Source selected at runtime from configuration.
#[derive(Debug, Clone)]
pub enum AnySource {
    Http(HttpSource),
    Directory(DirectorySource),
}

impl AnySource {
    /// Build the configured source. Exactly one of `http` / `directory` must be set.
    pub fn from_config(config: &SourceConfig) -> Result<Self, CoreError> {
        match (&config.http, &config.directory) {
            (Some(http), None) => Ok(Self::Http(HttpSource::new(http.clone(), config.timeout()))),
            (None, Some(dir)) => Ok(Self::Directory(DirectorySource::new(dir.clone()))),
            (Some(_), Some(_)) => Err(CoreError::InvalidConfig(
                "configure either source.http or source.directory, not both".into(),
            )),
            (None, None) => Err(CoreError::InvalidConfig(
                "no record source configured (source.http or source.directory)".into(),
            )),
        }
    }
}

impl RecordSource for AnySource {
    async fn fetch(&self, entity_id: &EntityId) -> Result<Record, SyncError> {
        match self {
            AnySource::Http(source) => source.fetch(entity_id).await,
            AnySource::Directory(source) => source.fetch(entity_id).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    /// Serve one canned HTTP response; returns the base URL and the request line.
    fn serve_once(status: &str, body: &str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).expect("header");
                if header == "\r\n" || header.is_empty() {
                    break;
                }
            }
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).expect("respond");
            request_line
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn directory_source_reads_record() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("42.json"), r#"{"name":{"surname":"Smith"}}"#).unwrap();
        let source = DirectorySource::new(dir.path());
        let record = source.fetch(&EntityId::from("42")).await.unwrap();
        assert_eq!(record.get("name"), Some(&json!({"surname": "Smith"})));
    }

    #[tokio::test]
    async fn directory_source_missing_file_is_fetch_error() {
        let dir = TempDir::new().unwrap();
        let err = DirectorySource::new(dir.path())
            .fetch(&EntityId::from("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceFile { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn directory_source_rejects_traversal_ids() {
        let dir = TempDir::new().unwrap();
        let err = DirectorySource::new(dir.path())
            .fetch(&EntityId::from("../etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Fetch { .. }));
    }

    #[tokio::test]
    async fn directory_source_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("1.json"), "[1,2]").unwrap();
        let err = DirectorySource::new(dir.path())
            .fetch(&EntityId::from("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotAnObject { .. }));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let mut cfg = HttpSourceConfig::new("https://example.org/dev/");
        cfg.path = "/person".into();
        let source = HttpSource::new(cfg, None);
        assert_eq!(source.endpoint(), "https://example.org/dev/person");
    }

    #[tokio::test]
    async fn http_source_queries_rating_record_by_id() {
        let (base, server) = serve_once("200 OK", r#"{"name":{"forename":"Ann"}}"#);
        let source = HttpSource::new(HttpSourceConfig::new(base), Some(Duration::from_secs(5)));

        let record = source.fetch(&EntityId::from("42")).await.unwrap();
        assert_eq!(record.get("name"), Some(&json!({"forename": "Ann"})));

        let request_line = server.join().unwrap();
        assert!(request_line.starts_with("GET /person?"), "{request_line}");
        assert!(request_line.contains("sailorType=rating"), "{request_line}");
        assert!(request_line.contains("nameId=42"), "{request_line}");
    }

    #[tokio::test]
    async fn http_status_error_is_reported() {
        let (base, server) = serve_once("404 Not Found", "{}");
        let source = HttpSource::new(HttpSourceConfig::new(base), Some(Duration::from_secs(5)));
        let err = source.fetch(&EntityId::from("7")).await.unwrap_err();
        server.join().unwrap();
        match err {
            SyncError::Fetch { message, .. } => assert!(message.contains("404"), "{message}"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn any_source_requires_one_backend() {
        let mut cfg = SourceConfig::default();
        assert!(AnySource::from_config(&cfg).is_err());
        cfg.directory = Some(PathBuf::from("/srv"));
        assert!(matches!(
            AnySource::from_config(&cfg),
            Ok(AnySource::Directory(_))
        ));
    }
}
