//! Unit tests for dependency loading: caching, integrity and resolution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use scriptbridge::database::Database;
use scriptbridge::services::dependency_loader::*;
use scriptbridge::services::metadata_parser::parse;
use scriptbridge::types::errors::DependencyError;

/// Serves bodies from a map and counts fetches.
#[derive(Default)]
struct MapFetcher {
    bodies: HashMap<String, FetchedBody>,
    fetches: AtomicUsize,
}

impl MapFetcher {
    fn with(entries: &[(&str, &str, Option<&str>)]) -> Arc<Self> {
        let bodies = entries
            .iter()
            .map(|(url, body, content_type)| {
                (
                    url.to_string(),
                    FetchedBody {
                        bytes: body.as_bytes().to_vec(),
                        content_type: content_type.map(|c| c.to_string()),
                    },
                )
            })
            .collect();
        Arc::new(Self {
            bodies,
            fetches: AtomicUsize::new(0),
        })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DependencyFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, DependencyError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| DependencyError::Network(format!("{url}: 404")))
    }
}

fn loader(fetcher: Arc<MapFetcher>) -> (DependencyLoader, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let loader = DependencyLoader::new(fetcher, DependencyCache::new(db.clone()));
    (loader, db)
}

#[tokio::test]
async fn test_second_load_is_served_from_cache() {
    let fetcher = MapFetcher::with(&[("https://cdn.test/lib.js", "var lib = 1;", None)]);
    let (loader, _db) = loader(fetcher.clone());

    let first = loader.load("https://cdn.test/lib.js").await.unwrap();
    let second = loader.load("https://cdn.test/lib.js").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.text(), "var lib = 1;");
    assert_eq!(fetcher.fetches(), 1);
}

#[tokio::test]
async fn test_cache_is_keyed_without_integrity_fragment() {
    let digest = sha256_hex(b"var lib = 1;");
    let fetcher = MapFetcher::with(&[("https://cdn.test/lib.js", "var lib = 1;", None)]);
    let (loader, db) = loader(fetcher.clone());

    loader
        .load(&format!("https://cdn.test/lib.js#sha256={digest}"))
        .await
        .unwrap();
    let cache = DependencyCache::new(db);
    assert!(cache.get("https://cdn.test/lib.js").unwrap().is_some());

    loader.load("https://cdn.test/lib.js").await.unwrap();
    assert_eq!(fetcher.fetches(), 1);
}

#[tokio::test]
async fn test_integrity_mismatch_is_rejected_and_not_cached() {
    let wrong = sha256_hex(b"something else");
    let fetcher = MapFetcher::with(&[("https://cdn.test/lib.js", "var lib = 1;", None)]);
    let (loader, db) = loader(fetcher);

    let err = loader
        .load(&format!("https://cdn.test/lib.js#sha256={wrong}"))
        .await
        .unwrap_err();
    assert!(matches!(err, DependencyError::IntegrityMismatch { .. }));
    assert!(DependencyCache::new(db).get("https://cdn.test/lib.js").unwrap().is_none());
}

#[tokio::test]
async fn test_cached_body_failing_integrity_is_refetched() {
    let fetcher = MapFetcher::with(&[("https://cdn.test/lib.js", "fresh", None)]);
    let (loader, db) = loader(fetcher.clone());
    DependencyCache::new(db)
        .put(
            "https://cdn.test/lib.js",
            &FetchedBody {
                bytes: b"stale".to_vec(),
                content_type: None,
            },
        )
        .unwrap();

    let digest = sha256_hex(b"fresh");
    let body = loader
        .load(&format!("https://cdn.test/lib.js#sha256={digest}"))
        .await
        .unwrap();
    assert_eq!(body.text(), "fresh");
    assert_eq!(fetcher.fetches(), 1);
}

#[tokio::test]
async fn test_network_failure_propagates() {
    let (loader, _db) = loader(MapFetcher::with(&[]));
    let err = loader.load("https://cdn.test/missing.js").await.unwrap_err();
    assert!(matches!(err, DependencyError::Network(_)));
}

#[tokio::test]
async fn test_resolve_fills_requires_and_resources() {
    let fetcher = MapFetcher::with(&[
        ("https://cdn.test/lib.js", "window.lib = true;", Some("text/javascript")),
        ("https://cdn.test/logo.svg", "<svg/>", Some("image/svg+xml")),
    ]);
    let (loader, _db) = loader(fetcher);
    let mut metadata = parse(
        "// ==UserScript==\n\
         // @name Deps\n\
         // @require https://cdn.test/lib.js\n\
         // @require https://cdn.test/gone.js\n\
         // @resource logo https://cdn.test/logo.svg\n\
         // ==/UserScript==",
    )
    .unwrap();

    let failed = loader.resolve(&mut metadata).await;
    assert_eq!(failed, 1);

    assert!(metadata.require[0].loaded);
    assert_eq!(metadata.require[0].text_content.as_deref(), Some("window.lib = true;"));
    assert!(!metadata.require[1].loaded);
    assert!(metadata.require[1].text_content.is_none());

    let logo = metadata.resource("logo").unwrap();
    assert!(logo.loaded);
    assert_eq!(logo.res_text.as_deref(), Some("<svg/>"));
    assert_eq!(logo.res_url.as_deref(), Some("data:image/svg+xml;base64,PHN2Zy8+"));
}

#[tokio::test]
async fn test_resolve_skips_loaded_entries() {
    let fetcher = MapFetcher::with(&[("https://cdn.test/lib.js", "x", None)]);
    let (loader, _db) = loader(fetcher.clone());
    let mut metadata =
        parse("// ==UserScript==\n// @require https://cdn.test/lib.js\n// ==/UserScript==").unwrap();

    assert_eq!(loader.resolve(&mut metadata).await, 0);
    assert_eq!(loader.resolve(&mut metadata).await, 0);
    assert_eq!(fetcher.fetches(), 1);
}

#[test]
fn test_data_url_defaults_content_type() {
    let body = FetchedBody {
        bytes: b"hi".to_vec(),
        content_type: None,
    };
    assert_eq!(body.data_url(), "data:application/octet-stream;base64,aGk=");
}

#[tokio::test]
async fn test_cache_clear() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let cache = DependencyCache::new(db);
    let body = FetchedBody {
        bytes: b"x".to_vec(),
        content_type: None,
    };
    cache.put("https://a/", &body).unwrap();
    assert_eq!(cache.get("https://a/").unwrap(), Some(body));
    cache.clear().unwrap();
    assert_eq!(cache.get("https://a/").unwrap(), None);
}

#[tokio::test]
async fn test_read_capped_collects_chunks() {
    let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(b"ab".to_vec()), Ok(b"cd".to_vec())];
    let body = read_capped(futures_util::stream::iter(chunks), 4, "https://cdn.test/a.js")
        .await
        .unwrap();
    assert_eq!(body, b"abcd".to_vec());
}

#[tokio::test]
async fn test_read_capped_stops_unbounded_body() {
    let endless = futures_util::stream::repeat(Ok::<_, String>(vec![0u8; 1024]));
    let err = read_capped(endless, 10_000, "https://cdn.test/huge.js").await.unwrap_err();
    assert_eq!(
        err,
        DependencyError::TooLarge {
            url: "https://cdn.test/huge.js".to_string(),
            bytes: 10_240,
        }
    );
}

#[tokio::test]
async fn test_read_capped_reports_stream_errors() {
    let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(b"ab".to_vec()), Err("reset".to_string())];
    let err = read_capped(futures_util::stream::iter(chunks), 100, "https://cdn.test/a.js")
        .await
        .unwrap_err();
    assert!(matches!(err, DependencyError::Network(_)));
}
