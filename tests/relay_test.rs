mod common;

use common::{DOCX_MIME, FakeUploader, MockProvider, stored_files};
use drive_relay::models::ProgressEvent;
use drive_relay::services::progress_channel::{ProgressChannel, Subscription};
use drive_relay::services::relay_service::{
    DELIVERED_TEXT, LOCAL_STORAGE_TEXT, RelayRequest, RelayService, UPLOAD_STARTED_TEXT,
};
use drive_relay::services::storage::LocalStorage;
use drive_relay::services::upload_dispatcher::UploadDispatcher;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4 quarterly numbers";
const DOC_EXPORT: &[u8] = b"PK\x03\x04 exported word document";

struct Harness {
    relay: RelayService,
    progress: Arc<ProgressChannel>,
    provider: Arc<MockProvider>,
    uploader: Arc<FakeUploader>,
    data_dir: TempDir,
}

fn harness(provider: MockProvider, uploader: FakeUploader, delete_after_upload: bool) -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(data_dir.path());
    let progress = Arc::new(ProgressChannel::new(Duration::from_secs(60)));
    let provider = Arc::new(provider);
    let uploader = Arc::new(uploader);

    let dispatcher = UploadDispatcher::new(
        reqwest::Client::new(),
        uploader.clone(),
        progress.clone(),
        storage.clone(),
        delete_after_upload,
    );
    let relay = RelayService::new(provider.clone(), storage, dispatcher);

    Harness {
        relay,
        progress,
        provider,
        uploader,
        data_dir,
    }
}

fn default_provider() -> MockProvider {
    MockProvider::new()
        .with_file("pdf-1", "Quarterly Report.pdf", "application/pdf", PDF_BYTES)
        .with_file(
            "doc-1",
            "Meeting Notes",
            "application/vnd.google-apps.document",
            DOC_EXPORT,
        )
        .with_file(
            "drawing-1",
            "Whiteboard",
            "application/vnd.google-apps.drawing",
            b"",
        )
}

fn request(file_id: &str, target: Option<&str>, protocol: Option<&str>) -> RelayRequest {
    RelayRequest {
        file_id: Some(file_id.to_string()),
        target: target.map(str::to_string),
        protocol: protocol.map(str::to_string),
    }
}

async fn collect_events(mut subscription: Subscription) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    let collect = async {
        while let Some(event) = subscription.next().await {
            events.push(event);
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("progress stream never finished");
    events
}

#[tokio::test]
async fn test_missing_file_id_is_rejected_before_any_fetch() {
    let h = harness(default_provider(), FakeUploader::open(), false);

    let result = h
        .relay
        .fetch_and_relay("token", RelayRequest::default())
        .await;
    assert_eq!(result.status_code, 400);
    assert_eq!(result.status_text, "An invalid fileId was provided");
    assert!(result.body.is_none());

    let result = h.relay.fetch_and_relay("token", request("   ", None, None)).await;
    assert_eq!(result.status_code, 400);

    assert_eq!(h.provider.metadata_calls.load(Ordering::SeqCst), 0);
    assert!(stored_files(h.data_dir.path()).is_empty());
}

#[tokio::test]
async fn test_invalid_target_and_protocol() {
    let h = harness(default_provider(), FakeUploader::open(), false);

    let result = h
        .relay
        .fetch_and_relay("token", request("pdf-1", Some("not a url"), None))
        .await;
    assert_eq!(result.status_code, 400);
    assert_eq!(result.status_text, "An invalid target was provided");

    let result = h
        .relay
        .fetch_and_relay("token", request("pdf-1", Some("https://up.example"), Some("ftp")))
        .await;
    assert_eq!(result.status_code, 400);
    assert_eq!(result.status_text, "An invalid protocol was provided");

    assert_eq!(h.provider.metadata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_native_document_is_exported_to_local_storage() {
    let h = harness(default_provider(), FakeUploader::open(), false);

    let result = h.relay.fetch_and_relay("token", request("doc-1", None, None)).await;
    assert_eq!(result.status_code, 200);
    assert_eq!(result.status_text, LOCAL_STORAGE_TEXT);
    assert!(result.token().is_none());

    assert_eq!(*h.provider.exports.lock().unwrap(), vec![DOCX_MIME.to_string()]);
    assert_eq!(h.provider.content_calls.load(Ordering::SeqCst), 0);

    let files = stored_files(h.data_dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0].file_name().unwrap().to_string_lossy(),
        "Meeting Notes.docx"
    );
    assert_eq!(std::fs::read(&files[0]).unwrap(), DOC_EXPORT);
}

#[tokio::test]
async fn test_regular_file_is_fetched_as_is() {
    let h = harness(default_provider(), FakeUploader::open(), false);

    let result = h.relay.fetch_and_relay("token", request("pdf-1", None, None)).await;
    assert_eq!(result.status_code, 200);
    assert!(h.provider.exports.lock().unwrap().is_empty());
    assert_eq!(h.provider.content_calls.load(Ordering::SeqCst), 1);

    let files = stored_files(h.data_dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0].file_name().unwrap().to_string_lossy(),
        "Quarterly Report.pdf"
    );
    assert_eq!(std::fs::read(&files[0]).unwrap(), PDF_BYTES);
}

#[tokio::test]
async fn test_unsupported_native_type_fails_without_writing() {
    let h = harness(default_provider(), FakeUploader::open(), false);

    let result = h
        .relay
        .fetch_and_relay("token", request("drawing-1", None, None))
        .await;
    assert_eq!(result.status_code, 500);
    assert_eq!(result.status_text, "Uppy Server cannot export this type of file");
    assert!(stored_files(h.data_dir.path()).is_empty());
}

#[tokio::test]
async fn test_metadata_failure_reports_generic_error() {
    let h = harness(default_provider(), FakeUploader::open(), false);

    let result = h
        .relay
        .fetch_and_relay("token", request("missing", None, None))
        .await;
    assert_eq!(result.status_code, 500);
    assert_eq!(
        result.status_text,
        "There was an error fetching the file information."
    );
}

#[tokio::test]
async fn test_content_failure_carries_provider_status() {
    let h = harness(
        default_provider().failing_content(404),
        FakeUploader::open(),
        false,
    );

    let result = h.relay.fetch_and_relay("token", request("pdf-1", None, None)).await;
    assert_eq!(result.status_code, 404);
    assert_eq!(result.status_text, "Not Found");
    assert!(stored_files(h.data_dir.path()).is_empty());
}

#[tokio::test]
async fn test_http_destination_receives_file_bytes() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/incoming"))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&destination)
        .await;

    let h = harness(default_provider(), FakeUploader::open(), false);
    let target = format!("{}/incoming", destination.uri());

    let result = h
        .relay
        .fetch_and_relay("token", request("pdf-1", Some(&target), None))
        .await;
    assert_eq!(result.status_code, 200);
    assert_eq!(result.status_text, DELIVERED_TEXT);
    assert!(result.token().is_none());

    let received = destination.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, PDF_BYTES);
    assert_eq!(
        received[0].headers.get("content-length").unwrap(),
        PDF_BYTES.len().to_string().as_str()
    );

    // The local copy is retained unless configured otherwise.
    assert_eq!(stored_files(h.data_dir.path()).len(), 1);
}

#[tokio::test]
async fn test_http_destination_rejection_keeps_local_copy() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&destination)
        .await;

    let h = harness(default_provider(), FakeUploader::open(), true);
    let target = format!("{}/incoming", destination.uri());

    let result = h
        .relay
        .fetch_and_relay("token", request("pdf-1", Some(&target), Some("http")))
        .await;
    assert_eq!(result.status_code, 200);
    assert_eq!(result.status_text, LOCAL_STORAGE_TEXT);
    assert_eq!(stored_files(h.data_dir.path()).len(), 1);
}

#[tokio::test]
async fn test_delete_after_upload_removes_delivered_file() {
    let destination = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&destination)
        .await;

    let h = harness(default_provider(), FakeUploader::open(), true);
    let target = format!("{}/incoming", destination.uri());

    let result = h
        .relay
        .fetch_and_relay("token", request("pdf-1", Some(&target), None))
        .await;
    assert_eq!(result.status_text, DELIVERED_TEXT);
    assert!(stored_files(h.data_dir.path()).is_empty());
}

#[tokio::test]
async fn test_resumable_upload_returns_token_before_progress() {
    let h = harness(default_provider(), FakeUploader::gated(), false);

    let result = h
        .relay
        .fetch_and_relay(
            "token",
            request("pdf-1", Some("https://up.example/files/"), Some("tus")),
        )
        .await;
    assert_eq!(result.status_code, 200);
    assert_eq!(result.status_text, UPLOAD_STARTED_TEXT);

    let token = result.token().expect("token in body").to_string();
    assert_eq!(token.len(), 36);
    let topic = format!("google:{}", token);
    assert!(h.progress.contains(&topic));
    assert!(h.progress.latest(&topic).is_none());

    // Subscribe first, then let the upload run.
    let collector = tokio::spawn(collect_events(h.progress.subscribe(&topic)));
    h.uploader.release();

    let events = collector.await.unwrap();
    assert_eq!(events.last(), Some(&ProgressEvent::Complete));

    let uploaded: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { bytes_uploaded, .. } => Some(*bytes_uploaded),
            _ => None,
        })
        .collect();
    assert!(!uploaded.is_empty());
    assert!(uploaded.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*uploaded.last().unwrap(), PDF_BYTES.len() as u64);

    let requests = h.uploader.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].filename, "Quarterly Report.pdf");
    assert_eq!(requests[0].size, PDF_BYTES.len() as u64);
    assert!(requests[0].resume);
}

#[tokio::test]
async fn test_failed_resumable_upload_is_replayed_to_late_subscriber() {
    let h = harness(default_provider(), FakeUploader::failing(), false);

    let result = h
        .relay
        .fetch_and_relay(
            "token",
            request("pdf-1", Some("https://up.example/files/"), Some("tus")),
        )
        .await;
    let topic = format!("google:{}", result.token().unwrap());

    let settled = async {
        while !h
            .progress
            .latest(&topic)
            .is_some_and(|e| e.is_terminal())
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), settled)
        .await
        .expect("upload never settled");

    let events = collect_events(h.progress.subscribe(&topic)).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ProgressEvent::Error { message } if message.contains("500")));

    // The local copy survives a failed upload.
    assert_eq!(stored_files(h.data_dir.path()).len(), 1);
}

#[tokio::test]
async fn test_concurrent_relays_of_same_file_are_isolated() {
    let h = harness(default_provider(), FakeUploader::open(), false);

    let (a, b) = tokio::join!(
        h.relay.fetch_and_relay(
            "token",
            request("pdf-1", Some("https://up.example/files/"), Some("tus"))
        ),
        h.relay.fetch_and_relay(
            "token",
            request("pdf-1", Some("https://up.example/files/"), Some("tus"))
        ),
    );
    assert_eq!(a.status_code, 200);
    assert_eq!(b.status_code, 200);
    assert_ne!(a.token(), b.token());

    let files = stored_files(h.data_dir.path());
    assert_eq!(files.len(), 2);
    assert_ne!(files[0].parent(), files[1].parent());
    for file in files {
        assert_eq!(std::fs::read(file).unwrap(), PDF_BYTES);
    }
}
