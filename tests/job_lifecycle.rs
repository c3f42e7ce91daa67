use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docpoll::{
    api,
    blob::FsBlobStore,
    extract::PdfTextExtractor,
    jobs::{JobId, JobState, JobStore, MemoryJobStore},
    metrics::JobMetrics,
    queue::{JobQueue, MemoryQueue},
    service::JobService,
    worker::{ExtractionWorker, WorkerOutcome},
};
use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const API_KEY: &str = "integration-secret";
const BOUNDARY: &str = "docpoll-integration";

struct Stack {
    _uploads: TempDir,
    store: Arc<MemoryJobStore>,
    queue: Arc<MemoryQueue>,
    worker: ExtractionWorker,
    app: Router,
}

impl Stack {
    async fn new() -> Self {
        let uploads = tempfile::tempdir().expect("tempdir");
        let blobs = Arc::new(FsBlobStore::open(uploads.path()).await.expect("blob store"));
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let metrics = Arc::new(JobMetrics::new());

        let service = Arc::new(JobService::new(
            store.clone(),
            blobs.clone(),
            queue.clone(),
            metrics.clone(),
            10 * 1024 * 1024,
        ));
        let worker = ExtractionWorker::new(
            store.clone(),
            blobs,
            Arc::new(PdfTextExtractor),
            metrics,
        );

        Self {
            _uploads: uploads,
            store,
            queue,
            worker,
            app: api::create_router(service, API_KEY),
        }
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    async fn upload(&self, filename: &str, content_type: &str, bytes: &[u8]) -> (StatusCode, Value) {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header("api_key", API_KEY)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");
        self.call(request).await
    }

    async fn poll(&self, file_id: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("/polling/{file_id}"))
            .header("api_key", API_KEY)
            .body(Body::empty())
            .expect("request");
        self.call(request).await
    }

    async fn upload_pdf(&self, bytes: &[u8]) -> String {
        let (status, json) = self.upload("test.pdf", "application/pdf", bytes).await;
        assert_eq!(status, StatusCode::OK, "upload failed: {json}");
        let file_id = json["file_id"].as_str().expect("file_id string").to_string();
        assert!(!file_id.is_empty());
        file_id
    }
}

fn hello_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hello from docpoll")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

#[tokio::test]
async fn upload_extract_poll_returns_text() {
    let stack = Stack::new().await;
    let file_id = stack.upload_pdf(&hello_pdf()).await;

    let (status, json) = stack.poll(&file_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processing");

    let queued = stack
        .queue
        .dequeue(Duration::from_millis(50))
        .await
        .expect("dequeue")
        .expect("job queued");
    assert_eq!(queued.as_str(), file_id);
    assert_eq!(stack.worker.process(&queued).await, WorkerOutcome::Completed);

    let (status, json) = stack.poll(&file_id).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.get("status").is_none());
    let data = json["data"].as_str().expect("data string");
    assert!(data.contains("Hello"), "unexpected text: {data:?}");
}

#[tokio::test]
async fn unreadable_pdf_is_reported_as_data() {
    let stack = Stack::new().await;
    let file_id = stack.upload_pdf(b"PDF").await;

    let outcome = stack.worker.process(&JobId::from(file_id.clone())).await;
    assert!(matches!(outcome, WorkerOutcome::Failed(_)));

    let (status, json) = stack.poll(&file_id).await;
    assert_eq!(status, StatusCode::OK);
    let data = json["data"].as_str().expect("data string");
    assert!(data.starts_with("Error processing file: "), "{data:?}");

    let record = stack
        .store
        .get(&JobId::from(file_id))
        .await
        .expect("get")
        .expect("record");
    assert!(matches!(record.state, JobState::Failed { .. }));
}

#[tokio::test]
async fn finished_job_polls_identically_and_ignores_redelivery() {
    let stack = Stack::new().await;
    let file_id = stack.upload_pdf(&hello_pdf()).await;
    let id = JobId::from(file_id.clone());

    assert_eq!(stack.worker.process(&id).await, WorkerOutcome::Completed);
    let (_, first) = stack.poll(&file_id).await;

    assert_eq!(stack.worker.process(&id).await, WorkerOutcome::NotFound);
    for _ in 0..3 {
        let (status, again) = stack.poll(&file_id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn concurrent_uploads_get_distinct_jobs() {
    let stack = Stack::new().await;
    let pdf = hello_pdf();

    let (first, second) = tokio::join!(stack.upload_pdf(&pdf), stack.upload_pdf(&pdf));
    assert_ne!(first, second);

    stack
        .worker
        .process(&JobId::from(first.clone()))
        .await;
    let (_, first_status) = stack.poll(&first).await;
    let (_, second_status) = stack.poll(&second).await;
    assert!(first_status.get("data").is_some());
    assert_eq!(second_status["status"], "processing");
}

#[tokio::test]
async fn invalid_upload_leaves_no_job_behind() {
    let stack = Stack::new().await;

    let (status, json) = stack.upload("test.txt", "text/plain", b"Not a PDF").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "The uploaded file is not a valid PDF file.");
    assert!(stack.store.is_empty().await);
    let next = stack
        .queue
        .dequeue(Duration::from_millis(5))
        .await
        .expect("dequeue");
    assert!(next.is_none());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let stack = Stack::new().await;
    let payload = vec![b'x'; 10 * 1024 * 1024 + 1];

    let (status, json) = stack.upload("big.pdf", "application/pdf", &payload).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "The uploaded file exceeds the size limit.");
}
