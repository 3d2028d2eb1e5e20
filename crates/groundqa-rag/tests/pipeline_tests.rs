use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use groundqa_core::input::QueryValidator;
use groundqa_core::traits::Embedder;
use groundqa_core::types::PassageChunk;
use groundqa_llm::{LlmBackend, LlmError, RetryPolicy};
use groundqa_rag::messages::{NO_RESULTS, UNEXPECTED, UNREACHABLE};
use groundqa_rag::{health, HealthStatus, Pipeline, QaService, RateLimiter, ReplyStatus, ResultCache};
use groundqa_vector::{FlatNeighbors, Retriever, VectorIndex};

/// Every query lands on the origin; counts calls.
struct OriginEmbedder {
    calls: Arc<AtomicUsize>,
}

impl Embedder for OriginEmbedder {
    fn dim(&self) -> usize { 2 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![0.0, 0.0]).collect())
    }
}

struct PanickingEmbedder;

impl Embedder for PanickingEmbedder {
    fn dim(&self) -> usize { 2 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        panic!("tensor shape mismatch")
    }
}

/// Replies from a script, repeating the last entry once exhausted.
struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Result<String, LlmError>,
    calls: Arc<AtomicUsize>,
    available: bool,
}

impl ScriptedBackend {
    fn new(script: Vec<Result<String, LlmError>>, calls: Arc<AtomicUsize>) -> Self {
        let last = script.last().cloned().unwrap_or_else(|| Ok(String::new()));
        Self { script: Mutex::new(script.into()), last, calls, available: true }
    }
}

impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str { "scripted" }
    fn model(&self) -> &str { "scripted-1" }
    fn generate(&self, prompt: &str, _temperature: f32, _max_tokens: u32) -> Result<String, LlmError> {
        assert!(prompt.contains("[Passage 1]"), "prompt carries the retrieved context");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().expect("script").pop_front().unwrap_or_else(|| self.last.clone())
    }
    fn is_available(&self) -> bool { self.available }
    fn list_models(&self) -> Vec<String> { vec!["scripted-1".into()] }
}

/// Twelve passages; the i-th sits at distance i^2 from the origin and only
/// ordinals 4 and 9 are credit_card.
fn index() -> VectorIndex {
    let vectors: Vec<Vec<f32>> = (0..12).map(|i| vec![i as f32, 0.0]).collect();
    let passages = (0..12)
        .map(|i| {
            let category = if i == 4 || i == 9 { "credit_card" } else { "mortgage" };
            Arc::new(PassageChunk {
                text: format!("Complaint narrative number {i}."),
                chunk_id: format!("c{i}"),
                category: category.into(),
                topic: if i % 2 == 0 { "Billing dispute".into() } else { format!("Issue {i}") },
                source_entity: "Bank".into(),
            })
        })
        .collect();
    VectorIndex::new(Box::new(FlatNeighbors::from_vectors(2, &vectors).expect("flat")), passages)
}

struct Harness {
    pipeline: Arc<Pipeline>,
    embeds: Arc<AtomicUsize>,
    generations: Arc<AtomicUsize>,
}

fn harness_with(backend: ScriptedBackend, generations: Arc<AtomicUsize>) -> Harness {
    let embeds = Arc::new(AtomicUsize::new(0));
    let retriever = Retriever::new(Box::new(OriginEmbedder { calls: Arc::clone(&embeds) }), index()).expect("retriever");
    let cache = Arc::new(ResultCache::new(true, Duration::from_secs(3600), 100));
    let retry = RetryPolicy::new(3, Duration::ZERO, LlmError::is_transient);
    let pipeline = Arc::new(Pipeline::new(retriever, Box::new(backend), retry, cache));
    Harness { pipeline, embeds, generations }
}

fn harness(script: Vec<Result<String, LlmError>>) -> Harness {
    let generations = Arc::new(AtomicUsize::new(0));
    harness_with(ScriptedBackend::new(script, Arc::clone(&generations)), generations)
}

fn service(pipeline: &Arc<Pipeline>, max_requests: usize) -> QaService {
    QaService::new(
        Arc::clone(pipeline),
        Arc::new(RateLimiter::new(max_requests, Duration::from_secs(60))),
        QueryValidator::new(1000).expect("validator"),
    )
}

#[test]
fn filtered_question_returns_only_matching_sources() {
    let h = harness(vec![Ok("  Customers dispute duplicate charges.  ".into())]);
    let answer = h.pipeline.answer("What billing disputes exist?", Some("credit_card"), 5);
    assert_eq!(answer.sources.len(), 2);
    assert!(answer.sources.iter().all(|s| s.category() == "credit_card"));
    assert_eq!(answer.text, "Customers dispute duplicate charges.");
    assert!(answer.notice.is_none());
}

#[test]
fn identical_request_is_served_from_cache() {
    let h = harness(vec![Ok("Answer.".into())]);
    let svc = service(&h.pipeline, 30);
    let first = svc.ask("10.0.0.1", "What billing disputes exist?", Some("credit_card"), 5);
    let second = svc.ask("10.0.0.1", "What  billing disputes exist? ", Some("credit_card"), 5);
    assert_eq!(first.status, ReplyStatus::Answered);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.text, second.text);
    assert_eq!(h.embeds.load(Ordering::SeqCst), 1);
    assert_eq!(h.generations.load(Ordering::SeqCst), 1);
    let m = h.pipeline.metrics().snapshot();
    assert_eq!((m.queries, m.cache_hits, m.cache_misses), (2, 1, 1));
}

#[test]
fn always_failing_backend_still_answers_with_sources() {
    let h = harness(vec![Err(LlmError::Unreachable("connection refused".into()))]);
    let answer = h.pipeline.answer("Why are fees so high?", None, 5);
    assert_eq!(h.generations.load(Ordering::SeqCst), 3, "transient failures use every attempt");
    assert!(!answer.text.is_empty());
    assert!(answer.text.starts_with("Found 5 relevant passage(s)"));
    assert_eq!(answer.sources.len(), 5);
    assert_eq!(answer.notice.as_deref(), Some(UNREACHABLE));

    // The fallback is cached like a generated answer.
    let again = h.pipeline.answer("Why are fees so high?", None, 5);
    assert!(again.cached);
    assert_eq!(h.generations.load(Ordering::SeqCst), 3);
}

#[test]
fn auth_failure_is_attempted_once() {
    let h = harness(vec![Err(LlmError::Auth("403".into()))]);
    let answer = h.pipeline.answer("Why are fees so high?", None, 5);
    assert_eq!(h.generations.load(Ordering::SeqCst), 1);
    assert!(answer.text.starts_with("Found"));
}

#[test]
fn two_failures_then_success_is_a_success() {
    let h = harness(vec![
        Err(LlmError::Timeout("slow".into())),
        Err(LlmError::Request("503".into())),
        Ok("Recovered answer.".into()),
    ]);
    let answer = h.pipeline.answer("Why are fees so high?", None, 5);
    assert_eq!(answer.text, "Recovered answer.");
    assert_eq!(h.generations.load(Ordering::SeqCst), 3);
}

#[test]
fn malformed_reply_keeps_an_empty_answer() {
    let h = harness(vec![Ok("   ".into())]);
    let answer = h.pipeline.answer("Why are fees so high?", None, 5);
    assert_eq!(answer.text, "");
    assert_eq!(answer.sources.len(), 5);
    assert!(h.pipeline.answer("Why are fees so high?", None, 5).cached);
}

#[test]
fn no_matches_skips_generation_and_cache() {
    let h = harness(vec![Ok("unused".into())]);
    let answer = h.pipeline.answer("Student loans?", Some("student_loan"), 5);
    assert_eq!(answer.text, NO_RESULTS);
    assert!(answer.sources.is_empty());
    assert_eq!(h.generations.load(Ordering::SeqCst), 0);
    assert_eq!(h.pipeline.cache().stats().size, 0);
}

#[test]
fn top_k_is_clamped_before_retrieval() {
    let h = harness(vec![Ok("ok".into())]);
    assert_eq!(h.pipeline.answer("q", None, 1).sources.len(), 3);
    assert_eq!(h.pipeline.answer("q", None, 500).sources.len(), 12);
    let svc = service(&h.pipeline, 30);
    assert_eq!(svc.ask("c", "another question", None, -7).sources.len(), 3);
}

#[test]
fn panic_below_the_boundary_becomes_a_safe_message() {
    let generations = Arc::new(AtomicUsize::new(0));
    let retriever = Retriever::new(Box::new(PanickingEmbedder), index()).expect("retriever");
    let pipeline = Pipeline::new(
        retriever,
        Box::new(ScriptedBackend::new(vec![Ok("x".into())], Arc::clone(&generations))),
        RetryPolicy::new(1, Duration::ZERO, LlmError::is_transient),
        Arc::new(ResultCache::new(true, Duration::from_secs(60), 10)),
    );
    let answer = pipeline.answer("anything", None, 5);
    assert_eq!(answer.text, UNEXPECTED);
    assert!(answer.sources.is_empty());
    assert_eq!(pipeline.metrics().snapshot().error_kinds.get("panic"), Some(&1));
}

#[test]
fn invalid_input_touches_neither_limiter_nor_cache() {
    let h = harness(vec![Ok("ok".into())]);
    let svc = service(&h.pipeline, 1);
    let reply = svc.ask("c", "<script>alert(1)</script>", None, 5);
    assert_eq!(reply.status, ReplyStatus::InvalidInput);
    assert_eq!(reply.text, "Invalid input: Query contains invalid characters");
    let empty = svc.ask("c", " \0 ", None, 5);
    assert_eq!(empty.text, "Invalid input: Query cannot be empty");
    assert_eq!(svc.limiter().get_remaining("c"), 1);
    assert_eq!(h.pipeline.cache().stats().size, 0);
    assert_eq!(h.embeds.load(Ordering::SeqCst), 0);
}

#[test]
fn rate_limited_caller_gets_explicit_message() {
    let h = harness(vec![Ok("ok".into())]);
    let svc = service(&h.pipeline, 2);
    assert_eq!(svc.ask("c", "first", None, 5).status, ReplyStatus::Answered);
    assert_eq!(svc.ask("c", "second", None, 5).status, ReplyStatus::Answered);
    let third = svc.ask("c", "third", None, 5);
    assert_eq!(third.status, ReplyStatus::RateLimited);
    assert_eq!(
        third.text,
        "Rate limit exceeded. Please wait before making another request. Limit: 2 requests per 60 seconds."
    );
    assert_eq!(svc.ask("other", "third", None, 5).status, ReplyStatus::Answered);
}

#[test]
fn concurrent_callers_share_limiter_and_cache_consistently() {
    let h = harness(vec![Ok("Shared answer.".into())]);
    let svc = Arc::new(service(&h.pipeline, 10));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            std::thread::spawn(move || {
                (0..5)
                    .map(|_| svc.ask("shared-client", "What billing disputes exist?", None, 5).status)
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let statuses: Vec<ReplyStatus> = handles.into_iter().flat_map(|h| h.join().expect("thread")).collect();
    let answered = statuses.iter().filter(|s| **s == ReplyStatus::Answered).count();
    assert_eq!(answered, 10, "exactly max_requests admitted across threads");
    assert_eq!(statuses.len() - answered, 30);
    assert_eq!(h.pipeline.cache().stats().size, 1);
}

#[test]
fn retrieve_only_skips_generation() {
    let h = harness(vec![Ok("unused".into())]);
    let sources = h.pipeline.retrieve_only("card fees", Some("credit_card"), 5).expect("retrieve");
    assert_eq!(sources.len(), 2);
    assert_eq!(h.generations.load(Ordering::SeqCst), 0);
}

#[test]
fn health_degrades_when_backend_is_down() {
    let generations = Arc::new(AtomicUsize::new(0));
    let mut backend = ScriptedBackend::new(vec![Ok("x".into())], Arc::clone(&generations));
    backend.available = false;
    let h = harness_with(backend, generations);
    let report = health::check(&h.pipeline, Instant::now());
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.index.passages, 12);
    assert!(report.llm.models.is_empty());
    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["llm"]["provider"], "scripted");
}

#[test]
fn health_is_healthy_with_available_backend() {
    let h = harness(vec![Ok("x".into())]);
    let report = health::check(&h.pipeline, Instant::now());
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.llm.models, vec!["scripted-1".to_string()]);
    assert_eq!(report.cache.max_size, 100);
}
