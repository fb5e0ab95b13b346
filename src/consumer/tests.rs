use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    Consumer, DESERIALIZATION_ERROR, DeadLetterReason, LoggingProcessor, MessageFilter, Outcome,
    PROCESSING_ERROR, Processor, matches,
};
use crate::broker::{Envelope, MessageSource, Received};
use crate::codec::JsonCodec;
use crate::model::Person;
use crate::utils::error::{ConsumerError, ProcessError, SourceError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Complete(String),
    DeadLetter(String, String, String),
    Abandon(String),
}

/// Replays scripted receive results, then cancels `cancel` once drained.
struct ScriptedSource {
    script: Mutex<VecDeque<Result<Received, SourceError>>>,
    calls: Mutex<Vec<Call>>,
    fail_dead_letter: HashSet<String>,
    fail_abandon: HashSet<String>,
    fail_complete: HashSet<String>,
    cancel_when_drained: Option<CancellationToken>,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Received, SourceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            fail_dead_letter: HashSet::new(),
            fail_abandon: HashSet::new(),
            fail_complete: HashSet::new(),
            cancel_when_drained: None,
        }
    }

    fn messages(envelopes: Vec<Envelope>) -> Self {
        Self::new(envelopes.into_iter().map(|e| Ok(Received::Message(e))).collect())
    }

    fn cancel_when_drained(mut self, cancel: &CancellationToken) -> Self {
        self.cancel_when_drained = Some(cancel.clone());
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn receive(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Received, SourceError> {
        let next = self.script.lock().unwrap().pop_front();
        if let Some(next) = next {
            return next;
        }
        if let Some(token) = &self.cancel_when_drained {
            token.cancel();
        }
        let wait = timeout.unwrap_or(Duration::from_secs(3600));
        tokio::select! {
            _ = cancel.cancelled() => Ok(Received::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(Received::Empty),
        }
    }

    async fn complete(&self, envelope: &Envelope) -> Result<(), SourceError> {
        if self.fail_complete.contains(&envelope.id) {
            return Err(SourceError::LockLost(envelope.lock_token));
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::Complete(envelope.id.clone()));
        Ok(())
    }

    async fn dead_letter(
        &self,
        envelope: &Envelope,
        reason: &str,
        description: &str,
    ) -> Result<(), SourceError> {
        if self.fail_dead_letter.contains(&envelope.id) {
            return Err(SourceError::Remote("dead-letter store unavailable".to_string()));
        }
        self.calls.lock().unwrap().push(Call::DeadLetter(
            envelope.id.clone(),
            reason.to_string(),
            description.to_string(),
        ));
        Ok(())
    }

    async fn abandon(&self, envelope: &Envelope) -> Result<(), SourceError> {
        if self.fail_abandon.contains(&envelope.id) {
            return Err(SourceError::LockLost(envelope.lock_token));
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::Abandon(envelope.id.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingProcessor {
    seen: Mutex<Vec<Person>>,
    fail_for: Option<String>,
}

#[async_trait]
impl Processor<Person> for RecordingProcessor {
    async fn process(&self, person: &Person, _envelope: &Envelope) -> Result<(), ProcessError> {
        if self.fail_for.as_deref() == Some(person.first_name.as_str()) {
            return Err(ProcessError::Failed("downstream rejected person".to_string()));
        }
        self.seen.lock().unwrap().push(person.clone());
        Ok(())
    }
}

fn envelope(id: &str, body: &str, message_type: Option<&str>) -> Envelope {
    let mut application_properties = std::collections::HashMap::new();
    if let Some(t) = message_type {
        application_properties.insert("MessageType".to_string(), t.to_string());
    }
    Envelope {
        id: id.to_string(),
        enqueued_time: chrono::Utc::now(),
        body: body.as_bytes().to_vec(),
        application_properties,
        lock_token: uuid::Uuid::new_v4(),
        delivery_count: 1,
    }
}

fn person_body(first: &str, last: &str) -> String {
    serde_json::to_string(&Person::new(first, last)).unwrap()
}

fn consumer(
    source: ScriptedSource,
) -> Consumer<ScriptedSource, JsonCodec<Person>, RecordingProcessor, Person> {
    Consumer::new(source, JsonCodec::new(), RecordingProcessor::default())
        .with_receive_timeout(Some(Duration::from_millis(50)))
        .with_error_backoff(Duration::from_millis(5))
}

#[test]
fn test_matches_without_wanted_value() {
    assert!(matches(None, None));
    assert!(matches(Some("VIP"), None));
    assert!(matches(Some(""), None));
}

#[test]
fn test_matches_requires_exact_classification() {
    assert!(matches(Some("VIP"), Some("VIP")));
    assert!(!matches(Some("Regular"), Some("VIP")));
    assert!(!matches(Some("vip"), Some("VIP")));
    assert!(!matches(None, Some("VIP")));
}

#[test]
fn test_filter_display() {
    assert_eq!(MessageFilter::all().to_string(), "no message type filter");
    assert_eq!(
        MessageFilter::only("VIP").to_string(),
        "filtering for VIP messages"
    );
    assert_eq!(
        MessageFilter::from(Some(crate::model::MessageType::Regular)).wanted(),
        Some("Regular")
    );
}

#[tokio::test]
async fn test_mixed_sequence_is_settled_in_order() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::messages(vec![
        envelope("1", &person_body("Ana", "Lopez"), None),
        envelope("2", "{not json", None),
        envelope("3", &person_body("", ""), None),
        envelope("4", &person_body("Bo", "Ek"), None),
    ])
    .cancel_when_drained(&cancel);
    let consumer = consumer(source);

    let stats = consumer.run(&cancel).await.unwrap();

    let calls = consumer.source().calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0], Call::Complete("1".to_string()));
    assert!(matches!(&calls[1], Call::DeadLetter(id, reason, _) if id == "2" && reason == DESERIALIZATION_ERROR));
    assert!(matches!(&calls[2], Call::DeadLetter(id, reason, _) if id == "3" && reason == PROCESSING_ERROR));
    assert_eq!(calls[3], Call::Complete("4".to_string()));

    assert_eq!(stats.received, 4);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.deserialization_failures, 1);
    assert_eq!(stats.processing_failures, 1);
}

#[tokio::test]
async fn test_dead_letter_descriptions_carry_error_text() {
    let consumer = consumer(ScriptedSource::new(Vec::new()));

    consumer
        .handle(&envelope("bad", "null", None))
        .await
        .unwrap();
    consumer
        .handle(&envelope("empty", &person_body("Ana", ""), None))
        .await
        .unwrap();

    let calls = consumer.source().calls();
    match &calls[0] {
        Call::DeadLetter(_, _, description) => assert!(description.contains("null")),
        other => panic!("Expected dead-letter, got {other:?}"),
    }
    match &calls[1] {
        Call::DeadLetter(_, _, description) => assert!(description.contains("Last Name is required")),
        other => panic!("Expected dead-letter, got {other:?}"),
    }
}

#[tokio::test]
async fn test_processor_failure_is_dead_lettered() {
    let source = ScriptedSource::new(Vec::new());
    let processor = RecordingProcessor {
        seen: Mutex::new(Vec::new()),
        fail_for: Some("Ana".to_string()),
    };
    let consumer = Consumer::new(source, JsonCodec::<Person>::new(), processor);

    let outcome = consumer
        .handle(&envelope("1", &person_body("Ana", "Lopez"), None))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::DeadLettered(DeadLetterReason::Processing));
    match &consumer.source().calls()[0] {
        Call::DeadLetter(_, reason, description) => {
            assert_eq!(reason, PROCESSING_ERROR);
            assert_eq!(description, "downstream rejected person");
        }
        other => panic!("Expected dead-letter, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_dead_letter_falls_back_to_abandon_once() {
    let cancel = CancellationToken::new();
    let mut source = ScriptedSource::messages(vec![
        envelope("1", &person_body("", "Lopez"), None),
        envelope("2", &person_body("Bo", "Ek"), None),
    ])
    .cancel_when_drained(&cancel);
    source.fail_dead_letter.insert("1".to_string());
    let consumer = consumer(source);

    let stats = consumer.run(&cancel).await.unwrap();

    assert_eq!(
        consumer.source().calls(),
        vec![
            Call::Abandon("1".to_string()),
            Call::Complete("2".to_string())
        ]
    );
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.processing_failures, 0);
}

#[tokio::test]
async fn test_failed_deserialization_dead_letter_also_abandons() {
    let mut source = ScriptedSource::new(Vec::new());
    source.fail_dead_letter.insert("1".to_string());
    let consumer = consumer(source);

    let outcome = consumer.handle(&envelope("1", "garbage", None)).await.unwrap();
    assert_eq!(outcome, Outcome::Abandoned);
    assert_eq!(consumer.source().calls(), vec![Call::Abandon("1".to_string())]);
}

#[tokio::test]
async fn test_failed_abandon_is_contained() {
    let cancel = CancellationToken::new();
    let mut source = ScriptedSource::messages(vec![
        envelope("1", "garbage", None),
        envelope("2", &person_body("Bo", "Ek"), None),
    ])
    .cancel_when_drained(&cancel);
    source.fail_dead_letter.insert("1".to_string());
    source.fail_abandon.insert("1".to_string());
    let consumer = consumer(source);

    let stats = consumer.run(&cancel).await.unwrap();

    assert_eq!(consumer.source().calls(), vec![Call::Complete("2".to_string())]);
    assert_eq!(stats.disposition_failures, 1);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_failed_complete_is_contained() {
    let cancel = CancellationToken::new();
    let mut source = ScriptedSource::messages(vec![
        envelope("1", &person_body("Ana", "Lopez"), None),
        envelope("2", &person_body("Bo", "Ek"), None),
    ])
    .cancel_when_drained(&cancel);
    source.fail_complete.insert("1".to_string());
    let consumer = consumer(source);

    let stats = consumer.run(&cancel).await.unwrap();

    // No fallback disposition after a failed complete.
    assert_eq!(consumer.source().calls(), vec![Call::Complete("2".to_string())]);
    assert_eq!(stats.disposition_failures, 1);
}

#[tokio::test]
async fn test_filter_skips_without_processing() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::messages(vec![
        envelope("vip", &person_body("Ana", "X"), Some("VIP")),
        envelope("untagged", &person_body("Bo", "Ek"), None),
        envelope("regular", &person_body("Cy", "Li"), Some("Regular")),
    ])
    .cancel_when_drained(&cancel);
    let consumer = consumer(source).with_filter(MessageFilter::only("Regular"));

    let stats = consumer.run(&cancel).await.unwrap();

    assert_eq!(
        consumer.source().calls(),
        vec![
            Call::Complete("vip".to_string()),
            Call::Complete("untagged".to_string()),
            Call::Complete("regular".to_string()),
        ]
    );
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_filter_skips_even_undecodable_bodies() {
    let consumer =
        consumer(ScriptedSource::new(Vec::new())).with_filter(MessageFilter::only("VIP"));
    let outcome = consumer
        .handle(&envelope("1", "garbage", Some("Regular")))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped);
}

#[tokio::test]
async fn test_cancel_while_blocked_exits_without_dispositions() {
    let cancel = CancellationToken::new();
    let consumer = Consumer::new(
        ScriptedSource::new(Vec::new()),
        JsonCodec::<Person>::new(),
        RecordingProcessor::default(),
    )
    .with_receive_timeout(Some(Duration::from_secs(1)));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let stats = tokio::time::timeout(Duration::from_secs(1), consumer.run(&cancel))
        .await
        .expect("loop did not exit within one receive timeout")
        .unwrap();

    assert_eq!(stats.received, 0);
    assert!(consumer.source().calls().is_empty());
}

#[tokio::test]
async fn test_already_cancelled_does_not_receive() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let consumer = consumer(ScriptedSource::messages(vec![envelope(
        "1",
        &person_body("Ana", "Lopez"),
        None,
    )]));

    let stats = consumer.run(&cancel).await.unwrap();
    assert_eq!(stats.received, 0);
    assert!(consumer.source().calls().is_empty());
}

#[tokio::test]
async fn test_fatal_receive_error_stops_loop() {
    let cancel = CancellationToken::new();
    let consumer = consumer(ScriptedSource::new(vec![
        Ok(Received::Empty),
        Err(SourceError::Connection("reset by peer".to_string())),
        Ok(Received::Message(envelope("never", "{}", None))),
    ]));

    let result = consumer.run(&cancel).await;
    assert!(matches!(
        result,
        Err(ConsumerError::Source(SourceError::Connection(_)))
    ));
    assert!(consumer.source().calls().is_empty());
}

#[tokio::test]
async fn test_transient_receive_error_is_retried() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::new(vec![
        Err(SourceError::Remote("busy".to_string())),
        Ok(Received::Message(envelope("1", &person_body("Ana", "Lopez"), None))),
    ])
    .cancel_when_drained(&cancel);
    let consumer = consumer(source);

    let stats = consumer.run(&cancel).await.unwrap();
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_processor_sees_decoded_person() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::messages(vec![envelope(
        "1",
        r#"{"firstName":"Ana","lastName":"X"}"#,
        Some("VIP"),
    )])
    .cancel_when_drained(&cancel);
    let consumer = consumer(source).with_filter(MessageFilter::only("VIP"));

    consumer.run(&cancel).await.unwrap();

    assert_eq!(consumer.source().calls(), vec![Call::Complete("1".to_string())]);
    assert_eq!(
        *consumer.processor().seen.lock().unwrap(),
        vec![Person::new("Ana", "X")]
    );
}

#[tokio::test]
async fn test_logging_processor_accepts_any_name() {
    let processor = LoggingProcessor::new("s1");
    let envelope = envelope("1", "", Some("VIP"));

    for person in [
        Person::new("Ana", "X"),
        Person::new("", ""),
        Person::new("Zoë", "O'Brien-Łukasz"),
    ] {
        assert!(processor.process(&person, &envelope).await.is_ok());
    }
}

#[tokio::test]
async fn test_loop_with_logging_processor_completes_messages() {
    let cancel = CancellationToken::new();
    let source = ScriptedSource::messages(vec![
        envelope("1", &person_body("Ana", "X"), Some("VIP")),
        envelope("2", &person_body("Bo", "Ek"), None),
    ])
    .cancel_when_drained(&cancel);
    let consumer = Consumer::new(source, JsonCodec::<Person>::new(), LoggingProcessor::new("person"))
        .with_receive_timeout(Some(Duration::from_millis(50)))
        .with_label("person");

    let stats = consumer.run(&cancel).await.unwrap();

    assert_eq!(stats.completed, 2);
    assert_eq!(
        consumer.source().calls(),
        vec![Call::Complete("1".to_string()), Call::Complete("2".to_string())]
    );
}
