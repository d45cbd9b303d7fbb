//! Integration tests for the engagement engine and the collection job.
//!
//! These tests run the engine against an in-memory message source with
//! scripted conversation heads.

#![allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_possible_truncation)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use sentmetrics_core::{
    Counters, EngagementEngine, EngineConfig, MessageSource, MetricsJob, MetricsRepository,
    SendFilter, SentMessage, TemperatureLabel,
};

const ACCOUNT: &str = "sales@acme.com";

#[derive(Debug)]
struct MockError(String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mock failure: {}", self.0)
    }
}

impl std::error::Error for MockError {}

/// Source with scripted sent folders and conversation heads.
#[derive(Default)]
struct MockSource {
    sent: HashMap<String, Vec<SentMessage>>,
    heads: HashMap<String, Vec<SentMessage>>,
    failing: HashSet<String>,
    fail_from_call: Option<usize>,
    head_calls: AtomicUsize,
}

impl MockSource {
    fn with_head(mut self, conversation_id: &str, head: Vec<SentMessage>) -> Self {
        self.heads.insert(conversation_id.to_string(), head);
        self
    }

    fn failing_on(mut self, conversation_id: &str) -> Self {
        self.failing.insert(conversation_id.to_string());
        self
    }

    /// Every head fetch from the `call`-th one (zero based) onwards fails.
    fn failing_from_call(mut self, call: usize) -> Self {
        self.fail_from_call = Some(call);
        self
    }

    fn with_sent(mut self, account: &str, messages: Vec<SentMessage>) -> Self {
        self.sent.insert(account.to_string(), messages);
        self
    }
}

impl MessageSource for MockSource {
    type Error = MockError;

    async fn sent_messages(&self, account: &str) -> Result<Vec<SentMessage>, MockError> {
        self.sent
            .get(account)
            .cloned()
            .ok_or_else(|| MockError(account.to_string()))
    }

    async fn conversation_head(
        &self,
        _account: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<SentMessage>, MockError> {
        let call = self.head_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(conversation_id) || self.fail_from_call.is_some_and(|n| call >= n)
        {
            return Err(MockError(conversation_id.to_string()));
        }
        Ok(self
            .heads
            .get(conversation_id)
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

fn sent(id: &str, conversation: &str, subject: &str, offset: Duration) -> SentMessage {
    SentMessage::new(id, conversation, t0() + offset)
        .with_from(ACCOUNT)
        .with_subject(subject)
        .with_recipients(vec!["client@x.com".into()])
}

fn reply(id: &str, conversation: &str, offset: Duration) -> SentMessage {
    SentMessage::new(id, conversation, t0() + offset)
        .with_from("client@x.com")
        .with_subject("Re Proposal, sounds good")
}

fn postmaster(id: &str, conversation: &str, offset: Duration) -> SentMessage {
    SentMessage::new(id, conversation, t0() + offset)
        .with_from("postmaster@x.com")
        .with_subject("Delivery Status Notification")
}

fn engine(source: MockSource) -> EngagementEngine<MockSource> {
    EngagementEngine::new(source, EngineConfig::default())
}

fn assert_identities(c: &Counters) {
    assert_eq!(c.delivered + c.bounced, c.sent);
    assert_eq!(c.no_reply, c.delivered - c.replied);
}

#[tokio::test]
async fn test_empty_batch_short_circuits() {
    let engine = engine(MockSource::default());
    let snapshot = engine.classify(&mut [], ACCOUNT).await;

    assert_eq!(snapshot.clean, Counters::default());
    assert_eq!(snapshot.raw, Counters::default());
    assert!(snapshot.avg_reply_latency_secs.is_none());
    assert_eq!(snapshot.temperature, TemperatureLabel::Cold);
    assert_eq!(snapshot.date, snapshot.run_at.date_naive());
    assert_eq!(snapshot.delivery_rate(), 0.0);
    assert_eq!(snapshot.reply_rate(), 0.0);
    assert_eq!(engine.source().head_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bounce_takes_precedence() {
    let source = MockSource::default().with_head(
        "c1",
        vec![
            reply("r", "c1", Duration::hours(1)),
            postmaster("b", "c1", Duration::hours(2)),
        ],
    );
    let mut batch = vec![
        sent("later", "c1", "Proposal", Duration::minutes(30)),
        sent("first", "c1", "Proposal", Duration::zero()),
    ];

    let snapshot = engine(source).classify(&mut batch, ACCOUNT).await;

    let rep = &batch[1];
    assert!(rep.is_bounced);
    assert!(!rep.is_replied);
    assert_eq!(rep.engagement_score, -100);
    assert_eq!(rep.temperature, TemperatureLabel::Cold);

    let other = &batch[0];
    assert!(!other.is_bounced);
    assert_eq!(other.engagement_score, 0);

    assert_eq!(snapshot.clean, Counters::from_totals(1, 1, 0));
    assert_eq!(snapshot.raw, Counters::from_totals(2, 2, 0));
}

#[tokio::test]
async fn test_two_hour_reply_is_hot() {
    let source = MockSource::default().with_head(
        "c1",
        vec![
            reply("r", "c1", Duration::hours(2)),
            sent("s", "c1", "Proposal", Duration::zero()),
        ],
    );
    let mut batch = vec![sent("s", "c1", "Proposal", Duration::zero())];

    let snapshot = engine(source).classify(&mut batch, ACCOUNT).await;

    let rep = &batch[0];
    assert!(rep.is_replied);
    assert!((rep.reply_latency_secs.unwrap() - 7200.0).abs() < 1e-6);
    assert_eq!(rep.engagement_score, 70);
    assert_eq!(rep.temperature, TemperatureLabel::Hot);

    assert_eq!(snapshot.clean, Counters::from_totals(1, 0, 1));
    assert_eq!(snapshot.avg_reply_latency_secs, Some(7200.0));
    assert_eq!(snapshot.temperature, TemperatureLabel::Hot);
}

#[tokio::test]
async fn test_non_positive_latency_counts_as_replied() {
    let source = MockSource::default()
        .with_head("c1", vec![reply("r1", "c1", Duration::zero())])
        .with_head("c2", vec![reply("r2", "c2", Duration::minutes(-5))]);
    let mut batch = vec![
        sent("s1", "c1", "One", Duration::zero()),
        sent("s2", "c2", "Two", Duration::zero()),
    ];

    let snapshot = engine(source).classify(&mut batch, ACCOUNT).await;

    for message in &batch {
        assert!(message.is_replied);
        assert!(message.reply_latency_secs.is_none());
        assert_eq!(message.engagement_score, 50);
    }
    assert_eq!(snapshot.clean.replied, 2);
    assert!(snapshot.avg_reply_latency_secs.is_none());
}

#[tokio::test]
async fn test_prefixed_duplicates_count_raw_only() {
    let mut batch = vec![
        sent("s1", "c1", "Proposal", Duration::zero()),
        sent("s2", "c1", "RES: Proposal", Duration::hours(1)),
        sent("s3", "c2", "  fw: forwarded deck", Duration::zero()),
    ];

    let snapshot = engine(MockSource::default())
        .classify(&mut batch, ACCOUNT)
        .await;

    assert_eq!(snapshot.raw.sent, 3);
    assert_eq!(snapshot.clean.sent, 1);
    assert_identities(&snapshot.clean);
    assert_identities(&snapshot.raw);
}

#[tokio::test]
async fn test_failed_head_skips_conversation() {
    let source = MockSource::default()
        .with_head("ok", vec![reply("r", "ok", Duration::hours(1))])
        .failing_on("broken");
    let mut batch = vec![
        sent("s1", "ok", "Proposal", Duration::zero()),
        sent("s2", "broken", "Offer", Duration::zero()),
        sent("s3", "broken", "Offer again", Duration::hours(1)),
    ];
    let untouched = batch[1].clone();

    let snapshot = engine(source).classify(&mut batch, ACCOUNT).await;

    assert_eq!(batch[1], untouched);
    assert_eq!(snapshot.clean, Counters::from_totals(1, 0, 1));
    assert_eq!(snapshot.raw, Counters::from_totals(1, 0, 1));
}

#[tokio::test]
async fn test_snapshot_date_from_first_message() {
    let mut batch = vec![
        sent("s1", "c1", "Proposal", Duration::days(2)),
        sent("s2", "c2", "Offer", Duration::zero()),
    ];

    let snapshot = engine(MockSource::default())
        .classify(&mut batch, ACCOUNT)
        .await;

    assert_eq!(snapshot.date, NaiveDate::from_ymd_opt(2025, 3, 12).unwrap());
}

#[tokio::test]
async fn test_classify_is_idempotent() {
    let source = MockSource::default()
        .with_head("c1", vec![reply("r", "c1", Duration::hours(5))])
        .with_head("c2", vec![postmaster("b", "c2", Duration::minutes(1))]);
    let batch = vec![
        sent("s1", "c1", "Proposal", Duration::zero()),
        sent("s2", "c2", "Offer", Duration::zero()),
        sent("s3", "c3", "Hello", Duration::zero()),
    ];
    let engine = engine(source);

    let first = engine.classify(&mut batch.clone(), ACCOUNT).await;
    let second = engine.classify(&mut batch.clone(), ACCOUNT).await;

    assert_eq!(first.clean, second.clean);
    assert_eq!(first.raw, second.raw);
    assert_eq!(first.avg_reply_latency_secs, second.avg_reply_latency_secs);
    assert_eq!(first.temperature, second.temperature);
    assert_eq!(first.date, second.date);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_concurrency_does_not_change_results() {
    let build = || {
        let mut source = MockSource::default().failing_on("c7");
        for n in 0..12 {
            let id = format!("c{n}");
            let head = match n % 3 {
                0 => vec![reply("r", &id, Duration::hours(n))],
                1 => vec![postmaster("b", &id, Duration::minutes(1))],
                _ => Vec::new(),
            };
            source = source.with_head(&id, head);
        }
        source
    };
    let batch: Vec<_> = (0..12)
        .map(|n| sent(&format!("s{n}"), &format!("c{n}"), "Proposal", Duration::zero()))
        .collect();

    let sequential = EngagementEngine::new(build(), EngineConfig::default());
    let parallel = EngagementEngine::new(
        build(),
        EngineConfig {
            concurrency: 4,
            ..EngineConfig::default()
        },
    );

    let mut a = batch.clone();
    let mut b = batch;
    let sa = sequential.classify(&mut a, ACCOUNT).await;
    let sb = parallel.classify(&mut b, ACCOUNT).await;

    assert_eq!(a, b);
    assert_eq!(sa.clean, sb.clean);
    assert_eq!(sa.raw, sb.raw);
    assert_eq!(sa.avg_reply_latency_secs, sb.avg_reply_latency_secs);
}

#[tokio::test]
async fn test_job_skips_failing_account_and_stores_results() {
    let source = MockSource::default()
        .with_sent(
            ACCOUNT,
            vec![
                sent("s1", "c1", "Proposal", Duration::zero()),
                sent("s2", "c2", "oportunidade de acordo: - parte: teste", Duration::zero()),
            ],
        )
        .with_head("c1", vec![reply("r", "c1", Duration::hours(1))]);
    let repository = MetricsRepository::in_memory().await.unwrap();
    let filter = SendFilter::new(&[], &["oportunidade de acordo: - parte:"], &[]);

    let job = MetricsJob::new(
        source,
        EngineConfig::default(),
        filter,
        repository,
        vec!["missing@acme.com".to_string(), ACCOUNT.to_string()],
    );

    let runs = job.run().await;

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].account, ACCOUNT);
    assert_eq!(runs[0].snapshot.clean, Counters::from_totals(1, 0, 1));

    let stored = job
        .repository()
        .metrics_for(ACCOUNT, runs[0].snapshot.date)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.snapshot.clean, runs[0].snapshot.clean);
    assert_eq!(job.repository().count_messages(ACCOUNT).await.unwrap(), 1);
    assert!(job.run_account("missing@acme.com").await.is_err());
}

#[tokio::test]
async fn test_job_keeps_stored_bounce_when_head_fetch_fails() {
    let source = MockSource::default()
        .with_sent(
            ACCOUNT,
            vec![
                sent("s1", "c1", "Proposal", Duration::zero()),
                sent("s1b", "c1", "Proposal follow-up", Duration::hours(2)),
            ],
        )
        .with_head("c1", vec![postmaster("b", "c1", Duration::minutes(1))])
        .failing_from_call(1);
    let repository = MetricsRepository::in_memory().await.unwrap();

    let job = MetricsJob::new(
        source,
        EngineConfig::default(),
        SendFilter::new::<&str>(&[], &[], &[]),
        repository,
        vec![ACCOUNT.to_string()],
    );

    let first = job.run_account(ACCOUNT).await.unwrap();
    assert_eq!(first.clean.bounced, 1);
    assert_eq!(job.repository().list_bounced(ACCOUNT).await.unwrap().len(), 1);

    let second = job.run_account(ACCOUNT).await.unwrap();
    assert_eq!(second.clean.sent, 0);

    let bounced = job.repository().list_bounced(ACCOUNT).await.unwrap();
    assert_eq!(bounced.len(), 1);
    assert_eq!(bounced[0].message_id, "s1");
    assert_eq!(bounced[0].engagement_score, -100);
    assert_eq!(bounced[0].temperature, TemperatureLabel::Cold);
    assert_eq!(job.repository().count_messages(ACCOUNT).await.unwrap(), 2);
}

#[derive(Debug, Clone)]
enum HeadKind {
    Bounce,
    Reply(i64),
    Silent,
    Fail,
}

fn head_kind() -> impl Strategy<Value = HeadKind> {
    prop_oneof![
        Just(HeadKind::Bounce),
        (-3_600_i64..200_000).prop_map(HeadKind::Reply),
        Just(HeadKind::Silent),
        Just(HeadKind::Fail),
    ]
}

fn batch_entry() -> impl Strategy<Value = (u8, bool, i64)> {
    (0_u8..6, any::<bool>(), 0_i64..86_400)
}

proptest! {
    #[test]
    fn prop_counter_identities_hold(
        entries in prop::collection::vec(batch_entry(), 1..24),
        kinds in prop::collection::vec(head_kind(), 6),
    ) {
        let mut source = MockSource::default();
        for (n, kind) in kinds.iter().enumerate() {
            let id = format!("c{n}");
            source = match kind {
                HeadKind::Bounce => {
                    source.with_head(&id, vec![postmaster("b", &id, Duration::zero())])
                }
                HeadKind::Reply(secs) => {
                    source.with_head(&id, vec![reply("r", &id, Duration::seconds(*secs))])
                }
                HeadKind::Silent => source,
                HeadKind::Fail => source.failing_on(&id),
            };
        }

        let mut batch: Vec<_> = entries
            .iter()
            .enumerate()
            .map(|(i, (conv, prefixed, offset))| {
                let subject = if *prefixed { "RE: Proposal" } else { "Proposal" };
                sent(&format!("s{i}"), &format!("c{conv}"), subject, Duration::seconds(*offset))
            })
            .collect();

        let engine = engine(source);
        let snapshot = futures::executor::block_on(engine.classify(&mut batch, ACCOUNT));

        for counters in [&snapshot.clean, &snapshot.raw] {
            prop_assert_eq!(counters.delivered + counters.bounced, counters.sent);
            prop_assert_eq!(counters.no_reply, counters.delivered - counters.replied);
        }

        let distinct: HashSet<_> = batch.iter().map(|m| m.conversation_id.clone()).collect();
        prop_assert!(snapshot.clean.sent as usize <= distinct.len());
        prop_assert!(snapshot.raw.sent as usize <= batch.len());

        let derived = batch.iter().filter(|m| m.is_bounced || m.is_replied).count();
        prop_assert!(derived <= distinct.len());

        if let Some(avg) = snapshot.avg_reply_latency_secs {
            prop_assert!(avg > 0.0);
        }
        prop_assert!((0.0..=1.0).contains(&snapshot.delivery_rate()));
        prop_assert!((0.0..=1.0).contains(&snapshot.reply_rate()));
    }
}
