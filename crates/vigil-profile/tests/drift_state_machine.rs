//! Stateful property testing for the drift buffer and re-clustering.
//!
//! Every drifting tweet embeds to a fresh unit vector, so it can never match
//! an existing topic. The model tracks how many tweets sit in the buffer and
//! predicts exactly when a classification call re-clusters it.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use tokio::runtime::Runtime;

use common::*;
use vigil_profile::drift::DriftBuffer;
use vigil_profile::{
    EmbeddedTweet, EngineConfig, EngineError, IncrementalClassifier, ProfileEngine,
};
use vigil_store::{MemoryStore, Store};

const DIMS: usize = 512;
const THRESHOLD: usize = 5;

fn basis_tweet(index: usize) -> EmbeddedTweet {
    let mut embedding = vec![0.0; DIMS];
    embedding[index] = 1.0;
    EmbeddedTweet {
        tweet: tweet(&format!("t{}", index), &format!("basis {}", index), epoch_day(1)),
        embedding,
    }
}

#[derive(Debug, Clone)]
pub enum DriftOperation {
    /// Classify a batch of tweets that match no topic.
    ClassifyDrifting { count: usize },
}

#[derive(Debug, Clone, Default)]
pub struct DriftModel {
    pub buffered: usize,
    pub total: u64,
    pub next_basis: usize,
    pub reclusters: usize,
}

impl ReferenceStateMachine for DriftModel {
    type State = Self;
    type Transition = DriftOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        // The harness bootstraps two topics from basis vectors 0 and 1.
        Just(Self {
            buffered: 0,
            total: 2,
            next_basis: 2,
            reclusters: 0,
        })
        .boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        (1usize..=4)
            .prop_map(|count| DriftOperation::ClassifyDrifting { count })
            .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            DriftOperation::ClassifyDrifting { count } => {
                state.buffered += count;
                state.total += *count as u64;
                state.next_basis += count;
                if state.buffered >= THRESHOLD {
                    state.buffered = 0;
                    state.reclusters += 1;
                }
            }
        }
        state
    }

    fn preconditions(state: &Self::State, transition: &Self::Transition) -> bool {
        match transition {
            DriftOperation::ClassifyDrifting { count } => state.next_basis + count <= DIMS,
        }
    }
}

pub struct DriftHarness {
    runtime: Runtime,
    store: Arc<MemoryStore>,
    engine: ProfileEngine,
    next_basis: usize,
    reclusters: usize,
}

impl DriftHarness {
    fn new() -> Self {
        let runtime = Runtime::new().expect("Failed to create tokio runtime");
        let config = EngineConfig {
            recluster_threshold: THRESHOLD,
            ..EngineConfig::default()
        };
        let (store, engine) = runtime.block_on(async {
            let store = store_with_account("acct", "alice").await;
            let engine = ProfileEngine::new(
                store.clone(),
                providers(ScriptedChat::happy(), basis_embedder(DIMS)),
                config,
            );
            engine
                .classify("acct", &[basis_tweet(0), basis_tweet(1)], epoch_day(1))
                .await
                .expect("bootstrap");
            (store, engine)
        });
        Self {
            runtime,
            store,
            engine,
            next_basis: 2,
            reclusters: 0,
        }
    }

    fn apply_operation(&mut self, op: &DriftOperation) {
        match op {
            DriftOperation::ClassifyDrifting { count } => {
                let batch: Vec<EmbeddedTweet> = (self.next_basis..self.next_basis + count)
                    .map(basis_tweet)
                    .collect();
                self.next_basis += count;
                let summary = self
                    .runtime
                    .block_on(self.engine.classify("acct", &batch, epoch_day(1)))
                    .expect("classify");
                assert_eq!(summary.matched, 0, "drifting tweets must not match");
                if let Some(recluster) = summary.recluster {
                    assert!(recluster.consumed >= THRESHOLD);
                    self.reclusters += 1;
                }
            }
        }
    }

    fn verify_invariants(&self, model: &DriftModel) {
        self.runtime.block_on(async {
            let buffered = self.store.count_drift_entries("acct").await.unwrap();
            assert_eq!(buffered, model.buffered, "buffer size mismatch");
            assert!(buffered < THRESHOLD, "buffer {} left at threshold", buffered);

            let profile = self.store.get_profile("acct").await.unwrap().unwrap();
            assert_eq!(profile.total_tweets_processed, model.total);
            let sum: f64 = profile.topics.iter().map(|t| t.proportion).sum();
            assert!((sum - 1.0).abs() < 1e-6, "proportions sum to {}", sum);
            assert!(profile.topics.iter().all(|t| t.centroid.len() == DIMS));
        });
        assert_eq!(self.reclusters, model.reclusters, "recluster count mismatch");
    }
}

impl StateMachineTest for DriftHarness {
    type SystemUnderTest = Self;
    type Reference = DriftModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new()
    }

    fn apply(
        mut state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        state.apply_operation(&transition);
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn drift_buffer_state_machine_test(sequential 1..40 => DriftHarness);
}

#[tokio::test]
async fn fiftieth_buffered_tweet_triggers_recluster() {
    let store = store_with_account("acct", "alice").await;
    let engine = ProfileEngine::new(
        store.clone(),
        providers(ScriptedChat::happy(), basis_embedder(DIMS)),
        EngineConfig::default(),
    );
    engine
        .classify("acct", &[basis_tweet(0), basis_tweet(1)], epoch_day(1))
        .await
        .unwrap();

    let batch: Vec<EmbeddedTweet> = (2..51).map(basis_tweet).collect();
    let summary = engine.classify("acct", &batch, epoch_day(1)).await.unwrap();
    assert_eq!(summary.drifted, 49);
    assert!(summary.recluster.is_none());
    assert_eq!(store.count_drift_entries("acct").await.unwrap(), 49);

    let summary = engine
        .classify("acct", &[basis_tweet(51)], epoch_day(1))
        .await
        .unwrap();
    let recluster = summary.recluster.expect("re-cluster on the 50th tweet");
    assert_eq!(recluster.consumed, 50);
    assert!(!recluster.new_topics.is_empty());
    assert_eq!(store.count_drift_entries("acct").await.unwrap(), 0);

    let profile = store.get_profile("acct").await.unwrap().unwrap();
    assert_eq!(profile.topics.len(), 2 + recluster.new_topics.len());
    assert!(profile.topics[2].label.starts_with("Untitled topic"));
}

#[tokio::test]
async fn failed_profile_write_keeps_drift_buffer() {
    let store = FaultyStore::new(store_with_account("acct", "alice").await);
    let providers = providers(ScriptedChat::happy(), basis_embedder(DIMS));
    let config = EngineConfig::default();
    let engine = ProfileEngine::new(store.clone(), providers.clone(), config.clone());
    engine
        .classify("acct", &[basis_tweet(0), basis_tweet(1)], epoch_day(1))
        .await
        .unwrap();
    let batch: Vec<EmbeddedTweet> = (2..51).map(basis_tweet).collect();
    engine.classify("acct", &batch, epoch_day(1)).await.unwrap();

    let last = basis_tweet(51);
    let len = DriftBuffer::new(store.as_ref(), "acct", config.recluster_threshold)
        .push(vec![(last.tweet.id, last.embedding)], epoch_day(1))
        .await
        .unwrap();
    assert_eq!(len, 50);

    let mut profile = store.get_profile("acct").await.unwrap().unwrap();
    let topics_before = profile.topics.len();
    store.fail_put_profile.store(true, Ordering::SeqCst);

    let result = IncrementalClassifier::new(store.as_ref(), &providers, &config)
        .recluster(&mut profile)
        .await;
    assert!(matches!(result, Err(EngineError::Store(_))));
    assert_eq!(store.count_drift_entries("acct").await.unwrap(), 50);

    let stored = store.get_profile("acct").await.unwrap().unwrap();
    assert_eq!(stored.topics.len(), topics_before);
}
