//! End-to-end flows through the public API with the shipped adapters.

use std::sync::Arc;
use tc_hash_chain::{
    ChainConfig, ChainError, FileBackedKVStore, HashChainApi, HashChainDependencies,
    HashChainService, InMemoryKVStore, KeyValueStore, ManualTimeSource, MockAuthority,
    PublishOutcome, RecordingNotifier, SubmitOutcome, TimeSource,
};

const AUTHORITY: &str = "OriginStamp";
const NOON_UTC: u64 = 1_704_110_400;

fn service_over<KV: KeyValueStore>(
    kv_store: KV,
    authority: Arc<MockAuthority>,
    notifier: Arc<RecordingNotifier>,
) -> HashChainService<KV, ManualTimeSource> {
    HashChainService::new(
        HashChainDependencies {
            kv_store,
            time_source: ManualTimeSource::new(NOON_UTC),
            notifier,
        },
        ChainConfig::default(),
    )
    .with_authority(authority)
}

async fn verify_published<S: HashChainApi>(service: &S, hex: &str, submitted: &str) {
    let result = service.get_validation_chain(hex).await.unwrap();
    assert!(result.validated, "{hex} should be validated");
    assert!(result.verify(), "{hex} proof should recompute");
    assert_eq!(result.validated_hash.as_deref(), Some(submitted));
}

#[tokio::test]
async fn test_full_day_cycle() {
    let authority = Arc::new(MockAuthority::new(AUTHORITY));
    let notifier = Arc::new(RecordingNotifier::new());
    let service = service_over(InMemoryKVStore::new(), authority.clone(), notifier.clone());

    assert_eq!(service.submit("AAAA").await.unwrap(), SubmitOutcome::Accepted);
    assert_eq!(service.submit("BBBB").await.unwrap(), SubmitOutcome::Accepted);
    assert_eq!(service.submit("bbbb").await.unwrap(), SubmitOutcome::AlreadyExists);

    // Pending-only.
    let pending = service.get_validation_chain("BBBB").await.unwrap();
    assert!(!pending.included_in_chain);

    assert_eq!(service.process_pending().await.unwrap(), 2);
    assert_eq!(
        service.publish_tip(AUTHORITY).await.unwrap(),
        PublishOutcome::Published { position: 2 }
    );
    assert_eq!(service.publish_tip(AUTHORITY).await.unwrap(), PublishOutcome::NoChange);

    let submitted = authority.submissions();
    assert_eq!(submitted.len(), 1);
    verify_published(&service, "AAAA", &submitted[0]).await;
    verify_published(&service, "BBBB", &submitted[0]).await;

    let json = serde_json::to_value(service.get_validation_chain("AAAA").await.unwrap()).unwrap();
    assert_eq!(json["chainId"], 1);
    assert_eq!(json["validatedChainId"], 2);
    assert_eq!(json["validationChain"].as_array().unwrap().len(), 2);
    assert_eq!(json["validationChain"][0]["hashedValue"], "AAAA");

    let reports = notifier.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].subject(), "Successfully published to OriginStamp");
    let body = reports[0].render(true);
    assert!(body.starts_with("Good morning,") || body.starts_with("Good afternoon,"));
    assert!(body.contains("This is the first value to be published."));

    assert!(matches!(
        service.get_validation_chain("CCCC").await,
        Err(ChainError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_file_backed_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let authority = Arc::new(MockAuthority::new(AUTHORITY));

    {
        let service = service_over(
            FileBackedKVStore::open(&path).unwrap(),
            authority.clone(),
            Arc::new(RecordingNotifier::new()),
        );
        service.submit("0A0B").await.unwrap();
        service.submit("0C0D").await.unwrap();
        service.process_pending().await.unwrap();
        service.publish_tip(AUTHORITY).await.unwrap();
        service.submit("0E0F").await.unwrap();
    }

    let service = service_over(
        FileBackedKVStore::open(&path).unwrap(),
        authority.clone(),
        Arc::new(RecordingNotifier::new()),
    );
    assert_eq!(service.submit("0A0B").await.unwrap(), SubmitOutcome::AlreadyExists);

    let status = service.status().await.unwrap();
    assert_eq!(status.tip_position, Some(2));
    assert_eq!(status.pending_count, 1);

    // Already anchored tip is not resubmitted after restart.
    assert_eq!(service.publish_tip(AUTHORITY).await.unwrap(), PublishOutcome::NoChange);

    assert_eq!(service.process_pending().await.unwrap(), 1);
    assert_eq!(
        service.publish_tip(AUTHORITY).await.unwrap(),
        PublishOutcome::Published { position: 3 }
    );
    let submitted = authority.submissions();
    assert_eq!(submitted.len(), 2);
    verify_published(&service, "0A0B", &submitted[0]).await;
    verify_published(&service, "0E0F", &submitted[1]).await;
}

#[tokio::test]
async fn test_earlier_proofs_stay_valid_after_later_anchor() {
    let authority = Arc::new(MockAuthority::new(AUTHORITY));
    let service = service_over(
        InMemoryKVStore::new(),
        authority.clone(),
        Arc::new(RecordingNotifier::new()),
    );

    service.submit("01").await.unwrap();
    service.process_pending().await.unwrap();
    service.publish_tip(AUTHORITY).await.unwrap();
    let before = service.get_validation_chain("01").await.unwrap();

    service.submit("02").await.unwrap();
    service.process_pending().await.unwrap();
    service.publish_tip(AUTHORITY).await.unwrap();

    // The first anchor still backs the first fingerprint.
    let after = service.get_validation_chain("01").await.unwrap();
    assert_eq!(before, after);
    assert_eq!(after.validated_hash.as_deref(), Some(authority.submissions()[0].as_str()));
}

#[test]
fn test_manual_clock_is_a_time_source() {
    let clock = ManualTimeSource::new(NOON_UTC);
    assert_eq!(clock.now(), NOON_UTC);
}
