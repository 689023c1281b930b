// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod helpers;
use alloy::primitives::Address;
use anyhow::Result;
use cbx_evm::{ContributionRecord, RecordId};
use cbx_lifecycle::{
    CreatePhase, DecryptOutcome, DecryptPhase, EncryptionError, IdGenerator, LifecycleError,
    StatusPhase,
};
use cbx_test_helpers::{MockGateway, MockLedger, MockVerifier, PlaintextVault};
use helpers::{alice, bob, seeded_project, wells, Harness};
use std::{sync::atomic::Ordering, time::Duration};
use tracing_test::traced_test;

#[tokio::test]
async fn test_create_then_decrypt() -> Result<()> {
    let h = Harness::new().connected(alice());
    h.lifecycle.connect(&h.session).await?;

    let id = h.lifecycle.create_project(&h.session, wells(Some(500))).await?;
    assert!(id.as_str().starts_with("charity-"));
    assert_eq!(h.last_message().as_deref(), Some("Project created successfully!"));

    // Durable and visible, but the amount stays hidden until disclosed
    let cached = h.session.registry().get(&id).expect("record cached after commit");
    assert_eq!(cached.creator, alice());
    assert_eq!(cached.target_amount, 500);
    assert_eq!(cached.decrypted_amount(), None);

    let outcome = h.lifecycle.decrypt(&h.session, &id).await?;
    assert_eq!(outcome, DecryptOutcome::Decrypted(100));
    assert_eq!(h.ledger.record(&id).and_then(|r| r.decrypted_amount()), Some(100));
    assert_eq!(
        h.session.registry().get(&id).and_then(|r| r.decrypted_amount()),
        Some(100)
    );
    assert_eq!(*h.lifecycle.subscribe_decrypt().borrow(), DecryptPhase::Done);
    assert_eq!(h.last_message().as_deref(), Some("Amount decrypted successfully!"));
    Ok(())
}

#[tokio::test]
async fn test_missing_target_uses_fallback() -> Result<()> {
    let h = Harness::new().connected(alice());
    let id = h.lifecycle.create_project(&h.session, wells(None)).await?;
    let zero = h.lifecycle.create_project(&h.session, wells(Some(0))).await?;

    assert_eq!(h.ledger.record(&id).map(|r| r.target_amount), Some(1000));
    assert_eq!(h.ledger.record(&zero).map(|r| r.target_amount), Some(1000));
    Ok(())
}

#[tokio::test]
async fn test_not_connected_makes_no_calls() -> Result<()> {
    let h = Harness::new();
    let project = RecordId::from("charity-1");
    let mut create_phase = h.lifecycle.subscribe_create();

    let created = h.lifecycle.create_project(&h.session, wells(Some(10))).await;
    assert!(matches!(created, Err(LifecycleError::NotConnected)));
    assert_eq!(h.last_message().as_deref(), Some("Please connect wallet first"));

    let donated = h.lifecycle.donate(&h.session, &project, 5).await;
    assert!(matches!(donated, Err(LifecycleError::NotConnected)));

    let decrypted = h.lifecycle.decrypt(&h.session, &project).await;
    assert!(matches!(decrypted, Err(LifecycleError::NotConnected)));

    assert_eq!(h.gateway.encrypt_calls(), 0);
    assert_eq!(h.verifier.calls(), 0);
    assert_eq!(h.ledger.calls().writes(), 0);
    assert_eq!(h.ledger.calls().get_record.load(Ordering::SeqCst), 0);
    // The create workflow never started
    assert!(!create_phase.has_changed()?);
    assert_eq!(*create_phase.borrow_and_update(), CreatePhase::Idle);
    Ok(())
}

#[tokio::test]
async fn test_zero_contract_address_is_not_connected() -> Result<()> {
    let vault = PlaintextVault::new();
    let h = Harness::build(
        MockLedger::with_address(Address::ZERO),
        vault.clone(),
        MockGateway::new(vault.clone()),
        MockVerifier::new(vault),
    )
    .connected(alice());

    let result = h.lifecycle.create_project(&h.session, wells(Some(10))).await;
    assert!(matches!(result, Err(LifecycleError::NotConnected)));
    assert_eq!(h.gateway.encrypt_calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_single_encryption_in_flight() -> Result<()> {
    let vault = PlaintextVault::new();
    let h = Harness::build(
        MockLedger::new(),
        vault.clone(),
        MockGateway::new(vault.clone()).with_delay(Duration::from_millis(200)),
        MockVerifier::new(vault),
    )
    .connected(alice());

    let (first, second) = tokio::join!(
        h.lifecycle.create_project(&h.session, wells(Some(10))),
        h.lifecycle.create_project(&h.session, wells(Some(20))),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(LifecycleError::EncryptionInFlight))));
    assert_eq!(h.gateway.max_in_flight(), 1);
    assert_eq!(h.gateway.encrypt_calls(), 1);

    // The slot is released once the first call is done
    h.lifecycle.create_project(&h.session, wells(Some(30))).await?;
    assert_eq!(h.ledger.records().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_encryption_failure_submits_nothing() -> Result<()> {
    let h = Harness::new().connected(alice());
    h.gateway
        .fail_next(EncryptionError::Transient("relayer timed out".to_string()));

    let result = h.lifecycle.create_project(&h.session, wells(Some(10))).await;
    match result {
        Err(LifecycleError::EncryptionFailed(e)) => assert!(e.is_transient()),
        other => panic!("expected an encryption failure, got {other:?}"),
    }
    assert_eq!(h.ledger.calls().writes(), 0);
    assert_eq!(*h.lifecycle.subscribe_create().borrow(), CreatePhase::Failed);
    Ok(())
}

#[tokio::test]
async fn test_user_rejection_leaves_registry_untouched() -> Result<()> {
    let h = Harness::new().connected(alice());
    h.ledger.reject_signing(true);

    let result = h.lifecycle.create_project(&h.session, wells(Some(10))).await;
    assert!(matches!(result, Err(LifecycleError::UserRejected)));
    assert_eq!(h.last_message().as_deref(), Some("Transaction rejected"));
    assert!(h.ledger.records().is_empty());
    assert!(h.session.registry().records().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reverted_transaction_is_a_failure() -> Result<()> {
    let h = Harness::new().connected(alice());
    h.ledger.revert_transactions(true);

    let result = h.lifecycle.create_project(&h.session, wells(Some(10))).await;
    assert!(matches!(result, Err(LifecycleError::SubmissionFailed(_))));
    assert!(h
        .last_message()
        .is_some_and(|m| m.starts_with("Creation failed:")));
    assert!(h.ledger.records().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_donation_round_trip() -> Result<()> {
    let h = Harness::new().connected(alice());
    let project = h.lifecycle.create_project(&h.session, wells(Some(1000))).await?;

    let donation = h.lifecycle.donate(&h.session, &project, 250).await?;
    assert!(donation
        .as_str()
        .starts_with(&format!("donation-{project}-")));
    assert_eq!(h.last_message().as_deref(), Some("Donation completed with FHE protection!"));

    let record = h.ledger.record(&donation).expect("donation mined");
    assert_eq!(record.name, "Donation to Wells");
    assert_eq!(record.description, "Encrypted donation of 250");
    assert_eq!(record.target_amount, 250);

    let outcome = h.lifecycle.decrypt(&h.session, &donation).await?;
    assert_eq!(outcome.value(), 250);

    let stats = h.session.registry().stats();
    assert_eq!(stats.total_records, 2);
    assert_eq!(stats.verified_records, 1);
    assert_eq!(stats.total_disclosed, 250);
    assert_eq!(stats.average_disclosed, 125.0);
    Ok(())
}

#[tokio::test]
async fn test_donate_to_unknown_project() -> Result<()> {
    let h = Harness::new().connected(alice());
    let mut create_phase = h.lifecycle.subscribe_create();
    let result = h
        .lifecycle
        .donate(&h.session, &RecordId::from("charity-404"), 5)
        .await;

    assert!(matches!(result, Err(LifecycleError::UnknownProject(_))));
    assert_eq!(h.last_message().as_deref(), Some("Donation failed"));
    assert_eq!(h.gateway.encrypt_calls(), 0);
    assert!(!create_phase.has_changed()?);
    assert_eq!(*create_phase.borrow_and_update(), CreatePhase::Idle);
    Ok(())
}

#[tokio::test]
async fn test_decrypt_verified_record_skips_service() -> Result<()> {
    let h = Harness::new().connected(alice());
    let id = RecordId::from("charity-7");
    h.ledger
        .insert(seeded_project("charity-7", bob()).with_verified_amount(42));

    let outcome = h.lifecycle.decrypt(&h.session, &id).await?;
    assert_eq!(outcome, DecryptOutcome::AlreadyVerified(42));
    assert_eq!(h.verifier.calls(), 0);
    assert_eq!(h.ledger.calls().writes(), 0);
    assert_eq!(h.last_message().as_deref(), Some("Data already verified"));
    assert_eq!(
        *h.lifecycle.subscribe_decrypt().borrow(),
        DecryptPhase::AlreadyVerified
    );
    Ok(())
}

#[tokio::test]
async fn test_decrypt_without_signer() -> Result<()> {
    let mut h = Harness::new();
    h.session.connect(alice(), None);
    h.ledger
        .insert(seeded_project("charity-1", bob()).with_verified_amount(9));
    h.ledger.insert(seeded_project("charity-2", bob()));

    let verified = h
        .lifecycle
        .decrypt(&h.session, &RecordId::from("charity-1"))
        .await?;
    assert_eq!(verified.value(), 9);

    let unverified = h
        .lifecycle
        .decrypt(&h.session, &RecordId::from("charity-2"))
        .await;
    assert!(matches!(unverified, Err(LifecycleError::SignerUnavailable)));
    assert_eq!(h.verifier.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_service_reports_already_verified() -> Result<()> {
    let id = RecordId::from("charity-3");
    let ledger = MockLedger::new();
    let vault = PlaintextVault::new();
    let handle = ledger.insert(seeded_project("charity-3", bob()));
    vault.insert(handle, 64);

    // Another party commits while our request is with the service
    let rival = ledger.clone();
    let rival_id = id.clone();
    let verifier = MockVerifier::new(vault.clone())
        .reporting_already_verified()
        .before_respond(move |_| rival.force_verify(&rival_id, 64));
    let h = Harness::build(ledger, vault.clone(), MockGateway::new(vault), verifier)
        .connected(alice());

    let outcome = h.lifecycle.decrypt(&h.session, &id).await?;
    assert_eq!(outcome, DecryptOutcome::AlreadyVerified(64));
    assert_eq!(h.ledger.calls().submit_verification.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_losing_the_commit_race_is_success() -> Result<()> {
    let id = RecordId::from("charity-4");
    let ledger = MockLedger::new();
    let vault = PlaintextVault::new();
    let handle = ledger.insert(seeded_project("charity-4", bob()));
    vault.insert(handle, 77);

    let rival = ledger.clone();
    let rival_id = id.clone();
    let verifier = MockVerifier::new(vault.clone())
        .before_respond(move |_| rival.force_verify(&rival_id, 77));
    let h = Harness::build(ledger, vault.clone(), MockGateway::new(vault), verifier)
        .connected(alice());

    let outcome = h.lifecycle.decrypt(&h.session, &id).await?;
    assert_eq!(outcome, DecryptOutcome::AlreadyVerified(77));
    assert_eq!(h.ledger.calls().submit_verification.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.session.registry().get(&id).and_then(|r| r.decrypted_amount()),
        Some(77)
    );
    Ok(())
}

#[tokio::test]
async fn test_rival_proof_mined_before_ours_is_success() -> Result<()> {
    let id = RecordId::from("charity-4");
    let h = Harness::new().connected(alice());
    let handle = h.ledger.insert(seeded_project("charity-4", bob()));
    h.vault.insert(handle, 77);
    h.lifecycle.refresh(&h.session).await?;
    // Our transaction is accepted, then reverts because the rival landed first
    h.ledger.mine_rival_verification_first(77);

    let outcome = h.lifecycle.decrypt(&h.session, &id).await?;
    assert_eq!(outcome, DecryptOutcome::AlreadyVerified(77));
    assert_eq!(h.ledger.calls().submit_verification.load(Ordering::SeqCst), 1);
    assert_eq!(h.last_message().as_deref(), Some("Data already verified"));
    assert_eq!(
        *h.lifecycle.subscribe_decrypt().borrow(),
        DecryptPhase::AlreadyVerified
    );

    // Verified state holds on the ledger and in the cache
    assert_eq!(h.ledger.record(&id).and_then(|r| r.decrypted_amount()), Some(77));
    assert_eq!(
        h.session.registry().get(&id).and_then(|r| r.decrypted_amount()),
        Some(77)
    );
    h.lifecycle.refresh(&h.session).await?;
    assert_eq!(
        h.session.registry().get(&id).and_then(|r| r.decrypted_amount()),
        Some(77)
    );
    Ok(())
}

#[tokio::test]
async fn test_reverted_proof_on_unverified_record_fails() -> Result<()> {
    let id = RecordId::from("charity-6");
    let h = Harness::new().connected(alice());
    let handle = h.ledger.insert(seeded_project("charity-6", bob()));
    h.vault.insert(handle, 31);
    h.ledger.revert_transactions(true);

    let result = h.lifecycle.decrypt(&h.session, &id).await;
    assert!(matches!(result, Err(LifecycleError::VerificationFailed(_))));
    assert_eq!(h.last_message().as_deref(), Some("Decryption failed"));
    assert_eq!(h.ledger.record(&id).and_then(|r| r.decrypted_amount()), None);
    Ok(())
}

#[tokio::test]
async fn test_verification_failure() -> Result<()> {
    let h = Harness::new().connected(alice());
    // Nothing in the vault for this handle
    h.ledger.insert(seeded_project("charity-5", bob()));

    let result = h
        .lifecycle
        .decrypt(&h.session, &RecordId::from("charity-5"))
        .await;
    assert!(matches!(result, Err(LifecycleError::VerificationFailed(_))));
    assert_eq!(h.last_message().as_deref(), Some("Decryption failed"));
    assert_eq!(*h.lifecycle.subscribe_decrypt().borrow(), DecryptPhase::Failed);
    assert_eq!(h.ledger.calls().writes(), 0);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_partial_load_skips_unreadable_records() -> Result<()> {
    let h = Harness::new().connected(alice());
    h.ledger.insert(seeded_project("charity-1", alice()));
    h.ledger.insert(seeded_project("charity-2", bob()));
    h.ledger.insert(seeded_project("charity-3", alice()));
    h.ledger.mark_malformed("charity-2");

    let report = h.lifecycle.refresh(&h.session).await?;
    assert!(report.is_partial());
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.skipped[0].id, RecordId::from("charity-2"));
    assert!(logs_contain("Skipping unreadable record"));

    let mine: Vec<RecordId> = h.session.own_history().into_iter().map(|r| r.id).collect();
    assert_eq!(
        mine,
        vec![RecordId::from("charity-1"), RecordId::from("charity-3")]
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_load_notifies() -> Result<()> {
    let h = Harness::new().connected(alice());
    h.ledger.set_unavailable(true);

    assert!(h.lifecycle.refresh(&h.session).await.is_err());
    let current = h.session.notifier().current().expect("notification posted");
    assert_eq!(current.phase, StatusPhase::Error);
    assert_eq!(current.message, "Failed to load data");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reloads_share_one_fetch() -> Result<()> {
    let h = slow_ledger_harness();
    h.ledger.insert(seeded_project("charity-1", alice()));

    let (first, second) = tokio::join!(
        h.session.registry().reload(),
        h.session.registry().reload()
    );
    let (first, second) = (first?, second?);

    assert_ne!(first.coalesced, second.coalesced);
    assert_eq!(first.records.len(), 1);
    assert_eq!(second.records.len(), 1);
    assert_eq!(h.ledger.calls().list_record_ids.load(Ordering::SeqCst), 1);
    Ok(())
}

fn slow_ledger_harness() -> Harness {
    let vault = PlaintextVault::new();
    Harness::build(
        MockLedger::new().with_read_delay(Duration::from_millis(50)),
        vault.clone(),
        MockGateway::new(vault.clone()),
        MockVerifier::new(vault),
    )
}

#[tokio::test(start_paused = true)]
async fn test_joined_reload_sees_the_failure() -> Result<()> {
    let h = slow_ledger_harness().connected(alice());
    h.ledger.insert(seeded_project("charity-1", alice()));
    h.ledger.set_unavailable(true);

    let (first, second) = tokio::join!(
        h.lifecycle.refresh(&h.session),
        h.lifecycle.refresh(&h.session)
    );

    assert!(first.is_err());
    assert!(second.is_err());
    assert_eq!(h.ledger.calls().list_record_ids.load(Ordering::SeqCst), 1);
    let failures = h
        .session
        .notifier()
        .live()
        .into_iter()
        .filter(|n| n.phase == StatusPhase::Error && n.message == "Failed to load data")
        .count();
    assert_eq!(failures, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_joined_reload_sees_skipped_records() -> Result<()> {
    let h = slow_ledger_harness();
    h.ledger.insert(seeded_project("charity-1", alice()));
    h.ledger.insert(seeded_project("charity-2", bob()));
    h.ledger.mark_malformed("charity-2");

    let (first, second) = tokio::join!(
        h.session.registry().reload(),
        h.session.registry().reload()
    );
    let (first, second) = (first?, second?);

    assert_ne!(first.coalesced, second.coalesced);
    for report in [&first, &second] {
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, RecordId::from("charity-2"));
    }
    Ok(())
}

#[tokio::test]
async fn test_generated_ids_avoid_known_records() -> Result<()> {
    let vault = PlaintextVault::new();
    let h = Harness::build(
        MockLedger::new(),
        vault.clone(),
        MockGateway::new(vault.clone()),
        MockVerifier::new(vault),
    );
    let h = Harness {
        lifecycle: h
            .lifecycle
            .with_id_generator(IdGenerator::with_clock(|| 1_000)),
        ..h
    }
    .connected(alice());

    h.ledger.insert(seeded_project("charity-1000", bob()));
    h.lifecycle.refresh(&h.session).await?;

    let first = h.lifecycle.create_project(&h.session, wells(Some(10))).await?;
    let second = h.lifecycle.create_project(&h.session, wells(Some(10))).await?;
    assert_eq!(first.as_str(), "charity-1001");
    assert_eq!(second.as_str(), "charity-1002");
    assert_eq!(h.ledger.records().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_gateway_initialized_once_per_session() -> Result<()> {
    let h = Harness::new().connected(alice());
    h.lifecycle.connect(&h.session).await?;
    h.lifecycle.connect(&h.session).await?;
    assert_eq!(h.gateway.initialize_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_gateway_initialization_failure() -> Result<()> {
    let vault = PlaintextVault::new();
    let h = Harness::build(
        MockLedger::new(),
        vault.clone(),
        MockGateway::new(vault.clone()).failing_initialize(),
        MockVerifier::new(vault),
    )
    .connected(alice());

    let result = h.lifecycle.connect(&h.session).await;
    assert!(matches!(
        result,
        Err(LifecycleError::EncryptionFailed(
            EncryptionError::InitializationFailed(_)
        ))
    ));
    assert_eq!(h.last_message().as_deref(), Some("FHE initialization failed"));
    assert_eq!(h.ledger.calls().list_record_ids.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_probe_availability() -> Result<()> {
    let h = Harness::new();
    assert!(h.lifecycle.probe_availability(&h.session).await);
    assert_eq!(h.last_message().as_deref(), Some("Contract is available!"));

    h.ledger.set_unavailable(true);
    assert!(!h.lifecycle.probe_availability(&h.session).await);
    assert_eq!(h.last_message().as_deref(), Some("Contract call failed"));
    Ok(())
}

#[tokio::test]
async fn test_disclosure_survives_reload() -> Result<()> {
    let h = Harness::new().connected(alice());
    let id = h.lifecycle.create_project(&h.session, wells(Some(400))).await?;
    h.lifecycle.decrypt(&h.session, &id).await?;

    h.lifecycle.refresh(&h.session).await?;
    let record: ContributionRecord = h.session.registry().get(&id).expect("cached");
    assert_eq!(record.decrypted_amount(), Some(100));

    // Decrypting again is answered from the chain
    let again = h.lifecycle.decrypt(&h.session, &id).await?;
    assert_eq!(again, DecryptOutcome::AlreadyVerified(100));
    assert_eq!(h.verifier.calls(), 1);
    Ok(())
}
