//! Channel lifecycle scenarios against the in-memory chain
//!
//! Run with: cargo test -p paychan-client --test lifecycle

use std::sync::Arc;

use paychan_channel::{
    ChannelError, ChannelStatus, HARD_CLOSE_TIMEOUT, SignedState, State, UpdateOutcome,
};
use paychan_client::{Client, ClientConfig, ClientError, InMemoryChain, InMemorySigner};
use paychan_ledger::{ChannelLedger, LedgerConfig};
use paychan_types::{AccountId, Balance};

// ============================================================================
// Fixture
// ============================================================================

struct Parties {
    chain: Arc<InMemoryChain>,
    alice: Client,
    bob: Client,
}

fn signer(account: &str) -> InMemorySigner {
    InMemorySigner::from_seed(account.parse().unwrap(), account.as_bytes()).unwrap()
}

async fn parties_with_ledger(alice_ledger: ChannelLedger) -> Parties {
    let config = ClientConfig::default();
    let chain = Arc::new(InMemoryChain::new(config.contract_account_id.clone()));
    let alice = signer("alice.near");
    let bob = signer("bob.near");
    for s in [&alice, &bob] {
        chain.add_access_key(s.account_id().clone(), *s.public_key()).await;
    }

    let bob_ledger = Arc::new(ChannelLedger::in_memory());
    Parties {
        alice: Client::new(config.clone(), Arc::new(alice_ledger), chain.clone())
            .with_signer(alice),
        bob: Client::new(config, bob_ledger, chain.clone()).with_signer(bob),
        chain,
    }
}

async fn parties() -> Parties {
    parties_with_ledger(ChannelLedger::in_memory()).await
}

fn yocto(amount: u128) -> Balance {
    Balance::from_yocto_near(amount)
}

fn account(id: &str) -> AccountId {
    id.parse().unwrap()
}

/// Alice opens a channel to Bob and Bob registers it.
async fn open(p: &Parties, balance: u128) -> paychan_channel::Channel {
    let receiver = p.bob.signer().unwrap().account();
    let channel = p.alice.open_channel(receiver, yocto(balance)).await.unwrap();
    p.bob.register_channel(channel.channel_id()).await.unwrap();
    channel
}

/// Sign an absolute spent balance with the channel's sender key.
fn sign_spent(channel: &paychan_channel::Channel, spent: u128) -> SignedState {
    State::new(channel.channel_id().clone(), yocto(spent))
        .sign(channel.sender_secret_key().unwrap())
        .unwrap()
}

// ============================================================================
// Payments
// ============================================================================

#[tokio::test]
async fn test_open_then_pay() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();
    assert_eq!(channel.status(), ChannelStatus::Active);
    assert_eq!(channel.added_balance(), yocto(10));

    let payment = p.alice.create_payment(id, yocto(3)).await.unwrap();
    assert_eq!(payment.spent_balance(), yocto(3));
    assert_eq!(
        p.bob.receive_payment(&payment).await.unwrap(),
        UpdateOutcome::Applied {
            previous: yocto(0),
            current: yocto(3)
        }
    );
    let stored = p.bob.get_channel(id, false).await.unwrap().unwrap();
    assert_eq!(stored.spent_balance(), yocto(3));

    let stale = sign_spent(&channel, 2);
    let err = p.bob.receive_payment(&stale).await.unwrap_err();
    assert_eq!(
        err.channel_error(),
        Some(&ChannelError::StaleUpdate {
            current: yocto(3),
            provided: yocto(2)
        })
    );
    let stored = p.bob.get_channel(id, false).await.unwrap().unwrap();
    assert_eq!(stored.spent_balance(), yocto(3));
}

#[tokio::test]
async fn test_idempotent_replay() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let payment = p.alice.create_payment(channel.channel_id(), yocto(4)).await.unwrap();

    p.bob.receive_payment(&payment).await.unwrap();
    assert_eq!(
        p.bob.receive_payment(&payment).await.unwrap(),
        UpdateOutcome::Unchanged
    );
    let stored = p.bob.get_channel(channel.channel_id(), false).await.unwrap().unwrap();
    assert_eq!(stored.spent_balance(), yocto(4));
}

#[tokio::test]
async fn test_signature_gate() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();

    // Signed by Bob's account key rather than the channel's sender key.
    let forged = State::new(id.clone(), yocto(5))
        .sign(p.bob.signer().unwrap().secret_key())
        .unwrap();
    let err = p.bob.receive_payment(&forged).await.unwrap_err();
    assert_eq!(err.channel_error(), Some(&ChannelError::InvalidSignature));

    let stored = p.bob.get_channel(id, false).await.unwrap().unwrap();
    assert_eq!(stored.spent_balance(), yocto(0));
    assert!(stored.latest_state().is_none());
}

#[tokio::test]
async fn test_over_deposit_state_rejected() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let err = p.bob.receive_payment(&sign_spent(&channel, 11)).await.unwrap_err();
    assert!(matches!(
        err.channel_error(),
        Some(ChannelError::BalanceExceedsDeposit { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_payments_serialize() {
    let p = parties().await;
    let channel = open(&p, 100).await;
    let alice = Arc::new(p.alice);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let alice = alice.clone();
        let id = channel.channel_id().clone();
        handles.push(tokio::spawn(async move {
            alice.create_payment(&id, yocto(1)).await.unwrap()
        }));
    }
    let mut spent = Vec::new();
    for handle in handles {
        spent.push(handle.await.unwrap().spent_balance());
    }
    spent.sort();
    assert_eq!(spent, (1..=10).map(yocto).collect::<Vec<_>>());

    let stored = alice.get_channel(channel.channel_id(), false).await.unwrap().unwrap();
    assert_eq!(stored.spent_balance(), yocto(10));
}

// ============================================================================
// On-chain settlement
// ============================================================================

#[tokio::test]
async fn test_topup_and_receiver_sync() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();

    let topped = p.alice.topup(id, yocto(5)).await.unwrap();
    assert_eq!(topped.added_balance(), yocto(15));
    assert_eq!(p.chain.channel(id).await.unwrap().added_balance, yocto(15));

    let before = p.bob.get_channel(id, false).await.unwrap().unwrap();
    assert_eq!(before.added_balance(), yocto(10));
    let synced = p.bob.get_channel(id, true).await.unwrap().unwrap();
    assert_eq!(synced.added_balance(), yocto(15));

    // The new deposit is spendable.
    let payment = p.alice.create_payment(id, yocto(12)).await.unwrap();
    p.bob.receive_payment(&payment).await.unwrap();
}

#[tokio::test]
async fn test_withdraw_claims_difference() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();

    let first = p.alice.create_payment(id, yocto(3)).await.unwrap();
    let after = p.bob.withdraw(&first).await.unwrap();
    assert_eq!(after.withdrawn_balance(), yocto(3));

    let second = p.alice.create_payment(id, yocto(4)).await.unwrap();
    p.bob.withdraw(&second).await.unwrap();
    assert_eq!(p.chain.balance_of(&account("bob.near")).await, yocto(7));

    let err = p.bob.withdraw(&second).await.unwrap_err();
    assert!(matches!(err, ClientError::NothingToWithdraw(_)));

    let synced = p.alice.get_channel(id, true).await.unwrap().unwrap();
    assert_eq!(synced.withdrawn_balance(), yocto(7));
}

#[tokio::test]
async fn test_cooperative_close_refunds_sender() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();

    let payment = p.alice.create_payment(id, yocto(6)).await.unwrap();
    p.bob.withdraw(&payment).await.unwrap();

    let close = p.bob.create_close_request(id).await.unwrap();
    assert_eq!(close.spent_balance(), yocto(0));
    let closed = p.alice.close_channel(&close).await.unwrap();
    assert_eq!(closed.status(), ChannelStatus::Closed);
    assert_eq!(p.chain.balance_of(&account("alice.near")).await, yocto(4));
    assert!(p.chain.channel(id).await.unwrap().is_reset());

    let synced = p.bob.get_channel(id, true).await.unwrap().unwrap();
    assert!(synced.is_closed());

    let late = p.alice.create_payment(id, yocto(1)).await.unwrap_err();
    assert!(matches!(late.channel_error(), Some(ChannelError::ChannelClosed(_))));
}

#[tokio::test]
async fn test_withdraw_and_close() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();

    let payment = p.alice.create_payment(id, yocto(8)).await.unwrap();
    let close = p.bob.create_close_request(id).await.unwrap();
    let closed = p.bob.withdraw_and_close(&payment, &close).await.unwrap();

    assert!(closed.is_closed());
    assert_eq!(closed.withdrawn_balance(), yocto(8));
    assert_eq!(p.chain.balance_of(&account("bob.near")).await, yocto(8));
    assert_eq!(p.chain.balance_of(&account("alice.near")).await, yocto(2));
}

// ============================================================================
// Force close
// ============================================================================

#[tokio::test]
async fn test_force_close_window() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();
    let payment = p.alice.create_payment(id, yocto(2)).await.unwrap();
    p.bob.receive_payment(&payment).await.unwrap();

    let closing = p.alice.start_force_close_channel(id).await.unwrap();
    assert_eq!(closing.status(), ChannelStatus::ForceClosing);
    let started = closing.force_close_started().unwrap();
    assert_eq!(
        p.chain.channel(id).await.unwrap().force_close_started,
        Some(started)
    );

    let err = p.alice.finish_force_close_channel(id).await.unwrap_err();
    assert!(matches!(
        err.channel_error(),
        Some(ChannelError::DisputeWindowNotElapsed { .. })
    ));

    // The counterparty may still record a higher state during the window.
    let higher = sign_spent(&channel, 5);
    p.alice.receive_payment(&higher).await.unwrap();

    p.chain.advance_time(HARD_CLOSE_TIMEOUT).await;
    let closed = p.alice.finish_force_close_channel(id).await.unwrap();
    assert_eq!(closed.status(), ChannelStatus::Closed);
    assert_eq!(p.chain.balance_of(&account("alice.near")).await, yocto(10));

    let err = p.alice.receive_payment(&sign_spent(&channel, 6)).await.unwrap_err();
    assert!(matches!(err.channel_error(), Some(ChannelError::ChannelClosed(_))));
    let err = p.alice.start_force_close_channel(id).await.unwrap_err();
    assert!(matches!(err.channel_error(), Some(ChannelError::ChannelClosed(_))));
}

#[tokio::test]
async fn test_force_close_needs_chain_time() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();
    p.bob.start_force_close_channel(id).await.unwrap();

    // Just short of the window in chain time.
    p.chain.advance_time(HARD_CLOSE_TIMEOUT - 2_000_000_000).await;
    let err = p.bob.finish_force_close_channel(id).await.unwrap_err();
    assert!(matches!(
        err.channel_error(),
        Some(ChannelError::DisputeWindowNotElapsed { .. })
    ));
    let record = p.bob.get_channel(id, false).await.unwrap().unwrap();
    assert_eq!(record.status(), ChannelStatus::ForceClosing);
}

#[tokio::test]
async fn test_topup_rejected_while_closing() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();
    p.bob.start_force_close_channel(id).await.unwrap();

    // Alice has not synced, so the chain is the one refusing.
    let err = p.alice.topup(id, yocto(1)).await.unwrap_err();
    assert!(matches!(err, ClientError::TransactionRejected { .. }));
    let record = p.alice.get_channel(id, false).await.unwrap().unwrap();
    assert_eq!(record.added_balance(), yocto(10));
}

// ============================================================================
// Chain failures
// ============================================================================

#[tokio::test]
async fn test_failed_topup_leaves_record() {
    let p = parties().await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();

    p.chain.fail_next_transaction("Exceeded the prepaid gas").await;
    let err = p.alice.topup(id, yocto(5)).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::TransactionRejected { ref method, .. } if method == "topup"
    ));
    assert!(!err.is_transient());

    p.chain.set_unavailable(true).await;
    let err = p.alice.topup(id, yocto(5)).await.unwrap_err();
    assert!(err.is_transient());
    p.chain.set_unavailable(false).await;

    let record = p.alice.get_channel(id, true).await.unwrap().unwrap();
    assert_eq!(record.added_balance(), yocto(10));
    assert_eq!(p.chain.channel(id).await.unwrap().added_balance, yocto(10));
}

#[tokio::test]
async fn test_failed_open_stays_opening() {
    let p = parties().await;
    p.chain.fail_next_transaction("Not enough balance").await;

    let receiver = p.bob.signer().unwrap().account();
    let err = p.alice.open_channel(receiver, yocto(10)).await.unwrap_err();
    assert!(matches!(err, ClientError::TransactionRejected { .. }));

    let channels = p.alice.list_channels().await.unwrap();
    assert_eq!(channels.len(), 1);
    let id = channels[0].channel_id();
    assert_eq!(channels[0].status(), ChannelStatus::Opening);

    let synced = p.alice.get_channel(id, true).await.unwrap().unwrap();
    assert_eq!(synced.status(), ChannelStatus::Opening);
    let err = p.alice.create_payment(id, yocto(1)).await.unwrap_err();
    assert!(matches!(err.channel_error(), Some(ChannelError::InvalidState { .. })));
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_filesystem_ledger_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = LedgerConfig::new().with_root_dir(temp_dir.path());

    let p = parties_with_ledger(ChannelLedger::open(&config).await.unwrap()).await;
    let channel = open(&p, 10).await;
    let id = channel.channel_id();
    p.alice.create_payment(id, yocto(3)).await.unwrap();

    let text = std::fs::read_to_string(temp_dir.path().join(format!("{id}.json"))).unwrap();
    assert!(text.contains("\n  \"channel_id\""));

    let reopened = ChannelLedger::open(&config).await.unwrap();
    let stored = reopened.load_channel(id).await.unwrap().unwrap();
    assert_eq!(stored.spent_balance(), yocto(3));
    assert_eq!(stored.status(), ChannelStatus::Active);
    assert_eq!(stored.sender_secret_key(), channel.sender_secret_key());
}
