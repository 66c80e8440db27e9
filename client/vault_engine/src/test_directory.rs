//! Vault listing and view-models across several vaults.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::creation::{VaultCreationForm, VaultCreator};
use crate::directory::VaultDirectory;
use crate::ledger::memory::{MemoryLedger, VaultAttribute};
use crate::registry::{ChainRegistry, NetworkView};
use crate::types::{Address, NetworkId};
use crate::vault::FieldRead;

const MOCK_USDC: Address = Address::repeat_byte(0x70);
const STRANGE_TOKEN: Address = Address::repeat_byte(0x55);
const BENEFICIARY: Address = Address::repeat_byte(0xbe);
const OTHER: Address = Address::repeat_byte(0x0b);

const WAIT: Duration = Duration::from_secs(30);

fn local() -> NetworkView {
    ChainRegistry::builtin().resolve(Some(NetworkId::FOUNDRY), NetworkId::FOUNDRY, Some(MOCK_USDC))
}

#[tokio::test]
async fn views_keep_registry_order() {
    let ledger = Arc::new(MemoryLedger::new(NetworkId::FOUNDRY));
    let a = ledger.add_vault("Food Bank", BENEFICIARY, MOCK_USDC, 100_000_000);
    let b = ledger.add_vault("Library", OTHER, MOCK_USDC, 1);
    let c = ledger.add_vault("Shelter", BENEFICIARY, MOCK_USDC, 200_000_000);
    ledger.mint(MOCK_USDC, a, 50_000_000);

    let directory = VaultDirectory::new(ledger, local());
    let mine = directory.views_for_beneficiary(BENEFICIARY, WAIT).await.unwrap();
    assert_eq!(mine.iter().map(|v| v.address).collect::<Vec<_>>(), vec![a, c]);

    let food = &mine[0];
    assert_eq!(food.name, FieldRead::Ready("Food Bank".to_string()));
    assert_eq!(food.symbol.as_deref(), Some("USDC"));
    assert_eq!(food.balance, FieldRead::Ready("50".to_string()));
    assert_eq!(food.target, FieldRead::Ready("100".to_string()));
    assert_eq!(food.progress, Some(50));
    assert!(!food.has_failures());

    assert_eq!(mine[1].progress, Some(0));

    let all = directory.views_all(WAIT).await.unwrap();
    assert_eq!(all.iter().map(|v| v.address).collect::<Vec<_>>(), vec![a, b, c]);
}

#[tokio::test]
async fn one_broken_vault_does_not_hide_the_rest() {
    let ledger = Arc::new(MemoryLedger::new(NetworkId::FOUNDRY));
    let good = ledger.add_vault("Good", BENEFICIARY, MOCK_USDC, 10_000_000);
    let broken = ledger.add_vault("Broken", BENEFICIARY, MOCK_USDC, 10_000_000);
    ledger.fail_reads_for(broken);
    ledger.mint(MOCK_USDC, good, 2_500_000);

    let views = VaultDirectory::new(ledger, local())
        .views_for_beneficiary(BENEFICIARY, WAIT)
        .await
        .unwrap();
    assert_eq!(views.len(), 2);

    assert_eq!(views[0].progress, Some(25));
    assert_eq!(views[0].balance, FieldRead::Ready("2.5".to_string()));

    assert!(views[1].has_failures());
    assert!(matches!(views[1].name, FieldRead::Failed(_)));
    assert!(matches!(views[1].balance, FieldRead::Failed(_)));
    assert_eq!(views[1].progress, None);
}

#[tokio::test]
async fn unrecognised_token_keeps_raw_fields() {
    let ledger = Arc::new(MemoryLedger::new(NetworkId::FOUNDRY));
    let vault = ledger.add_vault("Odd", BENEFICIARY, STRANGE_TOKEN, 400);
    ledger.mint(STRANGE_TOKEN, vault, 100);

    let views = VaultDirectory::new(ledger, local()).views_all(WAIT).await.unwrap();
    let view = &views[0];
    assert_eq!(view.token, FieldRead::Ready(STRANGE_TOKEN));
    assert_eq!(view.symbol, None);
    match &view.balance {
        FieldRead::Failed(reason) => assert!(reason.contains("not recognised")),
        other => panic!("expected failed balance, got {other:?}"),
    }
    // Progress is unit-free and still available.
    assert_eq!(view.progress, Some(25));
}

#[tokio::test]
async fn empty_registry_lists_nothing() {
    let ledger = Arc::new(MemoryLedger::new(NetworkId::FOUNDRY));
    let views = VaultDirectory::new(ledger, local())
        .views_for_beneficiary(BENEFICIARY, WAIT)
        .await
        .unwrap();
    assert!(views.is_empty());
}

#[tokio::test]
async fn created_vault_appears_in_listing() {
    let ledger = Arc::new(MemoryLedger::new(NetworkId::FOUNDRY));
    let network = local();
    let mut form = VaultCreationForm {
        name: "Community Garden".to_string(),
        beneficiary: BENEFICIARY.to_string(),
        currency: Some(MOCK_USDC),
        target: "250.5".to_string(),
    };
    VaultCreator::new()
        .create(ledger.as_ref(), Some(OTHER), &network, &mut form)
        .await
        .unwrap();

    let views = VaultDirectory::new(ledger, network)
        .views_for_beneficiary(BENEFICIARY, WAIT)
        .await
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, FieldRead::Ready("Community Garden".to_string()));
    assert_eq!(views[0].target, FieldRead::Ready("250.5".to_string()));
    assert_eq!(views[0].beneficiary, FieldRead::Ready(BENEFICIARY));
    assert_eq!(views[0].short_address, views[0].address.short());
}

#[tokio::test(start_paused = true)]
async fn stalled_vault_stays_pending_while_others_render() {
    let ledger = Arc::new(MemoryLedger::new(NetworkId::FOUNDRY));
    let healthy = ledger.add_vault("Food Bank", BENEFICIARY, MOCK_USDC, 100_000_000);
    let stalled = ledger.add_vault("Stuck", BENEFICIARY, MOCK_USDC, 100_000_000);
    ledger.mint(MOCK_USDC, healthy, 10_000_000);
    ledger.hold(stalled, VaultAttribute::Name);

    let views = VaultDirectory::new(ledger, local())
        .resolve_within(&[healthy, stalled], Duration::from_secs(3600))
        .await;
    assert_eq!(views.len(), 2);

    assert_eq!(views[0].name, FieldRead::Ready("Food Bank".to_string()));
    assert_eq!(views[0].progress, Some(10));

    assert!(views[1].name.is_pending());
    assert!(!views[1].has_failures());
    assert_eq!(views[1].beneficiary, FieldRead::Ready(BENEFICIARY));
    assert_eq!(views[1].progress, Some(0));
}

#[tokio::test]
async fn listing_fills_in_row_by_row() {
    let ledger = Arc::new(MemoryLedger::new(NetworkId::FOUNDRY));
    let first = ledger.add_vault("First", BENEFICIARY, MOCK_USDC, 4_000_000);
    let second = ledger.add_vault("Second", BENEFICIARY, MOCK_USDC, 4_000_000);
    ledger.mint(MOCK_USDC, first, 1_000_000);
    ledger.hold(second, VaultAttribute::Target);

    let directory = VaultDirectory::new(ledger.clone(), local());
    let vaults = [first, second];
    let mut listing = directory.listing(&vaults);
    let initial = listing.views();
    assert_eq!(initial.len(), 2);
    assert!(initial.iter().all(|v| v.name.is_pending() && v.progress.is_none()));

    // Five updates per vault; the second vault's target is held back.
    let mut updates = directory.updates(&vaults);
    for _ in 0..9 {
        let update = updates.next().await.unwrap();
        assert!(listing.apply(update).is_some());
    }
    assert!(futures::poll!(updates.next()).is_pending());

    let rows = listing.views();
    assert_eq!(rows[0].progress, Some(25));
    assert!(!listing.is_complete());
    assert!(rows[1].target.is_pending());
    assert_eq!(rows[1].name, FieldRead::Ready("Second".to_string()));
    assert_eq!(rows[1].progress, None);

    ledger.release(second, VaultAttribute::Target);
    let row = listing.apply(updates.next().await.unwrap()).unwrap();
    assert_eq!(row.address, second);
    assert_eq!(row.target, FieldRead::Ready("4".to_string()));
    assert_eq!(row.progress, Some(0));
    assert!(listing.is_complete());
    assert!(updates.next().await.is_none());
}
