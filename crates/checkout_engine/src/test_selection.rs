use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use crate::rewards::{FlowPage, RewardSelectionState, SelectionOutcome, SelectionPhase};
use crate::types::{AddOnSelections, Backing, Reward, ShippingType};
use crate::CheckoutError;

fn plain_reward(id: u64) -> Reward {
    Reward::new(id, format!("Reward {id}"), Decimal::from(20))
}

fn add_on_reward(id: u64) -> Reward {
    plain_reward(id)
        .with_add_ons(true)
        .with_shipping_type(ShippingType::Anywhere)
}

fn advance_of(outcome: &SelectionOutcome) -> (u8, bool) {
    match outcome {
        SelectionOutcome::Advanced { advance, .. } => (advance.page.index(), advance.expanded),
        other => panic!("expected flow advance, got {other:?}"),
    }
}

#[test]
fn test_reward_without_add_ons_advances_to_confirm_details() {
    let mut state = RewardSelectionState::new(vec![plain_reward(1), plain_reward(2)], None);

    let outcome = state.select_reward(2, Utc::now()).unwrap();

    assert_eq!(advance_of(&outcome), (2, true));
    let view = state.view();
    assert!(view.expanded);
    assert!(!view.show_alert_dialog);
    assert_eq!(view.selected_reward_id, Some(2));
    assert_eq!(view.initial_reward_index, 1);
}

#[test]
fn test_reward_with_add_ons_advances_to_add_ons_page() {
    let mut state = RewardSelectionState::new(vec![plain_reward(1), add_on_reward(2)], None);

    let outcome = state.select_reward(2, Utc::now()).unwrap();

    assert_eq!(advance_of(&outcome), (1, true));
    if let SelectionOutcome::Advanced { advance, .. } = outcome {
        assert_eq!(advance.page, FlowPage::AddOns);
    }
}

#[test]
fn test_reselecting_committed_reward_advances_again() {
    let mut state = RewardSelectionState::new(vec![plain_reward(1)], None);

    let first = state.select_reward(1, Utc::now()).unwrap();
    let second = state.select_reward(1, Utc::now()).unwrap();

    assert_eq!(advance_of(&first), (2, true));
    assert_eq!(advance_of(&second), (2, true));
    assert_eq!(state.view().selected_reward_id, Some(1));
}

#[test]
fn test_conflicting_selection_requires_confirmation() {
    let backed = add_on_reward(1);
    let backing =
        Backing::new("backing-1", backed.clone()).with_add_ons(AddOnSelections::new().with(50, 1));
    let other = plain_reward(2).with_shipping_type(ShippingType::NoShipping);
    let mut state = RewardSelectionState::new(vec![backed, other], Some(backing));

    let outcome = state.select_reward(2, Utc::now()).unwrap();

    assert_eq!(
        outcome,
        SelectionOutcome::ConfirmationRequired {
            initial_reward_index: 0
        }
    );
    let view = state.view();
    assert!(view.show_alert_dialog);
    assert_eq!(view.initial_reward_index, 0);
    assert_eq!(view.selected_reward_id, Some(1));
    assert_eq!(view.pending_reward_id, Some(2));
    assert_eq!(view.phase, SelectionPhase::PendingConfirmation);
}

#[test]
fn test_different_shipping_type_conflicts_without_backed_add_ons() {
    let backed = plain_reward(1).with_shipping_type(ShippingType::SingleLocation);
    let backing = Backing::new("backing-1", backed.clone());
    let mut state = RewardSelectionState::new(vec![backed, add_on_reward(2)], Some(backing));

    let outcome = state.select_reward(2, Utc::now()).unwrap();

    assert!(matches!(outcome, SelectionOutcome::ConfirmationRequired { .. }));
}

#[test]
fn test_same_shipping_type_without_backed_add_ons_commits() {
    let backed = add_on_reward(1);
    let backing = Backing::new("backing-1", backed.clone());
    let mut state = RewardSelectionState::new(vec![backed, add_on_reward(2)], Some(backing));

    let outcome = state.select_reward(2, Utc::now()).unwrap();

    assert_eq!(advance_of(&outcome), (1, true));
}

#[test]
fn test_neither_reward_has_add_ons_commits() {
    let backed = plain_reward(1).with_shipping_type(ShippingType::Anywhere);
    let backing = Backing::new("backing-1", backed.clone());
    let mut state = RewardSelectionState::new(vec![backed, plain_reward(2)], Some(backing));

    let outcome = state.select_reward(2, Utc::now()).unwrap();

    assert_eq!(advance_of(&outcome), (2, true));
}

#[test]
fn test_confirming_commits_with_add_on_branching() {
    let backed = plain_reward(1).with_shipping_type(ShippingType::SingleLocation);
    let backing = Backing::new("backing-1", backed.clone());
    let rewards = vec![backed, add_on_reward(2), plain_reward(3).with_add_ons(true)];

    let mut state = RewardSelectionState::new(rewards, Some(backing));
    state.select_reward(2, Utc::now()).unwrap();
    let outcome = state.on_confirmation(true);
    assert_eq!(advance_of(&outcome), (1, true));
    assert_eq!(state.view().selected_reward_id, Some(2));
    assert_eq!(state.phase(), SelectionPhase::Confirmed);
    assert!(!state.view().show_alert_dialog);

    let backed_with_add_ons = add_on_reward(1).with_shipping_type(ShippingType::Anywhere);
    let backing = Backing::new("backing-2", backed_with_add_ons.clone());
    let mut state = RewardSelectionState::new(vec![backed_with_add_ons, plain_reward(4)], Some(backing));
    state.select_reward(4, Utc::now()).unwrap();
    let outcome = state.on_confirmation(true);
    assert_eq!(advance_of(&outcome), (2, true));
}

#[test]
fn test_declining_reverts_without_advance() {
    let backed = add_on_reward(1);
    let backing =
        Backing::new("backing-1", backed.clone()).with_add_ons(AddOnSelections::new().with(50, 2));
    let mut state = RewardSelectionState::new(vec![backed, plain_reward(2)], Some(backing));

    state.select_reward(2, Utc::now()).unwrap();
    let outcome = state.on_confirmation(false);

    assert_eq!(
        outcome,
        SelectionOutcome::Reverted {
            initial_reward_index: 0
        }
    );
    let view = state.view();
    assert!(!view.show_alert_dialog);
    assert_eq!(view.selected_reward_id, Some(1));
    assert_eq!(view.pending_reward_id, None);
    assert_eq!(view.phase, SelectionPhase::Cancelled);
}

#[test]
fn test_confirmation_without_pending_selection() {
    let mut state = RewardSelectionState::new(vec![plain_reward(1)], None);
    assert_eq!(state.on_confirmation(true), SelectionOutcome::NothingPending);
    assert_eq!(state.view().selected_reward_id, None);
}

#[test]
fn test_initial_index_follows_backing() {
    let rewards = vec![plain_reward(1), plain_reward(2), plain_reward(3)];
    let backing = Backing::new("backing-1", plain_reward(3));

    let state = RewardSelectionState::new(rewards.clone(), Some(backing));
    assert_eq!(state.initial_reward_index(), 2);

    let state = RewardSelectionState::new(rewards, None);
    assert_eq!(state.initial_reward_index(), 0);

    let empty = RewardSelectionState::new(Vec::new(), None);
    assert_eq!(empty.initial_reward_index(), 0);
}

#[test]
fn test_unknown_reward_is_rejected() {
    let mut state = RewardSelectionState::new(Vec::new(), None);
    assert_eq!(
        state.select_reward(9, Utc::now()),
        Err(CheckoutError::RewardNotFound(9))
    );
}

#[test]
fn test_unavailable_reward_is_rejected_unless_backed() {
    let now = Utc::now();
    let ended = plain_reward(1).with_ends_at(now - Duration::hours(1));
    let sold_out = plain_reward(2).with_limit(10, 0);

    let mut state = RewardSelectionState::new(vec![ended.clone(), sold_out], None);
    assert_eq!(
        state.select_reward(1, now),
        Err(CheckoutError::RewardUnavailable(1))
    );
    assert_eq!(
        state.select_reward(2, now),
        Err(CheckoutError::RewardUnavailable(2))
    );

    let backing = Backing::new("backing-1", ended.clone());
    let mut state = RewardSelectionState::new(vec![ended], Some(backing));
    assert!(matches!(
        state.select_reward(1, now),
        Ok(SelectionOutcome::Advanced { reward_id: 1, .. })
    ));
}
