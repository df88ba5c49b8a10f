//! # Reward selection
//!
//! Tracks which reward the viewer intends to back and decides whether a
//! selection may be committed straight away or needs the viewer to confirm
//! that they are replacing an existing backing.
//!
//! ```text
//! Idle ──select (no conflict)──► Idle            (flow advances)
//! Idle ──select (conflict)─────► PendingConfirmation
//! PendingConfirmation ──yes───► Confirmed        (flow advances)
//! PendingConfirmation ──no────► Cancelled        (selection reverts)
//! ```
//!
//! A selection conflicts with the backing when the viewer picks a different
//! reward, either reward involves add-ons, and the shipping type changes or
//! the backing carried add-ons that would be dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{CheckoutError, Result};
use crate::types::{Backing, Reward};

/// Step of the pledge flow a committed selection navigates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPage {
    AddOns,
    ConfirmDetails,
}

impl FlowPage {
    /// Page index inside the pledge pager.
    pub fn index(self) -> u8 {
        match self {
            Self::AddOns => 1,
            Self::ConfirmDetails => 2,
        }
    }

    fn for_reward(reward: &Reward) -> Self {
        if reward.has_add_ons {
            Self::AddOns
        } else {
            Self::ConfirmDetails
        }
    }
}

/// Navigation signal emitted every time a selection is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowAdvance {
    pub page: FlowPage,
    pub expanded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPhase {
    Idle,
    PendingConfirmation,
    Confirmed,
    Cancelled,
}

/// Result of a selection action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SelectionOutcome {
    /// The reward was committed; navigate to `advance.page`.
    Advanced { reward_id: u64, advance: FlowAdvance },
    /// The viewer must confirm before the selection takes effect.
    ConfirmationRequired { initial_reward_index: usize },
    /// The pending selection was declined.
    Reverted { initial_reward_index: usize },
    /// A confirmation answer arrived with nothing pending.
    NothingPending,
}

/// Read-only view rendered by the rewards carousel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionView {
    pub phase: SelectionPhase,
    pub initial_reward_index: usize,
    pub selected_reward_id: Option<u64>,
    pub pending_reward_id: Option<u64>,
    pub show_alert_dialog: bool,
    pub expanded: bool,
}

#[derive(Debug, Clone)]
pub struct RewardSelectionState {
    rewards: Vec<Reward>,
    backing: Option<Backing>,
    selected: Option<usize>,
    pending: Option<usize>,
    phase: SelectionPhase,
    expanded: bool,
}

impl RewardSelectionState {
    pub fn new(rewards: Vec<Reward>, backing: Option<Backing>) -> Self {
        let selected = backing
            .as_ref()
            .and_then(|b| rewards.iter().position(|r| r.id == b.reward_id()));
        Self {
            rewards,
            backing,
            selected,
            pending: None,
            phase: SelectionPhase::Idle,
            expanded: false,
        }
    }

    pub fn rewards(&self) -> &[Reward] {
        &self.rewards
    }

    pub fn backing(&self) -> Option<&Backing> {
        self.backing.as_ref()
    }

    /// Position of the committed reward, or of the backed reward, or 0.
    pub fn initial_reward_index(&self) -> usize {
        self.selected.unwrap_or(0)
    }

    pub fn selected_reward(&self) -> Option<&Reward> {
        self.selected.map(|i| &self.rewards[i])
    }

    pub fn pending_reward(&self) -> Option<&Reward> {
        self.pending.map(|i| &self.rewards[i])
    }

    pub fn phase(&self) -> SelectionPhase {
        self.phase
    }

    pub fn view(&self) -> SelectionView {
        SelectionView {
            phase: self.phase,
            initial_reward_index: self.initial_reward_index(),
            selected_reward_id: self.selected_reward().map(|r| r.id),
            pending_reward_id: self.pending_reward().map(|r| r.id),
            show_alert_dialog: self.pending.is_some(),
            expanded: self.expanded,
        }
    }

    /// Handle a tap on a reward's select button.
    pub fn select_reward(&mut self, reward_id: u64, now: DateTime<Utc>) -> Result<SelectionOutcome> {
        let index = self
            .rewards
            .iter()
            .position(|r| r.id == reward_id)
            .ok_or(CheckoutError::RewardNotFound(reward_id))?;
        let reward = &self.rewards[index];

        // The backed reward stays selectable after it ends or sells out.
        let is_backed = self.backing.as_ref().map(|b| b.reward_id()) == Some(reward_id);
        if !is_backed && !reward.is_available(now) {
            return Err(CheckoutError::RewardUnavailable(reward_id));
        }

        if self.conflicts_with_backing(reward) {
            self.pending = Some(index);
            self.phase = SelectionPhase::PendingConfirmation;
            info!(reward_id, "Reward selection conflicts with existing backing");
            return Ok(SelectionOutcome::ConfirmationRequired {
                initial_reward_index: self.initial_reward_index(),
            });
        }

        Ok(self.commit(index, SelectionPhase::Idle))
    }

    /// Handle the viewer's answer to the replace-backing prompt.
    pub fn on_confirmation(&mut self, was_positive: bool) -> SelectionOutcome {
        let Some(index) = self.pending.take() else {
            return SelectionOutcome::NothingPending;
        };

        if was_positive {
            self.commit(index, SelectionPhase::Confirmed)
        } else {
            self.phase = SelectionPhase::Cancelled;
            debug!("Pending reward selection declined");
            SelectionOutcome::Reverted {
                initial_reward_index: self.initial_reward_index(),
            }
        }
    }

    fn commit(&mut self, index: usize, phase: SelectionPhase) -> SelectionOutcome {
        self.selected = Some(index);
        self.pending = None;
        self.phase = phase;
        self.expanded = true;

        let reward = &self.rewards[index];
        let advance = FlowAdvance {
            page: FlowPage::for_reward(reward),
            expanded: true,
        };
        info!(
            reward_id = reward.id,
            page = advance.page.index(),
            "Reward selection committed"
        );
        SelectionOutcome::Advanced {
            reward_id: reward.id,
            advance,
        }
    }

    fn conflicts_with_backing(&self, reward: &Reward) -> bool {
        let Some(backing) = &self.backing else {
            return false;
        };
        let backed = &backing.reward;

        reward.id != backed.id
            && (reward.has_add_ons || backed.has_add_ons)
            && (reward.shipping_type != backed.shipping_type || !backing.add_ons.is_empty())
    }
}
