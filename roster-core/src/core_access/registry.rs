//! Ordered participant records for a single conversation
//!
//! The registry owns the membership history of one conversation. Records are
//! appended in join order and never deleted: removal flips a record to
//! `Removed`, and re-adding the same user appends a fresh record. At most one
//! live (invited or active) record exists per user at any time.

use super::participant::{Participant, ParticipantRole, ParticipantStatus};
use super::types::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Participant registry with membership invariants
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantRegistry {
    records: Vec<Participant>,
}

/// A broken registry invariant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("User {0} already has a live membership record")]
    DuplicateLiveRecord(UserId),

    #[error("User {0} has no live membership record")]
    NoLiveRecord(UserId),

    #[error("Invalid status transition for {user}: {from} -> {to}")]
    InvalidTransition {
        user: UserId,
        from: ParticipantStatus,
        to: ParticipantStatus,
    },
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Participant>) -> Self {
        Self { records }
    }

    /// All records, including removed history, in join order
    pub fn records(&self) -> &[Participant] {
        &self.records
    }

    /// The live (invited or active) record for `user_id`
    pub fn live(&self, user_id: &UserId) -> Option<&Participant> {
        self.records
            .iter()
            .rev()
            .find(|p| p.is_live() && &p.user_id == user_id)
    }

    fn live_mut(&mut self, user_id: &UserId) -> Option<&mut Participant> {
        self.records
            .iter_mut()
            .rev()
            .find(|p| p.is_live() && &p.user_id == user_id)
    }

    /// The active record for `user_id`
    pub fn active(&self, user_id: &UserId) -> Option<&Participant> {
        self.live(user_id).filter(|p| p.is_active())
    }

    pub fn is_active(&self, user_id: &UserId) -> bool {
        self.active(user_id).is_some()
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.records.iter().filter(|p| p.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_participants().count()
    }

    pub fn active_admin_count(&self) -> usize {
        self.records.iter().filter(|p| p.is_active_admin()).count()
    }

    /// True when `user_id` is the only active admin
    pub fn is_sole_active_admin(&self, user_id: &UserId) -> bool {
        self.active(user_id)
            .map(|p| p.role == ParticipantRole::Admin)
            .unwrap_or(false)
            && self.active_admin_count() == 1
    }

    /// Append a new record; the user must not already hold a live one
    pub fn push(&mut self, participant: Participant) -> Result<(), RegistryError> {
        if self.live(&participant.user_id).is_some() {
            return Err(RegistryError::DuplicateLiveRecord(participant.user_id));
        }
        self.records.push(participant);
        Ok(())
    }

    /// Move an invited record to active, optionally overriding its role
    pub fn activate(
        &mut self,
        user_id: &UserId,
        role: Option<ParticipantRole>,
    ) -> Result<&Participant, RegistryError> {
        let record = self
            .live_mut(user_id)
            .ok_or_else(|| RegistryError::NoLiveRecord(user_id.clone()))?;

        if record.status != ParticipantStatus::Invited {
            return Err(RegistryError::InvalidTransition {
                user: user_id.clone(),
                from: record.status,
                to: ParticipantStatus::Active,
            });
        }

        record.status = ParticipantStatus::Active;
        record.joined_at = Timestamp::now();
        if let Some(role) = role {
            record.role = role;
        }
        Ok(record)
    }

    /// Mark the live record of `user_id` as removed
    pub fn mark_removed(&mut self, user_id: &UserId) -> Result<(), RegistryError> {
        let record = self
            .live_mut(user_id)
            .ok_or_else(|| RegistryError::NoLiveRecord(user_id.clone()))?;
        record.status = ParticipantStatus::Removed;
        record.removed_at = Some(Timestamp::now());
        Ok(())
    }

    /// Change the role of the active record of `user_id`
    pub fn set_role(
        &mut self,
        user_id: &UserId,
        role: ParticipantRole,
    ) -> Result<(), RegistryError> {
        let record = self
            .live_mut(user_id)
            .filter(|p| p.is_active())
            .ok_or_else(|| RegistryError::NoLiveRecord(user_id.clone()))?;
        record.role = role;
        Ok(())
    }

    /// Check the structural invariant: one live record per user
    pub fn check_unique_live(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for p in self.records.iter().filter(|p| p.is_live()) {
            if !seen.insert(&p.user_id) {
                return Err(RegistryError::DuplicateLiveRecord(p.user_id.clone()));
            }
        }
        Ok(())
    }
}
