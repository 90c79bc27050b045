//! Registration listings.
//!
//! Members see their own registrations without display codes; admins page
//! through every registration, display codes included.

use super::Dependencies;
use arena_core::commerce::{Page, Registration, RegistrationQuery, RegistrationStatus};
use arena_core::types::{
    CompetitionId, ParticipantDetails, RegistrationId, RegistrationTypeId, Role, User,
};
use arena_core::{ArenaError, ArenaResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registration as its owner sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRegistration {
    /// Registration id
    pub id: RegistrationId,
    /// Public registration number
    pub registration_number: String,
    /// Competition
    pub competition_id: CompetitionId,
    /// Registration type
    pub registration_type_id: RegistrationTypeId,
    /// Status
    pub status: RegistrationStatus,
    /// Amount paid, major units
    pub amount_paid: f64,
    /// Team and members
    pub participant_details: ParticipantDetails,
    /// Confirmation time
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl From<Registration> for MemberRegistration {
    fn from(registration: Registration) -> Self {
        Self {
            id: registration.id,
            registration_number: registration.registration_number,
            competition_id: registration.competition_id,
            registration_type_id: registration.registration_type_id,
            status: registration.status,
            amount_paid: registration.amount_paid.as_major(),
            participant_details: registration.participant,
            confirmed_at: registration.confirmed_at,
            created_at: registration.created_at,
        }
    }
}

/// Listing operations.
pub struct RegistrationService {
    deps: Dependencies,
}

impl RegistrationService {
    /// New service.
    #[must_use]
    pub const fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    /// The caller's registrations, newest first.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn for_member(&self, user: &User) -> ArenaResult<Vec<MemberRegistration>> {
        let rows = self.deps.store.registrations_for_user(user.id).await?;
        Ok(rows.into_iter().map(MemberRegistration::from).collect())
    }

    /// Every registration, newest first.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless `admin` is an admin.
    pub async fn list(
        &self,
        admin: &User,
        query: RegistrationQuery,
    ) -> ArenaResult<Page<Registration>> {
        if admin.role != Role::Admin {
            return Err(ArenaError::forbidden("Admin access required"));
        }
        Ok(self.deps.store.list_registrations(&query).await?)
    }
}
