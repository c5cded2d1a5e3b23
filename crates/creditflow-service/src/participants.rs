use tracing::info;

use creditflow_core::activity::{Activity, ActivityStatus};
use creditflow_core::application::{Application, ApplicationFilter};
use creditflow_core::identity::{Identity, UserType};
use creditflow_core::participant::{
    AddParticipants, CreditAssignment, EnrichedParticipant, Participant,
};

use crate::{ActivityService, ServiceError};

impl ActivityService {
    /// Add students to an activity's ledger. Users already on the ledger
    /// are skipped; every user id must resolve to a student profile.
    pub async fn add_participants(
        &self,
        identity: &Identity,
        activity_id: &str,
        input: &AddParticipants,
    ) -> Result<Vec<EnrichedParticipant>, ServiceError> {
        let activity = self.db.get_activity(activity_id)?;
        ensure_can_manage_ledger(identity, &activity)?;
        ensure_ledger_unfrozen(&activity)?;

        if input.user_ids.is_empty() {
            return Err(ServiceError::Validation("no user ids given".into()));
        }
        validate_credits(input.credits)?;

        let mut entries = Vec::with_capacity(input.user_ids.len());
        for user_id in &input.user_ids {
            let profile = self.directory.profile(user_id).await.map_err(|e| match e {
                ServiceError::NotFound(msg) => ServiceError::Validation(msg),
                other => other,
            })?;
            if profile.user_type != UserType::Student {
                return Err(ServiceError::Validation(format!(
                    "user {user_id} is not a student"
                )));
            }
            entries.push((user_id.clone(), input.credits));
        }

        let added = self.db.add_participants(activity_id, &entries)?;
        info!(
            activity_id = %activity_id,
            added = added.len(),
            "participants added"
        );

        let mut enriched = Vec::with_capacity(added.len());
        for participant in added {
            enriched.push(self.enrich(participant).await);
        }
        Ok(enriched)
    }

    pub async fn list_participants(
        &self,
        identity: &Identity,
        activity_id: &str,
    ) -> Result<Vec<EnrichedParticipant>, ServiceError> {
        let activity = self.db.get_activity(activity_id)?;
        self.ensure_can_view(identity, &activity)?;

        let rows = self.db.list_participants(activity_id)?;
        let mut enriched = Vec::with_capacity(rows.len());
        for participant in rows {
            enriched.push(self.enrich(participant).await);
        }
        Ok(enriched)
    }

    pub fn set_participant_credits(
        &self,
        identity: &Identity,
        activity_id: &str,
        user_id: &str,
        credits: f64,
    ) -> Result<Participant, ServiceError> {
        let activity = self.db.get_activity(activity_id)?;
        ensure_can_manage_ledger(identity, &activity)?;
        ensure_ledger_unfrozen(&activity)?;
        validate_credits(credits)?;

        Ok(self
            .db
            .set_participant_credits(activity_id, user_id, credits)?)
    }

    /// Overwrite credits for several participants at once. Ids without a
    /// live ledger row are skipped.
    pub fn set_many_participant_credits(
        &self,
        identity: &Identity,
        activity_id: &str,
        assignments: &[CreditAssignment],
    ) -> Result<Vec<Participant>, ServiceError> {
        let activity = self.db.get_activity(activity_id)?;
        ensure_can_manage_ledger(identity, &activity)?;
        ensure_ledger_unfrozen(&activity)?;

        if assignments.is_empty() {
            return Err(ServiceError::Validation("no assignments given".into()));
        }
        for assignment in assignments {
            validate_credits(assignment.credits)?;
        }

        let pairs: Vec<(String, f64)> = assignments
            .iter()
            .map(|a| (a.user_id.clone(), a.credits))
            .collect();
        Ok(self.db.set_many_participant_credits(activity_id, &pairs)?)
    }

    pub fn remove_participant(
        &self,
        identity: &Identity,
        activity_id: &str,
        user_id: &str,
    ) -> Result<(), ServiceError> {
        let activity = self.db.get_activity(activity_id)?;
        ensure_can_manage_ledger(identity, &activity)?;
        ensure_ledger_unfrozen(&activity)?;

        self.db.remove_participant(activity_id, user_id)?;
        info!(activity_id = %activity_id, user_id = %user_id, "participant removed");
        Ok(())
    }

    /// List generated applications. Students only see their own rows
    /// unless they own the filtered activity.
    pub fn list_applications(
        &self,
        identity: &Identity,
        filter: &ApplicationFilter,
    ) -> Result<Vec<Application>, ServiceError> {
        let mut filter = filter.clone();
        if identity.is_student() {
            match filter.activity_id {
                Some(ref activity_id) => {
                    let activity = self.db.get_activity(activity_id)?;
                    self.ensure_can_view(identity, &activity)?;
                }
                None => filter.user_id = Some(identity.user_id.clone()),
            }
        }
        Ok(self.db.list_applications(&filter)?)
    }

    /// Directory lookups are best-effort here: a participant whose profile
    /// has vanished still shows up on the ledger, just without a name.
    async fn enrich(&self, participant: Participant) -> EnrichedParticipant {
        match self.directory.profile(&participant.user_id).await {
            Ok(profile) => EnrichedParticipant {
                participant,
                name: profile.name,
                unit: profile.unit,
            },
            Err(_) => EnrichedParticipant {
                participant,
                name: String::new(),
                unit: String::new(),
            },
        }
    }
}

fn ensure_can_manage_ledger(
    identity: &Identity,
    activity: &Activity,
) -> Result<(), ServiceError> {
    if activity.owner_id == identity.user_id || identity.can_review() {
        return Ok(());
    }
    Err(ServiceError::Forbidden(
        "only the owner, a teacher or an admin can manage participants".into(),
    ))
}

/// The ledger feeds the application generator, so it stays frozen while
/// the generated rows are live.
fn ensure_ledger_unfrozen(activity: &Activity) -> Result<(), ServiceError> {
    if activity.status == ActivityStatus::Approved {
        return Err(ServiceError::StateConflict(
            "participant ledger is frozen while the activity is approved".into(),
        ));
    }
    Ok(())
}

fn validate_credits(credits: f64) -> Result<(), ServiceError> {
    if !credits.is_finite() || credits < 0.0 {
        return Err(ServiceError::Validation(
            "credits must be a non-negative number".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use creditflow_core::activity::{Category, CreateActivity, ReviewDecision};
    use creditflow_core::identity::{Identity, UserProfile, UserType};
    use creditflow_core::participant::{AddParticipants, CreditAssignment};
    use creditflow_db::Db;
    use creditflow_store::{create_store, StoreConfig};

    use crate::{ActivityService, ServiceError, StaticDirectory};

    fn student_profile(id: &str, name: &str) -> UserProfile {
        UserProfile {
            user_id: id.into(),
            name: name.into(),
            user_type: UserType::Student,
            unit: "CS".into(),
        }
    }

    fn service(dir: &std::path::Path) -> ActivityService {
        let db = Db::open_in_memory().unwrap();
        let store = create_store(&StoreConfig {
            data_dir: Some(dir.to_string_lossy().to_string()),
        });
        let directory = StaticDirectory::new()
            .with_user(student_profile("s1", "Ada"))
            .with_user(student_profile("s2", "Grace"))
            .with_user(UserProfile {
                user_id: "t1".into(),
                name: "Turing".into(),
                user_type: UserType::Teacher,
                unit: "CS".into(),
            });
        ActivityService::new(db, store, Arc::new(directory))
    }

    fn owner() -> Identity {
        Identity::new("s1", UserType::Student)
    }

    fn draft(svc: &ActivityService) -> creditflow_core::Activity {
        svc.create(
            &owner(),
            &CreateActivity {
                title: "Entry".into(),
                description: String::new(),
                category: Category::Innovation,
                start_date: None,
                end_date: None,
                detail: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn add_enriches_and_skips_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let activity = draft(&svc);

        let added = svc
            .add_participants(
                &owner(),
                &activity.id,
                &AddParticipants {
                    user_ids: vec!["s1".into(), "s2".into()],
                    credits: 2.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].name, "Ada");

        // Second add of the same users inserts nothing
        let again = svc
            .add_participants(
                &owner(),
                &activity.id,
                &AddParticipants {
                    user_ids: vec!["s2".into()],
                    credits: 3.0,
                },
            )
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn add_rejects_non_students_and_unknown_users() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let activity = draft(&svc);

        let err = svc
            .add_participants(
                &owner(),
                &activity.id,
                &AddParticipants {
                    user_ids: vec!["t1".into()],
                    credits: 1.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = svc
            .add_participants(
                &owner(),
                &activity.id,
                &AddParticipants {
                    user_ids: vec!["ghost".into()],
                    credits: 1.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn ledger_is_frozen_while_approved() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let activity = draft(&svc);
        svc.add_participants(
            &owner(),
            &activity.id,
            &AddParticipants {
                user_ids: vec!["s2".into()],
                credits: 2.0,
            },
        )
        .await
        .unwrap();
        svc.submit(&owner(), &activity.id).unwrap();
        svc.review(
            &Identity::new("t1", UserType::Teacher),
            &activity.id,
            ReviewDecision::Approve,
            "",
        )
        .unwrap();

        let err = svc
            .remove_participant(&owner(), &activity.id, "s2")
            .unwrap_err();
        assert!(matches!(err, ServiceError::StateConflict(_)));

        // Withdraw unfreezes the ledger
        svc.withdraw(&owner(), &activity.id).unwrap();
        svc.remove_participant(&owner(), &activity.id, "s2").unwrap();
    }

    #[tokio::test]
    async fn credits_must_be_non_negative() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let activity = draft(&svc);
        svc.add_participants(
            &owner(),
            &activity.id,
            &AddParticipants {
                user_ids: vec!["s2".into()],
                credits: 2.0,
            },
        )
        .await
        .unwrap();

        let err = svc
            .set_participant_credits(&owner(), &activity.id, "s2", -1.0)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn batch_credits_skip_unknown_users() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let activity = draft(&svc);
        svc.add_participants(
            &owner(),
            &activity.id,
            &AddParticipants {
                user_ids: vec!["s2".into()],
                credits: 2.0,
            },
        )
        .await
        .unwrap();

        let updated = svc
            .set_many_participant_credits(
                &owner(),
                &activity.id,
                &[
                    CreditAssignment {
                        user_id: "s2".into(),
                        credits: 4.5,
                    },
                    CreditAssignment {
                        user_id: "nobody".into(),
                        credits: 1.0,
                    },
                ],
            )
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].credits, 4.5);
    }

    #[tokio::test]
    async fn outsiders_cannot_manage_the_ledger() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let activity = draft(&svc);

        let err = svc
            .add_participants(
                &Identity::new("s2", UserType::Student),
                &activity.id,
                &AddParticipants {
                    user_ids: vec!["s2".into()],
                    credits: 1.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
