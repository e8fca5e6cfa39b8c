//! Vote aggregation.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use meetpoll_common::{AppError, AppResult, IdGenerator};
use meetpoll_db::entities::{
    user,
    vote::{self, VoteResponse},
};
use serde::{Deserialize, Serialize};

use super::store::PollStoreService;

/// Name recorded when no usable display name is available.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// One answer in a vote submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteItem {
    pub date_option_id: String,
    pub response: VoteResponse,
}

/// Votes of a poll grouped by voter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollVotes {
    pub by_user: BTreeMap<String, Vec<vote::Model>>,
    pub anonymous: Vec<vote::Model>,
}

/// Validates and records votes.
#[derive(Clone)]
pub struct VoteService {
    store: PollStoreService,
    id_gen: IdGenerator,
}

fn display_name(requester: Option<&user::Model>, supplied: Option<String>) -> String {
    let name = match requester {
        Some(user) => user.name.clone(),
        None => supplied,
    };
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| ANONYMOUS_NAME.to_string())
}

impl VoteService {
    #[must_use]
    pub const fn new(store: PollStoreService) -> Self {
        Self {
            store,
            id_gen: IdGenerator::new(),
        }
    }

    /// Record a batch of votes on a poll.
    ///
    /// Checks run in a fixed order and the first violation rejects the whole
    /// batch. Authenticated votes replace the voter's earlier answer for the
    /// same option; anonymous votes are always new rows. All rows are written
    /// in one transaction.
    pub async fn submit_votes(
        &self,
        poll_id: &str,
        requester: Option<&user::Model>,
        items: Vec<VoteItem>,
        supplied_name: Option<String>,
    ) -> AppResult<Vec<vote::Model>> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        let now = Utc::now().fixed_offset();
        if poll.is_expired_at(now) {
            return Err(AppError::InvalidState("poll expired".to_string()));
        }

        if !poll.allow_maybe && items.iter().any(|i| i.response == VoteResponse::Maybe) {
            return Err(AppError::InvalidRequest(
                "maybe is not allowed on this poll".to_string(),
            ));
        }

        if requester.is_none() && !poll.anonymous {
            return Err(AppError::Unauthorized("login required".to_string()));
        }

        if requester.is_none() && items.is_empty() {
            return Err(AppError::InvalidRequest(
                "at least one vote is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.date_option_id.as_str()) {
                return Err(AppError::InvalidRequest(format!(
                    "duplicate date option {}",
                    item.date_option_id
                )));
            }
        }

        for item in &items {
            if !self
                .store
                .date_option_belongs_to_poll(&item.date_option_id, poll_id)
                .await?
            {
                return Err(AppError::InvalidRequest(format!(
                    "invalid date option {}",
                    item.date_option_id
                )));
            }
        }

        let max_per_user = (poll.limit_votes && requester.is_some())
            .then(|| u64::try_from(poll.max_votes_per_user).unwrap_or(0));
        if let Some(max) = max_per_user
            && let Some(user) = requester
        {
            let existing = self.store.count_user_votes(poll_id, &user.id).await?;
            if existing + items.len() as u64 > max {
                return Err(AppError::InvalidRequest(format!(
                    "vote limit exceeded: {existing} existing and {} new, maximum {max}",
                    items.len()
                )));
            }
        }

        if items.is_empty() {
            return Ok(Vec::new());
        }

        let user_name = display_name(requester, supplied_name);
        let user_id = requester.map(|u| u.id.clone());
        let rows = items
            .into_iter()
            .map(|item| vote::Model {
                id: self.id_gen.generate(),
                poll_id: poll_id.to_string(),
                date_option_id: item.date_option_id,
                user_id: user_id.clone(),
                user_name: user_name.clone(),
                response: item.response,
                created_at: now,
            })
            .collect();

        // Checked again under the write lock for concurrent submissions.
        let stored = self.store.upsert_votes(rows, max_per_user).await?;

        tracing::info!(
            poll_id,
            user_id = user_id.as_deref().unwrap_or("anonymous"),
            count = stored.len(),
            "Votes recorded"
        );

        Ok(stored)
    }

    /// Change the answer of one of the requester's own votes.
    pub async fn update_vote(
        &self,
        poll_id: &str,
        vote_id: &str,
        requester: Option<&user::Model>,
        response: VoteResponse,
    ) -> AppResult<vote::Model> {
        let requester =
            requester.ok_or_else(|| AppError::Unauthorized("login required".to_string()))?;

        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        let vote = self.find_vote(poll_id, vote_id).await?;
        if vote.user_id.as_deref() != Some(requester.id.as_str()) {
            return Err(AppError::Forbidden(
                "only the voter can change this vote".to_string(),
            ));
        }

        if poll.is_expired_at(Utc::now().fixed_offset()) {
            return Err(AppError::InvalidState("poll expired".to_string()));
        }

        if !poll.allow_maybe && response == VoteResponse::Maybe {
            return Err(AppError::InvalidRequest(
                "maybe is not allowed on this poll".to_string(),
            ));
        }

        self.store.update_vote_response(vote, response).await
    }

    /// Delete a vote. Allowed for its voter and for the poll creator.
    pub async fn delete_vote(
        &self,
        poll_id: &str,
        vote_id: &str,
        requester: Option<&user::Model>,
    ) -> AppResult<()> {
        let requester =
            requester.ok_or_else(|| AppError::Unauthorized("login required".to_string()))?;

        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        let vote = self.find_vote(poll_id, vote_id).await?;
        let is_owner = vote.user_id.as_deref() == Some(requester.id.as_str());
        if !is_owner && poll.creator_id != requester.id {
            return Err(AppError::Forbidden(
                "only the voter or the poll creator can delete this vote".to_string(),
            ));
        }

        self.store.delete_vote(&vote.id).await?;
        tracing::info!(poll_id, vote_id, by = %requester.id, "Vote deleted");
        Ok(())
    }

    /// All votes of a poll, grouped by authenticated voter.
    pub async fn list_votes(&self, poll_id: &str) -> AppResult<PollVotes> {
        if self.store.get_poll(poll_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Poll not found: {poll_id}")));
        }

        let mut votes = self.store.get_votes(poll_id).await?;
        votes.sort_by_key(|v| v.created_at);

        let mut grouped = PollVotes::default();
        for vote in votes {
            match vote.user_id.clone() {
                Some(user_id) => grouped.by_user.entry(user_id).or_default().push(vote),
                None => grouped.anonymous.push(vote),
            }
        }
        Ok(grouped)
    }

    /// Every vote a user has cast.
    pub async fn list_user_votes(&self, user_id: &str) -> AppResult<Vec<vote::Model>> {
        self.store.get_user_votes(user_id).await
    }

    async fn find_vote(&self, poll_id: &str, vote_id: &str) -> AppResult<vote::Model> {
        self.store
            .get_vote(vote_id)
            .await?
            .filter(|v| v.poll_id == poll_id)
            .ok_or_else(|| AppError::NotFound(format!("Vote not found: {vote_id}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::store::{MemoryPollStore, PollStore};
    use chrono::Duration;
    use meetpoll_db::{entities::poll, test_utils::fixtures};
    use std::sync::Arc;

    fn setup(configure: impl FnOnce(&mut poll::Model)) -> (Arc<MemoryPollStore>, VoteService) {
        let store = Arc::new(MemoryPollStore::new());
        let mut poll = fixtures::poll("p1", "creator");
        configure(&mut poll);
        store.add_poll(poll);
        store.add_poll(fixtures::poll("p2", "creator"));
        store.add_date_option(fixtures::date_option("d1", "p1", "2025-03-01T10:00:00Z"));
        store.add_date_option(fixtures::date_option("d2", "p1", "2025-03-02T10:00:00Z"));
        store.add_date_option(fixtures::date_option("d3", "p1", "2025-03-03T10:00:00Z"));
        store.add_date_option(fixtures::date_option("x1", "p2", "2025-03-01T10:00:00Z"));
        let service = VoteService::new(store.clone());
        (store, service)
    }

    fn item(option: &str, response: VoteResponse) -> VoteItem {
        VoteItem {
            date_option_id: option.to_string(),
            response,
        }
    }

    #[tokio::test]
    async fn test_unknown_poll_is_not_found() {
        let (_, service) = setup(|_| {});
        let user = fixtures::user("u1", "Ann");
        let result = service
            .submit_votes("nope", Some(&user), vec![item("d1", VoteResponse::Yes)], None)
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_poll_is_invalid_state() {
        let (store, service) = setup(|p| {
            p.expires_at = Some(Utc::now().fixed_offset() - Duration::minutes(1));
        });
        let user = fixtures::user("u1", "Ann");

        let result = service
            .submit_votes("p1", Some(&user), vec![item("d1", VoteResponse::Yes)], None)
            .await;

        assert!(matches!(result, Err(AppError::InvalidState(ref m)) if m == "poll expired"));
        assert!(store.votes().is_empty());
    }

    #[tokio::test]
    async fn test_future_expiry_accepts_votes() {
        let (_, service) = setup(|p| {
            p.expires_at = Some(Utc::now().fixed_offset() + Duration::days(1));
        });
        let user = fixtures::user("u1", "Ann");

        let stored = service
            .submit_votes("p1", Some(&user), vec![item("d1", VoteResponse::Yes)], None)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_maybe_rejected_when_disallowed() {
        let (store, service) = setup(|p| p.allow_maybe = false);
        let user = fixtures::user("u1", "Ann");

        let result = service
            .submit_votes(
                "p1",
                Some(&user),
                vec![item("d1", VoteResponse::Yes), item("d2", VoteResponse::Maybe)],
                None,
            )
            .await;

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert!(store.votes().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_requires_anonymous_poll() {
        let (_, service) = setup(|_| {});
        let result = service
            .submit_votes("p1", None, vec![item("d1", VoteResponse::Yes)], None)
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(ref m)) if m == "login required"));
    }

    #[tokio::test]
    async fn test_maybe_check_precedes_login_check() {
        let (_, service) = setup(|p| p.allow_maybe = false);
        let result = service
            .submit_votes("p1", None, vec![item("d1", VoteResponse::Maybe)], None)
            .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_anonymous_requires_items() {
        let (_, service) = setup(|p| p.anonymous = true);
        let result = service
            .submit_votes("p1", None, Vec::new(), Some("Zoe".to_string()))
            .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_foreign_date_option_rejects_batch() {
        let (store, service) = setup(|_| {});
        let user = fixtures::user("u1", "Ann");

        let result = service
            .submit_votes(
                "p1",
                Some(&user),
                vec![item("d1", VoteResponse::Yes), item("x1", VoteResponse::No)],
                None,
            )
            .await;

        match result {
            Err(AppError::InvalidRequest(msg)) => assert!(msg.contains("x1")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(store.votes().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_option_in_batch_rejected() {
        let (_, service) = setup(|_| {});
        let user = fixtures::user("u1", "Ann");

        let result = service
            .submit_votes(
                "p1",
                Some(&user),
                vec![item("d1", VoteResponse::Yes), item("d1", VoteResponse::No)],
                None,
            )
            .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_vote_limit_never_exceeded() {
        let (store, service) = setup(|p| {
            p.limit_votes = true;
            p.max_votes_per_user = 2;
        });
        let user = fixtures::user("u1", "Ann");

        service
            .submit_votes("p1", Some(&user), vec![item("d1", VoteResponse::Yes)], None)
            .await
            .unwrap();

        let over = service
            .submit_votes(
                "p1",
                Some(&user),
                vec![item("d2", VoteResponse::Yes), item("d3", VoteResponse::Yes)],
                None,
            )
            .await;
        assert!(matches!(over, Err(AppError::InvalidRequest(ref m)) if m.contains("vote limit exceeded")));

        service
            .submit_votes("p1", Some(&user), vec![item("d2", VoteResponse::No)], None)
            .await
            .unwrap();

        let again = service
            .submit_votes("p1", Some(&user), vec![item("d3", VoteResponse::Yes)], None)
            .await;
        assert!(again.is_err());

        let rows = store
            .votes()
            .into_iter()
            .filter(|v| v.user_id.as_deref() == Some("u1"))
            .count();
        assert!(rows <= 2);
    }

    #[tokio::test]
    async fn test_write_rechecks_limit_after_concurrent_commit() {
        let (store, service) = setup(|p| {
            p.limit_votes = true;
            p.max_votes_per_user = 2;
        });
        let user = fixtures::user("u1", "Ann");

        service
            .submit_votes("p1", Some(&user), vec![item("d1", VoteResponse::Yes)], None)
            .await
            .unwrap();

        // Both submissions counted one row; the first of them commits.
        let at = Utc::now().fixed_offset();
        let batch = |id: &str, option: &str| {
            let mut vote = fixtures::vote(id, "p1", option, Some("u1"), VoteResponse::Yes);
            vote.created_at = at;
            vec![vote]
        };
        store.upsert_votes(batch("va", "d2"), Some(2)).await.unwrap();
        let late = store.upsert_votes(batch("vb", "d3"), Some(2)).await;

        assert!(
            matches!(late, Err(AppError::InvalidRequest(ref m)) if m.contains("vote limit exceeded"))
        );
        let rows = store
            .votes()
            .into_iter()
            .filter(|v| v.user_id.as_deref() == Some("u1"))
            .count();
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn test_resubmission_overwrites_response() {
        let (store, service) = setup(|_| {});
        let user = fixtures::user("u1", "Ann");

        let first = service
            .submit_votes("p1", Some(&user), vec![item("d1", VoteResponse::Yes)], None)
            .await
            .unwrap();
        service
            .submit_votes("p1", Some(&user), vec![item("d1", VoteResponse::No)], None)
            .await
            .unwrap();

        let rows = store.votes();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].response, VoteResponse::No);
        assert_eq!(rows[0].id, first[0].id);
    }

    #[tokio::test]
    async fn test_anonymous_votes_never_collide() {
        let (store, service) = setup(|p| p.anonymous = true);

        for _ in 0..3 {
            service
                .submit_votes(
                    "p1",
                    None,
                    vec![item("d1", VoteResponse::Yes)],
                    Some("Sam".to_string()),
                )
                .await
                .unwrap();
        }

        let rows = store.votes();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|v| v.user_name == "Sam" && v.user_id.is_none()));
    }

    #[tokio::test]
    async fn test_display_name_resolution() {
        let (_, service) = setup(|p| p.anonymous = true);
        let user = fixtures::user("u1", "Ann");

        let authenticated = service
            .submit_votes(
                "p1",
                Some(&user),
                vec![item("d1", VoteResponse::Yes)],
                Some("Impostor".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(authenticated[0].user_name, "Ann");

        let anonymous = service
            .submit_votes(
                "p1",
                None,
                vec![item("d1", VoteResponse::Yes)],
                Some("   ".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(anonymous[0].user_name, ANONYMOUS_NAME);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_no_rows() {
        let (store, service) = setup(|_| {});
        store.fail_vote_writes(true);
        let user = fixtures::user("u1", "Ann");

        let result = service
            .submit_votes(
                "p1",
                Some(&user),
                vec![item("d1", VoteResponse::Yes), item("d2", VoteResponse::No)],
                None,
            )
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(store.votes().is_empty());
    }

    #[tokio::test]
    async fn test_update_vote_owner_only() {
        let (store, service) = setup(|_| {});
        store.add_vote(fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes));
        let owner = fixtures::user("u1", "Ann");
        let other = fixtures::user("u2", "Bob");

        let denied = service
            .update_vote("p1", "v1", Some(&other), VoteResponse::No)
            .await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        let updated = service
            .update_vote("p1", "v1", Some(&owner), VoteResponse::No)
            .await
            .unwrap();
        assert_eq!(updated.response, VoteResponse::No);

        let wrong_poll = service
            .update_vote("p2", "v1", Some(&owner), VoteResponse::No)
            .await;
        assert!(matches!(wrong_poll, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_vote_by_owner_or_creator() {
        let (store, service) = setup(|_| {});
        store.add_vote(fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes));
        store.add_vote(fixtures::vote("v2", "p1", "d1", Some("u2"), VoteResponse::Yes));

        let stranger = fixtures::user("u3", "Cy");
        let denied = service.delete_vote("p1", "v1", Some(&stranger)).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        let owner = fixtures::user("u1", "Ann");
        service.delete_vote("p1", "v1", Some(&owner)).await.unwrap();

        let creator = fixtures::user("creator", "Cat");
        service.delete_vote("p1", "v2", Some(&creator)).await.unwrap();

        assert!(store.votes().is_empty());
        assert!(matches!(
            service.delete_vote("p1", "v2", None).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_list_votes_groups_by_user() {
        let (store, service) = setup(|_| {});
        store.add_vote(fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes));
        store.add_vote(fixtures::vote("v2", "p1", "d2", Some("u1"), VoteResponse::No));
        store.add_vote(fixtures::vote("v3", "p1", "d1", None, VoteResponse::Maybe));

        let grouped = service.list_votes("p1").await.unwrap();

        assert_eq!(grouped.by_user["u1"].len(), 2);
        assert_eq!(grouped.anonymous.len(), 1);
        assert_eq!(service.list_user_votes("u1").await.unwrap().len(), 2);
    }
}
