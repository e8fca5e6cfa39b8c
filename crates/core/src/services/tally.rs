//! Per-option vote tallies.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use meetpoll_common::{AppError, AppResult};
use meetpoll_db::entities::{
    date_option,
    vote::{self, VoteResponse},
};
use serde::Serialize;

use super::store::PollStoreService;

/// Response counts for one date option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateOptionStats {
    pub id: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub yes_count: u32,
    pub no_count: u32,
    pub maybe_count: u32,
    pub total_votes: u32,
}

/// Count votes per option, in the order the options are given.
///
/// Votes for options not in `options` are ignored.
#[must_use]
pub fn tally(options: &[date_option::Model], votes: &[vote::Model]) -> Vec<DateOptionStats> {
    let mut counts: HashMap<&str, [u32; 3]> = HashMap::with_capacity(options.len());
    for vote in votes {
        let slot = match vote.response {
            VoteResponse::Yes => 0,
            VoteResponse::No => 1,
            VoteResponse::Maybe => 2,
        };
        counts.entry(vote.date_option_id.as_str()).or_default()[slot] += 1;
    }

    options
        .iter()
        .map(|option| {
            let [yes, no, maybe] = counts.get(option.id.as_str()).copied().unwrap_or_default();
            DateOptionStats {
                id: option.id.clone(),
                start_time: option.start_time,
                end_time: option.end_time,
                yes_count: yes,
                no_count: no,
                maybe_count: maybe,
                total_votes: yes + no + maybe,
            }
        })
        .collect()
}

/// Computes tallies from the current votes on every call.
#[derive(Clone)]
pub struct TallyService {
    store: PollStoreService,
}

impl TallyService {
    #[must_use]
    pub const fn new(store: PollStoreService) -> Self {
        Self { store }
    }

    /// Tallies for every option of a poll, earliest start first.
    ///
    /// Options with equal start times come back in no particular order.
    pub async fn compute_tallies(&self, poll_id: &str) -> AppResult<Vec<DateOptionStats>> {
        if self.store.get_poll(poll_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Poll not found: {poll_id}")));
        }

        let options = self.store.get_date_options(poll_id).await?;
        let votes = self.store.get_votes(poll_id).await?;

        Ok(tally(&options, &votes))
    }
}
