// Friends: read side of the social graph
// Friend requests and acceptance live elsewhere; this only reads the links
// and the friends' collections.

use async_trait::async_trait;
use serde::Serialize;

use crate::db::document_db;
use crate::error::{PlantScopeError, Result};
use crate::model::{CollectionView, UserId};
use crate::reconcile::{bounded, merge_view, CallLimits};
use crate::store::{DocumentStore, RemoteStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendLink {
    pub friend_id: UserId,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendSummary {
    pub friend_id: UserId,
    pub username: String,
    /// None when the friend's collection couldn't be read.
    pub plants_collected: Option<usize>,
}

#[async_trait]
pub trait FriendDirectory: Send + Sync {
    async fn list_friends(&self, user: &UserId) -> Result<Vec<FriendLink>>;
}

#[async_trait]
impl FriendDirectory for DocumentStore {
    async fn list_friends(&self, user: &UserId) -> Result<Vec<FriendLink>> {
        let rows = self.with_conn(PlantScopeError::RemoteUnavailable, |conn| {
            document_db::list_friends(conn, user.as_str())
        })?;

        Ok(rows
            .into_iter()
            .map(|row| FriendLink {
                friend_id: UserId::new(row.friend_id),
                username: row.username,
            })
            .collect())
    }
}

/// Friends of `user` with the number of documents in each friend's collection.
/// One friend's unreadable collection does not fail the list.
pub async fn friend_summaries(
    directory: &dyn FriendDirectory,
    remote: &dyn RemoteStore,
    user: &UserId,
    limits: CallLimits,
) -> Result<Vec<FriendSummary>> {
    let friends = bounded(
        directory.list_friends(user),
        limits.remote_timeout,
        PlantScopeError::RemoteUnavailable,
    )
    .await?;

    let mut summaries = Vec::with_capacity(friends.len());
    for friend in friends {
        let count = match bounded(
            remote.load_remote(&friend.friend_id),
            limits.remote_timeout,
            PlantScopeError::RemoteUnavailable,
        )
        .await
        {
            Ok(records) => Some(records.len()),
            Err(e) => {
                log::warn!("Could not count plants for friend {}: {}", friend.friend_id, e);
                None
            }
        };

        summaries.push(FriendSummary {
            username: friend.username.unwrap_or_else(|| "Unknown".to_string()),
            friend_id: friend.friend_id,
            plants_collected: count,
        });
    }

    Ok(summaries)
}

/// A friend's collection as they store it remotely.
pub async fn friend_collection(
    remote: &dyn RemoteStore,
    friend: &UserId,
    limits: CallLimits,
) -> Result<CollectionView> {
    let records = bounded(
        remote.load_remote(friend),
        limits.remote_timeout,
        PlantScopeError::RemoteUnavailable,
    )
    .await?;
    Ok(merge_view(&[], &records))
}
