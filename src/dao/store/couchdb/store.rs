use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;

use crate::dao::{
    models::{LeaderboardRowEntity, RecentPlaylistEntity, RoomEntity},
    storage::StorageResult,
    store::{Store, merge_recent},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchLeaderboardDocument, CouchRecentDocument, CouchRoomDocument,
        END_SUFFIX, LEADERBOARD_PREFIX, leaderboard_doc_id, recent_doc_id, room_doc_id,
    },
};

/// Attempts allowed for a revision-conflicted read-modify-write.
const RMW_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct CouchRoomStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchRoomStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);
        let mut builder = self.client.get(&url);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
        }

        let response = builder
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let mut builder = self.client.put(&url);
                if let Some((ref user, ref pass)) = self.auth {
                    builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
                }
                let create =
                    builder
                        .send()
                        .await
                        .map_err(|source| CouchDaoError::DatabaseCreate {
                            database: database.clone(),
                            source,
                        })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document; returns `false` on a revision conflict so callers can
    /// re-read and retry.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<bool>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn delete_document(&self, doc_id: &str) -> CouchResult<()> {
        let Some(existing) = self.get_document::<serde_json::Value>(doc_id).await? else {
            return Ok(());
        };
        let Some(rev) = existing.get("_rev").and_then(|rev| rev.as_str()) else {
            return Ok(());
        };

        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })?;
                documents.push(parsed);
            }
        }

        Ok(documents)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

impl Store for CouchRoomStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = room_doc_id(&room.code);
            for _ in 0..RMW_ATTEMPTS {
                let mut doc = CouchRoomDocument::from_entity(room.clone());
                if let Some(existing) = store.get_document::<CouchRoomDocument>(&doc_id).await? {
                    // Never let a stale snapshot clobber a fresher one.
                    if existing.room.version > doc.room.version {
                        return Ok(());
                    }
                    doc.rev = existing.rev;
                }
                if store.put_document(&doc_id, &doc).await? {
                    return Ok(());
                }
            }
            Err(CouchDaoError::UpdateConflict {
                path: doc_id,
                attempts: RMW_ATTEMPTS,
            }
            .into())
        })
    }

    fn load_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        let doc_id = room_doc_id(code);
        Box::pin(async move {
            let maybe_doc = store.get_document::<CouchRoomDocument>(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.room))
        })
    }

    fn delete_room(&self, code: &str) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let doc_id = room_doc_id(code);
        Box::pin(async move { store.delete_document(&doc_id).await.map_err(Into::into) })
    }

    fn increment_leaderboard(
        &self,
        user_id: &str,
        name: &str,
        delta: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let doc_id = leaderboard_doc_id(user_id);
        let user_id = user_id.to_string();
        let name = name.to_string();
        Box::pin(async move {
            for _ in 0..RMW_ATTEMPTS {
                let existing = store
                    .get_document::<CouchLeaderboardDocument>(&doc_id)
                    .await?;
                let mut doc = match existing {
                    Some(mut doc) => {
                        doc.row.score += delta;
                        doc.row.name = name.clone();
                        doc.row.last_updated = now_ms();
                        doc
                    }
                    None => CouchLeaderboardDocument::from_row(LeaderboardRowEntity {
                        uid: user_id.clone(),
                        name: name.clone(),
                        score: delta,
                        last_updated: now_ms(),
                    }),
                };
                doc.id = doc_id.clone();
                if store.put_document(&doc_id, &doc).await? {
                    return Ok(());
                }
            }
            Err(CouchDaoError::UpdateConflict {
                path: doc_id,
                attempts: RMW_ATTEMPTS,
            }
            .into())
        })
    }

    fn get_leaderboard(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardRowEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchLeaderboardDocument>(LEADERBOARD_PREFIX)
                .await?;
            let mut rows: Vec<LeaderboardRowEntity> =
                docs.into_iter().map(|doc| doc.row).collect();
            rows.sort_by(|a, b| b.score.cmp(&a.score));
            rows.truncate(limit);
            Ok(rows)
        })
    }

    fn append_recent_playlist(
        &self,
        user_id: &str,
        entry: RecentPlaylistEntity,
    ) -> BoxFuture<'static, StorageResult<Vec<RecentPlaylistEntity>>> {
        let store = self.clone();
        let doc_id = recent_doc_id(user_id);
        let user_id = user_id.to_string();
        Box::pin(async move {
            for _ in 0..RMW_ATTEMPTS {
                let existing = store.get_document::<CouchRecentDocument>(&doc_id).await?;
                let (rev, history) = match existing {
                    Some(doc) => (doc.rev, doc.entries),
                    None => (None, Vec::new()),
                };
                let merged = merge_recent(history, entry.clone());
                let mut doc = CouchRecentDocument::new(&user_id, merged.clone());
                doc.rev = rev;
                if store.put_document(&doc_id, &doc).await? {
                    return Ok(merged);
                }
            }
            Err(CouchDaoError::UpdateConflict {
                path: doc_id,
                attempts: RMW_ATTEMPTS,
            }
            .into())
        })
    }

    fn get_recent_playlists(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<RecentPlaylistEntity>>> {
        let store = self.clone();
        let doc_id = recent_doc_id(user_id);
        Box::pin(async move {
            let maybe_doc = store.get_document::<CouchRecentDocument>(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.entries).unwrap_or_default())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let mut builder = store.client.get(&url);
            if let Some((ref user, ref pass)) = store.auth {
                builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
            }

            let response = builder
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
