//! GraphQL client for the DBoT catalog.
//!
//! Wraps the catalog's `/graphql/v1` endpoint using [`reqwest`] and exposes
//! it to the core services as a [`CatalogGateway`].

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::json;

use curio_core::catalog::{CatalogGateway, CollectionItem, CollectionItems, ExternalEntity};
use curio_core::error::CoreError;
use curio_core::types::EntityId;

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::graphql::{self, EntitiesData, GraphQlResponse, RelationshipsData};
use crate::normalize::ImageUrlNormalizer;

/// Relationships requested per page when listing collection members.
pub const PAGE_SIZE: usize = 100;

/// Ids per `in:` filter when fetching entities in bulk.
pub const ENTITY_BATCH_SIZE: usize = 100;

/// Collections fetched concurrently by
/// [`CatalogGateway::get_multiple_collection_items`].
pub const PARALLEL_FETCHES: usize = 5;

/// HTTP client for one catalog deployment.
pub struct DbotClient {
    client: reqwest::Client,
    graphql_url: String,
    api_key: String,
    normalizer: ImageUrlNormalizer,
}

impl DbotClient {
    /// Create a client with its own connection pool and the configured
    /// request timeout.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &CatalogConfig) -> Self {
        Self {
            client,
            graphql_url: format!("{}/graphql/v1", config.base_url),
            api_key: config.api_key.clone(),
            normalizer: ImageUrlNormalizer::new(
                config.base_url.clone(),
                config.image_url_transforms.clone(),
            ),
        }
    }

    /// Fetch one entity, `None` when the catalog does not know the id.
    pub async fn fetch_entity(&self, id: &str) -> Result<Option<ExternalEntity>, CatalogError> {
        let data: EntitiesData = self
            .query(&graphql::entity_by_id_query(), json!({ "id": id }))
            .await?;
        Ok(data
            .entities_collection
            .and_then(|c| c.edges.into_iter().next())
            .map(|edge| self.normalizer.normalize_entity(edge.node)))
    }

    /// Fetch many entities keyed by id. Duplicate input ids are collapsed.
    pub async fn fetch_entities(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, ExternalEntity>, CatalogError> {
        let unique: Vec<&EntityId> = {
            let mut seen = HashSet::new();
            ids.iter().filter(|id| seen.insert(*id)).collect()
        };

        let mut found = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(ENTITY_BATCH_SIZE) {
            let data: EntitiesData = self
                .query(
                    &graphql::entities_by_ids_query(),
                    json!({ "ids": chunk, "first": chunk.len() }),
                )
                .await?;
            let edges = data.entities_collection.map(|c| c.edges).unwrap_or_default();
            for edge in edges {
                let entity = self.normalizer.normalize_entity(edge.node);
                found.insert(entity.id.clone(), entity);
            }
        }
        Ok(found)
    }

    /// Fetch the members of a catalog collection, following cursors until
    /// the listing is exhausted or `limit` members have been collected.
    ///
    /// Relationships whose target entity no longer exists are skipped.
    pub async fn fetch_collection_items(
        &self,
        collection_id: &str,
        limit: Option<usize>,
    ) -> Result<CollectionItems, CatalogError> {
        let query = graphql::collection_items_query();
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let first = match limit {
                Some(limit) => PAGE_SIZE.min(limit.saturating_sub(items.len())),
                None => PAGE_SIZE,
            };
            if first == 0 {
                break;
            }

            let data: RelationshipsData = self
                .query(
                    &query,
                    json!({ "collectionId": collection_id, "first": first, "after": cursor }),
                )
                .await?;
            let Some(page) = data.relationships_collection else {
                break;
            };

            items.extend(page.edges.into_iter().filter_map(|edge| {
                let entity = edge.node.entities?;
                Some(CollectionItem {
                    entity: self.normalizer.normalize_entity(entity),
                    order: edge.node.order.unwrap_or(0),
                })
            }));

            match page.page_info {
                Some(info) if info.has_next_page && info.end_cursor.is_some() => {
                    cursor = info.end_cursor;
                }
                _ => break,
            }
        }

        if let Some(limit) = limit {
            items.truncate(limit);
        }
        tracing::debug!(collection_id, items = items.len(), "Fetched catalog collection items");
        Ok(CollectionItems::from_unsorted(items))
    }

    // ---- private helpers ----

    /// POST a GraphQL document and unwrap its `data` member.
    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, CatalogError> {
        let response = self
            .client
            .post(&self.graphql_url)
            .header("apikey", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let body: GraphQlResponse<T> = Self::parse_response(response).await?;
        if let Some(errors) = body.errors {
            return Err(CatalogError::GraphQl(errors.to_string()));
        }
        body.data
            .ok_or_else(|| CatalogError::GraphQl("response carried no data".to_string()))
    }

    /// Return the response if its status is 2xx, otherwise read the body
    /// and return an [`CatalogError::ApiError`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CatalogError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CatalogError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Check the status code and deserialize the JSON body.
    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CatalogError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CatalogGateway for DbotClient {
    async fn get_entity(&self, id: &str) -> Result<ExternalEntity, CoreError> {
        self.fetch_entity(id)
            .await?
            .ok_or_else(|| CoreError::not_found("dbot_entity", id))
    }

    async fn get_entities_by_ids(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, ExternalEntity>, CoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self.fetch_entities(ids).await?)
    }

    async fn get_collection(&self, id: &str) -> Result<ExternalEntity, CoreError> {
        self.fetch_entity(id)
            .await?
            .filter(ExternalEntity::is_collection)
            .ok_or_else(|| CoreError::not_found("dbot_collection", id))
    }

    async fn get_collection_items(&self, id: &str) -> Result<CollectionItems, CoreError> {
        Ok(self.fetch_collection_items(id, None).await?)
    }

    /// A collection whose fetch fails maps to an empty listing so one bad
    /// id does not hide the rest. The call fails only when every fetch
    /// failed.
    async fn get_multiple_collection_items(
        &self,
        ids: &[EntityId],
        limit_per_collection: usize,
    ) -> Result<HashMap<EntityId, CollectionItems>, CoreError> {
        let unique: Vec<EntityId> = {
            let mut seen = HashSet::new();
            ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
        };
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let results: Vec<(EntityId, Result<CollectionItems, CatalogError>)> =
            stream::iter(unique)
                .map(|id| async move {
                    let result = self
                        .fetch_collection_items(&id, Some(limit_per_collection))
                        .await;
                    (id, result)
                })
                .buffer_unordered(PARALLEL_FETCHES)
                .collect()
                .await;

        let mut listings = HashMap::with_capacity(results.len());
        let mut first_error = None;
        for (id, result) in results {
            match result {
                Ok(items) => {
                    listings.insert(id, items);
                }
                Err(err) => {
                    tracing::warn!(collection_id = %id, error = %err, "Failed to fetch collection items");
                    listings.insert(id, CollectionItems::default());
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) if listings.values().all(CollectionItems::is_empty) => Err(err.into()),
            _ => Ok(listings),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// Serves the given `(status, body)` responses to successive
    /// connections and records each request body.
    async fn serve(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request_body(&mut socket).await;
                recorded
                    .lock()
                    .unwrap()
                    .push(serde_json::from_slice(&request).unwrap_or_default());
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{addr}"), requests)
    }

    async fn read_request_body(socket: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if n == 0 {
                return Vec::new();
            }
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let length: usize = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        buf[header_end..].to_vec()
    }

    fn client(base_url: &str) -> DbotClient {
        let mut config = CatalogConfig::new(base_url, "test-key");
        config.image_url_transforms = vec![("/raw/".into(), "/thumb/".into())];
        DbotClient::new(&config).unwrap()
    }

    fn entity_json(id: &str, kind: &str, image: Option<&str>) -> serde_json::Value {
        json!({ "id": id, "name": id.to_uppercase(), "type": kind, "year": null,
                "image_url": image, "thumbnail_url": null })
    }

    fn entities_page(nodes: Vec<serde_json::Value>) -> String {
        let edges: Vec<_> = nodes.into_iter().map(|n| json!({ "node": n })).collect();
        json!({ "data": { "entitiesCollection": { "edges": edges } } }).to_string()
    }

    fn relationships_page(
        nodes: Vec<(i64, serde_json::Value)>,
        next: Option<&str>,
    ) -> String {
        let edges: Vec<_> = nodes
            .into_iter()
            .map(|(order, entity)| json!({ "node": { "to_id": entity["id"], "order": order, "entities": entity } }))
            .collect();
        json!({ "data": { "relationshipsCollection": {
            "edges": edges,
            "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next }
        } } })
        .to_string()
    }

    #[tokio::test]
    async fn collection_items_follow_cursor_and_sort() {
        let (url, requests) = serve(vec![
            (
                200,
                relationships_page(
                    vec![(3, entity_json("c", "item", Some("/raw/c.png"))), (1, entity_json("a", "item", None))],
                    Some("cursor-1"),
                ),
            ),
            (200, relationships_page(vec![(2, entity_json("b", "item", None))], None)),
        ])
        .await;

        let items = client(&url).get_collection_items("set-1").await.unwrap();

        let ids: Vec<&str> = items.entity_ids().map(String::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            items.items[2].entity.image_url.as_deref(),
            Some(format!("{url}/thumb/c.png").as_str())
        );

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["variables"]["collectionId"], "set-1");
        assert_eq!(requests[0]["variables"]["after"], serde_json::Value::Null);
        assert_eq!(requests[1]["variables"]["after"], "cursor-1");
    }

    #[tokio::test]
    async fn missing_entity_is_not_found() {
        let (url, _) = serve(vec![(200, entities_page(Vec::new()))]).await;
        assert_matches!(
            client(&url).get_entity("ghost").await,
            Err(CoreError::NotFound { entity: "dbot_entity", .. })
        );
    }

    #[tokio::test]
    async fn non_collection_is_not_a_collection() {
        let (url, _) = serve(vec![(200, entities_page(vec![entity_json("leaf", "item", None)]))]).await;
        assert_matches!(
            client(&url).get_collection("leaf").await,
            Err(CoreError::NotFound { entity: "dbot_collection", .. })
        );
    }

    #[tokio::test]
    async fn entities_by_ids_are_keyed_and_normalised() {
        let (url, requests) = serve(vec![(
            200,
            entities_page(vec![
                entity_json("a", "item", Some("https://cdn.test/raw/a.png")),
                entity_json("s", "collection", None),
            ]),
        )])
        .await;

        let ids = vec!["a".to_string(), "s".to_string(), "a".to_string(), "ghost".to_string()];
        let found = client(&url).get_entities_by_ids(&ids).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found["a"].image_url.as_deref(), Some("https://cdn.test/thumb/a.png"));
        assert!(found["s"].is_collection());
        assert_eq!(requests.lock().unwrap()[0]["variables"]["first"], 3);
    }

    #[tokio::test]
    async fn graphql_errors_are_external_failures() {
        let body = json!({ "errors": [{ "message": "boom" }] }).to_string();
        let (url, _) = serve(vec![(200, body)]).await;
        assert_matches!(client(&url).get_entity("x").await, Err(CoreError::ExternalFetch(_)));
    }

    #[tokio::test]
    async fn non_success_status_is_external_failure() {
        let (url, _) = serve(vec![(503, "{}".to_string())]).await;
        assert_matches!(
            client(&url).get_collection_items("set-1").await,
            Err(CoreError::ExternalFetch(msg)) if msg.contains("503")
        );
    }

    #[tokio::test]
    async fn unreachable_catalog_is_external_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert_matches!(
            client(&format!("http://{addr}")).get_entity("x").await,
            Err(CoreError::ExternalFetch(_))
        );
    }

    #[tokio::test]
    async fn empty_inputs_make_no_requests() {
        let c = client("http://127.0.0.1:9");
        assert!(c.get_entities_by_ids(&[]).await.unwrap().is_empty());
        assert!(c.get_multiple_collection_items(&[], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn multiple_listings_respect_limit() {
        let (url, requests) = serve(vec![(
            200,
            relationships_page(
                vec![(1, entity_json("a", "item", None)), (2, entity_json("b", "item", None))],
                Some("more"),
            ),
        )])
        .await;

        let listings = client(&url)
            .get_multiple_collection_items(&["set-1".to_string()], 2)
            .await
            .unwrap();

        assert_eq!(listings["set-1"].len(), 2);
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["variables"]["first"], 2);
    }

    #[tokio::test]
    async fn one_failed_listing_does_not_hide_the_others() {
        let (url, requests) = serve(vec![
            (200, relationships_page(vec![(1, entity_json("a", "item", None))], None)),
            (503, "{}".to_string()),
        ])
        .await;
        let ids = vec!["set-1".to_string(), "set-2".to_string(), "set-1".to_string()];

        let listings = client(&url)
            .get_multiple_collection_items(&ids, 10)
            .await
            .unwrap();

        assert_eq!(listings.len(), 2);
        let sizes: Vec<usize> = listings.values().map(CollectionItems::len).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 1);
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn all_failed_listings_are_an_error() {
        let (url, _) = serve(vec![(503, "{}".to_string()), (503, "{}".to_string())]).await;
        let ids = vec!["set-1".to_string(), "set-2".to_string()];

        assert_matches!(
            client(&url).get_multiple_collection_items(&ids, 10).await,
            Err(CoreError::ExternalFetch(_))
        );
    }
}
