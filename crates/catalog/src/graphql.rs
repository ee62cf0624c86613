//! GraphQL documents and response shapes for the catalog endpoint.

use serde::Deserialize;

use curio_core::catalog::ExternalEntity;

/// Entity fields requested wherever an entity is embedded.
const ENTITY_FIELDS: &str = "id name type year image_url thumbnail_url";

pub(crate) fn entity_by_id_query() -> String {
    format!(
        "query($id: UUID!) {{ entitiesCollection(filter: {{id: {{eq: $id}}}}) \
         {{ edges {{ node {{ {ENTITY_FIELDS} }} }} }} }}"
    )
}

/// `first` must be at least the number of ids; the endpoint pages by default.
pub(crate) fn entities_by_ids_query() -> String {
    format!(
        "query($ids: [UUID!]!, $first: Int!) {{ entitiesCollection(filter: {{id: {{in: $ids}}}}, first: $first) \
         {{ edges {{ node {{ {ENTITY_FIELDS} }} }} }} }}"
    )
}

pub(crate) fn collection_items_query() -> String {
    format!(
        "query($collectionId: UUID!, $first: Int!, $after: Cursor) {{ \
         relationshipsCollection(filter: {{from_id: {{eq: $collectionId}}, type: {{eq: \"contains\"}}}}, \
         first: $first, after: $after) {{ \
         edges {{ node {{ to_id order entities {{ {ENTITY_FIELDS} }} }} }} \
         pageInfo {{ hasNextPage endCursor }} }} }}"
    )
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Connection<N> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<N>>,
    #[serde(default, rename = "pageInfo")]
    pub page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Edge<N> {
    pub node: N,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EntitiesData {
    pub entities_collection: Option<Connection<ExternalEntity>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RelationshipsData {
    pub relationships_collection: Option<Connection<RelationshipNode>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RelationshipNode {
    #[serde(default)]
    pub order: Option<i64>,
    /// Null when the relationship points at a deleted entity.
    #[serde(default)]
    pub entities: Option<ExternalEntity>,
}
