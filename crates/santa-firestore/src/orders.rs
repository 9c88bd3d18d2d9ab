//! Firestore-backed `OrderStore`.
//!
//! Orders live in the top-level `orders` collection, one document per order
//! id, with the owner recorded in `userId`. The document `updateTime` is the
//! revision used for conditional writes.

use async_trait::async_trait;
use santa_models::{Order, OrderId, OrderStatus};
use tracing::warn;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{OrderStore, Revision, Versioned};
use crate::types::{from_fields, to_fields, Document, StructuredQuery, Value};

pub const ORDERS_COLLECTION: &str = "orders";

#[derive(Clone)]
pub struct FirestoreOrderStore {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreOrderStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            client,
            collection: ORDERS_COLLECTION.to_string(),
        }
    }

    fn revision_of(doc: &Document) -> FirestoreResult<Revision> {
        doc.update_time
            .clone()
            .map(Revision)
            .ok_or_else(|| FirestoreError::InvalidResponse("document has no updateTime".into()))
    }

    fn decode(doc: &Document) -> FirestoreResult<Order> {
        from_fields(doc.fields.as_ref())
    }
}

#[async_trait]
impl OrderStore for FirestoreOrderStore {
    async fn create(&self, order: &Order) -> FirestoreResult<Revision> {
        let doc = self
            .client
            .create_document(&self.collection, order.id.as_str(), to_fields(order)?)
            .await?;
        Self::revision_of(&doc)
    }

    async fn get(&self, id: &OrderId) -> FirestoreResult<Option<Versioned<Order>>> {
        let Some(doc) = self.client.get_document(&self.collection, id.as_str()).await? else {
            return Ok(None);
        };
        Ok(Some(Versioned {
            value: Self::decode(&doc)?,
            revision: Self::revision_of(&doc)?,
        }))
    }

    async fn replace(&self, order: &Order, expected: &Revision) -> FirestoreResult<Revision> {
        let doc = self
            .client
            .update_document_with_precondition(
                &self.collection,
                order.id.as_str(),
                to_fields(order)?,
                Some(expected.as_str()),
            )
            .await?;
        Self::revision_of(&doc)
    }

    async fn list_by_status(
        &self,
        status: OrderStatus,
        limit: u32,
    ) -> FirestoreResult<Vec<Order>> {
        let query = StructuredQuery::field_equals(
            &self.collection,
            "status",
            Value::StringValue(status.as_str().to_string()),
            limit,
        );
        let docs = self.client.run_query(query).await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match Self::decode(doc) {
                Ok(order) => Some(order),
                Err(e) => {
                    warn!(doc = ?doc.id(), "Skipping undecodable order document: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn check_connectivity(&self) -> FirestoreResult<()> {
        self.client.check_connectivity(&self.collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use crate::retry::RetryConfig;
    use crate::store::update_order;
    use santa_models::ChildProfile;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/v1/projects/north-pole/databases/test-db/documents";

    async fn store(server: &MockServer) -> FirestoreOrderStore {
        let config = FirestoreConfig {
            project_id: "north-pole".into(),
            database_id: "test-db".into(),
            emulator_host: Some(server.uri()),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            retry: RetryConfig {
                max_retries: 0,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
        };
        FirestoreOrderStore::new(FirestoreClient::new(config).await.unwrap())
    }

    fn doc(order: &Order, update_time: &str) -> serde_json::Value {
        serde_json::to_value(Document {
            name: Some(format!("projects/north-pole/databases/test-db/documents/orders/{}", order.id)),
            fields: Some(to_fields(order).unwrap()),
            create_time: Some("2025-12-01T00:00:00Z".into()),
            update_time: Some(update_time.into()),
        })
        .unwrap()
    }

    fn order() -> Order {
        Order::new("user-1", vec![ChildProfile::new("Ava", 6)]).unwrap()
    }

    #[tokio::test]
    async fn test_get_decodes_order_and_revision() {
        let server = MockServer::start().await;
        let o = order();
        Mock::given(method("GET"))
            .and(path(format!("{}/orders/{}", DOCS, o.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc(&o, "2025-12-01T10:00:00.1Z")))
            .mount(&server)
            .await;

        let got = store(&server).await.get(&o.id).await.unwrap().unwrap();
        assert_eq!(got.value, o);
        assert_eq!(got.revision.as_str(), "2025-12-01T10:00:00.1Z");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let got = store(&server)
            .await
            .get(&OrderId::from_string("missing-1"))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_update_sends_precondition_and_retries_conflict() {
        let server = MockServer::start().await;
        let o = order();
        let doc_path = format!("{}/orders/{}", DOCS, o.id);

        Mock::given(method("GET"))
            .and(path(doc_path.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc(&o, "rev-1")))
            .mount(&server)
            .await;
        // First conditional write loses the race, second wins.
        Mock::given(method("PATCH"))
            .and(path(doc_path.clone()))
            .and(query_param("currentDocument.updateTime", "rev-1"))
            .respond_with(ResponseTemplate::new(412))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        let mut paid = o.clone();
        paid.confirm_payment("pi_1").unwrap();
        Mock::given(method("PATCH"))
            .and(path(doc_path))
            .and(query_param("currentDocument.updateTime", "rev-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc(&paid, "rev-2")))
            .mount(&server)
            .await;

        let store = store(&server).await;
        let updated = update_order(&store, &o.id, |order| order.confirm_payment("pi_1"))
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Paid);

        let patches = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.to_string() == "PATCH")
            .count();
        assert_eq!(patches, 2);
    }

    #[tokio::test]
    async fn test_list_by_status_queries_status_field() {
        let server = MockServer::start().await;
        let mut o = order();
        o.confirm_payment("pi_9").unwrap();

        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "document": doc(&o, "rev-1"), "readTime": "2025-12-01T00:00:00Z" },
                { "readTime": "2025-12-01T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let orders = store(&server)
            .await
            .list_by_status(OrderStatus::Paid, 25)
            .await
            .unwrap();
        assert_eq!(orders, vec![o]);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["structuredQuery"]["where"]["fieldFilter"]["value"]["stringValue"],
            "paid"
        );
    }
}
