//! Gateway to the restaurant API.
//!
//! Reads go to the network first. A successful response is handed to the
//! mirror and returned without waiting for the store write; a failed one
//! falls back to whatever the local store holds. Writes are network only.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::models::{NewReview, Record, RecordId, Restaurant, Review, ID_FIELD};
use crate::net::{FetchError, Request, Transport};
use crate::store::{Mirror, StoreError, RESTAURANTS, REVIEWS};

use super::GatewayError;

/// Foreign key from a review to its restaurant.
const RESTAURANT_FK: &str = "restaurant_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Restaurants,
    Reviews,
}

impl ResourceKind {
    /// Local store collection mirroring this resource.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Restaurants => RESTAURANTS,
            ResourceKind::Reviews => REVIEWS,
        }
    }

    /// API path segment.
    fn segment(&self) -> &'static str {
        match self {
            ResourceKind::Restaurants => "restaurants",
            ResourceKind::Reviews => "reviews",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFilter {
    All,
    ById(RecordId),
    /// Reviews of one restaurant. For restaurants this is the same as `ById`.
    ByRestaurant(RecordId),
}

/// Restaurant API client with offline fallback.
/// Clone is cheap when the transport is.
#[derive(Clone)]
pub struct RemoteGateway<T> {
    base: Url,
    transport: T,
    mirror: Mirror,
}

impl<T: Transport> RemoteGateway<T> {
    pub fn new(base: Url, transport: T, mirror: Mirror) -> Result<Self, GatewayError> {
        if base.cannot_be_a_base() {
            return Err(GatewayError::InvalidBase(base.to_string()));
        }
        Ok(Self {
            base,
            transport,
            mirror,
        })
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// `base` with `segments` appended. An empty last segment leaves a
    /// trailing slash, which the API expects on query endpoints.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidBase(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn resource_url(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> Result<Url, GatewayError> {
        match (kind, filter) {
            (_, ResourceFilter::All) => self.endpoint(&[kind.segment()]),
            (ResourceKind::Reviews, ResourceFilter::ByRestaurant(restaurant_id)) => {
                let mut url = self.endpoint(&[kind.segment(), ""])?;
                url.query_pairs_mut()
                    .append_pair(RESTAURANT_FK, &restaurant_id.to_string());
                Ok(url)
            }
            (_, ResourceFilter::ById(id) | ResourceFilter::ByRestaurant(id)) => {
                self.endpoint(&[kind.segment(), &id.to_string()])
            }
        }
    }

    async fn send_json(&self, request: Request) -> Result<Value, GatewayError> {
        let response = self.transport.fetch(&request).await?.error_for_status()?;
        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(response.json()?)
    }

    // ===== Reads =====

    /// Fetch records of `kind`, network first, local store as fallback.
    pub async fn fetch_resource(
        &self,
        kind: ResourceKind,
        filter: ResourceFilter,
    ) -> Result<Vec<Record>, GatewayError> {
        let url = self.resource_url(kind, &filter)?;

        match self.send_json(Request::get(url.clone())).await {
            Ok(payload) => {
                let records = Record::list_from_payload(payload);
                debug!(url = %url, count = records.len(), "Fetched from network");
                self.mirror.spawn_upsert(kind.collection(), records.clone());
                Ok(records)
            }
            Err(GatewayError::Network(e)) => {
                warn!(url = %url, error = %e, "Network fetch failed, reading local store");
                let local = self.read_local(kind, &filter).await?;
                if local.is_empty() {
                    return Err(GatewayError::Unavailable { source: e });
                }
                debug!(url = %url, count = local.len(), "Served from local store");
                Ok(local)
            }
            Err(e) => Err(e),
        }
    }

    async fn read_local(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> Result<Vec<Record>, GatewayError> {
        let store = self.mirror.store();
        let collection = kind.collection();
        let result = match (kind, filter) {
            (_, ResourceFilter::All) => store.get_all(collection).await,
            (ResourceKind::Reviews, ResourceFilter::ByRestaurant(restaurant_id)) => store
                .get_all(collection)
                .await
                .map(|reviews| {
                    reviews
                        .into_iter()
                        .filter(|review| {
                            review
                                .key(RESTAURANT_FK)
                                .is_some_and(|fk| fk.same_as(restaurant_id))
                        })
                        .collect()
                }),
            (_, ResourceFilter::ById(id) | ResourceFilter::ByRestaurant(id)) => store
                .get_by_id(collection, id)
                .await
                .map(|found| found.into_iter().collect()),
        };

        match result {
            Ok(records) => Ok(records),
            // No local copy of a collection the store never created
            Err(StoreError::UnknownCollection(name)) => {
                debug!(collection = %name, "Collection not in local store");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, GatewayError> {
        let records = self
            .fetch_resource(ResourceKind::Restaurants, ResourceFilter::All)
            .await?;
        Ok(decode_all(&records))
    }

    pub async fn fetch_restaurant_by_id(&self, id: &RecordId) -> Result<Restaurant, GatewayError> {
        let records = self
            .fetch_resource(ResourceKind::Restaurants, ResourceFilter::ById(id.clone()))
            .await?;
        decode_first(&records)
    }

    /// Reviews of one restaurant, oldest first when the server provides
    /// creation times.
    pub async fn fetch_reviews_by_restaurant_id(
        &self,
        restaurant_id: &RecordId,
    ) -> Result<Vec<Review>, GatewayError> {
        let records = self
            .fetch_resource(
                ResourceKind::Reviews,
                ResourceFilter::ByRestaurant(restaurant_id.clone()),
            )
            .await?;
        let mut reviews: Vec<Review> = decode_all(&records);
        reviews.retain(|review| review.belongs_to(restaurant_id));
        reviews.sort_by_key(|review| review.created_at.as_ref().and_then(|t| t.to_datetime()));
        Ok(reviews)
    }

    pub async fn fetch_restaurants_by_cuisine(
        &self,
        cuisine: &str,
    ) -> Result<Vec<Restaurant>, GatewayError> {
        self.fetch_restaurants_by_cuisine_and_neighborhood(Some(cuisine), None)
            .await
    }

    pub async fn fetch_restaurants_by_neighborhood(
        &self,
        neighborhood: &str,
    ) -> Result<Vec<Restaurant>, GatewayError> {
        self.fetch_restaurants_by_cuisine_and_neighborhood(None, Some(neighborhood))
            .await
    }

    /// `None` for either filter means "all".
    pub async fn fetch_restaurants_by_cuisine_and_neighborhood(
        &self,
        cuisine: Option<&str>,
        neighborhood: Option<&str>,
    ) -> Result<Vec<Restaurant>, GatewayError> {
        let restaurants = self.fetch_restaurants().await?;
        Ok(restaurants
            .into_iter()
            .filter(|r| cuisine.map_or(true, |c| r.cuisine_type.as_deref() == Some(c)))
            .filter(|r| neighborhood.map_or(true, |n| r.neighborhood.as_deref() == Some(n)))
            .collect())
    }

    /// Distinct neighborhoods in first-seen order.
    pub async fn fetch_neighborhoods(&self) -> Result<Vec<String>, GatewayError> {
        let restaurants = self.fetch_restaurants().await?;
        Ok(unique(restaurants.iter().filter_map(|r| r.neighborhood.as_deref())))
    }

    /// Distinct cuisines in first-seen order.
    pub async fn fetch_cuisines(&self) -> Result<Vec<String>, GatewayError> {
        let restaurants = self.fetch_restaurants().await?;
        Ok(unique(restaurants.iter().filter_map(|r| r.cuisine_type.as_deref())))
    }

    // ===== Writes =====

    /// Mark a restaurant as favorite (or not). The server's reply is merged
    /// into the local store; the returned restaurant is the local copy with
    /// that reply applied, so a reply carrying only the changed fields
    /// still decodes.
    pub async fn set_favorite(
        &self,
        id: &RecordId,
        is_favorite: bool,
    ) -> Result<Restaurant, GatewayError> {
        let mut url = self.endpoint(&[ResourceKind::Restaurants.segment(), &id.to_string(), ""])?;
        url.query_pairs_mut()
            .append_pair("is_favorite", if is_favorite { "true" } else { "false" });

        let payload = self.send_json(Request::new(Method::PUT, url)).await?;
        let mut record = Record::from_value(payload).unwrap_or_default();
        if record.id().is_none() {
            record.set(ID_FIELD, id.clone());
        }
        record.set("is_favorite", is_favorite);

        let mut merged = match self.mirror.store().get_by_id(RESTAURANTS, id).await {
            Ok(Some(local)) => local,
            _ => Record::new(),
        };
        merged.merge(record.clone());
        self.mirror.spawn_upsert(RESTAURANTS, vec![record]);
        Ok(merged.decode()?)
    }

    /// Post a review. Blank names and out-of-range ratings are normalized
    /// before sending.
    pub async fn add_review(&self, review: &NewReview) -> Result<Review, GatewayError> {
        let body = review.normalized();
        let url = self.endpoint(&[ResourceKind::Reviews.segment(), ""])?;
        let request = Request::new(Method::POST, url).with_json(&body)?;

        let payload = self.send_json(request).await?;
        let record = Record::from_value(payload).ok_or_else(|| {
            GatewayError::Decode(serde::de::Error::custom("review response is not an object"))
        })?;
        let created = record.decode()?;
        self.mirror.spawn_upsert(REVIEWS, vec![record]);
        Ok(created)
    }

    pub async fn remove_review(&self, id: &RecordId) -> Result<(), GatewayError> {
        let url = self.endpoint(&[ResourceKind::Reviews.segment(), &id.to_string()])?;
        self.send_json(Request::new(Method::DELETE, url)).await?;
        self.mirror.spawn_delete(REVIEWS, id.clone());
        Ok(())
    }
}

/// Decode every record, skipping (and logging) the ones that do not fit.
fn decode_all<M: DeserializeOwned>(records: &[Record]) -> Vec<M> {
    records
        .iter()
        .filter_map(|record| match record.decode() {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(id = ?record.id(), error = %e, "Skipping undecodable record");
                None
            }
        })
        .collect()
}

fn decode_first<M: DeserializeOwned>(records: &[Record]) -> Result<M, GatewayError> {
    match records.first() {
        Some(record) => Ok(record.decode()?),
        None => Err(GatewayError::Unavailable {
            source: FetchError::Unreachable("empty response".to_string()),
        }),
    }
}

fn unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        if !seen.iter().any(|s| s == value) {
            seen.push(value.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::MockTransport;
    use crate::store::{restaurant_schema, LocalStore};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    const BASE: &str = "http://localhost:1337/";

    async fn setup() -> (TempDir, LocalStore, Arc<MockTransport>, RemoteGateway<Arc<MockTransport>>) {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "mws-restaurant", 2, restaurant_schema)
            .await
            .unwrap();
        let transport = MockTransport::new();
        let gateway = RemoteGateway::new(
            Url::parse(BASE).unwrap(),
            transport.clone(),
            Mirror::new(store.clone()),
        )
        .unwrap();
        (dir, store, transport, gateway)
    }

    fn restaurants() -> Value {
        json!([
            {"id": 1, "name": "Mission Chinese Food", "neighborhood": "Manhattan", "cuisine_type": "Asian"},
            {"id": 2, "name": "Emily", "neighborhood": "Brooklyn", "cuisine_type": "Pizza"},
            {"id": 3, "name": "Kang Ho Dong Baekjeong", "neighborhood": "Manhattan", "cuisine_type": "Asian"}
        ])
    }

    #[tokio::test]
    async fn test_resource_urls() {
        let (_dir, _store, _transport, gateway) = setup().await;
        let url = |kind, filter| gateway.resource_url(kind, &filter).unwrap().to_string();

        assert_eq!(
            url(ResourceKind::Restaurants, ResourceFilter::All),
            "http://localhost:1337/restaurants"
        );
        assert_eq!(
            url(ResourceKind::Restaurants, ResourceFilter::ById(RecordId::Int(4))),
            "http://localhost:1337/restaurants/4"
        );
        assert_eq!(
            url(ResourceKind::Reviews, ResourceFilter::ByRestaurant(RecordId::Int(4))),
            "http://localhost:1337/reviews/?restaurant_id=4"
        );
        assert_eq!(
            url(ResourceKind::Reviews, ResourceFilter::ById(RecordId::Int(9))),
            "http://localhost:1337/reviews/9"
        );
    }

    #[tokio::test]
    async fn test_base_with_path_prefix() {
        let gateway = RemoteGateway::new(
            Url::parse("http://api.local/v1/").unwrap(),
            MockTransport::new(),
            Mirror::new(LocalStore::unavailable()),
        )
        .unwrap();
        assert_eq!(
            gateway
                .resource_url(ResourceKind::Restaurants, &ResourceFilter::All)
                .unwrap()
                .as_str(),
            "http://api.local/v1/restaurants"
        );

        assert!(matches!(
            RemoteGateway::new(
                Url::parse("mailto:someone@example.com").unwrap(),
                MockTransport::new(),
                Mirror::new(LocalStore::unavailable()),
            ),
            Err(GatewayError::InvalidBase(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_mirrors_into_store() {
        let (_dir, store, transport, gateway) = setup().await;
        transport.json("http://localhost:1337/restaurants", restaurants());

        let records = gateway
            .fetch_resource(ResourceKind::Restaurants, ResourceFilter::All)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);

        gateway.mirror().settle().await;
        assert_eq!(store.count(RESTAURANTS).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_network_failure_falls_back_to_store() {
        let (_dir, store, transport, gateway) = setup().await;
        store
            .upsert_many(RESTAURANTS, Record::list_from_payload(restaurants()))
            .await
            .unwrap();
        transport.set_offline(true);

        let records = gateway
            .fetch_resource(ResourceKind::Restaurants, ResourceFilter::All)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);

        let one = gateway
            .fetch_restaurant_by_id(&RecordId::Int(2))
            .await
            .unwrap();
        assert_eq!(one.name, "Emily");
    }

    #[tokio::test]
    async fn test_error_status_falls_back_to_store() {
        let (_dir, store, transport, gateway) = setup().await;
        store
            .upsert_many(RESTAURANTS, Record::list_from_payload(restaurants()))
            .await
            .unwrap();
        transport.respond(
            "http://localhost:1337/restaurants",
            StatusCode::INTERNAL_SERVER_ERROR,
            "boom",
        );

        let restaurants = gateway.fetch_restaurants().await.unwrap();
        assert_eq!(restaurants.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_store_and_network_failure_is_unavailable() {
        let (_dir, _store, transport, gateway) = setup().await;
        transport.fail("http://localhost:1337/restaurants");

        let err = gateway
            .fetch_resource(ResourceKind::Restaurants, ResourceFilter::All)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { .. }));
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_unavailable_store_and_network_failure_is_unavailable() {
        let transport = MockTransport::new();
        transport.set_offline(true);
        let gateway = RemoteGateway::new(
            Url::parse(BASE).unwrap(),
            transport,
            Mirror::new(LocalStore::unavailable()),
        )
        .unwrap();
        let err = gateway.fetch_restaurants().await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_offline_reviews_filter_by_restaurant() {
        let (_dir, store, transport, gateway) = setup().await;
        store
            .upsert_many(
                REVIEWS,
                Record::list_from_payload(json!([
                    {"id": 1, "restaurant_id": 1, "name": "A", "rating": 4, "comments": "", "createdAt": 300},
                    {"id": 2, "restaurant_id": 2, "name": "B", "rating": 3, "comments": ""},
                    {"id": 3, "restaurant_id": "1", "name": "C", "rating": 5, "comments": "", "createdAt": 100}
                ])),
            )
            .await
            .unwrap();
        transport.set_offline(true);

        let reviews = gateway
            .fetch_reviews_by_restaurant_id(&RecordId::Int(1))
            .await
            .unwrap();
        let names: Vec<&str> = reviews.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
    }

    #[tokio::test]
    async fn test_filters_and_unique_lists() {
        let (_dir, _store, transport, gateway) = setup().await;
        transport.json("http://localhost:1337/restaurants", restaurants());

        let asian = gateway.fetch_restaurants_by_cuisine("Asian").await.unwrap();
        assert_eq!(asian.len(), 2);

        let brooklyn = gateway
            .fetch_restaurants_by_neighborhood("Brooklyn")
            .await
            .unwrap();
        assert_eq!(brooklyn.len(), 1);

        let both = gateway
            .fetch_restaurants_by_cuisine_and_neighborhood(Some("Asian"), Some("Brooklyn"))
            .await
            .unwrap();
        assert!(both.is_empty());

        let all = gateway
            .fetch_restaurants_by_cuisine_and_neighborhood(None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        assert_eq!(
            gateway.fetch_neighborhoods().await.unwrap(),
            vec!["Manhattan", "Brooklyn"]
        );
        assert_eq!(gateway.fetch_cuisines().await.unwrap(), vec!["Asian", "Pizza"]);
    }

    #[tokio::test]
    async fn test_set_favorite_merges_into_store() {
        let (_dir, store, transport, gateway) = setup().await;
        store
            .upsert(
                RESTAURANTS,
                Record::from_value(json!({"id": 7, "name": "Cafe X", "is_favorite": false})).unwrap(),
            )
            .await
            .unwrap();
        transport.json(
            "http://localhost:1337/restaurants/7/?is_favorite=true",
            json!({"id": 7, "is_favorite": "true"}),
        );

        let restaurant = gateway.set_favorite(&RecordId::Int(7), true).await.unwrap();
        assert!(restaurant.is_favorite);

        gateway.mirror().settle().await;
        let stored = store
            .get_by_id(RESTAURANTS, &RecordId::Int(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get("is_favorite"), Some(&json!(true)));
        assert_eq!(stored.get("name"), Some(&json!("Cafe X")));

        let (method, _) = transport.calls().pop().unwrap();
        assert_eq!(method, Method::PUT);
    }

    #[tokio::test]
    async fn test_set_favorite_with_camel_case_reply() {
        let (_dir, store, transport, gateway) = setup().await;
        store
            .upsert(
                RESTAURANTS,
                Record::from_value(json!({"id": 7, "name": "Cafe X", "isFavorite": false})).unwrap(),
            )
            .await
            .unwrap();
        transport.json(
            "http://localhost:1337/restaurants/7/?is_favorite=true",
            json!({"id": 7, "isFavorite": true}),
        );

        let restaurant = gateway.set_favorite(&RecordId::Int(7), true).await.unwrap();
        assert!(restaurant.is_favorite);
        assert_eq!(restaurant.name, "Cafe X");

        gateway.mirror().settle().await;
        let stored = store
            .get_by_id(RESTAURANTS, &RecordId::Int(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get("is_favorite"), Some(&json!(true)));
        assert!(stored.get("isFavorite").is_none());
        assert_eq!(stored.get("name"), Some(&json!("Cafe X")));

        // Listings decode the merged record too
        transport.set_offline(true);
        let listed = gateway.fetch_restaurants().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_favorite);
    }

    #[tokio::test]
    async fn test_write_failure_changes_nothing() {
        let (_dir, store, transport, gateway) = setup().await;
        store
            .upsert(
                RESTAURANTS,
                Record::from_value(json!({"id": 7, "name": "Cafe X", "is_favorite": false})).unwrap(),
            )
            .await
            .unwrap();
        transport.set_offline(true);

        let err = gateway.set_favorite(&RecordId::Int(7), true).await.unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));

        gateway.mirror().settle().await;
        let stored = store
            .get_by_id(RESTAURANTS, &RecordId::Int(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get("is_favorite"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_add_and_remove_review() {
        let (_dir, store, transport, gateway) = setup().await;
        transport.json(
            "http://localhost:1337/reviews/",
            json!({"id": 31, "restaurant_id": 2, "name": "unnamed reviewer", "rating": 0, "comments": "ok"}),
        );

        let review = gateway
            .add_review(&NewReview {
                restaurant_id: RecordId::Int(2),
                name: None,
                rating: 12,
                comments: "ok".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(review.id, RecordId::Int(31));
        gateway.mirror().settle().await;
        assert_eq!(store.count(REVIEWS).await.unwrap(), 1);

        transport.respond("http://localhost:1337/reviews/31", StatusCode::OK, "");
        gateway.remove_review(&RecordId::Int(31)).await.unwrap();
        gateway.mirror().settle().await;
        assert_eq!(store.count(REVIEWS).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_review_writes_change_nothing() {
        let (_dir, store, transport, gateway) = setup().await;
        store
            .upsert(
                REVIEWS,
                Record::from_value(
                    json!({"id": 31, "restaurant_id": 2, "name": "A", "rating": 4, "comments": "ok"}),
                )
                .unwrap(),
            )
            .await
            .unwrap();
        transport.set_offline(true);

        let err = gateway
            .add_review(&NewReview {
                restaurant_id: RecordId::Int(2),
                name: Some("B".to_string()),
                rating: 3,
                comments: "fine".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_network());

        let err = gateway.remove_review(&RecordId::Int(31)).await.unwrap_err();
        assert!(err.is_network());

        gateway.mirror().settle().await;
        let stored = store.get_all(REVIEWS).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get("name"), Some(&json!("A")));
    }

    #[tokio::test]
    async fn test_reviews_with_string_ratings_and_camel_case_keys() {
        let (_dir, store, transport, gateway) = setup().await;
        transport.json(
            "http://localhost:1337/reviews/?restaurant_id=4",
            json!([
                {"id": 1, "restaurant_id": 4, "name": "A", "rating": 4, "comments": ""},
                {"id": 2, "restaurantId": "4", "name": "B", "rating": "3", "comments": ""}
            ]),
        );

        let reviews = gateway
            .fetch_reviews_by_restaurant_id(&RecordId::Int(4))
            .await
            .unwrap();
        let ratings: Vec<u8> = reviews.iter().map(|r| r.rating).collect();
        assert_eq!(ratings, vec![4, 3]);

        // The offline copy answers the same query
        gateway.mirror().settle().await;
        transport.set_offline(true);
        let offline = gateway
            .fetch_reviews_by_restaurant_id(&RecordId::Int(4))
            .await
            .unwrap();
        assert_eq!(offline.len(), 2);
        assert_eq!(store.count(REVIEWS).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reviews_of_other_restaurants_are_dropped() {
        let (_dir, _store, transport, gateway) = setup().await;
        // Servers that ignore the query string answer with every review
        transport.json(
            "http://localhost:1337/reviews/?restaurant_id=4",
            json!([
                {"id": 1, "restaurant_id": 4, "name": "A", "rating": 4, "comments": ""},
                {"id": 2, "restaurant_id": 5, "name": "B", "rating": 2, "comments": ""}
            ]),
        );

        let reviews = gateway
            .fetch_reviews_by_restaurant_id(&RecordId::Int(4))
            .await
            .unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].id, RecordId::Int(1));
    }
}
