//! Courier upstream client against a wiremock server.

use pickup_gateway::core::config::{GatewayConfig, UpstreamConfig};
use pickup_gateway::upstream::search_request;
use pickup_gateway::{
    HttpUpstreamClient, LookupRequest, LookupSource, PickupLookupGateway, RequestOptions,
    SearchQuery, UpstreamClient, UpstreamError,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(base_url: String, token: Option<&str>) -> HttpUpstreamClient {
    HttpUpstreamClient::new(&UpstreamConfig {
        base_url,
        api_token: token.map(str::to_string),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_search_request_carries_token_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/points/map"))
        .and(header("authorization", "Bearer courier-token"))
        .and(body_json(json!({
            "location": {"city": "Gdańsk", "postcode": ""},
            "courierServices": ["inpost"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"points": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(server.uri(), Some("courier-token"));
    let query = SearchQuery::for_city("Gdańsk").with_courier_services(["inpost"]);

    let response = client
        .authenticated_request("/points/map", search_request(&query))
        .await
        .unwrap();

    assert!(response.ok);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"points": []}));
}

#[tokio::test]
async fn test_query_parameters_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/points"))
        .and(query_param("city", "Kraków"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(server.uri(), None);
    let options = RequestOptions::get().with_query("city", "Kraków");

    let response = client.authenticated_request("/points", options).await.unwrap();
    assert!(response.ok);
}

#[tokio::test]
async fn test_non_success_status_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = client_for(server.uri(), None);
    let response = client
        .authenticated_request("/points/map", RequestOptions::post(json!({})))
        .await
        .unwrap();

    assert!(!response.ok);
    assert_eq!(response.status, 502);
    assert_eq!(response.body, json!("bad gateway"));
}

#[tokio::test]
async fn test_invalid_json_on_success_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(server.uri(), None);
    let result = client
        .authenticated_request("/points/map", RequestOptions::post(json!({})))
        .await;

    assert!(matches!(result, Err(UpstreamError::Decode(_))));
}

#[tokio::test]
async fn test_connection_refused_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = client_for(format!("http://127.0.0.1:{port}"), None);
    let result = client
        .authenticated_request("/points/map", RequestOptions::post(json!({})))
        .await;

    assert!(matches!(result, Err(UpstreamError::Network(_))));
}

#[tokio::test]
async fn test_base_path_prefix_is_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/points/map"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(format!("{}/v2/", server.uri()), None);
    let response = client
        .authenticated_request("/points/map", RequestOptions::post(json!({})))
        .await
        .unwrap();

    assert!(response.ok);
    assert!(response.body.is_null());
}

#[tokio::test]
async fn test_gateway_end_to_end_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/points/map"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "POZ07",
                "provider": "dhl",
                "name": "DHL POP Stary Rynek",
                "address": "Stary Rynek 7",
                "city": "Poznań",
                "postal_code": "61-772",
                "lat": "52.4083",
                "lng": "16.9335"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = GatewayConfig::default();
    config.upstream.base_url = server.uri();
    let upstream = Arc::new(HttpUpstreamClient::new(&config.upstream).unwrap());
    let gateway = PickupLookupGateway::new(&config, upstream);

    let query = SearchQuery::for_city("Poznań").with_provider("dhl");
    let first = gateway.lookup(LookupRequest::new(query.clone())).await.unwrap();
    let second = gateway.lookup(LookupRequest::new(query)).await.unwrap();

    let first = first.into_response().unwrap();
    assert_eq!(first.source, LookupSource::Upstream);
    assert_eq!(first.points[0].id, "POZ07");
    let coordinates = first.points[0].coordinates.unwrap();
    assert!((coordinates.lat - 52.4083).abs() < 1e-9);

    assert_eq!(second.into_response().unwrap().source, LookupSource::Cache);
}
