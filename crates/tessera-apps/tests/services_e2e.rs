//! End-to-end tests of the assembled services, driven in memory.

use std::time::Duration;

use http::StatusCode;
use serde_json::{json, Value};
use tessera_apps::build_server;
use tessera_config::{PointBackend, TesseraConfig};
use tessera_test::TestClient;

async fn client_for(config: &TesseraConfig) -> TestClient {
    let server = build_server(config).await.unwrap();
    TestClient::started(server).await.unwrap()
}

async fn client() -> TestClient {
    let mut config = TesseraConfig::default();
    config.apps.wordcount.batch_interval_ms = 20;
    client_for(&config).await
}

#[tokio::test]
async fn test_nearest_points() {
    for backend in [PointBackend::Memory, PointBackend::Document] {
        let mut config = TesseraConfig::default();
        config.apps.points.backend = backend;
        let client = client_for(&config).await;

        for (x, y) in [(1.0, 1.0), (5.0, 5.0)] {
            client
                .post("/points/addPoint")
                .json(&json!({ "point": { "x": x, "y": y } }))
                .send()
                .await
                .unwrap()
                .assert_status(StatusCode::OK)
                .assert_text("null");
        }

        let nearest = |k: i64| {
            client
                .post("/points/getNearestPoints")
                .json(&json!({ "from": { "x": 0.0, "y": 0.0 }, "k": k }))
                .send()
        };

        let response = nearest(1).await.unwrap();
        response.assert_json(&json!([{ "x": 1.0, "y": 1.0 }]));

        let response = nearest(2).await.unwrap();
        response.assert_json(&json!([{ "x": 1.0, "y": 1.0 }, { "x": 5.0, "y": 5.0 }]));

        let response = nearest(3).await.unwrap();
        response.assert_status(StatusCode::BAD_REQUEST);
        let body = response.json_value().unwrap();
        assert_eq!(body["error"]["code"], "K_TOO_LARGE");
        assert_eq!(body["error"]["details"]["k"], 3);

        nearest(0).await.unwrap().assert_status(StatusCode::BAD_REQUEST);

        client.post("/points/clear").send().await.unwrap().assert_success();
        client.post("/points/clear").send().await.unwrap().assert_success();
        nearest(1).await.unwrap().assert_status(StatusCode::BAD_REQUEST);

        client.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn test_employees_across_protocols() {
    let client = client().await;

    for (first, last) in [("Thomas", "Feng"), ("Jackson", "Wang")] {
        client
            .post("/current/addEmployee")
            .json(&json!({ "employee": { "firstName": first, "lastName": last, "gender": "MALE" } }))
            .send()
            .await
            .unwrap()
            .assert_success();
    }
    let response = client
        .get("/legacy/addEmployee")
        .query("firstName", "Christine")
        .query("lastName", "Lee")
        .send()
        .await
        .unwrap();
    response.assert_text("3").assert_content_type("text/plain");

    for employee_id in [2, 3] {
        client
            .post("/current/makeManager")
            .json(&json!({ "managerId": 1, "employeeId": employee_id }))
            .send()
            .await
            .unwrap()
            .assert_text("null");
    }

    let response = client
        .post("/current/getEmployees")
        .json(&json!({ "managerId": 1 }))
        .send()
        .await
        .unwrap();
    let employees: Vec<Value> = response.json().unwrap();
    assert_eq!(employees.len(), 2);
    assert_eq!(employees[1]["firstName"], "Christine");
    assert_eq!(employees[1]["gender"], Value::Null);

    client
        .get("/legacy/getManager")
        .query("employeeId", 3)
        .send()
        .await
        .unwrap()
        .assert_text(r#"{"id": 1, "firstName": "Thomas", "lastName": "Feng"}"#);

    client
        .post("/current/countEmployees")
        .send()
        .await
        .unwrap()
        .assert_text("3");

    let response = client.get("/legacy/countEmployees").send().await.unwrap();
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response
        .text()
        .unwrap()
        .contains("Message not defined in the legacy protocol"));
}

#[tokio::test]
async fn test_graph() {
    let client = client().await;

    for (name, age) in [("amy", 12), ("brian", 13), ("catherine", 40), ("dave", 14)] {
        client
            .get("/graph/add")
            .query("name", name)
            .query("age", age)
            .send()
            .await
            .unwrap()
            .assert_status(StatusCode::OK)
            .assert_empty_body();
    }

    client
        .get("/graph/add")
        .query("name", "amy")
        .query("age", 20)
        .send()
        .await
        .unwrap()
        .assert_status(StatusCode::BAD_REQUEST);
    client
        .get("/graph/get")
        .query("name", "nobody")
        .send()
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);

    client
        .get("/graph/get")
        .query("name", "amy")
        .send()
        .await
        .unwrap()
        .assert_text("amy is 12 year(s) old.\n");
    client
        .get("/graph/betweenAges")
        .send()
        .await
        .unwrap()
        .assert_text("The following person(s) are between 0 and 120: amy, brian, catherine, dave.\n");

    for (name1, name2, strength) in [("amy", "brian", 5), ("brian", "catherine", 10), ("brian", "dave", 20)] {
        client
            .get("/graph/setFriend")
            .query("name1", name1)
            .query("name2", name2)
            .query("strength", strength)
            .send()
            .await
            .unwrap()
            .assert_empty_body();
    }

    client
        .get("/graph/getFriends")
        .query("name", "brian")
        .send()
        .await
        .unwrap()
        .assert_text("The following person(s) are friends of brian: dave, catherine, amy.\n");
    client
        .get("/graph/getMoreFriends")
        .query("name", "amy")
        .send()
        .await
        .unwrap()
        .assert_text("The following person(s) are more friends of amy: brian, dave, catherine.\n");
}

#[tokio::test]
async fn test_word_count() {
    let client = client().await;

    client.get("/wordcount/get").send().await.unwrap().assert_json(&json!({}));

    for message in ["hello world", "hello tessera"] {
        client
            .get("/wordcount/add")
            .query("message", message)
            .send()
            .await
            .unwrap()
            .assert_empty_body();
    }

    let counts = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let counts = client
                .get("/wordcount/get")
                .send()
                .await
                .unwrap()
                .json_value()
                .unwrap();
            if counts["hello"] == 2 {
                return counts;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(counts, json!({ "hello": 2, "tessera": 1, "world": 1 }));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_message_and_greeting() {
    let client = client().await;

    client
        .post("/message")
        .json(&json!({ "subject": "amy", "action": "likes", "object": "rust", "requestHeader": null }))
        .send()
        .await
        .unwrap()
        .assert_status(StatusCode::OK)
        .assert_text("null");

    client
        .get("/")
        .query("name", "Amy")
        .send()
        .await
        .unwrap()
        .assert_text("Hello, Amy!");
    client.get("/").send().await.unwrap().assert_text("Hello, Thomas!");

    client.get("/ready").send().await.unwrap().assert_status(StatusCode::OK);
    client.shutdown().await.unwrap();
    client
        .get("/ready")
        .send()
        .await
        .unwrap()
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_disabled_service_is_not_routed() {
    let mut config = TesseraConfig::default();
    config.apps.graph.enabled = false;
    let client = client_for(&config).await;
    client
        .get("/graph/get")
        .query("name", "amy")
        .send()
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);
}
