//! ---
//! ied_section: "05-networking-external-interfaces"
//! ied_subsection: "tests"
//! ied_type: "test"
//! ied_scope: "code"
//! ied_description: "HTTP round trips against the REST transport."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::sync::Arc;

use r_ied_model::{ModelBuilder, ModelStore, QueryPort, TypeDecl, Value};
use r_ied_net::{new_registry, IedMetrics, RestApiBuilder, RestApiHandle};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value as Json};

fn store() -> Arc<ModelStore> {
    let store = ModelBuilder::new()
        .enum_type("Beh", [("on", 1), ("blocked", 2), ("test", 3)])
        .ied("R1", |ied| {
            ied.logical_device("C1", |ld| {
                ld.logical_node("LLN0", |ln| {
                    ln.data_object("Beh", |d| {
                        d.attribute_with("stVal", TypeDecl::Enum("Beh".into()), "on");
                    });
                })
                .logical_node("MMXU1", |ln| {
                    ln.data_object("A", |a| {
                        a.data_object("phsA", |phs| {
                            phs.attribute("cVal", TypeDecl::Vector);
                        });
                    });
                });
            });
        })
        .build()
        .expect("model builds");
    Arc::new(store)
}

async fn spawn(store: Arc<ModelStore>, scope: Option<&str>) -> (RestApiHandle, String, IedMetrics) {
    let metrics = IedMetrics::new(new_registry()).unwrap();
    let handle = RestApiBuilder::new("127.0.0.1:0".parse().unwrap(), QueryPort::new(store))
        .with_scope(scope.map(str::to_owned))
        .with_metrics(metrics.clone())
        .spawn()
        .await
        .unwrap();
    let base = format!("http://{}", handle.local_addr());
    (handle, base, metrics)
}

#[tokio::test]
async fn set_then_get_vector_half() {
    let store = store();
    let (handle, base, _) = spawn(store.clone(), None).await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/value/R1/C1.MMXU1.A.phsA.cVal.mag.f"))
        .body("123.45")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Json = response.json().await.unwrap();
    assert_eq!(body["path"], "R1/C1.MMXU1.A.phsA.cVal.mag.f");
    assert_eq!(body["value"], json!(123.45));

    let body: Json = client
        .get(format!("{base}/value/R1/C1/MMXU1/A/phsA/cVal"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["type"], "vector");
    assert_eq!(body["value"]["mag"], json!(123.45));
    assert_eq!(body["value"]["ang"], json!(0.0));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejected_value_keeps_previous_one() {
    let store = store();
    store.set("R1/C1.MMXU1.A.phsA.cVal.mag.f", "123.45").unwrap();
    let (handle, base, _) = spawn(store.clone(), None).await;

    let response = Client::new()
        .post(format!("{base}/value/R1/C1.MMXU1.A.phsA.cVal.mag.f"))
        .body("abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Json = response.json().await.unwrap();
    assert_eq!(body["code"], "BAD_VALUE");
    assert_eq!(
        store.get("R1/C1.MMXU1.A.phsA.cVal.mag.f").unwrap().value,
        Value::Float32(123.45)
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn error_codes_map_to_http_statuses() {
    let (handle, base, _) = spawn(store(), None).await;
    let client = Client::new();
    let cases = [
        ("value/R1/C1.MMXU2.A", StatusCode::NOT_FOUND, "NOT_FOUND"),
        ("value/R1/C1.MMXU1.A", StatusCode::CONFLICT, "NOT_A_LEAF"),
        (
            "value/R1/C1.LLN0.Beh.stVal.deeper",
            StatusCode::BAD_REQUEST,
            "WRONG_DEPTH",
        ),
    ];
    for (path, status, code) in cases {
        let response = client.get(format!("{base}/{path}")).send().await.unwrap();
        assert_eq!(response.status(), status, "{path}");
        let body: Json = response.json().await.unwrap();
        assert_eq!(body["code"], code, "{path}");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn directory_and_definition_walk_the_tree() {
    let (handle, base, _) = spawn(store(), None).await;
    let client = Client::new();

    let roots: Json = client
        .get(format!("{base}/directory/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(roots["listing"], "directory");
    assert_eq!(roots["children"][0]["name"], "R1");

    let nodes: Json = client
        .get(format!("{base}/directory/R1/C1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<_> = nodes["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["LLN0", "MMXU1"]);

    let definition: Json = client
        .get(format!("{base}/definition/R1/C1.LLN0.Beh"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(definition["kind"], "data-object");
    assert!(definition["children"]["stVal"].is_object());

    let values: Json = client
        .get(format!("{base}/values/R1/C1.LLN0"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(values["Beh"]["stVal"]["value"], "on");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn scoped_server_accepts_ied_relative_paths() {
    let store = store();
    let (handle, base, _) = spawn(store.clone(), Some("R1")).await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/value/C1/MMXU1.A/phsA.cVal.ang.f"))
        .body("-30")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        store
            .get("R1/C1.MMXU1.A.phsA.cVal")
            .unwrap()
            .value
            .as_vector()
            .unwrap()
            .ang,
        -30.0
    );

    let listing: Json = client
        .get(format!("{base}/directory"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["path"], "R1");
    assert_eq!(listing["children"][0]["name"], "C1");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn metrics_count_queries_by_outcome() {
    let (handle, base, _) = spawn(store(), None).await;
    let client = Client::new();

    client
        .get(format!("{base}/value/R1/C1.LLN0.Beh.stVal"))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/value/R1/C1.LLN0.Beh.stVal"))
        .body("sideways")
        .send()
        .await
        .unwrap();

    let text = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains(r#"r_ied_queries_total{op="get",outcome="ok"} 1"#));
    assert!(text.contains(r#"r_ied_queries_total{op="set",outcome="BAD_VALUE"} 1"#));

    handle.shutdown().await.unwrap();
}
