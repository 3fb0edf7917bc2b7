//! Woven methods against a real HTTP server through the default transport.

mod common;

use common::{json_natives, load, weave, ITEMS};
use httpmock::prelude::*;
use restweave::StatusCode;
use restweave_synth::{Interpreter, ModuleDef, Value, WeavingOptions};
use serde_json::json;

async fn woven_for(server: &MockServer) -> ModuleDef {
    let mut def: ModuleDef = serde_json::from_str(ITEMS).unwrap();
    for marker in &mut def.types[1].markers {
        if let restweave_synth::Marker::ServiceFor { address } = marker {
            *address = Some(server.url("/api"));
        }
    }
    let (module, _, _) = weave(
        restweave_synth::MemoryModule::new(def),
        WeavingOptions::default(),
    )
    .await;
    module.into_inner()
}

#[tokio::test]
async fn get_item_round_trips_json() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/items/42")
                .header("accept", "application/json")
                .header("x-client", "items");
            then.status(200).body(r#"{"id":42,"name":"lamp"}"#);
        })
        .await;

    let interp = Interpreter::new(woven_for(&server).await).with_natives(json_natives());
    let api = interp.construct("ItemsApi", vec![]).unwrap();
    let out = interp
        .invoke(&api, "get_item", vec![Value::Int(42)])
        .await
        .unwrap();

    mock.assert_async().await;
    let Some(Value::Json(item)) = out.into_value() else {
        panic!("expected a deserialized item");
    };
    assert_eq!(item, json!({"id": 42, "name": "lamp"}));
}

#[tokio::test]
async fn search_sends_query_and_headers() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/items")
                .query_param("sort", "asc")
                .query_param("color", "dark red")
                .header("accept", "text/plain")
                .header("x-trace", "t-9");
            then.status(200).body("lamp");
        })
        .await;

    let interp = Interpreter::new(woven_for(&server).await).with_natives(json_natives());
    let api = interp.construct("ItemsApi", vec![]).unwrap();
    let out = interp
        .invoke(
            &api,
            "search",
            vec![
                Value::map([("color", "dark red")]),
                Value::map([("X-Trace", "t-9")]),
            ],
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(out.into_text().as_deref(), Some("lamp"));
}

#[tokio::test]
async fn server_error_surfaces_as_domain_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/items/7");
            then.status(404).body("no such item");
        })
        .await;

    let interp = Interpreter::new(woven_for(&server).await).with_natives(json_natives());
    let api = interp.construct("ItemsApi", vec![]).unwrap();
    let err = interp
        .invoke(&api, "get_item", vec![Value::Int(7)])
        .await
        .unwrap_err();

    let rest = err.rest().expect("domain error");
    assert_eq!(rest.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(rest.response().unwrap().text(), "no such item");
}

#[tokio::test]
async fn fixture_still_parses_after_weaving() {
    let (module, _, _) = weave(load(ITEMS), WeavingOptions::default()).await;
    let json = module.to_json().unwrap();
    let again = restweave_synth::MemoryModule::from_json(&json).unwrap();
    assert_eq!(again, module);
}
