mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use statwolf::{
    Element, FluentQuery, Join, MetricArgs, PipelineDefinition, Stage, StageContext, StageRegistry,
    StatwolfError, StatwolfResult,
};

use common::{mock_client, path};

fn rows_reply() -> Value {
    json!({
        "Data": {
            "hasErrors": false,
            "meta": [{ "name": "yolo", "type": "String" }],
            "data": [{ "yolo": "17", "myCount": 3 }, { "yolo": "18", "myCount": 5 }]
        }
    })
}

#[tokio::test]
async fn test_execute_returns_remote_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (client, mock) = mock_client();
    mock.reply(&path("/query"), rows_reply());

    let pipeline = client
        .datasource()
        .builder("uploaded_my_test_222")
        .calculated("yolo", "formatDateTime(toDate('1987-04-22'), '%V')")
        .dimensions(["yolo"])
        .metrics(["myCount"])
        .steps()
        .build();

    let element = pipeline.execute(None).await?;
    assert_eq!(element.meta["schema"], json!([{ "name": "yolo", "type": "String" }]));
    assert_eq!(element.dataset.len(), 2);

    let body = mock.last_body(&path("/query")).expect("query was posted");
    assert_eq!(body["table"], json!("uploaded_my_test_222"));
    assert_eq!(body["dimensions"], json!(["yolo"]));
    assert_eq!(
        body["testing"]["calculated"]["yolo"],
        json!("formatDateTime(toDate('1987-04-22'), '%V')")
    );
    Ok(())
}

#[tokio::test]
async fn test_transforms_run_in_order_on_the_element() -> Result<(), Box<dyn std::error::Error>> {
    let (client, mock) = mock_client();
    mock.reply(&path("/query"), rows_reply());

    let pipeline = client
        .datasource()
        .builder("src")
        .steps()
        .transform(|mut element, _| {
            element.meta.insert("pau".to_string(), json!("new field"));
            Ok(element)
        })
        .transform(|mut element, _| {
            let seen = element.meta.contains_key("pau");
            element.meta.insert("saw_previous".to_string(), json!(seen));
            element.dataset.truncate(1);
            Ok(element)
        })
        .build();

    assert_eq!(pipeline.steps().len(), 3);
    assert_eq!(pipeline.steps()[0].name(), "remote_query");

    let element = pipeline.execute(None).await?;
    assert_eq!(element.meta["pau"], json!("new field"));
    assert_eq!(element.meta["saw_previous"], json!(true));
    assert_eq!(element.dataset.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_override_applies_to_one_run_only() -> Result<(), Box<dyn std::error::Error>> {
    let (client, mock) = mock_client();
    mock.reply(&path("/query"), rows_reply());

    let seen_takes = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen_takes);

    let pipeline = client
        .datasource()
        .builder("src")
        .steps()
        .transform(move |element, context| {
            recorder.lock().unwrap().push(context.query().take().to_string());
            Ok(element)
        })
        .build();
    assert_eq!(pipeline.spec().take(), "5000");

    let override_query = pipeline.query().take(10);
    pipeline.execute(Some(override_query.spec())).await?;

    assert_eq!(mock.last_body(&path("/query")).unwrap()["take"], json!("10"));
    assert_eq!(pipeline.spec().take(), "5000");

    pipeline.execute(None).await?;
    assert_eq!(mock.last_body(&path("/query")).unwrap()["take"], json!("5000"));
    assert_eq!(*seen_takes.lock().unwrap(), vec!["10", "5000"]);
    Ok(())
}

#[tokio::test]
async fn test_query_returns_detached_editor() {
    let (client, _mock) = mock_client();

    let pipeline = client
        .datasource()
        .builder("src")
        .metrics(["a"])
        .steps()
        .build();

    let editor = pipeline
        .query()
        .metrics(["b", "c"])
        .custom_metric("c", MetricArgs::new().sql("1"))
        .join("j", Join::new("any left").by(["k"]).fields(["v"]));

    assert_eq!(editor.spec().metrics(), ["b", "c"]);
    assert_eq!(pipeline.spec().metrics(), ["a"]);
    assert!(pipeline.spec().custom_metrics().is_empty());
    assert!(pipeline.spec().computed_fields().is_empty());
}

#[tokio::test]
async fn test_step_params_are_bound_at_append_time() -> Result<(), Box<dyn std::error::Error>> {
    let (client, mock) = mock_client();
    mock.reply(&path("/query"), rows_reply());

    let mut params = json!({ "a": 1 });
    let observed = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&observed);

    let pipeline = client
        .datasource()
        .builder("src")
        .steps()
        .transform_with(
            move |element, context| {
                recorder.lock().unwrap().push(context.params().clone());
                Ok(element)
            },
            params.clone(),
        )
        .build();

    params["a"] = json!(2);
    params["b"] = json!(true);

    pipeline.execute(None).await?;
    pipeline.execute(None).await?;

    assert_eq!(*observed.lock().unwrap(), vec![json!({ "a": 1 }), json!({ "a": 1 })]);
    assert_eq!(pipeline.steps()[1].params(), &json!({ "a": 1 }));
    Ok(())
}

#[tokio::test]
async fn test_remote_error_is_raised_with_server_message() {
    let (client, mock) = mock_client();
    mock.reply(
        &path("/query"),
        json!({ "Data": { "hasErrors": true, "errorMessage": "bad field" } }),
    );

    let pipeline = client.datasource().builder("src").steps().build();

    match pipeline.execute(None).await {
        Err(StatwolfError::RemoteQuery(message)) => assert_eq!(message, "bad field"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_false_sentinel_is_an_authentication_error() {
    let (client, mock) = mock_client();
    mock.reply(&path("/query"), json!({ "Data": false }));

    let pipeline = client.datasource().builder("src").steps().build();

    assert!(matches!(
        pipeline.execute(None).await,
        Err(StatwolfError::AuthenticationOrRequest(_))
    ));
}

#[tokio::test]
async fn test_failing_stage_stops_later_stages() {
    let (client, mock) = mock_client();
    mock.reply(&path("/query"), rows_reply());

    let later_runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&later_runs);

    let pipeline = client
        .datasource()
        .builder("src")
        .steps()
        .transform(|_, _| Err(StatwolfError::stage("explode", "no rows wanted")))
        .transform(move |element, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(element)
        })
        .build();

    match pipeline.execute(None).await {
        Err(StatwolfError::Stage { stage, message }) => {
            assert_eq!(stage, "explode");
            assert_eq!(message, "no rows wanted");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(later_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_remote_failure_skips_transforms() {
    let (client, mock) = mock_client();
    mock.fail(&path("/query"), "connection reset");

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let pipeline = client
        .datasource()
        .builder("src")
        .steps()
        .transform(move |element, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(element)
        })
        .build();

    assert!(matches!(pipeline.execute(None).await, Err(StatwolfError::Network(_))));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

/// Stage that enriches rows with a second remote lookup
struct LookupStage;

#[async_trait]
impl Stage for LookupStage {
    fn name(&self) -> &str {
        "lookup"
    }

    async fn run(&self, mut element: Element, context: &StageContext<'_>) -> StatwolfResult<Element> {
        let path = context
            .param("path")
            .and_then(Value::as_str)
            .ok_or_else(|| StatwolfError::stage("lookup", "missing path"))?;
        let reply = context.post(path, &json!({ "table": context.query().table() })).await?;
        element.meta.insert("lookup".to_string(), reply);
        Ok(element)
    }
}

#[tokio::test]
async fn test_registered_stages_resolve_from_definition() -> Result<(), Box<dyn std::error::Error>> {
    let (client, mock) = mock_client();
    mock.reply(&path("/query"), rows_reply());
    mock.reply("/lookup", json!({ "labels": ["a"] }));

    let mut registry = StageRegistry::new();
    registry.register("lookup", Arc::new(LookupStage));
    registry.register_fn("count_rows", |mut element, context| {
        let key = context.param("key").and_then(Value::as_str).unwrap_or("rows").to_string();
        let count = element.dataset.len();
        element.meta.insert(key, json!(count));
        Ok(element)
    });

    let definition = PipelineDefinition::from_json(
        r#"{ "steps": [
            { "stage": "lookup", "params": { "path": "/lookup" } },
            { "stage": "count_rows", "params": { "key": "total" } }
        ] }"#,
    )?;

    let pipeline = client
        .datasource()
        .builder("src")
        .steps()
        .with_definition(&registry, &definition)?
        .build();

    let element = pipeline.execute(None).await?;
    assert_eq!(element.meta["lookup"], json!({ "labels": ["a"] }));
    assert_eq!(element.meta["total"], json!(2));
    assert_eq!(mock.last_body("/lookup").unwrap(), json!({ "table": "src" }));
    assert_eq!(pipeline.definition(), definition);
    Ok(())
}

#[tokio::test]
async fn test_unknown_stage_in_definition_is_rejected() {
    let (client, _mock) = mock_client();
    let definition = PipelineDefinition::from_json(r#"{ "steps": [{ "stage": "pivot" }] }"#).unwrap();

    let result = client
        .datasource()
        .builder("src")
        .steps()
        .with_definition(&StageRegistry::new(), &definition);

    assert!(matches!(result, Err(StatwolfError::UnknownStage(name)) if name == "pivot"));
}

#[tokio::test]
async fn test_definition_keeps_only_registered_steps() -> Result<(), Box<dyn std::error::Error>> {
    let (client, mock) = mock_client();
    mock.reply(&path("/query"), rows_reply());

    let mut registry = StageRegistry::new();
    registry.register_fn("tag", |mut element, context| {
        let label = context.param("label").cloned().unwrap_or(Value::Null);
        element.meta.insert("tag".to_string(), label);
        Ok(element)
    });

    let pipeline = client
        .datasource()
        .builder("src")
        .steps()
        .transform(|element, _| Ok(element))
        .transform_named(&registry, "tag", json!({ "label": "kept" }))?
        .build();

    let definition = pipeline.definition();
    assert_eq!(definition.steps.len(), 1);
    assert_eq!(definition.steps[0].stage, "tag");

    let reloaded = client
        .datasource()
        .builder("src")
        .steps()
        .with_definition(&registry, &PipelineDefinition::from_json(&definition.to_json()?)?)?
        .build();

    let element = reloaded.execute(None).await?;
    assert_eq!(element.meta["tag"], json!("kept"));
    assert_eq!(reloaded.definition(), definition);
    Ok(())
}
