//! Dispatcher-level pipeline tests: registration, graph linking through
//! runtime introspection, and tag authentication.

use tensor_vault::config::{self, CacheMode, EnvConfig};
use tensor_vault::dispatch::Dispatcher;
use tensor_vault::runtime::mock::MockRuntime;
use tensor_vault::wire::{InferRequest, RegisterRequest, Request, Response, WireTensor};

fn test_config(mode: CacheMode, dir: &std::path::Path) -> EnvConfig {
    let mut cfg = config::load();
    cfg.cache_mode = mode;
    cfg.model_dir = dir.to_path_buf();
    cfg
}

/// Three partitions: p0 feeds p1 and p2 through distinct output names,
/// exercising prefix matching ("branch_a" matches input "branch_a:0").
fn branching_pipeline() -> RegisterRequest {
    RegisterRequest {
        id: -1,
        partition_names: vec!["p0".into(), "p1".into(), "p2".into()],
        partitions: vec![
            MockRuntime::manifest(&["image"], &["branch_a", "branch_b"]),
            MockRuntime::manifest(&["branch_a"], &["logits_a"]),
            MockRuntime::manifest(&["branch_b"], &["logits_b"]),
        ],
        inputs: Vec::new(),
        tokenizer: None,
    }
}

fn infer(id: i32, tags: Vec<String>) -> Request {
    Request::Infer(InferRequest {
        model_id: id,
        inputs: vec![WireTensor::new(&[1, 4], &[1.0, 2.0, 3.0, 4.0])],
        tags,
        tokenizer: None,
    })
}

#[test]
fn branching_pipeline_predicts_from_the_last_partition() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(
        &test_config(CacheMode::Resident, dir.path()),
        Box::new(MockRuntime::new()),
    );

    let response = dispatcher.handle(Request::Register(branching_pipeline()));
    let Response::Registered { id, tags } = response else {
        panic!("registration failed: {response}");
    };
    assert_eq!(id, "1");
    assert!(tags.is_empty());

    let response = dispatcher.handle(infer(1, Vec::new()));
    let Response::Prediction {
        partition,
        category,
        ..
    } = response
    else {
        panic!("inference failed: {response}");
    };
    // Registration order decides authority, not graph shape.
    assert_eq!(partition, "p2");
    assert!(category < 1000);
}

#[test]
fn unresolvable_input_aborts_registration_before_any_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(
        &test_config(CacheMode::Resident, dir.path()),
        Box::new(MockRuntime::new()),
    );

    let request = RegisterRequest {
        id: -1,
        partition_names: vec!["p0".into(), "p1".into()],
        partitions: vec![
            MockRuntime::manifest(&["image"], &["features"]),
            MockRuntime::manifest(&["unrelated_tensor"], &["logits"]),
        ],
        inputs: Vec::new(),
        tokenizer: None,
    };
    let response = dispatcher.handle(Request::Register(request));
    assert!(matches!(&response, Response::Error(msg) if msg.contains("unrelated_tensor")));
    assert_eq!(dispatcher.model_count(), 0);
}

#[test]
fn durable_tags_authenticate_each_partition_independently() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(
        &test_config(CacheMode::Durable, dir.path()),
        Box::new(MockRuntime::new()),
    );

    let Response::Registered { id, tags } =
        dispatcher.handle(Request::Register(branching_pipeline()))
    else {
        panic!("registration failed");
    };
    let id: i32 = id.parse().unwrap();
    assert_eq!(tags.len(), 3);

    // Correct tags succeed.
    assert!(matches!(
        dispatcher.handle(infer(id, tags.clone())),
        Response::Prediction { .. }
    ));

    // Swapping two valid tags must fail: tag i authenticates only
    // ciphertext i.
    let mut swapped = tags.clone();
    swapped.swap(0, 1);
    let response = dispatcher.handle(infer(id, swapped));
    assert!(
        matches!(&response, Response::Error(msg) if msg.contains("authentication")),
        "got: {response}"
    );

    // The model is still usable afterwards.
    assert!(matches!(
        dispatcher.handle(infer(id, tags)),
        Response::Prediction { .. }
    ));
}

#[test]
fn fresh_parameters_per_registration() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(
        &test_config(CacheMode::Durable, dir.path()),
        Box::new(MockRuntime::new()),
    );

    let mut first = branching_pipeline();
    first.partition_names = vec!["a0".into(), "a1".into(), "a2".into()];
    let mut second = branching_pipeline();
    second.partition_names = vec!["b0".into(), "b1".into(), "b2".into()];

    let Response::Registered { tags: tags_a, .. } = dispatcher.handle(Request::Register(first))
    else {
        panic!("first registration failed");
    };
    let Response::Registered { tags: tags_b, .. } = dispatcher.handle(Request::Register(second))
    else {
        panic!("second registration failed");
    };
    // Same plaintext, different key material.
    assert_ne!(tags_a, tags_b);
}

#[test]
fn remove_frees_the_model_but_not_its_neighbors() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(
        &test_config(CacheMode::Resident, dir.path()),
        Box::new(MockRuntime::new()),
    );

    for name in ["m_one", "m_two", "m_three"] {
        let request = RegisterRequest {
            id: -1,
            partition_names: vec![name.to_string()],
            partitions: vec![MockRuntime::manifest(&["x"], &["y"])],
            inputs: Vec::new(),
            tokenizer: None,
        };
        assert!(matches!(
            dispatcher.handle(Request::Register(request)),
            Response::Registered { .. }
        ));
    }

    assert!(dispatcher.remove_model(2));
    assert!(!dispatcher.remove_model(2));
    assert_eq!(dispatcher.model_count(), 2);

    assert!(matches!(
        dispatcher.handle(infer(1, Vec::new())),
        Response::Prediction { .. }
    ));
    assert!(matches!(
        dispatcher.handle(infer(3, Vec::new())),
        Response::Prediction { .. }
    ));
    let response = dispatcher.handle(infer(2, Vec::new()));
    assert!(matches!(&response, Response::Error(msg) if msg.contains("no model")));
}
