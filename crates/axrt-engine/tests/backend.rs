mod common;

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use axrt_core::{Backend, BackendCapabilities, BackendModel, IOName, ModelArtifact, Shape, Tensor};
use axrt_engine::{AxEngineBackend, Error};
use bytes::Bytes;
use common::{Call, FakeDriver, MODEL_BLOB};

#[test]
fn backend_loads_and_infers_through_the_trait() -> Result<()> {
    let fake = Arc::new(FakeDriver::new(common::multi_group()));
    let backend = AxEngineBackend::new(common::device(&fake));

    ensure!(backend.name() == "ax-engine", "unexpected backend name");
    let BackendCapabilities {
        supports_shape_groups,
        owned_outputs,
    } = backend.capabilities();
    ensure!(supports_shape_groups, "shape groups should be supported");
    ensure!(owned_outputs, "outputs should be owned host copies");

    let mut model =
        backend.load(&ModelArtifact::AxModelBytes(Bytes::from_static(MODEL_BLOB)))?;
    ensure!(
        model.spec().group_count == 3,
        "expected 3 shape groups, got {}",
        model.spec().group_count
    );

    let x = Tensor::from_f32(Shape::from_slice(&[1, 8]), &[2.0; 8])?;
    let outputs = model.infer(vec![(IOName::from("x"), x)], 1)?;

    let names = outputs.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>();
    ensure!(names == ["y", "len"], "unexpected output order {names:?}");
    let (_, y) = outputs.first().context("missing output y")?;
    ensure!(y.to_f32_vec()? == vec![2.0; 8], "identity output mismatch");
    ensure!(
        fake.calls().contains(&Call::RunGroupSync(1)),
        "group 1 should use the indexed entry point"
    );
    Ok(())
}

#[test]
fn engine_errors_survive_the_trait_boundary() {
    let fake = Arc::new(FakeDriver::new(common::classifier()));
    let backend = AxEngineBackend::new(common::device(&fake));
    let mut model = backend
        .load(&ModelArtifact::AxModelBytes(Bytes::from_static(MODEL_BLOB)))
        .unwrap();

    let err = model.infer(Vec::new(), 4).unwrap_err();
    let engine = err.downcast_ref::<Error>().unwrap();
    assert!(matches!(engine, Error::ShapeGroup { requested: 4, .. }));
}

#[test]
fn missing_artifact_path_fails_to_load() {
    let fake = Arc::new(FakeDriver::new(common::classifier()));
    let backend = AxEngineBackend::new(common::device(&fake));

    let result = backend.load(&ModelArtifact::AxModelPath("/nonexistent/x.axmodel".into()));
    assert!(result.is_err());
}
