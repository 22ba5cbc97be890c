use std::sync::Arc;

use anyhow::Result;
use axrt_core::{
    Backend, BackendCapabilities, BackendModel, IOName, ModelArtifact, ModelSpec, Tensor,
};

use crate::{Device, Session, SessionOptions};

/// [`Backend`] over an already brought-up NPU device.
pub struct AxEngineBackend {
    device: Arc<Device>,
    options: SessionOptions,
}

impl AxEngineBackend {
    pub fn new(device: Arc<Device>) -> Self {
        Self::with_options(device, SessionOptions::default())
    }

    pub fn with_options(device: Arc<Device>, options: SessionOptions) -> Self {
        Self { device, options }
    }
}

impl Backend for AxEngineBackend {
    type Model = Session;

    fn name(&self) -> &'static str {
        "ax-engine"
    }

    fn load(&self, artifact: &ModelArtifact) -> Result<Self::Model> {
        let session = match artifact {
            ModelArtifact::AxModelPath(path) => {
                Session::from_path_with(&self.device, path, &self.options)?
            }
            ModelArtifact::AxModelBytes(bytes) => {
                Session::from_bytes_with(&self.device, bytes.clone(), &self.options)?
            }
        };
        Ok(session)
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_shape_groups: true,
            owned_outputs: true,
        }
    }
}

impl BackendModel for Session {
    fn spec(&self) -> &ModelSpec {
        Session::spec(self)
    }

    fn infer(
        &mut self,
        inputs: Vec<(IOName, Tensor)>,
        shape_group: usize,
    ) -> Result<Vec<(IOName, Tensor)>> {
        let feed = inputs
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor))
            .collect::<Vec<_>>();
        Ok(self.run_named(&[], &feed, shape_group)?)
    }
}
