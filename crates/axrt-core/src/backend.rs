use anyhow::Result;

use crate::{IOName, ModelArtifact, ModelSpec, Tensor};

#[derive(Clone, Copy, Debug)]
pub struct BackendCapabilities {
    /// Pre-compiled input-shape variants selectable per call.
    pub supports_shape_groups: bool,
    /// Outputs are copied out of device memory rather than borrowed.
    pub owned_outputs: bool,
}

pub trait Backend: Send + Sync + 'static {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(&self, artifact: &ModelArtifact) -> Result<Self::Model>;
    fn capabilities(&self) -> BackendCapabilities;
}

pub trait BackendModel: Send + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Runs one inference at `shape_group`. Outputs come back in declared order.
    fn infer(
        &mut self,
        inputs: Vec<(IOName, Tensor)>,
        shape_group: usize,
    ) -> Result<Vec<(IOName, Tensor)>>;
}
