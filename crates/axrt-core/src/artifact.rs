use bytes::Bytes;

/// Where a compiled model blob comes from.
#[derive(Clone, Debug)]
pub enum ModelArtifact {
    AxModelPath(std::path::PathBuf),
    AxModelBytes(Bytes),
}
