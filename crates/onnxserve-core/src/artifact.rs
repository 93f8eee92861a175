#[derive(Clone, Debug)]
pub enum ModelArtifact {
    OnnxPath(std::path::PathBuf),
}

