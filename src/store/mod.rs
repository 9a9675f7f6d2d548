pub mod emitter;
pub mod sink;

pub use emitter::Emitter;
pub use sink::{Artifact, ArtifactKind, ArtifactSink};
