pub mod artifacts;
pub mod events;
pub mod sessions;

pub use artifacts::{
    ActiveModel as ArtifactActiveModel, ArtifactKind, Column as ArtifactColumn, Entity as Artifacts,
    Model as Artifact,
};
pub use events::{ActiveModel as EventActiveModel, Column as EventColumn, Entity as Events, Model as Event};
pub use sessions::{ActiveModel as SessionActiveModel, Column as SessionColumn, Entity as Sessions, Model as Session};
