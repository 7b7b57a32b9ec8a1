// Domain Layer - Pure business logic and entities

pub mod auth_data;
pub mod error;
pub mod job;
pub mod models;

// Re-exports
pub use auth_data::{AuthData, AuthFlowConfiguration};
pub use error::{DomainError, TransferError};
pub use job::{AuthMode, DataVertical, JobAuthorization, JobId, JobState, PortabilityJob};
pub use models::{
    CalendarContainer, CalendarEvent, ContainerResource, ImportableItem, PhotoAlbum, PhotoModel,
    PhotosContainer, SocialActivity, SocialContainer, VideoModel, VideosContainer,
};
