//! Shared fixtures: a two-provider registry (flickr -> smugmug) over SQLite

#![allow(dead_code)]

use portability_core::application::callback::encode_job_id;
use portability_core::application::registry::StaticExtension;
use portability_core::application::{
    CallbackRequest, ExtensionContext, ExtensionFactory, ExtensionRegistry, JobLifecycleService,
    OauthCallbackHandler, ProviderBindings,
};
use portability_core::domain::{
    AuthMode, ContainerResource, DataVertical, JobState, PhotoAlbum, PhotoModel, PhotosContainer,
};
use portability_core::port::id_provider::SequentialIdProvider;
use portability_core::port::mocks::StaticAppCredentialStore;
use portability_core::port::provider::mocks::{MockAuthDataGenerator, MockExporter, MockPhotosImporter};
use portability_core::port::time_provider::FixedTimeProvider;
use portability_core::port::{JobStore, TemporaryPerJobDataStore};
use portability_infra_sqlite::{create_pool, run_migrations, SqliteStore};
use std::sync::Arc;

pub const WEB_URL: &str = "https://portability.test";
pub const API_URL: &str = "https://api.portability.test";

pub async fn sqlite_store(url: &str, clock: Arc<FixedTimeProvider>) -> Arc<SqliteStore> {
    let pool = create_pool(url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool, clock))
}

pub fn photo(id: &str, album: Option<&str>) -> PhotoModel {
    PhotoModel {
        data_id: id.to_string(),
        album_id: album.map(str::to_string),
        title: format!("Photo {}", id),
        description: None,
        media_type: "image/jpeg".to_string(),
        fetchable_url: format!("https://cdn.flickr.test/{}.jpg", id),
        in_temp_store: false,
    }
}

pub fn album_page(album_id: &str, photo_ids: &[&str]) -> ContainerResource {
    ContainerResource::Photos(PhotosContainer {
        albums: vec![PhotoAlbum {
            id: album_id.to_string(),
            name: "Holiday".to_string(),
            description: None,
        }],
        photos: photo_ids.iter().map(|id| photo(id, Some(album_id))).collect(),
    })
}

pub fn extensions(
    exporter: Arc<MockExporter>,
    importer: Arc<MockPhotosImporter>,
) -> Vec<Box<dyn ExtensionFactory>> {
    vec![
        Box::new(StaticExtension::new(
            "flickr",
            ProviderBindings::default()
                .with_exporter(DataVertical::Photos, exporter)
                .with_auth(
                    DataVertical::Photos,
                    AuthMode::Export,
                    Arc::new(MockAuthDataGenerator::new("T1")),
                ),
        )),
        Box::new(StaticExtension::new(
            "smugmug",
            ProviderBindings::default()
                .with_importer(DataVertical::Photos, importer)
                .with_auth(
                    DataVertical::Photos,
                    AuthMode::Import,
                    Arc::new(MockAuthDataGenerator::new("T2")),
                ),
        )),
    ]
}

pub fn registry(
    extensions: Vec<Box<dyn ExtensionFactory>>,
    temp_store: Arc<dyn TemporaryPerJobDataStore>,
) -> Arc<ExtensionRegistry> {
    let registry = Arc::new(ExtensionRegistry::new(extensions));
    registry.initialize(&ExtensionContext {
        temp_store,
        app_credentials: Arc::new(StaticAppCredentialStore::default()),
        base_url: WEB_URL.to_string(),
        base_api_url: API_URL.to_string(),
    });
    registry
}

pub struct Orchestrator {
    pub lifecycle: JobLifecycleService,
    pub callbacks: OauthCallbackHandler,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SqliteStore>,
        registry: Arc<ExtensionRegistry>,
        clock: Arc<FixedTimeProvider>,
    ) -> Self {
        Self {
            lifecycle: JobLifecycleService::new(
                store.clone(),
                registry.clone(),
                Arc::new(SequentialIdProvider::default()),
                clock.clone(),
                API_URL,
            ),
            callbacks: OauthCallbackHandler::new(store, registry, clock, WEB_URL, API_URL),
        }
    }

    /// Create a flickr -> smugmug photos job and authorize both sides
    pub async fn authorized_job(&self) -> String {
        let job = self
            .lifecycle
            .create_job("flickr", "smugmug", DataVertical::Photos)
            .await
            .unwrap();

        self.lifecycle.initiate_auth(&job.id, AuthMode::Export).await.unwrap();
        let outcome = self.callbacks.handle(&callback(&job.id, "flickr", "EXPORT")).await;
        assert_eq!(outcome.location(), format!("{}/next", WEB_URL));

        self.lifecycle.initiate_auth(&job.id, AuthMode::Import).await.unwrap();
        let outcome = self.callbacks.handle(&callback(&job.id, "smugmug", "IMPORT")).await;
        assert_eq!(outcome.location(), format!("{}/copy", WEB_URL));

        job.id
    }
}

pub fn callback(job_id: &str, service: &str, mode: &str) -> CallbackRequest {
    CallbackRequest {
        service_id: service.to_string(),
        oauth_token: Some(MockAuthDataGenerator::request_token(job_id)),
        oauth_verifier: Some("verifier".to_string()),
        encoded_job_id: Some(encode_job_id(job_id)),
        auth_mode: Some(mode.to_string()),
    }
}

/// Move an authorized job into TRANSFER_IN_PROGRESS without running it
pub async fn begin_transfer(store: &SqliteStore, job_id: &str, now: i64) {
    let mut job = store.find(job_id).await.unwrap().unwrap();
    job.begin_transfer(now).unwrap();
    store.update(&job, JobState::ImportAuthComplete).await.unwrap();
}
