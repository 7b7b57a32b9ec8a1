// Common data model shared by exporters and importers

use serde::{Deserialize, Serialize};

/// Leaf item that an importer hands to the import executor
pub trait ImportableItem {
    /// Key unique within the job; the executor attempts each key once
    fn id_key(&self) -> String;

    /// Human-readable label used in logs and failure reports
    fn display_name(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoAlbum {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoModel {
    /// Provider-side identifier, unique within the job
    pub data_id: String,
    pub album_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub media_type: String,
    /// Remote URL, or temporary blob key when `in_temp_store` is set
    pub fetchable_url: String,
    pub in_temp_store: bool,
}

impl ImportableItem for PhotoModel {
    fn id_key(&self) -> String {
        format!("photo:{}", self.data_id)
    }

    fn display_name(&self) -> String {
        self.title.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoModel {
    pub data_id: String,
    pub album_id: Option<String>,
    pub name: String,
    pub encoding_format: String,
    pub content_url: String,
    pub in_temp_store: bool,
}

impl ImportableItem for VideoModel {
    fn id_key(&self) -> String {
        format!("video:{}", self.data_id)
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotosContainer {
    pub albums: Vec<PhotoAlbum>,
    pub photos: Vec<PhotoModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideosContainer {
    pub albums: Vec<PhotoAlbum>,
    pub videos: Vec<VideoModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub start_millis: i64,
    pub end_millis: i64,
    pub location: Option<String>,
}

impl ImportableItem for CalendarEvent {
    fn id_key(&self) -> String {
        format!("event:{}", self.id)
    }

    fn display_name(&self) -> String {
        self.title.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarContainer {
    pub calendars: Vec<(String, String)>, // (id, name)
    pub events: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialActivity {
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub published_millis: i64,
    pub links: Vec<String>,
}

impl ImportableItem for SocialActivity {
    fn id_key(&self) -> String {
        format!("activity:{}", self.id)
    }

    fn display_name(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialContainer {
    pub activities: Vec<SocialActivity>,
}

/// Batch of items handed from an exporter to an importer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ContainerResource {
    Photos(PhotosContainer),
    Videos(VideosContainer),
    Calendar(CalendarContainer),
    Social(SocialContainer),
}

impl ContainerResource {
    /// Number of leaf items (albums and calendars are not counted)
    pub fn item_count(&self) -> usize {
        match self {
            ContainerResource::Photos(c) => c.photos.len(),
            ContainerResource::Videos(c) => c.videos.len(),
            ContainerResource::Calendar(c) => c.events.len(),
            ContainerResource::Social(c) => c.activities.len(),
        }
    }
}
