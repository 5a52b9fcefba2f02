use crate::domain::profile::UserProfile;

#[derive(Debug, sqlx::FromRow)]
pub struct ProfileRecord {
    pub(crate) name: Option<String>,
    pub(crate) photo_url: Option<String>,
    pub(crate) photo: Option<String>,
    pub(crate) photos: Vec<String>,
}

impl From<ProfileRecord> for UserProfile {
    fn from(record: ProfileRecord) -> Self {
        Self { name: record.name, photo_url: record.photo_url, photo: record.photo, photos: record.photos }
    }
}
