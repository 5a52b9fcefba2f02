use serde::Serialize;

pub const UNKNOWN_USER: &str = "Unknown User";

/// Profile document as stored for a user. Every field is optional in practice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub photo: Option<String>,
    pub photos: Vec<String>,
}

impl UserProfile {
    /// Picks the display name and the first available photo.
    #[must_use]
    pub fn summary(&self) -> ProfileSummary {
        let name = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).unwrap_or(UNKNOWN_USER).to_string();

        let photo_url = [self.photo_url.as_deref(), self.photo.as_deref(), self.photos.first().map(String::as_str)]
            .into_iter()
            .flatten()
            .find(|p| !p.is_empty())
            .map(ToString::to_string);

        ProfileSummary { name, photo_url }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub name: String,
    pub photo_url: Option<String>,
}

impl ProfileSummary {
    #[must_use]
    pub fn unknown() -> Self {
        Self { name: UNKNOWN_USER.to_string(), photo_url: None }
    }
}
