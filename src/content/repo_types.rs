use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::assets::AssetOwner;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub name: String,
    pub profile_pic: Option<String>,
    pub profile_pic2: Option<String>,
    pub pdf: Option<String>,
    pub video: Option<String>,
    pub about_text: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AssetOwner for Profile {
    fn asset_refs(&self) -> Vec<&str> {
        [&self.profile_pic, &self.profile_pic2, &self.pdf, &self.video]
            .into_iter()
            .filter_map(|r| r.as_deref())
            .collect()
    }
}

/// Values written by one profile save. `None` keeps whatever is stored.
#[derive(Debug, Clone, Default)]
pub struct ProfileDraft {
    pub name: String,
    pub profile_pic: Option<String>,
    pub profile_pic2: Option<String>,
    pub pdf: Option<String>,
    pub video: Option<String>,
    pub about_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub images: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AssetOwner for Blog {
    fn asset_refs(&self) -> Vec<&str> {
        self.thumbnail
            .as_deref()
            .into_iter()
            .chain(self.images.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlogSummary {
    pub id: Uuid,
    pub title: String,
    pub thumbnail: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&Blog> for BlogSummary {
    fn from(b: &Blog) -> Self {
        Self {
            id: b.id,
            title: b.title.clone(),
            thumbnail: b.thumbnail.clone(),
            created_at: b.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBlog {
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub images: Vec<String>,
}

/// An edit to an existing blog. New images are appended to the gallery.
#[derive(Debug, Clone)]
pub struct BlogPatch {
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub append_images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Technology {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AssetOwner for Technology {
    fn asset_refs(&self) -> Vec<&str> {
        vec![self.image.as_str()]
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub degree_name: String,
    pub college_name: String,
    pub from_year: String,
    pub to_year: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub designation: String,
    pub company_name: String,
    pub from_time: String,
    pub to_time: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub name: String,
    pub percentage: i32,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub title: String,
    pub description: String,
    pub icon_class: String,
}

// Validated section entries, in the order they were submitted.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEducation {
    pub degree_name: String,
    pub college_name: String,
    pub from_year: String,
    pub to_year: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExperience {
    pub designation: String,
    pub company_name: String,
    pub from_time: String,
    pub to_time: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSkill {
    pub name: String,
    pub percentage: i32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub title: String,
    pub description: String,
    pub icon_class: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blog_owns_thumbnail_and_gallery() {
        let now = OffsetDateTime::now_utc();
        let blog = Blog {
            id: Uuid::new_v4(),
            admin_id: Uuid::new_v4(),
            title: "t".into(),
            description: "d".into(),
            thumbnail: Some("/uploads/images/t.png".into()),
            images: vec!["/uploads/images/a.png".into(), "/uploads/images/b.png".into()],
            created_at: now,
            updated_at: now,
        };
        assert_eq!(
            blog.asset_refs(),
            vec!["/uploads/images/t.png", "/uploads/images/a.png", "/uploads/images/b.png"]
        );
    }

    #[test]
    fn profile_skips_empty_slots() {
        let now = OffsetDateTime::now_utc();
        let profile = Profile {
            id: Uuid::new_v4(),
            admin_id: Uuid::new_v4(),
            name: "n".into(),
            profile_pic: None,
            profile_pic2: Some("/uploads/images/p2.png".into()),
            pdf: Some("/uploads/pdfs/cv.pdf".into()),
            video: None,
            about_text: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(profile.asset_refs(), vec!["/uploads/images/p2.png", "/uploads/pdfs/cv.pdf"]);
    }
}
