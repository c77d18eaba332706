use tracing::{info, warn};
use uuid::Uuid;

use crate::assets::{AssetChanges, AssetError, Bucket, MultipartForm, UploadedFile};
use crate::auth::repo_types::AdminDetails;
use crate::auth::services::is_valid_email;
use crate::content::dto::{check_length, ContactRequest, ProfileView};
use crate::content::repo::Saved;
use crate::content::repo_types::{Blog, BlogPatch, NewBlog, Profile, ProfileDraft, Technology};
use crate::error::{AppError, AppResult};
use crate::notify::Notification;
use crate::state::AppState;

pub const MAX_BLOG_IMAGES: usize = 10;
pub const MAX_TECHNOLOGY_IMAGES: usize = 50;
pub const HOMEPAGE_BLOGS: i64 = 6;

/// Reject any upload that does not belong in its field before anything is written.
fn check_all<'u>(
    st: &AppState,
    uploads: impl IntoIterator<Item = (&'u UploadedFile, Bucket)>,
) -> Result<(), AssetError> {
    uploads
        .into_iter()
        .try_for_each(|(upload, bucket)| st.assets.check(upload, bucket))
}

/// Stage an upload for a single-asset field. Without an upload the field is
/// left out of the save.
async fn swap(
    changes: &mut AssetChanges<'_>,
    old: Option<&str>,
    upload: Option<UploadedFile>,
    expected: Bucket,
) -> Result<Option<String>, AssetError> {
    if upload.is_none() {
        return Ok(None);
    }
    changes.replace(old, upload, expected).await
}

struct ProfileUploads {
    pic: Option<UploadedFile>,
    pic2: Option<UploadedFile>,
    resume: Option<UploadedFile>,
    video: Option<UploadedFile>,
}

async fn stage_profile(
    changes: &mut AssetChanges<'_>,
    old: Option<&Profile>,
    name: String,
    about_text: Option<String>,
    uploads: ProfileUploads,
) -> Result<ProfileDraft, AssetError> {
    let pic = old.and_then(|p| p.profile_pic.as_deref());
    let pic2 = old.and_then(|p| p.profile_pic2.as_deref());
    let pdf = old.and_then(|p| p.pdf.as_deref());
    let video = old.and_then(|p| p.video.as_deref());
    Ok(ProfileDraft {
        name,
        profile_pic: swap(changes, pic, uploads.pic, Bucket::Image).await?,
        profile_pic2: swap(changes, pic2, uploads.pic2, Bucket::Image).await?,
        pdf: swap(changes, pdf, uploads.resume, Bucket::Document).await?,
        video: swap(changes, video, uploads.video, Bucket::Video).await?,
        about_text,
    })
}

/// Thumbnail plus an append-only gallery.
async fn stage_blog(
    changes: &mut AssetChanges<'_>,
    old: Option<&Blog>,
    thumbnail: Option<UploadedFile>,
    images: Vec<UploadedFile>,
) -> Result<(Option<String>, Vec<String>), AssetError> {
    let old_thumbnail = old.and_then(|b| b.thumbnail.as_deref());
    let old_images = old.map(|b| b.images.as_slice()).unwrap_or_default();
    let thumbnail = swap(changes, old_thumbnail, thumbnail, Bucket::Image).await?;
    let gallery = changes.replace_many(old_images, images, Bucket::Image).await?;
    Ok((thumbnail, gallery))
}

/// Create or update the caller's profile. Uploaded files replace the ones
/// they supersede; the old files go only once the profile is saved.
pub async fn update_profile(st: &AppState, admin_id: Uuid, mut form: MultipartForm) -> AppResult<Profile> {
    let name = form.required_text("name")?;
    let experience = form
        .text("experience")
        .map(|v| {
            v.parse::<i32>()
                .map_err(|_| AppError::Validation("experience must be a whole number".into()))
        })
        .transpose()?;
    let details = AdminDetails {
        name: Some(name.clone()),
        phone_number: form.text("phoneNumber"),
        degree: form.text("degree"),
        birthday: form.text("birthday"),
        address: form.text("address"),
        experience,
    };
    let about_text = form.text("aboutText");
    if let Some(about) = &about_text {
        check_length("aboutText", about)?;
    }
    let uploads = ProfileUploads {
        pic: form.single_file("profilePic")?,
        pic2: form.single_file("profilePic2")?,
        resume: form.single_file("resumePdf")?,
        video: form.single_file("video")?,
    };
    check_all(
        st,
        [
            (&uploads.pic, Bucket::Image),
            (&uploads.pic2, Bucket::Image),
            (&uploads.resume, Bucket::Document),
            (&uploads.video, Bucket::Video),
        ]
        .into_iter()
        .filter_map(|(u, b)| u.as_ref().map(|u| (u, b))),
    )?;

    let old = st.content.profile_for(admin_id).await?;
    let mut changes = st.assets.changes();
    let draft = match stage_profile(&mut changes, old.as_ref(), name, about_text, uploads).await {
        Ok(draft) => draft,
        Err(e) => {
            changes.rollback().await;
            return Err(e.into());
        }
    };

    let result = st.content.upsert_profile(admin_id, &draft, &details).await;
    if let Ok(saved) = &result {
        changes.retire_superseded(&saved.previous, &saved.current);
    }
    let Saved { current, .. } = changes.settle(result).await?;
    info!(admin_id = %admin_id, "profile saved");
    Ok(current)
}

/// Profile shown to a visitor. Without a session this resolves to the sole
/// admin, but only when the deployment runs in single-admin mode.
pub async fn load_profile(st: &AppState, caller: Option<Uuid>) -> AppResult<ProfileView> {
    let admin = match caller {
        Some(id) => st.admins.find_by_id(id).await?,
        None if st.config.single_admin_mode => st.admins.first().await?,
        None => return Err(AppError::Unauthorized("No token provided".into())),
    };
    let Some(admin) = admin else {
        return Err(AppError::NotFound("Profile or user not found".into()));
    };
    let profile = st
        .content
        .profile_for(admin.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile or user not found".into()))?;
    Ok(ProfileView::new(profile, admin))
}

fn blog_text(form: &MultipartForm) -> AppResult<(String, String)> {
    match (form.text("title"), form.text("description")) {
        (Some(title), Some(description)) => {
            check_length("title", &title)?;
            Ok((title, description))
        }
        _ => Err(AppError::Validation("Title and Description are required.".into())),
    }
}

pub async fn create_blog(st: &AppState, admin_id: Uuid, mut form: MultipartForm) -> AppResult<Blog> {
    let (title, description) = blog_text(&form)?;
    let thumbnail = form
        .single_file("thumbnail")?
        .ok_or_else(|| AppError::Validation("Thumbnail image is required.".into()))?;
    let images = form.files("images", MAX_BLOG_IMAGES)?;
    check_all(
        st,
        std::iter::once(&thumbnail)
            .chain(images.iter())
            .map(|u| (u, Bucket::Image)),
    )?;

    let mut changes = st.assets.changes();
    let (thumbnail, images) = match stage_blog(&mut changes, None, Some(thumbnail), images).await {
        Ok((Some(thumbnail), images)) => (thumbnail, images),
        Ok((None, _)) => {
            changes.rollback().await;
            return Err(AppError::Internal("thumbnail was not stored".into()));
        }
        Err(e) => {
            changes.rollback().await;
            return Err(e.into());
        }
    };

    let new_blog = NewBlog {
        title,
        description,
        thumbnail,
        images,
    };
    let blog = changes.settle(st.content.create_blog(admin_id, &new_blog).await).await?;
    info!(admin_id = %admin_id, blog_id = %blog.id, "blog created");
    Ok(blog)
}

async fn owned_blog(st: &AppState, id: Uuid, admin_id: Uuid, action: &str) -> AppResult<Blog> {
    let blog = st
        .content
        .find_blog(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Blog not found".into()))?;
    if blog.admin_id != admin_id {
        warn!(admin_id = %admin_id, blog_id = %id, "blog owned by another admin");
        return Err(AppError::Forbidden(format!("Unauthorized to {action} this blog")));
    }
    Ok(blog)
}

/// Edit a blog. A new thumbnail replaces the old one; new gallery images are
/// appended to the existing ones.
pub async fn update_blog(
    st: &AppState,
    id: Uuid,
    admin_id: Uuid,
    mut form: MultipartForm,
) -> AppResult<Blog> {
    let blog = owned_blog(st, id, admin_id, "edit").await?;
    let (title, description) = blog_text(&form)?;
    let thumbnail = form.single_file("thumbnail")?;
    let images = form.files("images", MAX_BLOG_IMAGES)?;
    check_all(
        st,
        thumbnail
            .iter()
            .chain(images.iter())
            .map(|u| (u, Bucket::Image)),
    )?;

    let mut changes = st.assets.changes();
    let (thumbnail, gallery) = match stage_blog(&mut changes, Some(&blog), thumbnail, images).await {
        Ok(refs) => refs,
        Err(e) => {
            changes.rollback().await;
            return Err(e.into());
        }
    };

    let patch = BlogPatch {
        title,
        description,
        thumbnail,
        append_images: gallery[blog.images.len()..].to_vec(),
    };
    let result = match st.content.update_blog(id, admin_id, &patch).await {
        Ok(Some(saved)) => Ok(saved),
        Ok(None) => Err(AppError::NotFound("Blog not found".into())),
        Err(e) => Err(AppError::from(e)),
    };
    if let Ok(saved) = &result {
        changes.retire_superseded(&saved.previous, &saved.current);
    }
    let Saved { current, .. } = changes.settle(result).await?;
    info!(admin_id = %admin_id, blog_id = %id, "blog updated");
    Ok(current)
}

/// Remove a blog, then every file it referenced.
pub async fn delete_blog(st: &AppState, id: Uuid, admin_id: Uuid) -> AppResult<Blog> {
    owned_blog(st, id, admin_id, "delete").await?;
    let blog = st
        .content
        .delete_blog(id, admin_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Blog not found".into()))?;
    let removed = st.assets.delete_all(&blog).await;
    info!(admin_id = %admin_id, blog_id = %id, removed, "blog deleted");
    Ok(blog)
}

/// Replace the caller's technology logos with the uploaded set.
pub async fn replace_technologies(
    st: &AppState,
    admin_id: Uuid,
    mut form: MultipartForm,
) -> AppResult<Vec<Technology>> {
    let images = form.files("images", MAX_TECHNOLOGY_IMAGES)?;
    if images.is_empty() {
        return Err(AppError::Validation("No images provided.".into()));
    }
    check_all(st, images.iter().map(|u| (u, Bucket::Image)))?;

    let mut changes = st.assets.changes();
    let refs = match changes.store_all(images, Bucket::Image).await {
        Ok(refs) => refs,
        Err(e) => {
            changes.rollback().await;
            return Err(e.into());
        }
    };

    let result = st.content.replace_technologies(admin_id, &refs).await;
    if let Ok((inserted, removed)) = &result {
        changes.retire_superseded(removed.as_slice(), inserted.as_slice());
    }
    let (inserted, _) = changes.settle(result).await?;
    info!(admin_id = %admin_id, count = inserted.len(), "technologies replaced");
    Ok(inserted)
}

pub async fn send_contact(st: &AppState, req: &ContactRequest) -> AppResult<()> {
    let (name, email, subject, message) = (
        req.name.trim(),
        req.email.trim(),
        req.subject.trim(),
        req.message.trim(),
    );
    if name.is_empty() || subject.is_empty() || message.is_empty() {
        return Err(AppError::Validation("name, subject and message are required".into()));
    }
    if !is_valid_email(email) {
        return Err(AppError::Validation("Valid email is required".into()));
    }

    let note = Notification::contact(&st.config.contact_recipient, name, email, subject, message);
    st.notifier.send(note).await.map_err(|e| {
        warn!(error = %e, "contact message not delivered");
        AppError::Dependency("Message failed to send".into())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::auth::repo::Created;

    fn file(name: &str, mime: &str) -> UploadedFile {
        UploadedFile {
            original_name: name.into(),
            mime_type: mime.into(),
            body: Bytes::from_static(b"data"),
        }
    }

    async fn admin(st: &AppState, email: &str) -> Uuid {
        match st.admins.create("Admin", email, "not-a-real-hash").await.expect("create admin") {
            Created::Admin(a) => a.id,
            Created::EmailTaken => panic!("email taken"),
        }
    }

    fn key(reference: &str) -> String {
        reference.trim_start_matches("/uploads/").to_string()
    }

    #[tokio::test]
    async fn profile_picture_replacement_deletes_the_old_file() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;

        let first = update_profile(
            &st,
            id,
            MultipartForm::from_parts(
                &[("name", "Ann"), ("aboutText", "hi")],
                vec![("profilePic", file("me.png", "image/png")), ("resumePdf", file("cv.pdf", "application/pdf"))],
            ),
        )
        .await
        .expect("first save");
        let old_pic = first.profile_pic.clone().unwrap();
        let cv = first.pdf.clone().unwrap();
        assert!(old_pic.starts_with("/uploads/images/"));
        assert!(cv.starts_with("/uploads/pdfs/"));

        let second = update_profile(
            &st,
            id,
            MultipartForm::from_parts(&[("name", "Ann B")], vec![("profilePic", file("new me.png", "image/png"))]),
        )
        .await
        .expect("second save");

        let new_pic = second.profile_pic.clone().unwrap();
        assert_ne!(new_pic, old_pic);
        assert!(new_pic.ends_with("-new_me.png"));
        assert_eq!(second.pdf.as_deref(), Some(cv.as_str()));
        assert_eq!(second.about_text.as_deref(), Some("hi"));

        let keys = storage.keys();
        assert!(!keys.contains(&key(&old_pic)));
        assert!(keys.contains(&key(&new_pic)));
        assert!(keys.contains(&key(&cv)));

        let stored = st.admins.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ann B");
    }

    #[tokio::test]
    async fn misrouted_upload_is_rejected_before_any_write() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;
        let err = update_profile(
            &st,
            id,
            MultipartForm::from_parts(
                &[("name", "Ann")],
                vec![("profilePic", file("me.png", "image/png")), ("resumePdf", file("cv.png", "image/png"))],
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(storage.keys().is_empty());
        assert!(st.content.profile_for(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profile_requires_a_name() {
        let (st, _notifier, _storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;
        let err = update_profile(&st, id, MultipartForm::from_parts(&[("name", " ")], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn anonymous_profile_needs_single_admin_mode() {
        let (mut st, _notifier, _storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;
        update_profile(&st, id, MultipartForm::from_parts(&[("name", "Ann"), ("degree", "BSc")], vec![]))
            .await
            .unwrap();

        assert!(matches!(load_profile(&st, None).await, Err(AppError::Unauthorized(_))));
        let view = load_profile(&st, Some(id)).await.unwrap();
        assert_eq!(view.email, "a@x.com");
        assert_eq!(view.degree, "BSc");
        assert_eq!(view.profile_pic2, "");

        let mut config = (*st.config).clone();
        config.single_admin_mode = true;
        st.config = std::sync::Arc::new(config);
        assert_eq!(load_profile(&st, None).await.unwrap().name, "Ann");
    }

    #[tokio::test]
    async fn blog_update_replaces_thumbnail_and_appends_images() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;
        let blog = create_blog(
            &st,
            id,
            MultipartForm::from_parts(
                &[("title", "Hello"), ("description", "World")],
                vec![("thumbnail", file("t.png", "image/png")), ("images", file("a.png", "image/png"))],
            ),
        )
        .await
        .unwrap();
        let old_thumb = blog.thumbnail.clone().unwrap();

        let updated = update_blog(
            &st,
            blog.id,
            id,
            MultipartForm::from_parts(
                &[("title", "Hello 2"), ("description", "World")],
                vec![("thumbnail", file("t2.png", "image/png")), ("images", file("b.png", "image/png"))],
            ),
        )
        .await
        .unwrap();

        assert_eq!(updated.title, "Hello 2");
        assert_eq!(updated.images.len(), 2);
        assert_eq!(updated.images[0], blog.images[0]);
        let keys = storage.keys();
        assert!(!keys.contains(&key(&old_thumb)));
        assert!(keys.contains(&key(updated.thumbnail.as_deref().unwrap())));
        assert_eq!(keys.len(), 3);
    }

    #[tokio::test]
    async fn blog_requires_thumbnail_and_caps_gallery() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;
        let err = create_blog(
            &st,
            id,
            MultipartForm::from_parts(&[("title", "T"), ("description", "D")], vec![]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut files = vec![("thumbnail", file("t.png", "image/png"))];
        files.extend((0..11).map(|_| ("images", file("x.png", "image/png"))));
        let err = create_blog(&st, id, MultipartForm::from_parts(&[("title", "T"), ("description", "D")], files))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn other_admins_cannot_touch_a_blog() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let owner = admin(&st, "a@x.com").await;
        let intruder = admin(&st, "b@x.com").await;
        let blog = create_blog(
            &st,
            owner,
            MultipartForm::from_parts(
                &[("title", "T"), ("description", "D")],
                vec![("thumbnail", file("t.png", "image/png"))],
            ),
        )
        .await
        .unwrap();

        let err = update_blog(
            &st,
            blog.id,
            intruder,
            MultipartForm::from_parts(
                &[("title", "X"), ("description", "Y")],
                vec![("thumbnail", file("evil.png", "image/png"))],
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(matches!(delete_blog(&st, blog.id, intruder).await, Err(AppError::Forbidden(_))));
        assert_eq!(storage.keys().len(), 1);

        let missing = update_blog(
            &st,
            Uuid::new_v4(),
            owner,
            MultipartForm::from_parts(&[("title", "X"), ("description", "Y")], vec![]),
        )
        .await
        .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_a_blog_removes_its_files() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;
        let blog = create_blog(
            &st,
            id,
            MultipartForm::from_parts(
                &[("title", "T"), ("description", "D")],
                vec![
                    ("thumbnail", file("t.png", "image/png")),
                    ("images", file("a.png", "image/png")),
                    ("images", file("b.png", "image/png")),
                ],
            ),
        )
        .await
        .unwrap();
        assert_eq!(storage.keys().len(), 3);

        delete_blog(&st, blog.id, id).await.unwrap();
        assert!(storage.keys().is_empty());
        assert!(st.content.find_blog(blog.id).await.unwrap().is_none());
        assert!(matches!(delete_blog(&st, blog.id, id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn technologies_are_replaced_wholesale() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;
        let first = replace_technologies(
            &st,
            id,
            MultipartForm::from_parts(&[], vec![("images", file("rust.png", "image/png"))]),
        )
        .await
        .unwrap();
        let second = replace_technologies(
            &st,
            id,
            MultipartForm::from_parts(
                &[],
                vec![("images", file("go.png", "image/png")), ("images", file("ts.png", "image/png"))],
            ),
        )
        .await
        .unwrap();

        assert_eq!(second.len(), 2);
        let keys = storage.keys();
        assert!(!keys.contains(&key(&first[0].image)));
        assert_eq!(keys.len(), 2);
        assert_eq!(st.content.list_technologies().await.unwrap().len(), 2);

        let err = replace_technologies(&st, id, MultipartForm::from_parts(&[], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn contact_goes_to_the_configured_recipient() {
        let (st, notifier, _storage) = AppState::fake_with_handles();
        let req = ContactRequest {
            name: "Bob".into(),
            email: "bob@x.com".into(),
            subject: "Hi".into(),
            message: "Nice site".into(),
        };
        send_contact(&st, &req).await.unwrap();
        let sent = notifier.last_to(&st.config.contact_recipient).expect("contact mail");
        assert_eq!(sent.subject, "Portfolio Message: Hi");
        assert_eq!(sent.reply_to.as_deref(), Some("bob@x.com"));

        notifier.set_failing(true);
        assert!(matches!(send_contact(&st, &req).await, Err(AppError::Dependency(_))));

        let bad = ContactRequest { email: "nope".into(), ..req };
        assert!(matches!(send_contact(&st, &bad).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn failed_profile_save_keeps_no_files_or_rows() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let ghost = Uuid::new_v4();

        let err = update_profile(
            &st,
            ghost,
            MultipartForm::from_parts(
                &[("name", "Ann"), ("phoneNumber", "555")],
                vec![("profilePic", file("me.png", "image/png"))],
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(storage.keys().is_empty());
        assert!(st.content.profile_for(ghost).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_text_is_a_validation_error() {
        let (st, _notifier, storage) = AppState::fake_with_handles();
        let id = admin(&st, "a@x.com").await;
        let long = "x".repeat(crate::content::dto::MAX_TEXT_CHARS + 1);

        let err = update_profile(
            &st,
            id,
            MultipartForm::from_parts(
                &[("name", "Ann"), ("aboutText", long.as_str())],
                vec![("profilePic", file("me.png", "image/png"))],
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = create_blog(
            &st,
            id,
            MultipartForm::from_parts(
                &[("title", long.as_str()), ("description", "body")],
                vec![("thumbnail", file("t.png", "image/png"))],
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(storage.keys().is_empty());
    }
}
