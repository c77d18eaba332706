use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::AdminDetails;
use crate::content::repo_types::{
    Blog, BlogPatch, BlogSummary, Education, Experience, NewBlog, NewEducation, NewExperience,
    NewService, NewSkill, Profile, ProfileDraft, Service, Skill, Technology,
};

/// A saved record together with what it replaced.
#[derive(Debug, Clone)]
pub struct Saved<T> {
    pub current: T,
    pub previous: Option<T>,
}

/// Persistence for portfolio content. Each write is one transaction, and the
/// writes that swap asset references hand back the replaced state so the
/// caller can retire exactly the files nothing points at any more.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn profile_for(&self, admin_id: Uuid) -> anyhow::Result<Option<Profile>>;
    /// Saves the profile and the owning admin's details together.
    async fn upsert_profile(
        &self,
        admin_id: Uuid,
        draft: &ProfileDraft,
        details: &AdminDetails,
    ) -> anyhow::Result<Saved<Profile>>;

    async fn create_blog(&self, admin_id: Uuid, blog: &NewBlog) -> anyhow::Result<Blog>;
    async fn find_blog(&self, id: Uuid) -> anyhow::Result<Option<Blog>>;
    /// `None` when no blog with that id belongs to `admin_id`.
    async fn update_blog(
        &self,
        id: Uuid,
        admin_id: Uuid,
        patch: &BlogPatch,
    ) -> anyhow::Result<Option<Saved<Blog>>>;
    async fn delete_blog(&self, id: Uuid, admin_id: Uuid) -> anyhow::Result<Option<Blog>>;
    /// Newest first.
    async fn list_blogs(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Blog>>;
    async fn recent_blogs(&self, limit: i64) -> anyhow::Result<Vec<BlogSummary>>;

    /// Returns `(inserted, removed)`.
    async fn replace_technologies(
        &self,
        admin_id: Uuid,
        images: &[String],
    ) -> anyhow::Result<(Vec<Technology>, Vec<Technology>)>;
    async fn list_technologies(&self) -> anyhow::Result<Vec<Technology>>;

    async fn replace_education(&self, admin_id: Uuid, entries: &[NewEducation]) -> anyhow::Result<Vec<Education>>;
    async fn list_education(&self) -> anyhow::Result<Vec<Education>>;
    async fn replace_experience(&self, admin_id: Uuid, entries: &[NewExperience]) -> anyhow::Result<Vec<Experience>>;
    async fn list_experience(&self) -> anyhow::Result<Vec<Experience>>;
    async fn replace_skills(&self, admin_id: Uuid, entries: &[NewSkill]) -> anyhow::Result<Vec<Skill>>;
    async fn list_skills(&self) -> anyhow::Result<Vec<Skill>>;
    async fn replace_services(&self, admin_id: Uuid, entries: &[NewService]) -> anyhow::Result<Vec<Service>>;
    async fn list_services(&self) -> anyhow::Result<Vec<Service>>;
}

const PROFILE_COLUMNS: &str =
    "id, admin_id, name, profile_pic, profile_pic2, pdf, video, about_text, created_at, updated_at";
const BLOG_COLUMNS: &str =
    "id, admin_id, title, description, thumbnail, images, created_at, updated_at";

#[derive(Clone)]
pub struct PgContentRepo {
    db: PgPool,
}

impl PgContentRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContentRepo for PgContentRepo {
    async fn profile_for(&self, admin_id: Uuid) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE admin_id = $1"
        ))
        .bind(admin_id)
        .fetch_optional(&self.db)
        .await
        .context("load profile")?;
        Ok(profile)
    }

    async fn upsert_profile(
        &self,
        admin_id: Uuid,
        d: &ProfileDraft,
        details: &AdminDetails,
    ) -> anyhow::Result<Saved<Profile>> {
        let mut tx = self.db.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE admins
               SET name         = COALESCE($2, name),
                   phone_number = COALESCE($3, phone_number),
                   degree       = COALESCE($4, degree),
                   birthday     = COALESCE($5, birthday),
                   address      = COALESCE($6, address),
                   experience   = COALESCE($7, experience),
                   updated_at   = now()
             WHERE id = $1
            "#,
        )
        .bind(admin_id)
        .bind(&details.name)
        .bind(&details.phone_number)
        .bind(&details.degree)
        .bind(&details.birthday)
        .bind(&details.address)
        .bind(details.experience)
        .execute(&mut *tx)
        .await
        .context("update admin details")?;
        anyhow::ensure!(updated.rows_affected() == 1, "admin {admin_id} not found");

        let previous = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE admin_id = $1 FOR UPDATE"
        ))
        .bind(admin_id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock profile")?;

        let current = sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (admin_id, name, profile_pic, profile_pic2, pdf, video, about_text)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (admin_id) DO UPDATE
               SET name         = EXCLUDED.name,
                   profile_pic  = COALESCE(EXCLUDED.profile_pic, profiles.profile_pic),
                   profile_pic2 = COALESCE(EXCLUDED.profile_pic2, profiles.profile_pic2),
                   pdf          = COALESCE(EXCLUDED.pdf, profiles.pdf),
                   video        = COALESCE(EXCLUDED.video, profiles.video),
                   about_text   = COALESCE(EXCLUDED.about_text, profiles.about_text),
                   updated_at   = now()
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(admin_id)
        .bind(&d.name)
        .bind(&d.profile_pic)
        .bind(&d.profile_pic2)
        .bind(&d.pdf)
        .bind(&d.video)
        .bind(&d.about_text)
        .fetch_one(&mut *tx)
        .await
        .context("upsert profile")?;

        tx.commit().await?;
        Ok(Saved { current, previous })
    }

    async fn create_blog(&self, admin_id: Uuid, b: &NewBlog) -> anyhow::Result<Blog> {
        let blog = sqlx::query_as::<_, Blog>(&format!(
            r#"
            INSERT INTO blogs (admin_id, title, description, thumbnail, images)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {BLOG_COLUMNS}
            "#
        ))
        .bind(admin_id)
        .bind(&b.title)
        .bind(&b.description)
        .bind(&b.thumbnail)
        .bind(&b.images)
        .fetch_one(&self.db)
        .await
        .context("insert blog")?;
        Ok(blog)
    }

    async fn find_blog(&self, id: Uuid) -> anyhow::Result<Option<Blog>> {
        let blog = sqlx::query_as::<_, Blog>(&format!(
            "SELECT {BLOG_COLUMNS} FROM blogs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find blog")?;
        Ok(blog)
    }

    async fn update_blog(
        &self,
        id: Uuid,
        admin_id: Uuid,
        p: &BlogPatch,
    ) -> anyhow::Result<Option<Saved<Blog>>> {
        let mut tx = self.db.begin().await?;
        let Some(previous) = sqlx::query_as::<_, Blog>(&format!(
            "SELECT {BLOG_COLUMNS} FROM blogs WHERE id = $1 AND admin_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(admin_id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock blog")?
        else {
            return Ok(None);
        };

        let current = sqlx::query_as::<_, Blog>(&format!(
            r#"
            UPDATE blogs
               SET title       = $2,
                   description = $3,
                   thumbnail   = COALESCE($4, thumbnail),
                   images      = images || $5,
                   updated_at  = now()
             WHERE id = $1
            RETURNING {BLOG_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&p.title)
        .bind(&p.description)
        .bind(&p.thumbnail)
        .bind(&p.append_images)
        .fetch_one(&mut *tx)
        .await
        .context("update blog")?;

        tx.commit().await?;
        Ok(Some(Saved {
            current,
            previous: Some(previous),
        }))
    }

    async fn delete_blog(&self, id: Uuid, admin_id: Uuid) -> anyhow::Result<Option<Blog>> {
        let blog = sqlx::query_as::<_, Blog>(&format!(
            "DELETE FROM blogs WHERE id = $1 AND admin_id = $2 RETURNING {BLOG_COLUMNS}"
        ))
        .bind(id)
        .bind(admin_id)
        .fetch_optional(&self.db)
        .await
        .context("delete blog")?;
        Ok(blog)
    }

    async fn list_blogs(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Blog>> {
        let rows = sqlx::query_as::<_, Blog>(&format!(
            r#"
            SELECT {BLOG_COLUMNS}
            FROM blogs
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list blogs")?;
        Ok(rows)
    }

    async fn recent_blogs(&self, limit: i64) -> anyhow::Result<Vec<BlogSummary>> {
        let rows = sqlx::query_as::<_, BlogSummary>(
            r#"
            SELECT id, title, thumbnail, created_at
            FROM blogs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("recent blogs")?;
        Ok(rows)
    }

    async fn replace_technologies(
        &self,
        admin_id: Uuid,
        images: &[String],
    ) -> anyhow::Result<(Vec<Technology>, Vec<Technology>)> {
        let mut tx = self.db.begin().await?;
        let removed = sqlx::query_as::<_, Technology>(
            "DELETE FROM technologies WHERE admin_id = $1 RETURNING id, admin_id, image, created_at",
        )
        .bind(admin_id)
        .fetch_all(&mut *tx)
        .await
        .context("clear technologies")?;

        let mut inserted = Vec::with_capacity(images.len());
        for (position, image) in images.iter().enumerate() {
            let row = sqlx::query_as::<_, Technology>(
                r#"
                INSERT INTO technologies (admin_id, image, position)
                VALUES ($1, $2, $3)
                RETURNING id, admin_id, image, created_at
                "#,
            )
            .bind(admin_id)
            .bind(image)
            .bind(position as i32)
            .fetch_one(&mut *tx)
            .await
            .context("insert technology")?;
            inserted.push(row);
        }

        tx.commit().await?;
        Ok((inserted, removed))
    }

    async fn list_technologies(&self) -> anyhow::Result<Vec<Technology>> {
        let rows = sqlx::query_as::<_, Technology>(
            "SELECT id, admin_id, image, created_at FROM technologies ORDER BY created_at, position",
        )
        .fetch_all(&self.db)
        .await
        .context("list technologies")?;
        Ok(rows)
    }

    async fn replace_education(&self, admin_id: Uuid, entries: &[NewEducation]) -> anyhow::Result<Vec<Education>> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM educations WHERE admin_id = $1")
            .bind(admin_id)
            .execute(&mut *tx)
            .await
            .context("clear education")?;

        let mut rows = Vec::with_capacity(entries.len());
        for (position, e) in entries.iter().enumerate() {
            let row = sqlx::query_as::<_, Education>(
                r#"
                INSERT INTO educations (admin_id, position, degree_name, college_name, from_year, to_year, description)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, admin_id, degree_name, college_name, from_year, to_year, description
                "#,
            )
            .bind(admin_id)
            .bind(position as i32)
            .bind(&e.degree_name)
            .bind(&e.college_name)
            .bind(&e.from_year)
            .bind(&e.to_year)
            .bind(&e.description)
            .fetch_one(&mut *tx)
            .await
            .context("insert education")?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn list_education(&self) -> anyhow::Result<Vec<Education>> {
        let rows = sqlx::query_as::<_, Education>(
            r#"
            SELECT id, admin_id, degree_name, college_name, from_year, to_year, description
            FROM educations
            ORDER BY admin_id, position
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list education")?;
        Ok(rows)
    }

    async fn replace_experience(&self, admin_id: Uuid, entries: &[NewExperience]) -> anyhow::Result<Vec<Experience>> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM experiences WHERE admin_id = $1")
            .bind(admin_id)
            .execute(&mut *tx)
            .await
            .context("clear experience")?;

        let mut rows = Vec::with_capacity(entries.len());
        for (position, e) in entries.iter().enumerate() {
            let row = sqlx::query_as::<_, Experience>(
                r#"
                INSERT INTO experiences (admin_id, position, designation, company_name, from_time, to_time, description)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, admin_id, designation, company_name, from_time, to_time, description
                "#,
            )
            .bind(admin_id)
            .bind(position as i32)
            .bind(&e.designation)
            .bind(&e.company_name)
            .bind(&e.from_time)
            .bind(&e.to_time)
            .bind(&e.description)
            .fetch_one(&mut *tx)
            .await
            .context("insert experience")?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn list_experience(&self) -> anyhow::Result<Vec<Experience>> {
        let rows = sqlx::query_as::<_, Experience>(
            r#"
            SELECT id, admin_id, designation, company_name, from_time, to_time, description
            FROM experiences
            ORDER BY admin_id, position
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list experience")?;
        Ok(rows)
    }

    async fn replace_skills(&self, admin_id: Uuid, entries: &[NewSkill]) -> anyhow::Result<Vec<Skill>> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM skills WHERE admin_id = $1")
            .bind(admin_id)
            .execute(&mut *tx)
            .await
            .context("clear skills")?;

        let mut rows = Vec::with_capacity(entries.len());
        for (position, e) in entries.iter().enumerate() {
            let row = sqlx::query_as::<_, Skill>(
                r#"
                INSERT INTO skills (admin_id, position, name, percentage, color)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, admin_id, name, percentage, color
                "#,
            )
            .bind(admin_id)
            .bind(position as i32)
            .bind(&e.name)
            .bind(e.percentage)
            .bind(&e.color)
            .fetch_one(&mut *tx)
            .await
            .context("insert skill")?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn list_skills(&self) -> anyhow::Result<Vec<Skill>> {
        let rows = sqlx::query_as::<_, Skill>(
            "SELECT id, admin_id, name, percentage, color FROM skills ORDER BY admin_id, position",
        )
        .fetch_all(&self.db)
        .await
        .context("list skills")?;
        Ok(rows)
    }

    async fn replace_services(&self, admin_id: Uuid, entries: &[NewService]) -> anyhow::Result<Vec<Service>> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM services WHERE admin_id = $1")
            .bind(admin_id)
            .execute(&mut *tx)
            .await
            .context("clear services")?;

        let mut rows = Vec::with_capacity(entries.len());
        for (position, e) in entries.iter().enumerate() {
            let row = sqlx::query_as::<_, Service>(
                r#"
                INSERT INTO services (admin_id, position, title, description, icon_class)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, admin_id, title, description, icon_class
                "#,
            )
            .bind(admin_id)
            .bind(position as i32)
            .bind(&e.title)
            .bind(&e.description)
            .bind(&e.icon_class)
            .fetch_one(&mut *tx)
            .await
            .context("insert service")?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn list_services(&self) -> anyhow::Result<Vec<Service>> {
        let rows = sqlx::query_as::<_, Service>(
            "SELECT id, admin_id, title, description, icon_class FROM services ORDER BY admin_id, position",
        )
        .fetch_all(&self.db)
        .await
        .context("list services")?;
        Ok(rows)
    }
}
