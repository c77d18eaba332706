//! In-process store used when no `DATABASE_URL` is configured, and by tests.
//! State lives only as long as the process.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::{AdminRepo, Created};
use crate::auth::repo_types::{Admin, AdminDetails};
use crate::content::repo::{ContentRepo, Saved};
use crate::content::repo_types::{
    Blog, BlogPatch, BlogSummary, Education, Experience, NewBlog, NewEducation, NewExperience,
    NewService, NewSkill, Profile, ProfileDraft, Service, Skill, Technology,
};

#[derive(Default)]
struct Tables {
    admins: Vec<Admin>,
    profiles: Vec<Profile>,
    blogs: Vec<Blog>, // insertion order, oldest first
    technologies: Vec<Technology>,
    educations: Vec<Education>,
    experiences: Vec<Experience>,
    skills: Vec<Skill>,
    services: Vec<Service>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

/// Drop the rows owned by `admin_id`, then append the new ones.
fn replace_owned<T: Clone>(
    rows: &mut Vec<T>,
    owner: impl Fn(&T) -> Uuid,
    admin_id: Uuid,
    fresh: Vec<T>,
) -> Vec<T> {
    rows.retain(|r| owner(r) != admin_id);
    rows.extend(fresh.iter().cloned());
    fresh
}

#[async_trait]
impl AdminRepo for MemoryStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Admin>> {
        Ok(self.lock()?.admins.iter().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Admin>> {
        Ok(self.lock()?.admins.iter().find(|a| a.id == id).cloned())
    }

    async fn first(&self) -> anyhow::Result<Option<Admin>> {
        Ok(self.lock()?.admins.first().cloned())
    }

    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<Created> {
        let mut t = self.lock()?;
        if t.admins.iter().any(|a| a.email == email) {
            return Ok(Created::EmailTaken);
        }
        let now = OffsetDateTime::now_utc();
        let admin = Admin {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            otp_code: None,
            otp_expires_at: None,
            phone_number: None,
            degree: None,
            birthday: None,
            address: None,
            experience: None,
            created_at: now,
            updated_at: now,
        };
        t.admins.push(admin.clone());
        Ok(Created::Admin(admin))
    }

    async fn set_pending_otp(
        &self,
        id: Uuid,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let mut t = self.lock()?;
        if let Some(admin) = t.admins.iter_mut().find(|a| a.id == id) {
            admin.otp_code = Some(code);
            admin.otp_expires_at = Some(expires_at);
            admin.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn consume_otp(
        &self,
        email: &str,
        code: i32,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Admin>> {
        let mut t = self.lock()?;
        let Some(admin) = t.admins.iter_mut().find(|a| a.email == email) else {
            return Ok(None);
        };
        let live = admin.otp_code == Some(code) && admin.otp_expires_at.is_some_and(|exp| exp > now);
        if !live {
            return Ok(None);
        }
        admin.otp_code = None;
        admin.otp_expires_at = None;
        admin.updated_at = now;
        Ok(Some(admin.clone()))
    }
}

#[async_trait]
impl ContentRepo for MemoryStore {
    async fn profile_for(&self, admin_id: Uuid) -> anyhow::Result<Option<Profile>> {
        Ok(self.lock()?.profiles.iter().find(|p| p.admin_id == admin_id).cloned())
    }

    async fn upsert_profile(
        &self,
        admin_id: Uuid,
        d: &ProfileDraft,
        details: &AdminDetails,
    ) -> anyhow::Result<Saved<Profile>> {
        let mut t = self.lock()?;
        let now = OffsetDateTime::now_utc();
        let Some(admin) = t.admins.iter_mut().find(|a| a.id == admin_id) else {
            anyhow::bail!("admin {admin_id} not found");
        };
        if let Some(name) = &details.name {
            admin.name = name.clone();
        }
        admin.phone_number = details.phone_number.clone().or(admin.phone_number.take());
        admin.degree = details.degree.clone().or(admin.degree.take());
        admin.birthday = details.birthday.clone().or(admin.birthday.take());
        admin.address = details.address.clone().or(admin.address.take());
        admin.experience = details.experience.or(admin.experience);
        admin.updated_at = now;
        match t.profiles.iter_mut().find(|p| p.admin_id == admin_id) {
            Some(p) => {
                let previous = p.clone();
                p.name = d.name.clone();
                p.profile_pic = d.profile_pic.clone().or(p.profile_pic.take());
                p.profile_pic2 = d.profile_pic2.clone().or(p.profile_pic2.take());
                p.pdf = d.pdf.clone().or(p.pdf.take());
                p.video = d.video.clone().or(p.video.take());
                p.about_text = d.about_text.clone().or(p.about_text.take());
                p.updated_at = now;
                Ok(Saved {
                    current: p.clone(),
                    previous: Some(previous),
                })
            }
            None => {
                let profile = Profile {
                    id: Uuid::new_v4(),
                    admin_id,
                    name: d.name.clone(),
                    profile_pic: d.profile_pic.clone(),
                    profile_pic2: d.profile_pic2.clone(),
                    pdf: d.pdf.clone(),
                    video: d.video.clone(),
                    about_text: d.about_text.clone(),
                    created_at: now,
                    updated_at: now,
                };
                t.profiles.push(profile.clone());
                Ok(Saved {
                    current: profile,
                    previous: None,
                })
            }
        }
    }

    async fn create_blog(&self, admin_id: Uuid, b: &NewBlog) -> anyhow::Result<Blog> {
        let now = OffsetDateTime::now_utc();
        let blog = Blog {
            id: Uuid::new_v4(),
            admin_id,
            title: b.title.clone(),
            description: b.description.clone(),
            thumbnail: Some(b.thumbnail.clone()),
            images: b.images.clone(),
            created_at: now,
            updated_at: now,
        };
        self.lock()?.blogs.push(blog.clone());
        Ok(blog)
    }

    async fn find_blog(&self, id: Uuid) -> anyhow::Result<Option<Blog>> {
        Ok(self.lock()?.blogs.iter().find(|b| b.id == id).cloned())
    }

    async fn update_blog(
        &self,
        id: Uuid,
        admin_id: Uuid,
        p: &BlogPatch,
    ) -> anyhow::Result<Option<Saved<Blog>>> {
        let mut t = self.lock()?;
        let Some(blog) = t.blogs.iter_mut().find(|b| b.id == id && b.admin_id == admin_id) else {
            return Ok(None);
        };
        let previous = blog.clone();
        blog.title = p.title.clone();
        blog.description = p.description.clone();
        if let Some(thumbnail) = &p.thumbnail {
            blog.thumbnail = Some(thumbnail.clone());
        }
        blog.images.extend(p.append_images.iter().cloned());
        blog.updated_at = OffsetDateTime::now_utc();
        Ok(Some(Saved {
            current: blog.clone(),
            previous: Some(previous),
        }))
    }

    async fn delete_blog(&self, id: Uuid, admin_id: Uuid) -> anyhow::Result<Option<Blog>> {
        let mut t = self.lock()?;
        let Some(pos) = t.blogs.iter().position(|b| b.id == id && b.admin_id == admin_id) else {
            return Ok(None);
        };
        Ok(Some(t.blogs.remove(pos)))
    }

    async fn list_blogs(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Blog>> {
        Ok(self
            .lock()?
            .blogs
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn recent_blogs(&self, limit: i64) -> anyhow::Result<Vec<BlogSummary>> {
        Ok(self
            .lock()?
            .blogs
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .map(BlogSummary::from)
            .collect())
    }

    async fn replace_technologies(
        &self,
        admin_id: Uuid,
        images: &[String],
    ) -> anyhow::Result<(Vec<Technology>, Vec<Technology>)> {
        let mut t = self.lock()?;
        let removed: Vec<Technology> = t
            .technologies
            .iter()
            .filter(|r| r.admin_id == admin_id)
            .cloned()
            .collect();
        let now = OffsetDateTime::now_utc();
        let fresh = images
            .iter()
            .map(|image| Technology {
                id: Uuid::new_v4(),
                admin_id,
                image: image.clone(),
                created_at: now,
            })
            .collect();
        let inserted = replace_owned(&mut t.technologies, |r| r.admin_id, admin_id, fresh);
        Ok((inserted, removed))
    }

    async fn list_technologies(&self) -> anyhow::Result<Vec<Technology>> {
        Ok(self.lock()?.technologies.clone())
    }

    async fn replace_education(&self, admin_id: Uuid, entries: &[NewEducation]) -> anyhow::Result<Vec<Education>> {
        let fresh = entries
            .iter()
            .map(|e| Education {
                id: Uuid::new_v4(),
                admin_id,
                degree_name: e.degree_name.clone(),
                college_name: e.college_name.clone(),
                from_year: e.from_year.clone(),
                to_year: e.to_year.clone(),
                description: e.description.clone(),
            })
            .collect();
        Ok(replace_owned(&mut self.lock()?.educations, |r| r.admin_id, admin_id, fresh))
    }

    async fn list_education(&self) -> anyhow::Result<Vec<Education>> {
        Ok(self.lock()?.educations.clone())
    }

    async fn replace_experience(&self, admin_id: Uuid, entries: &[NewExperience]) -> anyhow::Result<Vec<Experience>> {
        let fresh = entries
            .iter()
            .map(|e| Experience {
                id: Uuid::new_v4(),
                admin_id,
                designation: e.designation.clone(),
                company_name: e.company_name.clone(),
                from_time: e.from_time.clone(),
                to_time: e.to_time.clone(),
                description: e.description.clone(),
            })
            .collect();
        Ok(replace_owned(&mut self.lock()?.experiences, |r| r.admin_id, admin_id, fresh))
    }

    async fn list_experience(&self) -> anyhow::Result<Vec<Experience>> {
        Ok(self.lock()?.experiences.clone())
    }

    async fn replace_skills(&self, admin_id: Uuid, entries: &[NewSkill]) -> anyhow::Result<Vec<Skill>> {
        let fresh = entries
            .iter()
            .map(|e| Skill {
                id: Uuid::new_v4(),
                admin_id,
                name: e.name.clone(),
                percentage: e.percentage,
                color: e.color.clone(),
            })
            .collect();
        Ok(replace_owned(&mut self.lock()?.skills, |r| r.admin_id, admin_id, fresh))
    }

    async fn list_skills(&self) -> anyhow::Result<Vec<Skill>> {
        Ok(self.lock()?.skills.clone())
    }

    async fn replace_services(&self, admin_id: Uuid, entries: &[NewService]) -> anyhow::Result<Vec<Service>> {
        let fresh = entries
            .iter()
            .map(|e| Service {
                id: Uuid::new_v4(),
                admin_id,
                title: e.title.clone(),
                description: e.description.clone(),
                icon_class: e.icon_class.clone(),
            })
            .collect();
        Ok(replace_owned(&mut self.lock()?.services, |r| r.admin_id, admin_id, fresh))
    }

    async fn list_services(&self) -> anyhow::Result<Vec<Service>> {
        Ok(self.lock()?.services.clone())
    }
}
