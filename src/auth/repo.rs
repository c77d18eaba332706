use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::Admin;

/// Result of inserting a new admin.
#[derive(Debug)]
pub enum Created {
    Admin(Admin),
    EmailTaken,
}

/// Persistence for the admin identity. Every method is a single atomic
/// operation against the store.
#[async_trait]
pub trait AdminRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Admin>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Admin>>;
    /// Earliest registered admin.
    async fn first(&self) -> anyhow::Result<Option<Admin>>;
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<Created>;
    /// Overwrites any code that is still pending.
    async fn set_pending_otp(
        &self,
        id: Uuid,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()>;
    /// Clears the pending code iff it equals `code` and is unexpired at `now`.
    async fn consume_otp(
        &self,
        email: &str,
        code: i32,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Admin>>;
}

const ADMIN_COLUMNS: &str = "id, name, email, password_hash, otp_code, otp_expires_at, \
     phone_number, degree, birthday, address, experience, created_at, updated_at";

#[derive(Clone)]
pub struct PgAdminRepo {
    db: PgPool,
}

impl PgAdminRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AdminRepo for PgAdminRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find admin by email")?;
        Ok(admin)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find admin by id")?;
        Ok(admin)
    }

    async fn first(&self) -> anyhow::Result<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins ORDER BY created_at ASC LIMIT 1"
        ))
        .fetch_optional(&self.db)
        .await
        .context("find first admin")?;
        Ok(admin)
    }

    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<Created> {
        // ON CONFLICT keeps a registration race from surfacing as a 500.
        let admin = sqlx::query_as::<_, Admin>(&format!(
            r#"
            INSERT INTO admins (name, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .context("insert admin")?;
        Ok(admin.map(Created::Admin).unwrap_or(Created::EmailTaken))
    }

    async fn set_pending_otp(
        &self,
        id: Uuid,
        code: i32,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE admins
               SET otp_code = $2, otp_expires_at = $3, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .context("store pending otp")?;
        Ok(())
    }

    async fn consume_otp(
        &self,
        email: &str,
        code: i32,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>(&format!(
            r#"
            UPDATE admins
               SET otp_code = NULL, otp_expires_at = NULL, updated_at = now()
             WHERE email = $1
               AND otp_code = $2
               AND otp_expires_at > $3
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(code)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("consume otp")?;
        Ok(admin)
    }
}
