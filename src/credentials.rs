use actix_web::web;
use chrono::Utc;
use password_auth::{generate_hash, verify_password};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::BootstrapPasswords;
use crate::model::{Partner, UserModel, UserSummary};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("unknown username")]
    InvalidUsername,
    #[error("password does not match")]
    InvalidPassword,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Checks a login attempt against the stored digest. A known user without a
/// row yet gets one created from its bootstrap password first.
pub async fn verify(
    db: &SqlitePool,
    bootstrap: &BootstrapPasswords,
    username: &str,
    password: &str,
) -> Result<UserSummary, CredentialError> {
    let partner: Partner = username
        .parse()
        .map_err(|_| CredentialError::InvalidUsername)?;

    let user = ensure_user(db, bootstrap, partner).await?;

    let password = password.to_owned();
    let digest = user.password_hash;
    let matches = web::block(move || verify_password(password, &digest).is_ok())
        .await
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;

    if !matches {
        return Err(CredentialError::InvalidPassword);
    }

    Ok(UserSummary {
        id: user.id,
        name: user.name,
    })
}

/// Makes sure both accounts exist. Existing rows keep their password.
pub async fn seed(db: &SqlitePool, bootstrap: &BootstrapPasswords) -> Result<(), CredentialError> {
    for partner in Partner::ALL {
        ensure_user(db, bootstrap, partner).await?;
    }
    Ok(())
}

pub async fn find_user(db: &SqlitePool, partner: Partner) -> Result<Option<UserModel>, sqlx::Error> {
    sqlx::query_as::<_, UserModel>(
        r#"SELECT id, name, password_hash, created_at FROM users WHERE name = ?"#,
    )
    .bind(partner)
    .fetch_optional(db)
    .await
}

async fn ensure_user(
    db: &SqlitePool,
    bootstrap: &BootstrapPasswords,
    partner: Partner,
) -> Result<UserModel, CredentialError> {
    if let Some(user) = find_user(db, partner).await? {
        return Ok(user);
    }

    let password = match partner {
        Partner::Wendy => bootstrap.wendy.clone(),
        Partner::Daniel => bootstrap.daniel.clone(),
    };
    let password_hash = web::block(move || generate_hash(password))
        .await
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;

    // Two first logins can race here; the unique name keeps a single row.
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO users
        (id, name, password_hash, created_at)
        VALUES
        (?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(partner)
    .bind(password_hash)
    .bind(Utc::now())
    .execute(db)
    .await?;

    if result.rows_affected() > 0 {
        log::info!("created account for {partner}");
    }

    find_user(db, partner)
        .await?
        .ok_or(CredentialError::Database(sqlx::Error::RowNotFound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn bootstrap() -> BootstrapPasswords {
        BootstrapPasswords {
            wendy: "wendy-secret".to_string(),
            daniel: "daniel-secret".to_string(),
        }
    }

    #[actix_web::test]
    async fn first_login_creates_the_account() {
        let pool = db::in_memory().await.unwrap();
        assert!(find_user(&pool, Partner::Daniel).await.unwrap().is_none());

        let user = verify(&pool, &bootstrap(), "Daniel", "daniel-secret")
            .await
            .unwrap();
        assert_eq!(user.name, Partner::Daniel);

        let stored = find_user(&pool, Partner::Daniel).await.unwrap().unwrap();
        assert_eq!(stored.id, user.id);
        assert_ne!(stored.password_hash, "daniel-secret");
    }

    #[actix_web::test]
    async fn rejects_unknown_usernames_and_wrong_passwords() {
        let pool = db::in_memory().await.unwrap();
        assert!(matches!(
            verify(&pool, &bootstrap(), "Mallory", "daniel-secret").await,
            Err(CredentialError::InvalidUsername)
        ));
        assert!(matches!(
            verify(&pool, &bootstrap(), "Wendy", "daniel-secret").await,
            Err(CredentialError::InvalidPassword)
        ));
    }

    #[actix_web::test]
    async fn bootstrap_password_is_not_a_fallback() {
        let pool = db::in_memory().await.unwrap();
        seed(&pool, &bootstrap()).await.unwrap();

        sqlx::query("UPDATE users SET password_hash = ? WHERE name = ?")
            .bind(generate_hash("changed"))
            .bind(Partner::Wendy)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            verify(&pool, &bootstrap(), "Wendy", "wendy-secret").await,
            Err(CredentialError::InvalidPassword)
        ));
        assert!(verify(&pool, &bootstrap(), "Wendy", "changed").await.is_ok());
    }

    #[actix_web::test]
    async fn seeding_twice_keeps_one_row_per_user() {
        let pool = db::in_memory().await.unwrap();
        seed(&pool, &bootstrap()).await.unwrap();
        seed(&pool, &bootstrap()).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
