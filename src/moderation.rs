//! Moderation gate: every reservation operation consults this before
//! touching inventory. Bans may carry an expiry and lift themselves on the
//! first check past it.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use crate::entities::admin_log;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};

pub async fn is_banned(db: &DatabaseConnection, actor: Uuid) -> AppResult<bool> {
    Ok(ensure_not_banned(db, actor).await.is_err())
}

/// Refuse banned actors. A ban whose expiry has passed is lifted here
/// rather than left to rot, matching the ban records' self-expiry.
pub async fn ensure_not_banned(db: &DatabaseConnection, actor: Uuid) -> AppResult<()> {
    let user = user::Entity::find_by_id(actor)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !user.is_banned {
        return Ok(());
    }

    if let Some(until) = user.banned_until {
        if until.with_timezone(&Utc) <= Utc::now() {
            let mut active: user::ActiveModel = user.into();
            active.is_banned = Set(false);
            active.banned_until = Set(None);
            active.ban_reason = Set(None);
            active.banned_at = Set(None);
            active.banned_by = Set(None);
            active.update(db).await?;
            return Ok(());
        }
    }

    Err(AppError::Forbidden("Account is banned".to_string()))
}

pub async fn ban_user(
    db: &DatabaseConnection,
    admin_id: Uuid,
    user_id: Uuid,
    until: Option<DateTime<Utc>>,
    reason: Option<String>,
) -> AppResult<user::Model> {
    let user = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.role == UserRole::Admin {
        return Err(AppError::Forbidden(
            "Administrator accounts cannot be banned".to_string(),
        ));
    }

    let mut active: user::ActiveModel = user.into();
    active.is_banned = Set(true);
    active.banned_until = Set(until.map(Into::into));
    active.ban_reason = Set(reason.clone());
    active.banned_at = Set(Some(Utc::now().into()));
    active.banned_by = Set(Some(admin_id));
    let updated = active.update(db).await?;

    log_admin_action(
        db,
        admin_id,
        "ban_user",
        Some(format!(
            "user={} until={} reason={}",
            user_id,
            until.map(|u| u.to_rfc3339()).unwrap_or_else(|| "forever".to_string()),
            reason.unwrap_or_default()
        )),
    )
    .await;

    Ok(updated)
}

pub async fn unban_user(
    db: &DatabaseConnection,
    admin_id: Uuid,
    user_id: Uuid,
) -> AppResult<user::Model> {
    let user = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut active: user::ActiveModel = user.into();
    active.is_banned = Set(false);
    active.banned_until = Set(None);
    active.ban_reason = Set(None);
    active.banned_at = Set(None);
    active.banned_by = Set(None);
    let updated = active.update(db).await?;

    log_admin_action(db, admin_id, "unban_user", Some(format!("user={}", user_id))).await;

    Ok(updated)
}

/// Append to the admin audit trail. Best-effort: a failed write is logged
/// and never fails the admin operation itself.
pub async fn log_admin_action(
    db: &DatabaseConnection,
    admin_id: Uuid,
    action: &str,
    details: Option<String>,
) {
    let entry = admin_log::ActiveModel {
        admin_id: Set(admin_id),
        action: Set(action.to_string()),
        details: Set(details),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };

    if let Err(err) = entry.insert(db).await {
        tracing::warn!(%err, action, "failed to record admin action");
    }
}
