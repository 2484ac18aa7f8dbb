use actix_web::web::{Data, Json};
use actix_web::{delete, get, post, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{Tenant, TokenService};
use crate::database::Database;
use crate::error::Error;

use super::{manager, User, UserId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterUserBody {
    pub email: String,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserBody {
    pub id: UserId,
    pub email: String,
    pub company_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl UserBody {
    pub fn render(user: User) -> UserBody {
        UserBody {
            id: user.id,
            email: user.email,
            company_name: user.company_name,
            created_at: user.created_at,
            modified_at: user.modified_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisteredUserBody {
    pub user: UserBody,
    pub token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

#[post("/users")]
#[tracing::instrument(skip(db, tokens))]
pub async fn register_user(
    db: Data<Box<dyn Database>>,
    tokens: Data<TokenService>,
    body: Json<RegisterUserBody>,
) -> Result<Json<RegisteredUserBody>, Error> {
    let body = body.into_inner();

    let user = manager::register_user(&***db, body.email, body.company_name).await?;
    let token = tokens.issue(user.id)?;

    Ok(Json(RegisteredUserBody {
        user: UserBody::render(user),
        token,
    }))
}

#[get("/users/me")]
#[tracing::instrument(skip(db))]
pub async fn get_current_user(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<UserBody>, Error> {
    let user = manager::get_user_by_id(&***db, tenant.user_id).await?;

    Ok(Json(UserBody::render(user)))
}

#[post("/users/me/token")]
#[tracing::instrument(skip(db, tokens))]
pub async fn refresh_token(
    db: Data<Box<dyn Database>>,
    tokens: Data<TokenService>,
    tenant: Tenant,
) -> Result<Json<TokenBody>, Error> {
    let user = manager::get_user_by_id(&***db, tenant.user_id).await?;
    let token = tokens.issue(user.id)?;

    Ok(Json(TokenBody { token }))
}

#[delete("/users/me")]
#[tracing::instrument(skip(db))]
pub async fn delete_current_user(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<HttpResponse, Error> {
    manager::delete_user(&***db, tenant.user_id).await?;

    Ok(HttpResponse::NoContent().finish())
}
