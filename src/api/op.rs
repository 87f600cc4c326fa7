// Operator CRUD endpoints. Mutations run the write pipeline and carry the
// per-slave fan-out outcomes in the response; reads serve straight from
// the snapshot. Writes are accepted on the master only.

use actix_web::{HttpResponse, Responder, Scope, get, post, put, web};
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfitError,
    model::{common::AppState, common::Envelope, replication::SyncOutcome},
    service,
};

// All operator mutations are master-only; slaves stay read-only replicas.
fn conf_write_check(state: &AppState) -> Result<(), ConfitError> {
    if state.settings.is_master() {
        Ok(())
    } else {
        Err(ConfitError::not_permitted("write operations go to the master"))
    }
}

#[derive(Debug, Serialize)]
struct WriteResult<T> {
    #[serde(flatten)]
    row: T,
    sync: Vec<SyncOutcome>,
}

#[derive(Debug, Deserialize)]
struct NewUserReq {
    name: String,
    password: String,
    #[serde(default = "default_role")]
    role: String,
    #[serde(default)]
    op_user_key: String,
}

fn default_role() -> String {
    "op".to_string()
}

#[post("/user")]
async fn new_user(
    data: web::Data<AppState>,
    body: web::Json<NewUserReq>,
) -> Result<HttpResponse, ConfitError> {
    conf_write_check(&data)?;
    let req = body.into_inner();
    let (user, sync) =
        service::user::create(&data, &req.name, &req.password, &req.role, &req.op_user_key)
            .await?;
    Ok(HttpResponse::Ok().json(Envelope::success(WriteResult { row: user, sync })))
}

#[derive(Debug, Deserialize)]
struct UpdateUserReq {
    key: String,
    name: Option<String>,
    password: Option<String>,
    role: Option<String>,
    #[serde(default)]
    op_user_key: String,
}

#[put("/user")]
async fn update_user(
    data: web::Data<AppState>,
    body: web::Json<UpdateUserReq>,
) -> Result<HttpResponse, ConfitError> {
    conf_write_check(&data)?;
    let req = body.into_inner();
    let (user, sync) = service::user::update(
        &data,
        &req.key,
        req.name.as_deref(),
        req.password.as_deref(),
        req.role.as_deref(),
        &req.op_user_key,
    )
    .await?;
    Ok(HttpResponse::Ok().json(Envelope::success(WriteResult { row: user, sync })))
}

#[get("/users")]
async fn get_users(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(Envelope::success(service::user::list(&data)))
}

#[derive(Debug, Deserialize)]
struct NewAppReq {
    user_key: String,
    name: String,
    r#type: String,
    #[serde(default)]
    op_user_key: String,
}

#[post("/app")]
async fn new_app(
    data: web::Data<AppState>,
    body: web::Json<NewAppReq>,
) -> Result<HttpResponse, ConfitError> {
    conf_write_check(&data)?;
    let req = body.into_inner();
    let (app, sync) =
        service::app::create(&data, &req.user_key, &req.name, &req.r#type, &req.op_user_key)
            .await?;
    Ok(HttpResponse::Ok().json(Envelope::success(WriteResult { row: app, sync })))
}

#[derive(Debug, Deserialize)]
struct UpdateAppReq {
    key: String,
    name: Option<String>,
    r#type: Option<String>,
    #[serde(default)]
    op_user_key: String,
}

#[put("/app")]
async fn update_app(
    data: web::Data<AppState>,
    body: web::Json<UpdateAppReq>,
) -> Result<HttpResponse, ConfitError> {
    conf_write_check(&data)?;
    let req = body.into_inner();
    let (app, sync) = service::app::update(
        &data,
        &req.key,
        req.name.as_deref(),
        req.r#type.as_deref(),
        &req.op_user_key,
    )
    .await?;
    Ok(HttpResponse::Ok().json(Envelope::success(WriteResult { row: app, sync })))
}

#[get("/apps/{user_key}")]
async fn get_apps(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(Envelope::success(service::app::list_for_user(
        &data,
        &path.into_inner(),
    )))
}

#[derive(Debug, Deserialize)]
struct NewConfigReq {
    app_key: String,
    k: String,
    v: String,
    v_type: String,
    #[serde(default)]
    op_user_key: String,
}

#[post("/config")]
async fn new_config(
    data: web::Data<AppState>,
    body: web::Json<NewConfigReq>,
) -> Result<HttpResponse, ConfitError> {
    conf_write_check(&data)?;
    let req = body.into_inner();
    let (config, sync) = service::config::create(
        &data,
        &req.app_key,
        &req.k,
        &req.v,
        &req.v_type,
        &req.op_user_key,
    )
    .await?;
    Ok(HttpResponse::Ok().json(Envelope::success(WriteResult { row: config, sync })))
}

#[derive(Debug, Deserialize)]
struct UpdateConfigReq {
    key: String,
    k: Option<String>,
    v: Option<String>,
    v_type: Option<String>,
    status: Option<i32>,
    #[serde(default)]
    op_user_key: String,
}

#[put("/config")]
async fn update_config(
    data: web::Data<AppState>,
    body: web::Json<UpdateConfigReq>,
) -> Result<HttpResponse, ConfitError> {
    conf_write_check(&data)?;
    let req = body.into_inner();
    let (config, sync) = service::config::update(
        &data,
        &req.key,
        req.k.as_deref(),
        req.v.as_deref(),
        req.v_type.as_deref(),
        req.status,
        &req.op_user_key,
    )
    .await?;
    Ok(HttpResponse::Ok().json(Envelope::success(WriteResult { row: config, sync })))
}

#[get("/configs/{app_key}")]
async fn get_configs(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(Envelope::success(service::config::list_for_app(
        &data,
        &path.into_inner(),
    )))
}

#[derive(Debug, Deserialize)]
struct NewWebHookReq {
    app_key: Option<String>,
    url: String,
    #[serde(default = "default_scope")]
    scope: String,
    #[serde(default)]
    op_user_key: String,
}

fn default_scope() -> String {
    "global".to_string()
}

#[post("/webhook")]
async fn new_webhook(
    data: web::Data<AppState>,
    body: web::Json<NewWebHookReq>,
) -> Result<HttpResponse, ConfitError> {
    conf_write_check(&data)?;
    let req = body.into_inner();
    let (hook, sync) = service::webhook::create(
        &data,
        req.app_key.as_deref(),
        &req.url,
        &req.scope,
        &req.op_user_key,
    )
    .await?;
    Ok(HttpResponse::Ok().json(Envelope::success(WriteResult { row: hook, sync })))
}

#[derive(Debug, Deserialize)]
struct UpdateWebHookReq {
    key: String,
    url: String,
    #[serde(default)]
    op_user_key: String,
}

#[put("/webhook")]
async fn update_webhook(
    data: web::Data<AppState>,
    body: web::Json<UpdateWebHookReq>,
) -> Result<HttpResponse, ConfitError> {
    conf_write_check(&data)?;
    let req = body.into_inner();
    let (hook, sync) =
        service::webhook::update(&data, &req.key, &req.url, &req.op_user_key).await?;
    Ok(HttpResponse::Ok().json(Envelope::success(WriteResult { row: hook, sync })))
}

pub fn routes() -> Scope {
    web::scope("/op")
        .service(new_user)
        .service(update_user)
        .service(get_users)
        .service(new_app)
        .service(update_app)
        .service(get_apps)
        .service(new_config)
        .service(update_config)
        .service(get_configs)
        .service(new_webhook)
        .service(update_webhook)
}
