// Public client endpoint: effective configs for one app and one client.

use actix_web::{HttpResponse, Responder, Scope, get, web};
use serde::Serialize;
use std::collections::HashMap;

use crate::{
    error,
    model::{client::ClientData, common::AppState, common::Envelope},
    resolver,
    rules::Value,
};

#[derive(Debug, Serialize)]
struct ClientConf {
    nodes: Vec<String>,
    configs: HashMap<String, Value>,
    data_sign: String,
}

// GET /client/conf?app_key=...&os_type=...&os_version=...&app_version=...
//     &ip=...&lang=...&device_id=...&data_sign=...
//
// Configs are always returned; the submitted data_sign is informational
// and the client decides whether to apply the payload.
#[get("/conf")]
pub async fn conf(data: web::Data<AppState>, query: web::Query<ClientData>) -> impl Responder {
    let client = query.into_inner();

    if client.app_key.is_empty() {
        return HttpResponse::Ok().json(Envelope::<()>::failure(error::BAD_REQUEST));
    }

    let (nodes, data_sign) = data.shared.read(|mem| {
        (mem.node_urls(), mem.app_data_sign(&client.app_key))
    });

    let Some(data_sign) = data_sign else {
        return HttpResponse::Ok().json(Envelope::<()>::failure(error::BAD_REQUEST));
    };

    let configs = resolver::resolve(&data.shared, &client.app_key, &client);

    HttpResponse::Ok().json(Envelope::success(ClientConf {
        nodes,
        configs,
        data_sign,
    }))
}

pub fn routes() -> Scope {
    web::scope("/client").service(conf)
}
