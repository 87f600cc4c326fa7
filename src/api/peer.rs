// Peer endpoint: POST /node/req/{req_type} with an {auth, data} body.
// The body arrives as raw bytes so a peer built on a plain HTTP client
// does not need exact content-type headers.

use actix_web::{HttpResponse, Scope, post, web};

use crate::{
    cluster::{auth, protocol},
    error::ConfitError,
    model::{
        common::{AppState, Envelope},
        replication::{PeerRequest, REQ_CHECK_MASTER, REQ_SYNC_MASTER, REQ_SYNC_SLAVE},
    },
};

#[post("/req/{req_type}")]
async fn node_request(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ConfitError> {
    let request: PeerRequest = serde_json::from_slice(&body)
        .map_err(|_| ConfitError::bad_request("bad request body format"))?;

    if !auth::verify_token(&request.auth, &data.settings.cluster_secret()) {
        return Err(ConfitError::not_permitted("invalid node auth"));
    }

    match path.into_inner().as_str() {
        REQ_SYNC_SLAVE => {
            protocol::handle_sync_slave(&data, &request.data).await?;
            Ok(HttpResponse::Ok().json(Envelope::ok()))
        }
        REQ_CHECK_MASTER => {
            let ver = protocol::handle_check_master(&data, &request.data).await?;
            Ok(HttpResponse::Ok().json(Envelope::success(ver)))
        }
        REQ_SYNC_MASTER => {
            let full = protocol::handle_sync_master(&data).await?;
            Ok(HttpResponse::Ok().json(Envelope::success(full)))
        }
        other => Err(ConfitError::bad_request(format!(
            "unknown node request type: {}",
            other
        ))),
    }
}

pub fn routes() -> Scope {
    web::scope("/node").service(node_request)
}
