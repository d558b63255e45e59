use std::{net::SocketAddr, sync::Arc};

use actix_web::{App, HttpResponse, HttpServer, Responder, dev::Server, get, web};
use log::{error, info};

use crate::runs::RunHistory;

#[get("/runs")]
async fn runs(history: web::Data<RunHistory>) -> impl Responder {
    HttpResponse::Ok().json(history.snapshot())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(runs);
}

/// Read-only view of the run history, so failed runs are visible outside the logs.
pub fn serve(addr: SocketAddr, history: Arc<RunHistory>) -> std::io::Result<Server> {
    let data = web::Data::from(history);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure)
    })
    .workers(1)
    .bind(addr)?
    .run();

    Ok(server)
}

/// Like `serve`, but a bind failure is logged and ingestion carries on without it.
pub fn start(addr: SocketAddr, history: Arc<RunHistory>) -> Option<Server> {
    match serve(addr, history) {
        Ok(server) => {
            info!("Run history available on http://{}/runs", addr);
            Some(server)
        }
        Err(e) => {
            error!("Can't start run history server on {}: {}", addr, e);
            None
        }
    }
}
