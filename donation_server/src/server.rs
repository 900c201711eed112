use std::{sync::Arc, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use donation_engine::{
    events::{EventHandlers, EventProducers},
    MatchingApi,
    SqliteDatabase,
    WebhookApi,
};
use futures::{future::ok, FutureExt};
use log::*;

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    helpers::get_remote_ip,
    matching_worker::{MatchingWorker, MatchingWorkerStatus},
    middleware::ApiKeyMiddlewareFactory,
    routes::{
        health,
        matching_status,
        DonorsByProjectRoute,
        PreviewMatchingRoute,
        ProcessMatchingRoute,
        TgbWebhookRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let matching_api = MatchingApi::new(db.clone(), db.clone()).with_ordering(config.matching.ordering);
    let worker = MatchingWorker::new(matching_api.clone(), config.matching);
    let status = worker.status();
    let handlers = EventHandlers::new(128, worker.hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _sweep = worker.start_sweep();
    let srv = create_server_instance(config, db, matching_api, status, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    matching_api: MatchingApi<SqliteDatabase, SqliteDatabase>,
    status: Arc<MatchingWorkerStatus>,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    // Fail at startup rather than on the first webhook
    let decryptor = config.webhook.decryptor()?;
    let max_event_age = chrono::Duration::from_std(config.webhook.max_event_age)
        .map_err(|e| ServerError::InitializeError(format!("Invalid event max age. {e}")))?;
    let options = ServerOptions::from_config(&config);
    let status = web::Data::from(status);
    let srv = HttpServer::new(move || {
        let webhook_api =
            WebhookApi::new(db.clone(), decryptor.clone(), producers.clone()).with_max_event_age(max_event_age);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("dpg::access_log"))
            .app_data(web::Data::new(webhook_api))
            .app_data(web::Data::new(matching_api.clone()))
            .app_data(status.clone());
        let api_scope = web::scope("/api")
            .wrap(ApiKeyMiddlewareFactory::new(config.admin_api_key.clone()))
            .service(ProcessMatchingRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(PreviewMatchingRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(DonorsByProjectRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(matching_status);
        let whitelist = config.webhook.whitelist.clone();
        let webhook_scope = web::scope("/webhook")
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(&req, options);
                let whitelisted = match (peer_ip, &whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("💻️ Webhook from {ip}");
                        whitelist.contains(&ip)
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("💻️ No IP address found in webhook remote peer request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    srv.call(req).boxed_local()
                } else {
                    let err = ServerError::Forbidden("Webhook requests are not accepted from this address.".into());
                    ok(req.error_response(err)).boxed_local()
                }
            })
            .service(TgbWebhookRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
