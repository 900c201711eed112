//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every handler here is async, and the webhook handler never waits
//! for the matching engine: it only queues a request for the matching worker.
use actix_web::{get, web, HttpResponse, Responder};
use donation_engine::{DonationStore, MatchingApi, MatchingDonorDirectory, WebhookApi};
use log::*;

use crate::{
    data_objects::{
        MatchingQuery,
        MatchingRequest,
        MatchingRunResponse,
        ProjectMatchReport,
        ProjectMatchRow,
        ProjectQuery,
        WebhookAck,
    },
    errors::ServerError,
    matching_worker::MatchingWorkerStatus,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(tgb_webhook => Post "/tgb" impl DonationStore);
/// Route handler for payment provider webhooks.
///
/// The body is a JSON envelope, `{"eventType": "...", "payload": "<hex>"}`, where the payload is the AES encrypted
/// event. A duplicate delivery of an event that has already been applied is acknowledged like a new one.
///
/// Requests that can never succeed (unparseable envelopes, undecryptable payloads, stale or undated events) get a 400.
/// Failures while applying a legitimate event get a 500, so that the provider delivers it again later.
pub async fn tgb_webhook<B: DonationStore>(
    body: web::Bytes,
    api: web::Data<WebhookApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received webhook request");
    let envelope = serde_json::from_slice(&body).map_err(|e| {
        warn!("💻️ Could not parse webhook envelope. {e}");
        ServerError::InvalidRequestBody(format!("Expected {{eventType, payload}}. {e}"))
    })?;
    let outcome = api.process_webhook(envelope).await?;
    debug!("💻️ Webhook outcome: {outcome:?}");
    Ok(HttpResponse::Ok().json(WebhookAck::default()))
}

//----------------------------------------------   Matching  ----------------------------------------------------
route!(process_matching => Post "/matching/process" impl DonationStore, MatchingDonorDirectory);
/// Route handler for manual matching runs.
///
/// Accepts an optional JSON body, `{"dryRun": bool, "minDate": "<ISO 8601>"}`. Without a body, a live run over every
/// unprocessed donation is started. The call returns once the run has completed.
pub async fn process_matching<B, D>(
    body: web::Bytes,
    api: web::Data<MatchingApi<B, D>>,
) -> Result<HttpResponse, ServerError>
where
    B: DonationStore,
    D: MatchingDonorDirectory,
{
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        MatchingRequest::default()
    } else {
        serde_json::from_slice::<MatchingRequest>(&body).map_err(|e| {
            debug!("💻️ Could not parse matching request. {e}");
            ServerError::InvalidRequestBody(e.to_string())
        })?
    };
    let options = request.into_options()?;
    info!("💻️ Manual matching run requested. dry run: {}, minDate: {:?}", options.dry_run, options.min_date);
    let result = api.run(options).await?;
    Ok(HttpResponse::Ok().json(MatchingRunResponse::new(options.dry_run, result)))
}

route!(preview_matching => Get "/matching/process" impl DonationStore, MatchingDonorDirectory);
/// Route handler for matching previews. This is a dry run unless `dryRun=false` is in the query string.
pub async fn preview_matching<B, D>(
    query: web::Query<MatchingQuery>,
    api: web::Data<MatchingApi<B, D>>,
) -> Result<HttpResponse, ServerError>
where
    B: DonationStore,
    D: MatchingDonorDirectory,
{
    let options = query.into_inner().into_options()?;
    debug!("💻️ GET matching run. dry run: {}, minDate: {:?}", options.dry_run, options.min_date);
    let result = api.run(options).await?;
    Ok(HttpResponse::Ok().json(MatchingRunResponse::new(options.dry_run, result)))
}

route!(donors_by_project => Get "/matching/donors-by-project" impl DonationStore, MatchingDonorDirectory);
/// Route handler for the per-project matching report: how much each matching donor has contributed to a project.
pub async fn donors_by_project<B, D>(
    query: web::Query<ProjectQuery>,
    api: web::Data<MatchingApi<B, D>>,
) -> Result<HttpResponse, ServerError>
where
    B: DonationStore,
    D: MatchingDonorDirectory,
{
    let slug = query
        .into_inner()
        .slug
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::InvalidQuery("The slug query parameter is required".into()))?;
    debug!("💻️ GET matching donors for project {slug}");
    let donors = api.matched_donors_for_project(&slug).await?;
    let report = ProjectMatchReport { project_slug: slug, donors: donors.into_iter().map(ProjectMatchRow::from).collect() };
    Ok(HttpResponse::Ok().json(report))
}

#[get("/matching/status")]
pub async fn matching_status(status: web::Data<MatchingWorkerStatus>) -> impl Responder {
    trace!("💻️ GET matching worker status");
    HttpResponse::Ok().json(status.snapshot().await)
}
