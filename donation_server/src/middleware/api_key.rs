//! API key middleware for Actix Web.
//!
//! Operator routes are protected by a single shared key, configured with `DPG_ADMIN_API_KEY` and supplied by callers
//! in the `X-Api-Key` header. When no key is configured the middleware lets every request through.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use dpg_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::errors::ServerError;

pub const API_KEY_HEADER: &str = "X-Api-Key";

pub struct ApiKeyMiddlewareFactory {
    key: Option<Secret<String>>,
}

impl ApiKeyMiddlewareFactory {
    pub fn new(key: Option<Secret<String>>) -> Self {
        ApiKeyMiddlewareFactory { key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = ApiKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyMiddlewareService { key: self.key.clone(), service: Rc::new(service) }))
    }
}

pub struct ApiKeyMiddlewareService<S> {
    key: Option<Secret<String>>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let key = self.key.clone();
        Box::pin(async move {
            let Some(key) = key else {
                trace!("🔐️ No API key is configured. Allowing request.");
                return service.call(req).await;
            };
            let supplied = req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
            match supplied {
                Some(s) if constant_time_eq(s.as_bytes(), key.reveal().as_bytes()) => {
                    trace!("🔐️ API key check for {} ✅️", req.path());
                    service.call(req).await
                },
                Some(_) => {
                    warn!("🔐️ Invalid API key supplied for {}. Denying access.", req.path());
                    Err(ServerError::Forbidden("Invalid API key.".into()).into())
                },
                None => {
                    warn!("🔐️ No API key supplied for {}. Denying access.", req.path());
                    Err(ServerError::Unauthorized(format!("The {API_KEY_HEADER} header is required.")).into())
                },
            }
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
