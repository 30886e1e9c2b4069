use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;

/// Request logging middleware
///
/// Wraps every request in a span carrying a fresh `request_id` and logs the
/// outcome with status and latency. Headers and bodies are not logged; they
/// carry bearer tokens and passwords.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let span = tracing::info_span!(
            "http_request",
            request_id = %uuid::Uuid::new_v4(),
            method = %req.method(),
            path = %req.path(),
        );

        let service = self.service.clone();

        Box::pin(
            async move {
                tracing::debug!("Request started");
                let res = service.call(req).await?;

                let status = res.status();
                let elapsed_ms = start_time.elapsed().as_millis() as u64;
                if status.is_server_error() {
                    tracing::error!(status = status.as_u16(), elapsed_ms, "Request failed");
                } else {
                    tracing::info!(status = status.as_u16(), elapsed_ms, "Request completed");
                }

                Ok(res)
            }
            .instrument(span),
        )
    }
}
