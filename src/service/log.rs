use std::{
    future::{ready, Ready},
    io::Write,
    time::Instant,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use colored::{ColoredString, Colorize};
use env_logger::{Builder, Env};
use futures_util::future::LocalBoxFuture;
use log::{info, warn, Level};

/// Logs one line per request and one per response with the elapsed time.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggerMiddlewareService { service }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let route = format!("{} {}", req.method(), req.path());
        info!("request: {}", route);
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let status = res.status();
            let elapsed = started.elapsed().as_millis();
            if status.is_server_error() {
                warn!("response: {} -> {} in {}ms", route, status, elapsed);
            } else {
                info!("response: {} -> {} in {}ms", route, status, elapsed);
            }
            Ok(res)
        })
    }
}

fn paint(level: Level) -> ColoredString {
    let name = level.as_str();
    match level {
        Level::Error => name.red().bold(),
        Level::Warn => name.yellow().bold(),
        Level::Info => name.green().bold(),
        Level::Debug => name.blue().bold(),
        Level::Trace => name.magenta().bold(),
    }
}

/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logger() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                paint(record.level()),
                record.target(),
                record.args()
            )
        })
        .init()
}
