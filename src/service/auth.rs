use std::{
    future::{ready, Ready},
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use log::debug;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;

/// The caller behind a verified bearer token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

impl AuthUser {
    pub fn display_name(&self) -> Option<String> {
        self.full_name.clone().or_else(|| self.username.clone())
    }
}

/// Turns a bearer token into a user. Implementations never touch the store.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Result<AuthUser, AppError>;
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Reads the user the middleware attached to this request.
pub fn current_user(req: &HttpRequest) -> Result<AuthUser, AppError> {
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthenticated("No authentication token provided".to_string()))
}

/// Resolves the bearer token, when one is present, and stores the
/// [`AuthUser`] in the request extensions. A token that fails to resolve
/// ends the request with 401; a missing token is left for the handler to
/// refuse through [`current_user`].
pub struct AuthMiddleware {
    pub identity: Arc<dyn IdentityProvider>,
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            identity: self.identity.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    identity: Arc<dyn IdentityProvider>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let resolved = bearer_token(req.headers()).map(|token| self.identity.resolve(token));
        match resolved {
            Some(Ok(user)) => {
                req.extensions_mut().insert(user);
            }
            Some(Err(err)) => {
                debug!("rejected bearer token on {}: {}", req.path(), err);
                return Box::pin(async move { Err(err.into()) });
            }
            None => {}
        }
        let fut = self.service.call(req);
        Box::pin(async move { fut.await })
    }
}

pub mod jwt {
    use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use super::{AuthUser, IdentityProvider};
    use crate::errors::AppError;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct UserMetadata {
        pub username: Option<String>,
        #[serde(alias = "fullName")]
        pub full_name: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Claims {
        pub sub: Uuid,
        pub email: Option<String>,
        pub exp: i64,
        #[serde(default)]
        pub user_metadata: UserMetadata,
    }

    /// HS256 tokens issued by the identity provider, verified locally with
    /// the shared secret.
    pub struct JwtIdentity {
        key: DecodingKey,
        validation: Validation,
    }

    impl JwtIdentity {
        pub fn new(secret: &str, audience: Option<&str>) -> Self {
            let mut validation = Validation::new(Algorithm::HS256);
            match audience {
                Some(aud) => validation.set_audience(&[aud]),
                None => validation.validate_aud = false,
            }
            Self {
                key: DecodingKey::from_secret(secret.as_bytes()),
                validation,
            }
        }
    }

    impl IdentityProvider for JwtIdentity {
        fn resolve(&self, token: &str) -> Result<AuthUser, AppError> {
            let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|err| {
                match err.kind() {
                    ErrorKind::ExpiredSignature => {
                        AppError::Unauthenticated("Authentication token has expired".to_string())
                    }
                    _ => AppError::Unauthenticated("Invalid authentication token".to_string()),
                }
            })?;
            let claims = data.claims;
            Ok(AuthUser {
                user_id: claims.sub,
                email: claims.email,
                username: claims.user_metadata.username,
                full_name: claims.user_metadata.full_name,
            })
        }
    }

}
