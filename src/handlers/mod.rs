use actix_web::web;

use crate::domain::errors::DomainError;
use crate::errors::AppError;

pub mod actor;
pub mod messages;
pub mod openapi;
pub mod orders;
pub mod services;
pub mod store;
pub mod webhook;

/// Runs synchronous diesel work on the blocking thread pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    Ok(web::block(f).await??)
}
