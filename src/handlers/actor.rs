//! Request context set by the upstream session layer.

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest};
use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::errors::AppError;

pub const ROLE_HEADER: &str = "X-Actor-Role";
pub const ID_HEADER: &str = "X-Actor-Id";
pub const GUEST_HEADER: &str = "X-Guest-Token";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Role headers win over a guest token when both are present.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Option<Actor>, AppError> {
    if let Some(role) = header(headers, ROLE_HEADER) {
        let id = header(headers, ID_HEADER)
            .ok_or_else(|| AppError::BadRequest(format!("{ID_HEADER} is required")))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| AppError::BadRequest(format!("{ID_HEADER} is not a valid id")))?;
        let actor = match role {
            "member" => Actor::Member(id),
            "creator" => Actor::Creator(id),
            "admin" => Actor::Admin(id),
            other => {
                return Err(AppError::BadRequest(format!(
                    "unknown actor role '{other}'"
                )))
            }
        };
        return Ok(Some(actor));
    }
    Ok(header(headers, GUEST_HEADER).map(|token| Actor::Guest(token.to_string())))
}

/// An authenticated caller; requests without one are refused.
#[derive(Debug, Clone)]
pub struct Caller(pub Actor);

impl FromRequest for Caller {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req.headers()).and_then(|actor| {
            actor
                .map(Caller)
                .ok_or_else(|| AppError::Forbidden("sign in to continue".to_string()))
        }))
    }
}

/// A caller that may be anonymous, e.g. a guest opening an inquiry.
#[derive(Debug, Clone)]
pub struct MaybeCaller(pub Option<Actor>);

impl FromRequest for MaybeCaller {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req.headers()).map(MaybeCaller))
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn role_and_id_make_an_actor() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((ROLE_HEADER, "creator"))
            .insert_header((ID_HEADER, id.to_string()))
            .to_http_request();
        assert_eq!(
            actor_from_headers(req.headers()).unwrap(),
            Some(Actor::Creator(id))
        );
    }

    #[test]
    fn guest_token_is_used_without_role() {
        let req = TestRequest::default()
            .insert_header((GUEST_HEADER, "tok123"))
            .to_http_request();
        assert_eq!(
            actor_from_headers(req.headers()).unwrap(),
            Some(Actor::Guest("tok123".to_string()))
        );
    }

    #[test]
    fn bad_headers_are_rejected() {
        let req = TestRequest::default()
            .insert_header((ROLE_HEADER, "member"))
            .to_http_request();
        assert!(matches!(
            actor_from_headers(req.headers()),
            Err(AppError::BadRequest(_))
        ));

        let req = TestRequest::default()
            .insert_header((ROLE_HEADER, "root"))
            .insert_header((ID_HEADER, Uuid::new_v4().to_string()))
            .to_http_request();
        assert!(actor_from_headers(req.headers()).is_err());
    }

    #[test]
    fn no_headers_means_anonymous() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(actor_from_headers(req.headers()).unwrap(), None);
    }
}
