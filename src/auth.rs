//! Caller identity for the registry routes, read from an
//! `Authorization: <kind>:<id>` header.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    pub id: String,
}

impl Identity {
    pub fn parse(header: &str) -> Result<Self, AppError> {
        let (kind, id) = header
            .split_once(':')
            .ok_or(AppError::Unauthorized("Token non valido o assente"))?;
        let (kind, id) = (kind.trim(), id.trim());
        if kind.is_empty() || id.is_empty() {
            return Err(AppError::Unauthorized("Token malformato"));
        }

        let role = match kind.to_lowercase().as_str() {
            "studente" => Role::Student,
            "docente" => Role::Teacher,
            _ => return Err(AppError::Forbidden("Tipo utente non autorizzato")),
        };

        Ok(Self {
            role,
            id: id.to_string(),
        })
    }

    pub fn require(self, role: Role) -> Result<String, AppError> {
        if self.role == role {
            Ok(self.id)
        } else {
            Err(AppError::Forbidden("Accesso negato"))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized("Token non valido o assente"))?;
        Identity::parse(header)
    }
}

/// The id of a caller authenticated as a student.
#[derive(Debug, Clone)]
pub struct StudentId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for StudentId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        Ok(StudentId(identity.require(Role::Student)?))
    }
}

/// The id of a caller authenticated as a teacher.
#[derive(Debug, Clone)]
pub struct TeacherId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for TeacherId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        Ok(TeacherId(identity.require(Role::Teacher)?))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;

    use super::*;

    fn status(result: Result<Identity, AppError>) -> StatusCode {
        result.unwrap_err().into_response().status()
    }

    #[test]
    fn parses_kind_case_insensitively() {
        let identity = Identity::parse(" Docente : DOC1 ").unwrap();
        assert_eq!(identity.role, Role::Teacher);
        assert_eq!(identity.id, "DOC1");
    }

    #[test]
    fn malformed_headers_are_unauthorized() {
        assert_eq!(status(Identity::parse("studente")), StatusCode::UNAUTHORIZED);
        assert_eq!(status(Identity::parse("studente:  ")), StatusCode::UNAUTHORIZED);
        assert_eq!(status(Identity::parse(":STU1")), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unknown_kinds_are_forbidden() {
        assert_eq!(status(Identity::parse("admin:1")), StatusCode::FORBIDDEN);
    }

    #[test]
    fn role_mismatch_is_forbidden() {
        let identity = Identity::parse("studente:STU1").unwrap();
        let err = identity.require(Role::Teacher).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn extractor_reads_the_authorization_header() {
        let (mut parts, _) = Request::builder()
            .header(AUTHORIZATION, "studente:STU1")
            .body(())
            .unwrap()
            .into_parts();

        let StudentId(id) = StudentId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(id, "STU1");

        let err = TeacherId::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let err = Identity::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
