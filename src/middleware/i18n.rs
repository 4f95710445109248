// src/middleware/i18n.rs

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::common::i18n::DEFAULT_LOCALE;

// Extrator de idioma: primeira tag do Accept-Language, só a parte primária ("fr-SN" -> "fr")
#[derive(Debug, Clone)]
pub struct Locale(pub String);

impl Locale {
    pub fn from_header(value: Option<&str>) -> Self {
        let lang = value
            .and_then(|header_str| {
                accept_language::parse(header_str)
                    .first()
                    .and_then(|tag| tag.split('-').next())
                    .map(|primary| primary.to_lowercase())
            })
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

        Locale(lang)
    }
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|header_value| header_value.to_str().ok());

        Ok(Locale::from_header(value))
    }
}
