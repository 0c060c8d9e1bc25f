//! Request correlation ids.
//!
//! Every exchange carries an `x-request-id`. A client-supplied id is kept
//! as is; otherwise one is generated. The id is written onto the request
//! before anything downstream sees it and echoed on the response.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::{Rng, distr::Alphanumeric};

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const REQUEST_ID_LEN: usize = 20;

pub async fn propagate_request_id(mut request: Request, next: Next) -> Response {
    let request_id = match request.headers().get(&REQUEST_ID_HEADER) {
        Some(existing) if !existing.is_empty() => existing.clone(),
        _ => generate_request_id(),
    };

    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER.clone(), request_id.clone());

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER.clone(), request_id);
    response
}

/// Random alphanumeric id of `REQUEST_ID_LEN` characters.
pub fn generate_request_id() -> HeaderValue {
    let id: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(char::from)
        .collect();
    HeaderValue::from_str(&id).expect("alphanumeric ids are valid header values")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_twenty_alphanumerics() {
        let id = generate_request_id();
        let id = id.to_str().unwrap();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_request_id(), generate_request_id());
    }
}
