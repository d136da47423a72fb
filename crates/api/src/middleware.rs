use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

/// Header the internal task queue sets on every delivery.
pub const QUEUE_NAME_HEADER: &str = "x-light-queue-name";

/// Name of the queue that delivered the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueName(pub String);

/// Only let requests delivered by the internal task queue through.
pub async fn require_queue_header(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let queue = extract_queue_name(req.headers())?;
    tracing::debug!(queue = %queue, "internal delivery");

    req.extensions_mut().insert(QueueName(queue));
    Ok(next.run(req).await)
}

fn extract_queue_name(headers: &HeaderMap) -> Result<String, StatusCode> {
    let value = headers
        .get(QUEUE_NAME_HEADER)
        .ok_or(StatusCode::FORBIDDEN)?
        .to_str()
        .map_err(|_| StatusCode::FORBIDDEN)?
        .trim();

    if value.is_empty() {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_or_blank_header_is_forbidden() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_queue_name(&headers), Err(StatusCode::FORBIDDEN));

        headers.insert(QUEUE_NAME_HEADER, HeaderValue::from_static("  "));
        assert_eq!(extract_queue_name(&headers), Err(StatusCode::FORBIDDEN));

        headers.insert(QUEUE_NAME_HEADER, HeaderValue::from_static("notifications"));
        assert_eq!(extract_queue_name(&headers).unwrap(), "notifications");
    }
}
