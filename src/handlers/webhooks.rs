use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use crate::{
    errors::ServiceError,
    handlers::{ApiResponse, AppState},
    services::order_lifecycle::WooCommerceOrder,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-wc-webhook-signature";

/// Checks `X-WC-Webhook-Signature`: base64 of the HMAC-SHA256 of the raw body.
pub fn verify_signature(headers: &HeaderMap, payload: &[u8], secret: &str) -> bool {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    // constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Signature value WooCommerce would send for `payload`.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid webhook secret: {}", e)))?;
    mac.update(payload);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

// POST /api/webhook/woocommerce
pub async fn woocommerce_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    if let Some(secret) = state.config.woocommerce_webhook_secret.as_deref() {
        if !verify_signature(&headers, &body, secret) {
            warn!("WooCommerce webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    // WooCommerce pings a new webhook with a form-encoded `webhook_id=` body
    if body.starts_with(b"webhook_id=") {
        info!("WooCommerce webhook ping received");
        return Ok(
            (StatusCode::OK, Json(ApiResponse::message("Webhook registered"))).into_response(),
        );
    }

    let payload: WooCommerceOrder = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("invalid WooCommerce payload: {}", e)))?;

    let (order, created) = state.lifecycle.ingest_woocommerce_order(payload).await?;
    let (status, message) = if created {
        (
            StatusCode::CREATED,
            format!(
                "Order {} received from {}",
                order.order_no, order.customer_name
            ),
        )
    } else {
        (
            StatusCode::OK,
            format!("Order {} was already received", order.order_no),
        )
    };

    Ok((status, Json(ApiResponse::with_message(order, message))).into_response())
}
