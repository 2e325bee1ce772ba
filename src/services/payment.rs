use crate::{config::GatewayConfig, errors::ServiceError, services::carts::LineSelection};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;
use url::Url;
use uuid::Uuid;

type HmacSha512 = Hmac<Sha512>;

// Gateway wire parameter names. The signature is computed over every
// parameter except `secure_hash` itself, canonically sorted by key.
pub const PARAM_VERSION: &str = "version";
pub const PARAM_COMMAND: &str = "command";
pub const PARAM_MERCHANT_CODE: &str = "merchant_code";
pub const PARAM_CURRENCY_CODE: &str = "currency_code";
pub const PARAM_LOCALE: &str = "locale";
pub const PARAM_TXN_REF: &str = "txn_ref";
pub const PARAM_ORDER_INFO: &str = "order_info";
pub const PARAM_AMOUNT: &str = "amount";
pub const PARAM_RETURN_URL: &str = "return_url";
pub const PARAM_IP_ADDR: &str = "ip_addr";
pub const PARAM_CREATE_DATE: &str = "create_date";
pub const PARAM_SECURE_HASH: &str = "secure_hash";
pub const PARAM_RESPONSE_CODE: &str = "response_code";
pub const PARAM_TRANSACTION_NO: &str = "transaction_no";

/// Gateway response code signalling an approved payment.
pub const RESPONSE_CODE_SUCCESS: &str = "00";

const CREATE_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// The prospective order carried opaquely through the gateway round-trip.
///
/// Embedded base64-encoded in the `order_info` parameter, so the callback is
/// self-describing: no pending-order row exists between redirect and
/// callback, and none is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub txn_ref: String,
    pub user_id: Uuid,
    pub payment_method: String,
    pub shipping_address: String,
    pub voucher_code: Option<String>,
    pub lines: Vec<LineSelection>,
    /// Total computed at redirect time; the callback's amount parameter must
    /// equal this.
    pub total_amount: Decimal,
}

impl OrderIntent {
    /// Deterministic order code for this intent. Keying the created order by
    /// it makes a redelivered callback find the existing order instead of
    /// creating a second one.
    pub fn order_number(&self) -> String {
        format!("ORD-{}", self.txn_ref)
    }
}

/// A callback that passed signature and amount verification.
#[derive(Debug)]
pub struct VerifiedCallback {
    pub intent: OrderIntent,
    pub amount: Decimal,
    pub response_code: String,
    pub transaction_no: Option<String>,
}

impl VerifiedCallback {
    pub fn payment_approved(&self) -> bool {
        self.response_code == RESPONSE_CODE_SUCCESS
    }
}

/// Builds outbound signed redirect URLs and verifies inbound signed
/// callbacks.
///
/// This is the only component allowed to let a value received over an
/// untrusted channel drive a financial state transition, which makes
/// [`PaymentGatewayService::verify_callback`] the most security-sensitive
/// code in the crate: signature first, then the amount cross-check, and only
/// then is the embedded intent believed.
#[derive(Clone)]
pub struct PaymentGatewayService {
    cfg: GatewayConfig,
}

impl PaymentGatewayService {
    pub fn new(cfg: GatewayConfig) -> Self {
        Self { cfg }
    }

    /// Serializes an order intent into the gateway's parameter set, signs
    /// it, and returns the redirect URL the buyer is sent to.
    ///
    /// The amount travels in integer minor units (price * 100). The
    /// signature is computed last, after every other parameter is fixed and
    /// canonically sorted.
    pub fn build_redirect(
        &self,
        intent: &OrderIntent,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Url, ServiceError> {
        let amount_minor = (intent.total_amount.round_dp(2) * Decimal::ONE_HUNDRED)
            .to_i64()
            .filter(|minor| *minor >= 0)
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "order total {} cannot be represented in minor units",
                    intent.total_amount
                ))
            })?;

        let mut params = BTreeMap::new();
        params.insert(PARAM_VERSION.to_string(), self.cfg.version.clone());
        params.insert(PARAM_COMMAND.to_string(), self.cfg.command.clone());
        params.insert(
            PARAM_MERCHANT_CODE.to_string(),
            self.cfg.merchant_code.clone(),
        );
        params.insert(
            PARAM_CURRENCY_CODE.to_string(),
            self.cfg.currency_code.clone(),
        );
        params.insert(PARAM_LOCALE.to_string(), self.cfg.locale.clone());
        params.insert(PARAM_TXN_REF.to_string(), intent.txn_ref.clone());
        params.insert(PARAM_ORDER_INFO.to_string(), encode_intent(intent)?);
        params.insert(PARAM_AMOUNT.to_string(), amount_minor.to_string());
        params.insert(PARAM_RETURN_URL.to_string(), self.cfg.return_url.clone());
        params.insert(PARAM_IP_ADDR.to_string(), client_ip.to_string());
        params.insert(
            PARAM_CREATE_DATE.to_string(),
            now.format(CREATE_DATE_FORMAT).to_string(),
        );

        let signature = self.sign(&canonical_query(&params))?;

        let mut url = Url::parse(&self.cfg.endpoint).map_err(|e| {
            ServiceError::InternalError(format!("invalid gateway endpoint: {e}"))
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(PARAM_SECURE_HASH, &signature);
        }
        Ok(url)
    }

    /// Verifies an inbound callback and extracts the embedded intent.
    ///
    /// Rejection never says why: a forged callback learns nothing from the
    /// response. The signature check runs before any field of the payload
    /// is interpreted, and the amount equality check runs before the caller
    /// is allowed to act on the intent.
    pub fn verify_callback(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<VerifiedCallback, ServiceError> {
        let Some(received_hash) = params.get(PARAM_SECURE_HASH) else {
            warn!("payment callback missing signature");
            return Err(ServiceError::SignatureError);
        };

        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(key, _)| key.as_str() != PARAM_SECURE_HASH)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let expected = self.sign(&canonical_query(&signed))?;

        if !constant_time_eq(&expected, received_hash) {
            warn!("payment callback signature mismatch");
            return Err(ServiceError::SignatureError);
        }

        // Signature holds from here on; the parameters are ours. Anything
        // malformed past this point is still treated as a rejection rather
        // than a diagnostic to avoid becoming an oracle.
        let intent = match params.get(PARAM_ORDER_INFO).map(|v| decode_intent(v)) {
            Some(Ok(intent)) => intent,
            _ => {
                warn!("payment callback carried an undecodable order intent");
                return Err(ServiceError::SignatureError);
            }
        };

        if params.get(PARAM_TXN_REF) != Some(&intent.txn_ref) {
            warn!("payment callback transaction reference does not match its intent");
            return Err(ServiceError::SignatureError);
        }

        let amount = match params
            .get(PARAM_AMOUNT)
            .and_then(|v| v.parse::<i64>().ok())
        {
            // Minor units back to major: divide by 100.
            Some(minor) if minor >= 0 => Decimal::new(minor, 2),
            _ => {
                warn!("payment callback carried an unparseable amount");
                return Err(ServiceError::SignatureError);
            }
        };

        if amount != intent.total_amount {
            warn!(
                txn_ref = %intent.txn_ref,
                "payment callback amount does not match the signed intent total"
            );
            return Err(ServiceError::SignatureError);
        }

        Ok(VerifiedCallback {
            amount,
            response_code: params
                .get(PARAM_RESPONSE_CODE)
                .cloned()
                .unwrap_or_default(),
            transaction_no: params.get(PARAM_TRANSACTION_NO).cloned(),
            intent,
        })
    }

    fn sign(&self, canonical: &str) -> Result<String, ServiceError> {
        let mut mac = HmacSha512::new_from_slice(self.cfg.secret_key.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("hmac init failed: {e}")))?;
        mac.update(canonical.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Canonical signing string: parameters sorted by key,
/// form-urlencoded. Both directions (outbound build, inbound verify) go
/// through this one function so the encodings can never drift apart.
fn canonical_query(params: &BTreeMap<String, String>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn encode_intent(intent: &OrderIntent) -> Result<String, ServiceError> {
    let json = serde_json::to_vec(intent)
        .map_err(|e| ServiceError::InternalError(format!("intent serialization failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_intent(encoded: &str) -> Result<OrderIntent, ServiceError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| ServiceError::SignatureError)?;
    serde_json::from_slice(&bytes).map_err(|_| ServiceError::SignatureError)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn gateway() -> PaymentGatewayService {
        PaymentGatewayService::new(GatewayConfig::default())
    }

    fn intent() -> OrderIntent {
        OrderIntent {
            txn_ref: "a1b2c3d4e5f60718293a4b5c6d7e8f90".to_string(),
            user_id: Uuid::new_v4(),
            payment_method: "gateway".to_string(),
            shipping_address: "1 Main St, Springfield".to_string(),
            voucher_code: Some("WELCOME10".to_string()),
            lines: vec![LineSelection {
                product_id: Uuid::new_v4(),
                variant_id: Uuid::new_v4(),
                quantity: 2,
            }],
            total_amount: dec!(140.00),
        }
    }

    fn callback_params(url: &Url) -> HashMap<String, String> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Rebuilds the signature the way the gateway would after appending its
    /// own response fields.
    fn resign(service: &PaymentGatewayService, params: &mut HashMap<String, String>) {
        params.remove(PARAM_SECURE_HASH);
        let sorted: BTreeMap<String, String> =
            params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let hash = service.sign(&canonical_query(&sorted)).unwrap();
        params.insert(PARAM_SECURE_HASH.to_string(), hash);
    }

    #[test]
    fn redirect_carries_all_required_parameters() {
        let service = gateway();
        let url = service
            .build_redirect(&intent(), "203.0.113.7", Utc::now())
            .unwrap();
        let params = callback_params(&url);

        for key in [
            PARAM_VERSION,
            PARAM_COMMAND,
            PARAM_MERCHANT_CODE,
            PARAM_CURRENCY_CODE,
            PARAM_LOCALE,
            PARAM_TXN_REF,
            PARAM_ORDER_INFO,
            PARAM_AMOUNT,
            PARAM_RETURN_URL,
            PARAM_IP_ADDR,
            PARAM_CREATE_DATE,
            PARAM_SECURE_HASH,
        ] {
            assert!(params.contains_key(key), "missing parameter {key}");
        }
        // 140.00 in minor units.
        assert_eq!(params[PARAM_AMOUNT], "14000");
    }

    #[test]
    fn unaltered_callback_verifies_and_decodes_the_intent() {
        let service = gateway();
        let original = intent();
        let url = service
            .build_redirect(&original, "203.0.113.7", Utc::now())
            .unwrap();

        let mut params = callback_params(&url);
        params.insert(PARAM_RESPONSE_CODE.to_string(), "00".to_string());
        params.insert(PARAM_TRANSACTION_NO.to_string(), "9912345".to_string());
        resign(&service, &mut params);

        let verified = service.verify_callback(&params).unwrap();
        assert!(verified.payment_approved());
        assert_eq!(verified.intent, original);
        assert_eq!(verified.amount, dec!(140.00));
        assert_eq!(verified.intent.order_number(), format!("ORD-{}", original.txn_ref));
    }

    #[test]
    fn any_single_altered_parameter_fails_verification() {
        let service = gateway();
        let url = service
            .build_redirect(&intent(), "203.0.113.7", Utc::now())
            .unwrap();
        let baseline = callback_params(&url);

        for key in baseline.keys() {
            let mut tampered = baseline.clone();
            tampered.insert(key.clone(), format!("{}x", tampered[key]));
            let err = service.verify_callback(&tampered).unwrap_err();
            assert!(
                matches!(err, ServiceError::SignatureError),
                "altering {key} should reject the callback"
            );
        }
    }

    #[test]
    fn missing_signature_is_rejected() {
        let service = gateway();
        let url = service
            .build_redirect(&intent(), "203.0.113.7", Utc::now())
            .unwrap();
        let mut params = callback_params(&url);
        params.remove(PARAM_SECURE_HASH);
        assert!(matches!(
            service.verify_callback(&params),
            Err(ServiceError::SignatureError)
        ));
    }

    #[test]
    fn resigned_amount_tamper_is_caught_by_the_equality_check() {
        // Even if an attacker could produce a valid signature over a
        // modified amount, the explicit amount-vs-intent comparison rejects
        // the callback.
        let service = gateway();
        let url = service
            .build_redirect(&intent(), "203.0.113.7", Utc::now())
            .unwrap();
        let mut params = callback_params(&url);
        params.insert(PARAM_AMOUNT.to_string(), "1".to_string());
        resign(&service, &mut params);

        assert!(matches!(
            service.verify_callback(&params),
            Err(ServiceError::SignatureError)
        ));
    }

    #[test]
    fn callback_signed_with_a_different_secret_is_rejected() {
        let service = gateway();
        let mut other_cfg = GatewayConfig::default();
        other_cfg.secret_key = "another_secret_that_is_long_enough_0123456789abc".to_string();
        let other = PaymentGatewayService::new(other_cfg);

        let url = other
            .build_redirect(&intent(), "203.0.113.7", Utc::now())
            .unwrap();
        let params = callback_params(&url);
        assert!(matches!(
            service.verify_callback(&params),
            Err(ServiceError::SignatureError)
        ));
    }

    #[test]
    fn intent_round_trips_through_the_opaque_payload() {
        let original = intent();
        let encoded = encode_intent(&original).unwrap();
        let decoded = decode_intent(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    proptest! {
        /// The canonical string is stable regardless of input ordering and
        /// signing it round-trips, while flipping any value breaks it.
        #[test]
        fn canonical_signing_round_trips(
            entries in proptest::collection::btree_map("[a-z_]{1,12}", "[a-zA-Z0-9 ./:-]{0,24}", 1..8)
        ) {
            let service = gateway();
            let canonical = canonical_query(&entries);
            let signature = service.sign(&canonical).unwrap();
            prop_assert!(constant_time_eq(&signature, &service.sign(&canonical).unwrap()));

            let mut tampered = entries.clone();
            let first_key = tampered.keys().next().unwrap().clone();
            let old = tampered[&first_key].clone();
            tampered.insert(first_key, format!("{old}!"));
            let tampered_sig = service.sign(&canonical_query(&tampered)).unwrap();
            prop_assert!(!constant_time_eq(&signature, &tampered_sig));
        }
    }
}
