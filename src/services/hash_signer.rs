//! PayU request and response hashes.
//!
//! Every hash is SHA-512 over pipe-joined fields, hex encoded in lowercase.
//!
//! - Payment request: `key|txnid|amount|productinfo|firstname|email|udf1..udf5|||||SALT`
//! - Callback response: `[additionalCharges|]SALT|status||||||udf5..udf1|email|firstname|productinfo|amount|txnid|key`
//! - Reporting command: `key|command|var1|SALT`

use rust_decimal::Decimal;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use crate::config::{GatewayConfig, MerchantCredentials};
use crate::error::AppError;
use crate::models::callback::CallbackForm;

/// Ordered inputs of a payment request hash.
///
/// The merchant key and salt come from the signer.
#[derive(Debug, Clone, Default)]
pub struct PaymentHashFields<'a> {
    pub txnid: &'a str,
    /// Already formatted with two decimals, see [`format_amount`]
    pub amount: &'a str,
    pub productinfo: &'a str,
    pub firstname: &'a str,
    pub email: &'a str,
    pub udf: [&'a str; 5],
}

/// Computes and checks PayU hashes for one merchant.
#[derive(Debug, Clone)]
pub struct HashSigner {
    credentials: MerchantCredentials,
}

/// SHA-512 of `input`, lowercase hex.
pub fn sha512_hex(input: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Amount as PayU expects it in hashes and forms: exactly two decimals.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

impl HashSigner {
    pub fn new(credentials: MerchantCredentials) -> Self {
        Self { credentials }
    }

    /// Build a signer from the gateway configuration.
    ///
    /// # Errors
    ///
    /// `Configuration` when the merchant key or salt is missing.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, AppError> {
        Ok(Self::new(config.credentials()?))
    }

    pub fn key(&self) -> &str {
        &self.credentials.key
    }

    /// Hash for a payment initiation form.
    pub fn sign_payment(&self, fields: &PaymentHashFields<'_>) -> String {
        let [udf1, udf2, udf3, udf4, udf5] = fields.udf;
        let hash_string = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|||||{}",
            self.credentials.key,
            fields.txnid,
            fields.amount,
            fields.productinfo,
            fields.firstname,
            fields.email,
            udf1,
            udf2,
            udf3,
            udf4,
            udf5,
            self.credentials.salt,
        );
        sha512_hex(&hash_string)
    }

    /// Hash PayU is expected to attach to a callback carrying `form`.
    ///
    /// Uses the key the merchant is configured with, not the one in the payload.
    pub fn response_hash(&self, form: &CallbackForm) -> String {
        let [udf1, udf2, udf3, udf4, udf5] = &form.udf;
        let base = format!(
            "{}|{}||||||{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.credentials.salt,
            form.status,
            udf5,
            udf4,
            udf3,
            udf2,
            udf1,
            form.email,
            form.firstname,
            form.productinfo,
            form.amount,
            form.txnid,
            self.credentials.key,
        );

        match &form.additional_charges {
            Some(charges) => sha512_hex(&format!("{}|{}", charges, base)),
            None => sha512_hex(&base),
        }
    }

    /// Check the hash a callback claims against one recomputed from its own fields.
    ///
    /// The comparison runs in constant time and ignores hex case.
    pub fn verify(&self, form: &CallbackForm) -> bool {
        let claimed = form.hash.trim().to_ascii_lowercase();
        if claimed.is_empty() {
            return false;
        }
        let expected = self.response_hash(form);
        expected.as_bytes().ct_eq(claimed.as_bytes()).into()
    }

    /// Hash for a reporting API command such as `verify_payment`.
    pub fn sign_command(&self, command: &str, var1: &str) -> String {
        sha512_hex(&format!(
            "{}|{}|{}|{}",
            self.credentials.key, command, var1, self.credentials.salt
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signer() -> HashSigner {
        HashSigner::new(MerchantCredentials {
            key: "gtKFFx".to_string(),
            salt: "eCwWELxi".to_string(),
        })
    }

    fn signed_form(signer: &HashSigner) -> CallbackForm {
        let mut form = CallbackForm {
            txnid: "TXN1".to_string(),
            status: "success".to_string(),
            amount: "100.00".to_string(),
            productinfo: "Payment for 100.00 INR".to_string(),
            firstname: "Jane".to_string(),
            email: "jane@x.com".to_string(),
            mihpayid: "G1".to_string(),
            ..CallbackForm::default()
        };
        form.hash = signer.response_hash(&form);
        form
    }

    #[test]
    fn test_payment_hash_matches_pipe_layout() {
        let signer = signer();
        let fields = PaymentHashFields {
            txnid: "TXN1",
            amount: "100.00",
            productinfo: "Payment",
            firstname: "Jane",
            email: "jane@x.com",
            udf: ["", "", "", "", ""],
        };

        let expected =
            sha512_hex("gtKFFx|TXN1|100.00|Payment|Jane|jane@x.com||||||||||eCwWELxi");
        assert_eq!(signer.sign_payment(&fields), expected);
    }

    #[test]
    fn test_payment_hash_is_deterministic() {
        let signer = signer();
        let fields = PaymentHashFields {
            txnid: "TXN1",
            amount: "100.00",
            productinfo: "Payment",
            firstname: "Jane",
            email: "jane@x.com",
            udf: ["a", "", "c", "", ""],
        };

        let first = signer.sign_payment(&fields);
        let second = signer.sign_payment(&fields.clone());
        assert_eq!(first, second);
        assert_eq!(first.len(), 128);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_amount_always_has_two_decimals() {
        assert_eq!(format_amount(dec!(100)), "100.00");
        assert_eq!(format_amount(dec!(100.5)), "100.50");
        assert_eq!(format_amount(dec!(99.999)), "100.00");
    }

    #[test]
    fn test_valid_callback_verifies() {
        let signer = signer();
        let form = signed_form(&signer);
        assert!(signer.verify(&form));

        let mut upper = form.clone();
        upper.hash = upper.hash.to_ascii_uppercase();
        assert!(signer.verify(&upper));
    }

    #[test]
    fn test_any_single_field_flip_fails_verification() {
        let signer = signer();
        let form = signed_form(&signer);

        let tampers: [fn(&mut CallbackForm); 8] = [
            |f| f.amount = "1.00".to_string(),
            |f| f.status = "failure".to_string(),
            |f| f.txnid = "TXN2".to_string(),
            |f| f.email = "eve@x.com".to_string(),
            |f| f.firstname = "Eve".to_string(),
            |f| f.productinfo = "Other".to_string(),
            |f| f.udf[2] = "x".to_string(),
            |f| f.additional_charges = Some("10.00".to_string()),
        ];

        for tamper in tampers {
            let mut tampered = form.clone();
            tamper(&mut tampered);
            assert!(!signer.verify(&tampered), "tampered form verified: {:?}", tampered);
        }
    }

    #[test]
    fn test_missing_hash_never_verifies() {
        let signer = signer();
        let mut form = signed_form(&signer);
        form.hash.clear();
        assert!(!signer.verify(&form));
    }

    #[test]
    fn test_additional_charges_prefix_the_response_hash() {
        let signer = signer();
        let mut form = signed_form(&signer);
        form.additional_charges = Some("5.00".to_string());

        let without = signer.response_hash(&CallbackForm {
            additional_charges: None,
            ..form.clone()
        });
        assert_ne!(signer.response_hash(&form), without);

        form.hash = signer.response_hash(&form);
        assert!(signer.verify(&form));
    }

    #[test]
    fn test_command_hash_layout() {
        let signer = signer();
        assert_eq!(
            signer.sign_command("verify_payment", "TXN1"),
            sha512_hex("gtKFFx|verify_payment|TXN1|eCwWELxi")
        );
    }
}
