//! Inbound gateway callback payloads.
//!
//! PayU posts form-encoded bodies to the success and failure URLs, and to the
//! webhook URL. Handlers hand the raw field map to [`GatewayCallback::parse`],
//! which lifts the fields the reconciliation core understands into typed
//! values and keeps everything else in an `extra` bag.

use std::collections::BTreeMap;

use serde::Serialize;

/// Raw form fields exactly as posted by the gateway.
pub type RawPayload = BTreeMap<String, String>;

/// Which inbound endpoint a callback arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackEvent {
    Success,
    Failure,
    Webhook,
}

impl CallbackEvent {
    /// Event name stored on the audit record.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackEvent::Success => "payment_success",
            CallbackEvent::Failure => "payment_failure",
            CallbackEvent::Webhook => "webhook",
        }
    }
}

/// Fields common to every PayU callback.
///
/// Absent fields are empty strings; PayU omits fields freely and the hash
/// treats missing values as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackForm {
    pub key: String,
    pub txnid: String,
    pub mihpayid: String,
    pub status: String,
    pub unmappedstatus: String,
    pub amount: String,
    pub net_amount_debit: String,
    pub addedon: String,
    pub productinfo: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
    /// `udf1` through `udf5`, in order
    pub udf: [String; 5],
    /// `field1` through `field9`, only those present
    pub fields: BTreeMap<String, String>,
    pub bank_ref_num: String,
    pub bankcode: String,
    pub mode: String,
    pub payment_source: String,
    pub error: String,
    pub error_message: String,
    pub hash: String,
    pub additional_charges: Option<String>,
    /// Anything the gateway sent that is not mapped above
    pub extra: BTreeMap<String, String>,
}

/// Address and locale fields PayU includes on failure callbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerAddress {
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zipcode: String,
}

/// A parsed callback, tagged by the endpoint it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCallback {
    Success(CallbackForm),
    Failure {
        form: CallbackForm,
        address: CustomerAddress,
    },
    Webhook {
        event_name: Option<String>,
        form: CallbackForm,
    },
}

fn take(map: &mut RawPayload, key: &str) -> String {
    map.remove(key).unwrap_or_default()
}

fn take_first(map: &mut RawPayload, keys: &[&str]) -> String {
    let mut found = String::new();
    for key in keys {
        if let Some(value) = map.remove(*key) {
            if found.is_empty() {
                found = value;
            }
        }
    }
    found
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl CallbackForm {
    fn take_from(map: &mut RawPayload) -> Self {
        let udf = [
            take(map, "udf1"),
            take(map, "udf2"),
            take(map, "udf3"),
            take(map, "udf4"),
            take(map, "udf5"),
        ];

        let mut fields = BTreeMap::new();
        for n in 1..=9 {
            let name = format!("field{}", n);
            if let Some(value) = map.remove(&name) {
                fields.insert(name, value);
            }
        }

        Self {
            key: take(map, "key"),
            txnid: take(map, "txnid"),
            mihpayid: take(map, "mihpayid"),
            status: take(map, "status"),
            unmappedstatus: take(map, "unmappedstatus"),
            amount: take(map, "amount"),
            net_amount_debit: take(map, "net_amount_debit"),
            addedon: take(map, "addedon"),
            productinfo: take(map, "productinfo"),
            firstname: take(map, "firstname"),
            lastname: take(map, "lastname"),
            email: take(map, "email"),
            phone: take(map, "phone"),
            udf,
            fields,
            bank_ref_num: take(map, "bank_ref_num"),
            bankcode: take(map, "bankcode"),
            mode: take(map, "mode"),
            payment_source: take(map, "payment_source"),
            error: take(map, "error"),
            error_message: take_first(map, &["error_Message", "error_message"]),
            hash: take(map, "hash"),
            additional_charges: map.remove("additionalCharges").and_then(|v| non_empty(&v)),
            extra: BTreeMap::new(),
        }
    }

    /// Error code worth surfacing to the user; PayU sends `E000` for "no error".
    pub fn error_code(&self) -> Option<String> {
        non_empty(&self.error).filter(|code| code != "E000")
    }

    pub fn error_text(&self) -> Option<String> {
        non_empty(&self.error_message).filter(|msg| !msg.eq_ignore_ascii_case("no error"))
    }
}

impl CustomerAddress {
    fn take_from(map: &mut RawPayload) -> Self {
        Self {
            address1: take(map, "address1"),
            address2: take(map, "address2"),
            city: take(map, "city"),
            state: take(map, "state"),
            country: take(map, "country"),
            zipcode: take(map, "zipcode"),
        }
    }

    fn is_empty(&self) -> bool {
        self == &CustomerAddress::default()
    }
}

impl GatewayCallback {
    /// Lift the raw form fields into a typed callback for `event`.
    ///
    /// Never fails: missing fields become empty strings, unknown fields go to `extra`.
    pub fn parse(event: CallbackEvent, raw: &RawPayload) -> Self {
        let mut map = raw.clone();
        match event {
            CallbackEvent::Success => {
                let mut form = CallbackForm::take_from(&mut map);
                form.extra = map;
                GatewayCallback::Success(form)
            }
            CallbackEvent::Failure => {
                let mut form = CallbackForm::take_from(&mut map);
                let address = CustomerAddress::take_from(&mut map);
                form.extra = map;
                GatewayCallback::Failure { form, address }
            }
            CallbackEvent::Webhook => {
                let event_name = map
                    .remove("event")
                    .or_else(|| map.remove("event_type"))
                    .and_then(|e| non_empty(&e));
                let mut form = CallbackForm::take_from(&mut map);
                form.extra = map;
                GatewayCallback::Webhook { event_name, form }
            }
        }
    }

    pub fn event(&self) -> CallbackEvent {
        match self {
            GatewayCallback::Success(_) => CallbackEvent::Success,
            GatewayCallback::Failure { .. } => CallbackEvent::Failure,
            GatewayCallback::Webhook { .. } => CallbackEvent::Webhook,
        }
    }

    pub fn form(&self) -> &CallbackForm {
        match self {
            GatewayCallback::Success(form) => form,
            GatewayCallback::Failure { form, .. } => form,
            GatewayCallback::Webhook { form, .. } => form,
        }
    }

    /// Internal audit shape of this callback.
    pub fn normalize(&self) -> NormalizedCallback {
        let form = self.form();

        let mut merchant_fields = BTreeMap::new();
        for (i, value) in form.udf.iter().enumerate() {
            if let Some(value) = non_empty(value) {
                merchant_fields.insert(format!("udf{}", i + 1), value);
            }
        }
        for (name, value) in &form.fields {
            if let Some(value) = non_empty(value) {
                merchant_fields.insert(name.clone(), value);
            }
        }

        let (event_name, address) = match self {
            GatewayCallback::Webhook { event_name, .. } => (event_name.clone(), None),
            GatewayCallback::Failure { address, .. } if !address.is_empty() => {
                (None, Some(address.clone()))
            }
            _ => (None, None),
        };

        NormalizedCallback {
            reference_id: form.txnid.clone(),
            gateway_payment_id: non_empty(&form.mihpayid),
            status: form.status.trim().to_ascii_lowercase(),
            unmapped_status: non_empty(&form.unmappedstatus),
            amount: form.amount.clone(),
            net_amount_debit: non_empty(&form.net_amount_debit),
            added_on: non_empty(&form.addedon),
            product_info: form.productinfo.clone(),
            customer_first_name: form.firstname.clone(),
            customer_last_name: non_empty(&form.lastname),
            customer_email: form.email.clone(),
            customer_phone: form.phone.clone(),
            bank_reference: non_empty(&form.bank_ref_num),
            bank_code: non_empty(&form.bankcode),
            mode: non_empty(&form.mode),
            payment_source: non_empty(&form.payment_source),
            error_code: form.error_code(),
            error_message: form.error_text(),
            merchant_fields,
            address,
            event_name,
            extra: form.extra.clone(),
        }
    }
}

/// Gateway-neutral view of a callback, stored on every [`super::webhook::WebhookRecord`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedCallback {
    pub reference_id: String,
    pub gateway_payment_id: Option<String>,
    pub status: String,
    pub unmapped_status: Option<String>,
    pub amount: String,
    pub net_amount_debit: Option<String>,
    pub added_on: Option<String>,
    pub product_info: String,
    pub customer_first_name: String,
    pub customer_last_name: Option<String>,
    pub customer_email: String,
    pub customer_phone: String,
    pub bank_reference: Option<String>,
    pub bank_code: Option<String>,
    pub mode: Option<String>,
    pub payment_source: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub merchant_fields: BTreeMap<String, String>,
    pub address: Option<CustomerAddress>,
    pub event_name: Option<String>,
    pub extra: BTreeMap<String, String>,
}
